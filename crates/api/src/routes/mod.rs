//! API routes

pub mod health;
pub mod payment_history;
pub mod plan_change;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    auth::{require_auth, require_plan_change_auth},
    state::AppState,
};

/// Headers the Supabase JS client sends when invoking a function
const FUNCTION_CLIENT_HEADERS: [&str; 2] = ["x-client-info", "apikey"];

/// CORS policy for the browser-invoked function endpoints
fn function_cors() -> CorsLayer {
    let mut headers = vec![header::AUTHORIZATION, header::CONTENT_TYPE];
    headers.extend(FUNCTION_CLIENT_HEADERS.into_iter().map(HeaderName::from_static));

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(headers)
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Functions invoked directly from the dashboard. The CORS layer sits
    // outside auth so preflight requests are answered without a token.
    let function_routes = Router::new()
        .route("/upgrade-plan", post(plan_change::upgrade_plan))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_plan_change_auth,
        ))
        .layer(function_cors());

    // Protected API routes - under /api/v1
    let protected_api_routes = Router::new()
        .route(
            "/businesses/:id/payment-history",
            get(payment_history::list_payment_history),
        )
        .route(
            "/businesses/:id/payment-history.csv",
            get(payment_history::export_payment_history),
        )
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .merge(health_routes)
        .nest("/functions/v1", function_routes)
        .nest("/api/v1", protected_api_routes)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
