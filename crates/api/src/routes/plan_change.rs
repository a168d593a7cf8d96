//! Plan change function (upgrade / downgrade a business listing plan)

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::HeaderMap,
    Json,
};
use bizdir_billing::{CallerIdentity, PlanChangeError, PlanChangeOutcome, PlanChangeRequest};
use serde::Serialize;

use crate::{error::PlanChangeFailure, state::AppState};

/// Header carrying a client-chosen key that makes retries safe
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Successful plan change response
#[derive(Debug, Serialize)]
pub struct PlanChangeResponse {
    pub success: bool,
    pub message: String,
    pub is_downgrade: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

impl From<PlanChangeOutcome> for PlanChangeResponse {
    fn from(outcome: PlanChangeOutcome) -> Self {
        // Charge details are only reported for upgrades
        let upgrade = !outcome.is_downgrade;
        Self {
            success: true,
            message: outcome.message,
            is_downgrade: outcome.is_downgrade,
            transaction_id: outcome.transaction_id.filter(|_| upgrade),
            amount: upgrade.then_some(outcome.amount),
            status: upgrade.then_some(outcome.status),
            replayed: outcome.replayed,
        }
    }
}

/// Change the plan of a business owned by the caller
pub async fn upgrade_plan(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    headers: HeaderMap,
    payload: Result<Json<PlanChangeRequest>, JsonRejection>,
) -> Result<Json<PlanChangeResponse>, PlanChangeFailure> {
    let Json(mut request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected malformed plan change body");
        PlanChangeError::InvalidRequest(rejection.body_text())
    })?;

    if request.idempotency_key.is_none() {
        request.idempotency_key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
    }

    let outcome = state
        .billing
        .plan_change
        .change_plan(&caller, request)
        .await
        .map_err(|e| {
            if e.is_recoverable() {
                tracing::info!(user_id = %caller.user_id, "Plan change needs a payment method");
            } else {
                tracing::warn!(user_id = %caller.user_id, error = %e, "Plan change failed");
            }
            PlanChangeFailure(e)
        })?;

    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use bizdir_billing::MemoryPlanChangeStore;
    use bizdir_shared::{BusinessId, UserId, NO_TRANSACTION_ID};
    use serde_json::{json, Value};
    use time::Duration;
    use tower::ServiceExt;

    use crate::auth::jwt::test_tokens::{sign, TEST_SECRET};
    use crate::auth::jwt::SUPABASE_AUDIENCE;
    use crate::routes::{create_router, test_support::app_state};

    const PATH: &str = "/functions/v1/upgrade-plan";

    struct Fixture {
        store: Arc<MemoryPlanChangeStore>,
        business_id: BusinessId,
        token: String,
    }

    async fn fixture(plan_price: Option<i64>, vault_id: Option<&str>) -> Fixture {
        let store = Arc::new(MemoryPlanChangeStore::new());
        let owner = UserId::new();
        let business_id = store
            .insert_business(owner, Some("Enhanced"), plan_price)
            .await;
        store.insert_subscription(business_id, vault_id).await;
        let token = sign(TEST_SECRET, &owner.to_string(), SUPABASE_AUDIENCE, Duration::hours(1));

        Fixture {
            store,
            business_id,
            token,
        }
    }

    fn app(fixture: &Fixture, gateway_url: &str) -> Router {
        create_router(app_state(fixture.store.clone(), gateway_url))
    }

    fn post(token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(PATH)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_downgrade_succeeds_without_charge() {
        let fx = fixture(Some(4900), Some("cv_123")).await;
        let app = app(&fx, "http://127.0.0.1:9");

        let response = app
            .oneshot(post(
                Some(&fx.token),
                json!({
                    "businessId": fx.business_id.to_string(),
                    "currentPlan": "Enhanced",
                    "newPlan": "Starter",
                    "planPrice": 0
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["is_downgrade"], true);
        assert_eq!(body["message"], "Plan downgraded successfully");
        assert!(body.get("transaction_id").is_none());

        let history = fx.store.history(fx.business_id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction_id, NO_TRANSACTION_ID);
        assert_eq!(history[0].amount_cents, 0);
        assert_eq!(
            fx.store.business(fx.business_id).await.unwrap().plan_name.as_deref(),
            Some("Starter")
        );
    }

    #[tokio::test]
    async fn test_upgrade_charges_difference() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::UrlEncoded(
                "amount".into(),
                "49.00".into(),
            ))
            .with_status(200)
            .with_body("response=1&responsetext=SUCCESS&transactionid=txn_abc&response_code=100")
            .create_async()
            .await;

        let fx = fixture(None, Some("cv_123")).await;
        let app = app(&fx, &server.url());

        let response = app
            .oneshot(post(
                Some(&fx.token),
                json!({
                    "businessId": fx.business_id.to_string(),
                    "currentPlan": "Free",
                    "newPlan": "Enhanced",
                    "planPrice": 4900
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["is_downgrade"], false);
        assert_eq!(body["transaction_id"], "txn_abc");
        assert_eq!(body["amount"], 49.0);
        assert_eq!(body["status"], "approved");
        assert!(body.get("replayed").is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_vault_returns_payment_method_required() {
        let fx = fixture(Some(0), None).await;
        let app = app(&fx, "http://127.0.0.1:9");

        let response = app
            .oneshot(post(
                Some(&fx.token),
                json!({
                    "businessId": fx.business_id.to_string(),
                    "newPlan": "Enhanced",
                    "planPrice": 4900
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "payment_method_required");
        assert_eq!(body["requires_payment_method"], true);
        assert_eq!(fx.store.plan_writes(), 0);
    }

    #[tokio::test]
    async fn test_gateway_decline_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body("response=2&responsetext=DECLINE&response_code=200")
            .create_async()
            .await;

        let fx = fixture(Some(0), Some("cv_123")).await;
        let app = app(&fx, &server.url());

        let response = app
            .oneshot(post(
                Some(&fx.token),
                json!({
                    "businessId": fx.business_id.to_string(),
                    "newPlan": "VIP",
                    "planPrice": 9900
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["code"], "upgrade_error");
        assert_eq!(body["error"], "Transaction was declined by processor");
        assert_eq!(fx.store.plan_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_uses_error_envelope() {
        let fx = fixture(Some(0), Some("cv_123")).await;
        let app = app(&fx, "http://127.0.0.1:9");

        let response = app
            .oneshot(post(
                None,
                json!({
                    "businessId": fx.business_id.to_string(),
                    "newPlan": "Enhanced",
                    "planPrice": 4900
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "upgrade_error");
    }

    #[tokio::test]
    async fn test_other_users_business_is_rejected() {
        let fx = fixture(Some(0), Some("cv_123")).await;
        let app = app(&fx, "http://127.0.0.1:9");
        let stranger = sign(
            TEST_SECRET,
            &UserId::new().to_string(),
            SUPABASE_AUDIENCE,
            Duration::hours(1),
        );
        assert_ne!(stranger, fx.token);

        let response = app
            .oneshot(post(
                Some(&stranger),
                json!({
                    "businessId": fx.business_id.to_string(),
                    "newPlan": "Enhanced",
                    "planPrice": 4900
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Business not found or access denied");
        assert_eq!(fx.store.plan_writes(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_request() {
        let fx = fixture(Some(0), Some("cv_123")).await;
        let app = app(&fx, "http://127.0.0.1:9");

        let request = Request::builder()
            .method(Method::POST)
            .uri(PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", fx.token))
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["code"], "upgrade_error");
    }

    #[tokio::test]
    async fn test_idempotency_header_replays_without_second_charge() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::UrlEncoded(
                "orderid".into(),
                "retry-1".into(),
            ))
            .with_status(200)
            .with_body("response=1&responsetext=SUCCESS&transactionid=txn_once&response_code=100")
            .expect(1)
            .create_async()
            .await;

        let fx = fixture(Some(0), Some("cv_123")).await;
        let body = json!({
            "businessId": fx.business_id.to_string(),
            "newPlan": "Enhanced",
            "planPrice": 4900
        });

        for attempt in 0..2 {
            let mut request = post(Some(&fx.token), body.clone());
            request
                .headers_mut()
                .insert("idempotency-key", "retry-1".parse().unwrap());

            let response = app(&fx, &server.url()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let json = read_json(response).await;
            assert_eq!(json["transaction_id"], "txn_once");
            assert_eq!(json["replayed"].as_bool().unwrap_or(false), attempt == 1);
        }

        assert_eq!(fx.store.plan_writes(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_preflight_is_answered_without_auth() {
        let fx = fixture(Some(0), Some("cv_123")).await;
        let app = app(&fx, "http://127.0.0.1:9");

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(PATH)
            .header(header::ORIGIN, "https://dashboard.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(
                header::ACCESS_CONTROL_REQUEST_HEADERS,
                "authorization,x-client-info,apikey,content-type",
            )
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        let allowed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
            .unwrap()
            .to_str()
            .unwrap()
            .to_lowercase();
        assert!(allowed.contains("x-client-info"));
        assert!(allowed.contains("apikey"));
    }
}
