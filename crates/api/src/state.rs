//! Shared application state

use std::sync::Arc;

use bizdir_billing::{BillingResult, BillingService};
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
}

impl AppState {
    /// Build state from configuration, wiring billing to Postgres and the gateway
    pub fn new(pool: PgPool, config: &Config) -> BillingResult<Self> {
        let billing = BillingService::new(config.gateway.clone(), pool.clone())?;
        Ok(Self::from_parts(
            pool,
            JwtManager::new(&config.supabase_jwt_secret),
            billing,
        ))
    }

    /// Build state from already constructed parts
    pub fn from_parts(pool: PgPool, jwt_manager: JwtManager, billing: BillingService) -> Self {
        Self {
            pool,
            jwt_manager,
            billing: Arc::new(billing),
        }
    }

    /// State for the authentication middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
