// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Bizdir Billing Module
//!
//! Handles subscription plan changes for listed businesses.
//!
//! ## Features
//!
//! - **Plan Changes**: Upgrade (charge the price difference against the stored
//!   payment method) and downgrade (no charge) with an atomic audit record
//! - **Payment Gateway**: Form-encoded client for the merchant gateway, with
//!   decline-code translation and voids for compensating failed commits
//! - **Payment History**: Listing, summaries and CSV export

pub mod client;
pub mod error;
pub mod gateway;
pub mod history;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod plan_change;
pub mod store;

// Client
pub use client::{GatewayClient, GatewayConfig, GatewayMode, PaymentGateway, SaleRequest};

// Error
pub use error::{BillingError, BillingResult, GatewayError, GatewayResult, PlanChangeError};

// Gateway
pub use gateway::{decline_message, GatewayResponse, SaleApproval};

// History
pub use history::{PaymentHistoryService, PaymentSummary};

// Memory store (tests only)
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryPlanChangeStore;

// Plan change
pub use plan_change::{CallerIdentity, PlanChangeOutcome, PlanChangeRequest, PlanChangeService};

// Store
pub use store::{PgPlanChangeStore, PlanChangeStore, PlanCommit};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub plan_change: PlanChangeService,
    pub history: PaymentHistoryService,
}

impl BillingService {
    /// Create a new billing service backed by Postgres and the configured gateway
    pub fn new(config: GatewayConfig, pool: PgPool) -> BillingResult<Self> {
        let store: Arc<dyn PlanChangeStore> = Arc::new(PgPlanChangeStore::new(pool));
        let gateway: Arc<dyn PaymentGateway> = Arc::new(GatewayClient::new(config)?);
        Ok(Self::with_parts(store, gateway))
    }

    /// Create a billing service from explicit parts
    pub fn with_parts(store: Arc<dyn PlanChangeStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            plan_change: PlanChangeService::new(store.clone(), gateway),
            history: PaymentHistoryService::new(store),
        }
    }
}
