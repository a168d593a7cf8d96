//! Common types used across Bizdir

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Placeholder transaction id recorded when no gateway charge took place
pub const NO_TRANSACTION_ID: &str = "no_transaction_id";

/// Recorded when the gateway approved a charge but did not report its id
pub const UNREPORTED_TRANSACTION_ID: &str = "unreported_transaction_id";

/// Length of a plan billing period
pub const BILLING_PERIOD_DAYS: i64 = 365;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Business ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessId(pub Uuid);

impl BusinessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BusinessId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BusinessId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BusinessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A listed business with its denormalized plan fields
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Business {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub plan_name: Option<String>,
    /// Price in cents
    pub plan_price: Option<i64>,
    pub subscription_status: Option<String>,
    pub next_billing_date: Option<OffsetDateTime>,
    pub last_payment_date: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

impl Business {
    /// Stored plan price, with no recorded price counting as the free tier
    pub fn current_price_cents(&self) -> i64 {
        self.plan_price.unwrap_or(0)
    }
}

/// Subscription attached one-to-one to a business
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub business_id: Uuid,
    /// Gateway handle for the stored payment method
    pub customer_vault_id: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Vault id, ignoring blank values left behind by the dashboard
    pub fn vault_id(&self) -> Option<&str> {
        self.customer_vault_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Kind of plan transition recorded in payment history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    PlanUpgrade,
    PlanDowngrade,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::PlanUpgrade => "plan_upgrade",
            PaymentType::PlanDowngrade => "plan_downgrade",
        }
    }
}

impl std::str::FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan_upgrade" => Ok(PaymentType::PlanUpgrade),
            "plan_downgrade" => Ok(PaymentType::PlanDowngrade),
            other => Err(format!("unknown payment type: {}", other)),
        }
    }
}

/// Immutable audit row written once per committed plan transition
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentHistoryEntry {
    pub id: Uuid,
    pub business_id: Uuid,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub payment_type: String,
    pub description: String,
    /// Plan the business moved to with this transition
    pub plan_name: String,
    pub plan_price_cents: i64,
    pub idempotency_key: Option<String>,
    pub created_at: OffsetDateTime,
}

impl PaymentHistoryEntry {
    pub fn amount_dollars(&self) -> f64 {
        cents_to_dollars(self.amount_cents)
    }

    pub fn is_charge(&self) -> bool {
        self.transaction_id != NO_TRANSACTION_ID
    }
}

// =============================================================================
// Money
// =============================================================================

/// Format cents as a decimal dollar string, e.g. 4900 -> "49.00"
pub fn format_dollars(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}
