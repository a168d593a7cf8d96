//! Billing error types

use thiserror::Error;

/// Errors raised by the persistence layer and supporting services
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BillingError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // PostgreSQL unique violation
                if db_err.code().as_deref() == Some("23505") {
                    return BillingError::AlreadyExists(db_err.to_string());
                }
                BillingError::Database(db_err.to_string())
            }
            other => BillingError::Database(other.to_string()),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors talking to the payment gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered but refused the transaction
    #[error("{message}")]
    Declined {
        code: Option<String>,
        message: String,
    },

    #[error("Gateway returned HTTP {status}")]
    Http { status: u16 },

    #[error("Gateway request failed: {0}")]
    Transport(String),

    #[error("Malformed gateway response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Outcome kinds of a rejected plan change.
///
/// Callers branch on the variant (or [`PlanChangeError::code`]); the
/// `Display` impl is the human-readable message shown to the user.
#[derive(Debug, Error)]
pub enum PlanChangeError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Business not found or access denied")]
    NotFoundOrForbidden,

    #[error("Failed to create subscription: {0}")]
    SubscriptionCreateFailed(String),

    #[error("No plan change detected")]
    NoPlanChange,

    /// Recoverable: the caller should collect a payment method and retry
    #[error("A saved payment method is required to change plans")]
    PaymentMethodRequired,

    #[error("{message}")]
    GatewayDeclined {
        code: Option<String>,
        message: String,
    },

    /// The local write failed. When `transaction_id` is set the customer was
    /// charged; `voided` reports whether the charge was reversed.
    #[error("Failed to update plan: {reason}")]
    UpdateFailed {
        reason: String,
        transaction_id: Option<String>,
        voided: bool,
    },

    #[error("Unexpected error: {0}")]
    Unhandled(String),
}

impl PlanChangeError {
    pub const PAYMENT_METHOD_REQUIRED: &'static str = "payment_method_required";
    pub const UPGRADE_ERROR: &'static str = "upgrade_error";

    /// Machine-readable code carried in the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            PlanChangeError::PaymentMethodRequired => Self::PAYMENT_METHOD_REQUIRED,
            _ => Self::UPGRADE_ERROR,
        }
    }

    /// HTTP status for the error envelope
    pub fn status_code(&self) -> u16 {
        match self {
            PlanChangeError::PaymentMethodRequired => 400,
            _ => 500,
        }
    }

    /// Only a missing payment method is recoverable by the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlanChangeError::PaymentMethodRequired)
    }
}

impl From<GatewayError> for PlanChangeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined { code, message } => {
                PlanChangeError::GatewayDeclined { code, message }
            }
            other => PlanChangeError::GatewayDeclined {
                code: None,
                message: other.to_string(),
            },
        }
    }
}
