//! Payment history routes for business owners

use axum::{
    extract::{Extension, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bizdir_billing::{CallerIdentity, PaymentSummary};
use bizdir_shared::{BusinessId, PaymentHistoryEntry};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Optional reporting window
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
}

/// A single history row as shown on the billing page
#[derive(Debug, Serialize)]
pub struct PaymentHistoryItem {
    pub id: Uuid,
    pub transaction_id: String,
    pub amount: String,
    pub status: String,
    pub payment_type: String,
    pub description: String,
    pub plan_name: String,
    pub created_at: String,
}

impl From<PaymentHistoryEntry> for PaymentHistoryItem {
    fn from(entry: PaymentHistoryEntry) -> Self {
        Self {
            id: entry.id,
            amount: bizdir_shared::format_dollars(entry.amount_cents),
            created_at: entry.created_at.format(&Rfc3339).unwrap_or_default(),
            transaction_id: entry.transaction_id,
            status: entry.status,
            payment_type: entry.payment_type,
            description: entry.description,
            plan_name: entry.plan_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentHistoryResponse {
    pub payments: Vec<PaymentHistoryItem>,
    pub summary: PaymentSummary,
}

/// Reject callers that do not own the business
async fn ensure_owner(
    state: &AppState,
    business_id: BusinessId,
    caller: &CallerIdentity,
) -> Result<(), ApiError> {
    if state
        .billing
        .history
        .is_owner(business_id, caller.user_id)
        .await?
    {
        Ok(())
    } else {
        tracing::debug!(
            business_id = %business_id,
            user_id = %caller.user_id,
            "Payment history requested by non-owner"
        );
        Err(ApiError::NotFound)
    }
}

/// List a business's plan-change payments
pub async fn list_payment_history(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(business_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PaymentHistoryResponse>, ApiError> {
    let business_id = BusinessId::from(business_id);
    ensure_owner(&state, business_id, &caller).await?;

    let history = &state.billing.history;
    let payments = history.list(business_id, query.start, query.end).await?;
    let summary = history.summary(business_id, query.start, query.end).await?;

    Ok(Json(PaymentHistoryResponse {
        payments: payments.into_iter().map(PaymentHistoryItem::from).collect(),
        summary,
    }))
}

/// Download a business's plan-change payments as CSV
pub async fn export_payment_history(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(business_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let business_id = BusinessId::from(business_id);
    ensure_owner(&state, business_id, &caller).await?;

    let csv = state
        .billing
        .history
        .export_csv(business_id, query.start, query.end)
        .await?;

    tracing::info!(business_id = %business_id, "Exported payment history");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"payment-history-{}.csv\"", business_id),
            ),
        ],
        csv,
    )
        .into_response())
}
