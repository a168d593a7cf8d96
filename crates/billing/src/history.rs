//! Payment History Export
//!
//! Read side of the plan-change audit log:
//! - Listing for the business owner's billing page
//! - CSV statements for reconciliation

use std::sync::Arc;

use bizdir_shared::{BusinessId, PaymentHistoryEntry, PaymentType, UserId};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::store::PlanChangeStore;

/// Default export window
const DEFAULT_LOOKBACK_DAYS: i64 = 365;

/// Service for reading payment history
#[derive(Clone)]
pub struct PaymentHistoryService {
    store: Arc<dyn PlanChangeStore>,
}

impl PaymentHistoryService {
    pub fn new(store: Arc<dyn PlanChangeStore>) -> Self {
        Self { store }
    }

    /// Whether `owner_id` owns the business
    pub async fn is_owner(&self, business_id: BusinessId, owner_id: UserId) -> BillingResult<bool> {
        Ok(self
            .store
            .find_owned_business(business_id, owner_id)
            .await?
            .is_some())
    }

    /// History entries for a business, newest first
    pub async fn list(
        &self,
        business_id: BusinessId,
        start_date: Option<OffsetDateTime>,
        end_date: Option<OffsetDateTime>,
    ) -> BillingResult<Vec<PaymentHistoryEntry>> {
        let (start, end) = resolve_window(start_date, end_date);
        self.store.list_history(business_id, start, end).await
    }

    /// Export payment history for a business to CSV format
    pub async fn export_csv(
        &self,
        business_id: BusinessId,
        start_date: Option<OffsetDateTime>,
        end_date: Option<OffsetDateTime>,
    ) -> BillingResult<String> {
        let records = self.list(business_id, start_date, end_date).await?;
        Ok(render_csv(&records))
    }

    /// Totals for a period
    pub async fn summary(
        &self,
        business_id: BusinessId,
        start_date: Option<OffsetDateTime>,
        end_date: Option<OffsetDateTime>,
    ) -> BillingResult<PaymentSummary> {
        let (start, end) = resolve_window(start_date, end_date);
        let records = self.store.list_history(business_id, start, end).await?;
        Ok(summarize(business_id, start, end, &records))
    }
}

fn resolve_window(
    start_date: Option<OffsetDateTime>,
    end_date: Option<OffsetDateTime>,
) -> (OffsetDateTime, OffsetDateTime) {
    let end = end_date.unwrap_or_else(OffsetDateTime::now_utc);
    let start = start_date.unwrap_or_else(|| end - time::Duration::days(DEFAULT_LOOKBACK_DAYS));
    (start, end)
}

fn render_csv(records: &[PaymentHistoryEntry]) -> String {
    let mut csv = String::new();

    // CSV Header
    csv.push_str("Date,Type,Description,Amount (USD),Status,Transaction\n");

    for record in records {
        let date = record
            .created_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            date,
            record.payment_type,
            escape_csv_field(&record.description),
            bizdir_shared::format_dollars(record.amount_cents),
            record.status,
            escape_csv_field(&record.transaction_id)
        ));
    }

    csv
}

fn summarize(
    business_id: BusinessId,
    period_start: OffsetDateTime,
    period_end: OffsetDateTime,
    records: &[PaymentHistoryEntry],
) -> PaymentSummary {
    let mut summary = PaymentSummary {
        business_id,
        period_start,
        period_end,
        total_charged_cents: 0,
        upgrade_count: 0,
        downgrade_count: 0,
        record_count: records.len(),
    };

    for record in records {
        match record.payment_type.parse::<PaymentType>() {
            Ok(PaymentType::PlanUpgrade) => {
                summary.upgrade_count += 1;
                summary.total_charged_cents += record.amount_cents;
            }
            Ok(PaymentType::PlanDowngrade) => summary.downgrade_count += 1,
            Err(_) => {}
        }
    }

    summary
}

/// Summary of plan-change payments for a period
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub business_id: BusinessId,
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub period_end: OffsetDateTime,
    pub total_charged_cents: i64,
    pub upgrade_count: usize,
    pub downgrade_count: usize,
    pub record_count: usize,
}

/// Escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
