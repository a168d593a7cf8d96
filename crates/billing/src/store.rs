//! Persistence for the plan-change workflow
//!
//! The workflow only touches businesses, subscriptions and payment history.
//! [`PlanChangeStore`] is the seam between the workflow and the database;
//! [`PgPlanChangeStore`] is the production implementation.

use async_trait::async_trait;
use bizdir_shared::{
    Business, BusinessId, PaymentHistoryEntry, PaymentType, Subscription, UserId,
    BILLING_PERIOD_DAYS,
};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use crate::error::BillingResult;

/// Everything written when a plan change commits
#[derive(Debug, Clone)]
pub struct PlanCommit {
    pub business_id: BusinessId,
    pub plan_name: String,
    pub plan_price_cents: i64,
    pub now: OffsetDateTime,
    pub next_billing_date: OffsetDateTime,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub payment_type: PaymentType,
    pub description: String,
    pub idempotency_key: Option<String>,
}

impl PlanCommit {
    pub const STATUS_ACTIVE: &'static str = "active";
    pub const STATUS_APPROVED: &'static str = "approved";
}

/// Data access used by the plan-change workflow
#[async_trait]
pub trait PlanChangeStore: Send + Sync {
    /// Business owned by `owner_id`, or `None` when missing or owned by someone else
    async fn find_owned_business(
        &self,
        business_id: BusinessId,
        owner_id: UserId,
    ) -> BillingResult<Option<Business>>;

    async fn find_subscription(&self, business_id: BusinessId)
        -> BillingResult<Option<Subscription>>;

    /// Create the default subscription: active, payment pending, one billing period long
    async fn create_default_subscription(
        &self,
        business_id: BusinessId,
        now: OffsetDateTime,
    ) -> BillingResult<Subscription>;

    /// History entry previously committed under `idempotency_key`
    async fn find_replay(
        &self,
        business_id: BusinessId,
        idempotency_key: &str,
    ) -> BillingResult<Option<PaymentHistoryEntry>>;

    /// Update the business plan fields and append the history entry atomically
    async fn commit_plan_change(&self, commit: PlanCommit) -> BillingResult<PaymentHistoryEntry>;

    /// History entries in `[start, end]`, newest first
    async fn list_history(
        &self,
        business_id: BusinessId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> BillingResult<Vec<PaymentHistoryEntry>>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgPlanChangeStore {
    pool: PgPool,
}

impl PgPlanChangeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanChangeStore for PgPlanChangeStore {
    async fn find_owned_business(
        &self,
        business_id: BusinessId,
        owner_id: UserId,
    ) -> BillingResult<Option<Business>> {
        let business: Option<Business> = sqlx::query_as(
            r#"
            SELECT id, owner_id, name, plan_name, plan_price, subscription_status,
                   next_billing_date, last_payment_date, updated_at
            FROM businesses
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(business_id.0)
        .bind(owner_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(business)
    }

    async fn find_subscription(
        &self,
        business_id: BusinessId,
    ) -> BillingResult<Option<Subscription>> {
        let subscription: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT s.id, s.business_id, s.customer_vault_id, s.status, s.payment_status,
                   s.current_period_start, s.current_period_end, s.created_at
            FROM subscriptions s
            JOIN businesses b ON b.id = s.business_id
            WHERE b.id = $1
            "#,
        )
        .bind(business_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn create_default_subscription(
        &self,
        business_id: BusinessId,
        now: OffsetDateTime,
    ) -> BillingResult<Subscription> {
        let period_end = now + Duration::days(BILLING_PERIOD_DAYS);

        let subscription: Subscription = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (business_id, status, payment_status, current_period_start, current_period_end)
            VALUES ($1, 'active', 'pending', $2, $3)
            RETURNING id, business_id, customer_vault_id, status, payment_status,
                      current_period_start, current_period_end, created_at
            "#,
        )
        .bind(business_id.0)
        .bind(now)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            business_id = %business_id,
            subscription_id = %subscription.id,
            "Created default subscription"
        );

        Ok(subscription)
    }

    async fn find_replay(
        &self,
        business_id: BusinessId,
        idempotency_key: &str,
    ) -> BillingResult<Option<PaymentHistoryEntry>> {
        let entry: Option<PaymentHistoryEntry> = sqlx::query_as(
            r#"
            SELECT id, business_id, transaction_id, amount_cents, status, payment_type,
                   description, plan_name, plan_price_cents, idempotency_key, created_at
            FROM payment_history
            WHERE business_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(business_id.0)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn commit_plan_change(&self, commit: PlanCommit) -> BillingResult<PaymentHistoryEntry> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE businesses SET
                plan_name = $1,
                plan_price = $2,
                subscription_status = $3,
                next_billing_date = $4,
                last_payment_date = $5,
                updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&commit.plan_name)
        .bind(commit.plan_price_cents)
        .bind(PlanCommit::STATUS_ACTIVE)
        .bind(commit.next_billing_date)
        .bind(commit.now)
        .bind(commit.business_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Err(crate::error::BillingError::NotFound(format!(
                "business {}",
                commit.business_id
            )));
        }

        let entry: PaymentHistoryEntry = sqlx::query_as(
            r#"
            INSERT INTO payment_history
                (business_id, transaction_id, amount_cents, status, payment_type,
                 description, plan_name, plan_price_cents, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, business_id, transaction_id, amount_cents, status, payment_type,
                      description, plan_name, plan_price_cents, idempotency_key, created_at
            "#,
        )
        .bind(commit.business_id.0)
        .bind(&commit.transaction_id)
        .bind(commit.amount_cents)
        .bind(PlanCommit::STATUS_APPROVED)
        .bind(commit.payment_type.as_str())
        .bind(&commit.description)
        .bind(&commit.plan_name)
        .bind(commit.plan_price_cents)
        .bind(&commit.idempotency_key)
        .bind(commit.now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(entry)
    }

    async fn list_history(
        &self,
        business_id: BusinessId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> BillingResult<Vec<PaymentHistoryEntry>> {
        let entries: Vec<PaymentHistoryEntry> = sqlx::query_as(
            r#"
            SELECT id, business_id, transaction_id, amount_cents, status, payment_type,
                   description, plan_name, plan_price_cents, idempotency_key, created_at
            FROM payment_history
            WHERE business_id = $1
              AND created_at >= $2
              AND created_at <= $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(business_id.0)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
