//! In-memory [`PlanChangeStore`] for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bizdir_shared::{
    Business, BusinessId, PaymentHistoryEntry, Subscription, UserId, BILLING_PERIOD_DAYS,
};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::store::{PlanChangeStore, PlanCommit};

#[derive(Default)]
struct Tables {
    businesses: Vec<Business>,
    subscriptions: Vec<Subscription>,
    history: Vec<PaymentHistoryEntry>,
}

/// Store backed by vectors, with write counting and failure injection
#[derive(Default)]
pub struct MemoryPlanChangeStore {
    tables: Mutex<Tables>,
    writes: AtomicUsize,
    fail_commit: AtomicBool,
    conflict_commit: AtomicBool,
    fail_subscription_create: AtomicBool,
}

impl MemoryPlanChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a business owned by `owner_id` with the given stored plan
    pub async fn insert_business(
        &self,
        owner_id: UserId,
        plan_name: Option<&str>,
        plan_price: Option<i64>,
    ) -> BusinessId {
        let id = Uuid::new_v4();
        self.tables.lock().await.businesses.push(Business {
            id,
            owner_id: owner_id.0,
            name: "Test Business".to_string(),
            plan_name: plan_name.map(String::from),
            plan_price,
            subscription_status: None,
            next_billing_date: None,
            last_payment_date: None,
            updated_at: OffsetDateTime::now_utc(),
        });
        BusinessId(id)
    }

    /// Attach a subscription with an optional vault id
    pub async fn insert_subscription(&self, business_id: BusinessId, vault_id: Option<&str>) {
        let now = OffsetDateTime::now_utc();
        self.tables.lock().await.subscriptions.push(Subscription {
            id: Uuid::new_v4(),
            business_id: business_id.0,
            customer_vault_id: vault_id.map(String::from),
            status: "active".to_string(),
            payment_status: "paid".to_string(),
            current_period_start: now,
            current_period_end: now + Duration::days(BILLING_PERIOD_DAYS),
            created_at: now,
        });
    }

    pub async fn business(&self, business_id: BusinessId) -> Option<Business> {
        self.tables
            .lock()
            .await
            .businesses
            .iter()
            .find(|b| b.id == business_id.0)
            .cloned()
    }

    pub async fn subscription(&self, business_id: BusinessId) -> Option<Subscription> {
        self.tables
            .lock()
            .await
            .subscriptions
            .iter()
            .find(|s| s.business_id == business_id.0)
            .cloned()
    }

    pub async fn history(&self, business_id: BusinessId) -> Vec<PaymentHistoryEntry> {
        self.tables
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.business_id == business_id.0)
            .cloned()
            .collect()
    }

    /// Number of committed plan changes (business update + history insert)
    pub fn plan_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_next_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make commits lose the idempotency-key race to a concurrent request
    pub fn conflict_next_commits(&self, conflict: bool) {
        self.conflict_commit.store(conflict, Ordering::SeqCst);
    }

    pub fn fail_subscription_creates(&self, fail: bool) {
        self.fail_subscription_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlanChangeStore for MemoryPlanChangeStore {
    async fn find_owned_business(
        &self,
        business_id: BusinessId,
        owner_id: UserId,
    ) -> BillingResult<Option<Business>> {
        Ok(self
            .business(business_id)
            .await
            .filter(|b| b.owner_id == owner_id.0))
    }

    async fn find_subscription(
        &self,
        business_id: BusinessId,
    ) -> BillingResult<Option<Subscription>> {
        Ok(self.subscription(business_id).await)
    }

    async fn create_default_subscription(
        &self,
        business_id: BusinessId,
        now: OffsetDateTime,
    ) -> BillingResult<Subscription> {
        if self.fail_subscription_create.load(Ordering::SeqCst) {
            return Err(BillingError::Database("subscription insert failed".to_string()));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            business_id: business_id.0,
            customer_vault_id: None,
            status: "active".to_string(),
            payment_status: "pending".to_string(),
            current_period_start: now,
            current_period_end: now + Duration::days(BILLING_PERIOD_DAYS),
            created_at: now,
        };
        self.tables
            .lock()
            .await
            .subscriptions
            .push(subscription.clone());
        Ok(subscription)
    }

    async fn find_replay(
        &self,
        business_id: BusinessId,
        idempotency_key: &str,
    ) -> BillingResult<Option<PaymentHistoryEntry>> {
        Ok(self
            .history(business_id)
            .await
            .into_iter()
            .find(|h| h.idempotency_key.as_deref() == Some(idempotency_key)))
    }

    async fn commit_plan_change(&self, commit: PlanCommit) -> BillingResult<PaymentHistoryEntry> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(BillingError::Database("connection reset".to_string()));
        }

        let mut tables = self.tables.lock().await;

        let duplicate = commit.idempotency_key.is_some()
            && tables.history.iter().any(|h| {
                h.business_id == commit.business_id.0 && h.idempotency_key == commit.idempotency_key
            });
        if duplicate || self.conflict_commit.load(Ordering::SeqCst) {
            return Err(BillingError::AlreadyExists(
                "payment_history_business_idempotency_key".to_string(),
            ));
        }

        let business = tables
            .businesses
            .iter_mut()
            .find(|b| b.id == commit.business_id.0)
            .ok_or_else(|| BillingError::NotFound(format!("business {}", commit.business_id)))?;

        business.plan_name = Some(commit.plan_name.clone());
        business.plan_price = Some(commit.plan_price_cents);
        business.subscription_status = Some(PlanCommit::STATUS_ACTIVE.to_string());
        business.next_billing_date = Some(commit.next_billing_date);
        business.last_payment_date = Some(commit.now);
        business.updated_at = commit.now;

        let entry = PaymentHistoryEntry {
            id: Uuid::new_v4(),
            business_id: commit.business_id.0,
            transaction_id: commit.transaction_id,
            amount_cents: commit.amount_cents,
            status: PlanCommit::STATUS_APPROVED.to_string(),
            payment_type: commit.payment_type.as_str().to_string(),
            description: commit.description,
            plan_name: commit.plan_name.clone(),
            plan_price_cents: commit.plan_price_cents,
            idempotency_key: commit.idempotency_key,
            created_at: commit.now,
        };
        tables.history.push(entry.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(entry)
    }

    async fn list_history(
        &self,
        business_id: BusinessId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> BillingResult<Vec<PaymentHistoryEntry>> {
        let mut entries: Vec<PaymentHistoryEntry> = self
            .history(business_id)
            .await
            .into_iter()
            .filter(|h| h.created_at >= start && h.created_at <= end)
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}
