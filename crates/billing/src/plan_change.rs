//! Subscription plan change (upgrade / downgrade)
//!
//! A single pass per request: validate, classify the price delta, then
//! either record a free downgrade or charge the difference against the
//! stored payment method and record the upgrade. Nothing is retried.
//!
//! The business update and its history entry are committed atomically by
//! the store. If the gateway charge succeeds but the commit fails, the
//! charge is voided so the customer is not billed for a plan they did
//! not receive.

use std::cmp::Ordering;
use std::sync::Arc;

use bizdir_shared::{
    Business, BusinessId, PaymentHistoryEntry, PaymentType, Subscription,
    UserId, BILLING_PERIOD_DAYS, NO_TRANSACTION_ID, UNREPORTED_TRANSACTION_ID,
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::client::{PaymentGateway, SaleRequest};
use crate::error::PlanChangeError;
use crate::store::{PlanChangeStore, PlanCommit};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Authenticated caller, resolved once at the HTTP boundary
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub email: Option<String>,
}

/// Plan change request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChangeRequest {
    pub business_id: Option<String>,
    pub current_plan: Option<String>,
    pub new_plan: Option<String>,
    /// Price of the new plan in cents
    pub plan_price: Option<i64>,
    pub customer_email: Option<String>,
    pub discount_code: Option<String>,
    /// Discounted charge for an upgrade, in cents
    pub discounted_amount: Option<i64>,
    pub idempotency_key: Option<String>,
}

/// Request with mandatory fields checked
#[derive(Debug, Clone)]
struct ValidatedRequest {
    business_id: BusinessId,
    current_plan: Option<String>,
    new_plan: String,
    plan_price: i64,
    customer_email: Option<String>,
    discount_code: Option<String>,
    discounted_amount: Option<i64>,
    idempotency_key: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PlanChangeRequest {
    fn validate(self) -> Result<ValidatedRequest, PlanChangeError> {
        let raw_business_id = non_blank(self.business_id)
            .ok_or_else(|| PlanChangeError::InvalidRequest("businessId is required".to_string()))?;
        let new_plan = non_blank(self.new_plan)
            .ok_or_else(|| PlanChangeError::InvalidRequest("newPlan is required".to_string()))?;
        let plan_price = self
            .plan_price
            .ok_or_else(|| PlanChangeError::InvalidRequest("planPrice is required".to_string()))?;

        if plan_price < 0 {
            return Err(PlanChangeError::InvalidRequest(
                "planPrice must not be negative".to_string(),
            ));
        }

        // An id that cannot name a row cannot name one the caller owns
        let business_id = Uuid::parse_str(&raw_business_id)
            .map(BusinessId::from)
            .map_err(|_| PlanChangeError::NotFoundOrForbidden)?;

        let idempotency_key = non_blank(self.idempotency_key);
        if idempotency_key
            .as_ref()
            .is_some_and(|key| key.len() > MAX_IDEMPOTENCY_KEY_LEN)
        {
            return Err(PlanChangeError::InvalidRequest(format!(
                "idempotencyKey must be at most {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }

        Ok(ValidatedRequest {
            business_id,
            current_plan: non_blank(self.current_plan),
            new_plan,
            plan_price,
            customer_email: non_blank(self.customer_email),
            discount_code: non_blank(self.discount_code),
            discounted_amount: self.discounted_amount,
            idempotency_key,
        })
    }
}

/// A committed (or replayed) plan change
#[derive(Debug, Clone, PartialEq)]
pub struct PlanChangeOutcome {
    pub is_downgrade: bool,
    pub message: String,
    pub plan_name: String,
    pub plan_price_cents: i64,
    /// Gateway transaction id; `None` when nothing was charged
    pub transaction_id: Option<String>,
    /// Charged amount in dollars
    pub amount: f64,
    pub status: String,
    pub history_id: Uuid,
    /// True when an earlier commit was returned for a repeated idempotency key
    pub replayed: bool,
}

impl PlanChangeOutcome {
    fn from_entry(entry: &PaymentHistoryEntry) -> Self {
        let is_downgrade = entry.payment_type == PaymentType::PlanDowngrade.as_str();
        Self {
            is_downgrade,
            message: if is_downgrade {
                "Plan downgraded successfully".to_string()
            } else {
                "Plan upgraded successfully".to_string()
            },
            plan_name: entry.plan_name.clone(),
            plan_price_cents: entry.plan_price_cents,
            transaction_id: entry.is_charge().then(|| entry.transaction_id.clone()),
            amount: entry.amount_dollars(),
            status: entry.status.clone(),
            history_id: entry.id,
            replayed: false,
        }
    }
}

/// Runs plan changes against a store and a payment gateway
#[derive(Clone)]
pub struct PlanChangeService {
    store: Arc<dyn PlanChangeStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PlanChangeService {
    pub fn new(store: Arc<dyn PlanChangeStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Change the plan of a business owned by `caller`
    pub async fn change_plan(
        &self,
        caller: &CallerIdentity,
        request: PlanChangeRequest,
    ) -> Result<PlanChangeOutcome, PlanChangeError> {
        let request = request.validate()?;
        let business_id = request.business_id;

        let business = self
            .store
            .find_owned_business(business_id, caller.user_id)
            .await
            .map_err(|e| PlanChangeError::Unhandled(e.to_string()))?
            .ok_or(PlanChangeError::NotFoundOrForbidden)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            let previous = self
                .store
                .find_replay(business_id, key)
                .await
                .map_err(|e| PlanChangeError::Unhandled(e.to_string()))?;

            if let Some(entry) = previous {
                tracing::info!(
                    business_id = %business_id,
                    history_id = %entry.id,
                    "Replaying committed plan change for repeated idempotency key"
                );
                let mut outcome = PlanChangeOutcome::from_entry(&entry);
                outcome.replayed = true;
                return Ok(outcome);
            }
        }

        if business.plan_price.is_none() {
            tracing::debug!(
                business_id = %business_id,
                "No stored plan price; treating current plan as free tier"
            );
        }
        let current_price = business.current_price_cents();
        let delta = request
            .plan_price
            .checked_sub(current_price)
            .ok_or_else(|| {
                tracing::warn!(
                    business_id = %business_id,
                    current_price_cents = current_price,
                    new_price_cents = request.plan_price,
                    "Plan price difference out of range"
                );
                PlanChangeError::InvalidRequest("planPrice is out of range".to_string())
            })?;

        if delta == 0 {
            return Err(PlanChangeError::NoPlanChange);
        }

        let subscription = self.resolve_subscription(business_id).await?;

        tracing::info!(
            business_id = %business_id,
            user_id = %caller.user_id,
            new_plan = %request.new_plan,
            current_price_cents = current_price,
            new_price_cents = request.plan_price,
            delta_cents = delta,
            "Processing plan change"
        );

        match delta.cmp(&0) {
            Ordering::Less => self.downgrade(&business, &subscription, &request).await,
            _ => {
                self.upgrade(caller, &business, &subscription, &request, delta)
                    .await
            }
        }
    }

    /// Load the business's subscription, creating the default one if missing
    async fn resolve_subscription(
        &self,
        business_id: BusinessId,
    ) -> Result<Subscription, PlanChangeError> {
        let existing = self
            .store
            .find_subscription(business_id)
            .await
            .map_err(|e| PlanChangeError::Unhandled(e.to_string()))?;

        match existing {
            Some(subscription) => Ok(subscription),
            None => self
                .store
                .create_default_subscription(business_id, OffsetDateTime::now_utc())
                .await
                .map_err(|e| {
                    tracing::error!(
                        business_id = %business_id,
                        error = %e,
                        "Failed to create default subscription"
                    );
                    PlanChangeError::SubscriptionCreateFailed(e.to_string())
                }),
        }
    }

    async fn downgrade(
        &self,
        business: &Business,
        subscription: &Subscription,
        request: &ValidatedRequest,
    ) -> Result<PlanChangeOutcome, PlanChangeError> {
        if subscription.vault_id().is_none() {
            tracing::info!(
                business_id = %request.business_id,
                "Downgrade blocked: no stored payment method"
            );
            return Err(PlanChangeError::PaymentMethodRequired);
        }

        let now = OffsetDateTime::now_utc();
        let commit = PlanCommit {
            business_id: request.business_id,
            plan_name: request.new_plan.clone(),
            plan_price_cents: request.plan_price,
            now,
            next_billing_date: now + Duration::days(BILLING_PERIOD_DAYS),
            transaction_id: NO_TRANSACTION_ID.to_string(),
            amount_cents: 0,
            payment_type: PaymentType::PlanDowngrade,
            description: describe(PaymentType::PlanDowngrade, business, request),
            idempotency_key: request.idempotency_key.clone(),
        };

        let entry = self.store.commit_plan_change(commit).await.map_err(|e| {
            tracing::error!(
                business_id = %request.business_id,
                error = %e,
                "Failed to commit plan downgrade"
            );
            PlanChangeError::UpdateFailed {
                reason: e.to_string(),
                transaction_id: None,
                voided: false,
            }
        })?;

        tracing::info!(
            business_id = %request.business_id,
            new_plan = %request.new_plan,
            history_id = %entry.id,
            "Plan downgraded"
        );

        Ok(PlanChangeOutcome::from_entry(&entry))
    }

    async fn upgrade(
        &self,
        caller: &CallerIdentity,
        business: &Business,
        subscription: &Subscription,
        request: &ValidatedRequest,
        delta: i64,
    ) -> Result<PlanChangeOutcome, PlanChangeError> {
        let vault_id = subscription.vault_id().ok_or_else(|| {
            tracing::info!(
                business_id = %request.business_id,
                "Upgrade blocked: no stored payment method"
            );
            PlanChangeError::PaymentMethodRequired
        })?;

        let charge_cents = match request.discounted_amount {
            Some(amount) if !(0..=delta).contains(&amount) => {
                return Err(PlanChangeError::InvalidRequest(format!(
                    "discountedAmount must be between 0 and {}",
                    delta
                )));
            }
            Some(amount) => amount,
            None => delta,
        };

        // `charged` is the id to void if the commit fails
        let (transaction_id, charged) = if charge_cents == 0 {
            tracing::info!(
                business_id = %request.business_id,
                discount_code = ?request.discount_code,
                "Upgrade fully discounted; skipping gateway charge"
            );
            (NO_TRANSACTION_ID.to_string(), None)
        } else {
            let sale = SaleRequest {
                amount_cents: charge_cents,
                customer_vault_id: vault_id.to_string(),
                order_description: describe(PaymentType::PlanUpgrade, business, request),
                email: request
                    .customer_email
                    .clone()
                    .or_else(|| caller.email.clone()),
                order_id: request.idempotency_key.clone(),
            };

            let approval = self.gateway.sale(&sale).await.map_err(|e| {
                tracing::warn!(
                    business_id = %request.business_id,
                    error = %e,
                    "Plan upgrade charge failed"
                );
                PlanChangeError::from(e)
            })?;

            match approval.transaction_id {
                Some(id) => (id.clone(), Some(id)),
                None => {
                    tracing::error!(
                        business_id = %request.business_id,
                        amount = %bizdir_shared::format_dollars(charge_cents),
                        "Gateway approved charge without a transaction id; manual reconciliation required"
                    );
                    (UNREPORTED_TRANSACTION_ID.to_string(), None)
                }
            }
        };

        let now = OffsetDateTime::now_utc();
        let commit = PlanCommit {
            business_id: request.business_id,
            plan_name: request.new_plan.clone(),
            plan_price_cents: request.plan_price,
            now,
            next_billing_date: now + Duration::days(BILLING_PERIOD_DAYS),
            transaction_id: transaction_id.clone(),
            amount_cents: charge_cents,
            payment_type: PaymentType::PlanUpgrade,
            description: describe(PaymentType::PlanUpgrade, business, request),
            idempotency_key: request.idempotency_key.clone(),
        };

        let entry = match self.store.commit_plan_change(commit).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(
                    business_id = %request.business_id,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Failed to commit plan upgrade after charge"
                );
                return Err(self.compensate(charged.as_deref(), e.to_string()).await);
            }
        };

        tracing::info!(
            business_id = %request.business_id,
            new_plan = %request.new_plan,
            transaction_id = %transaction_id,
            amount = %bizdir_shared::format_dollars(charge_cents),
            "Plan upgraded"
        );

        Ok(PlanChangeOutcome::from_entry(&entry))
    }

    /// Reverse a charge whose plan change could not be recorded
    async fn compensate(&self, transaction_id: Option<&str>, reason: String) -> PlanChangeError {
        let Some(transaction_id) = transaction_id else {
            return PlanChangeError::UpdateFailed {
                reason,
                transaction_id: None,
                voided: false,
            };
        };

        let voided = match self.gateway.void(transaction_id).await {
            Ok(()) => {
                tracing::warn!(transaction_id = %transaction_id, "Voided orphaned upgrade charge");
                true
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Failed to void orphaned upgrade charge; manual reconciliation required"
                );
                false
            }
        };

        PlanChangeError::UpdateFailed {
            reason,
            transaction_id: Some(transaction_id.to_string()),
            voided,
        }
    }
}

/// Human-readable history description
fn describe(payment_type: PaymentType, business: &Business, request: &ValidatedRequest) -> String {
    let from = request
        .current_plan
        .clone()
        .or_else(|| business.plan_name.clone())
        .unwrap_or_else(|| "Free".to_string());
    let verb = match payment_type {
        PaymentType::PlanUpgrade => "upgrade",
        PaymentType::PlanDowngrade => "downgrade",
    };

    match request.discount_code.as_deref() {
        Some(code) if payment_type == PaymentType::PlanUpgrade => format!(
            "Plan {} from {} to {} (discount code {})",
            verb, from, request.new_plan, code
        ),
        _ => format!("Plan {} from {} to {}", verb, from, request.new_plan),
    }
}
