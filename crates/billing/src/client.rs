//! Payment gateway client configuration

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BillingError, BillingResult, GatewayError, GatewayResult};
use crate::gateway::{GatewayResponse, SaleApproval};

/// Default transaction endpoint
pub const DEFAULT_GATEWAY_ENDPOINT: &str = "https://secure.nmi.com/api/transact.php";

/// Default request timeout for gateway calls
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which merchant account the gateway security key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    Live,
    #[default]
    Test,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Live => "live",
            GatewayMode::Test => "test",
        }
    }
}

impl std::str::FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" | "production" => Ok(GatewayMode::Live),
            "test" | "sandbox" => Ok(GatewayMode::Test),
            other => Err(format!("unknown gateway mode: {}", other)),
        }
    }
}

/// Configuration for the payment gateway
///
/// The security key is chosen once, at construction, from the mode.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub security_key: String,
    pub mode: GatewayMode,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Build a config, selecting the key that matches `mode`
    pub fn new(
        mode: GatewayMode,
        live_key: Option<String>,
        test_key: Option<String>,
        endpoint: Option<String>,
    ) -> BillingResult<Self> {
        let security_key = match mode {
            GatewayMode::Live => live_key,
            GatewayMode::Test => test_key,
        }
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            BillingError::Config(format!(
                "no payment gateway security key configured for {} mode",
                mode.as_str()
            ))
        })?;

        Ok(Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_GATEWAY_ENDPOINT.to_string()),
            security_key,
            mode,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A charge against a stored payment method
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub amount_cents: i64,
    pub customer_vault_id: String,
    pub order_description: String,
    pub email: Option<String>,
    /// Forwarded as the merchant order id so duplicates are visible at the gateway
    pub order_id: Option<String>,
}

/// Operations the plan-change workflow needs from a payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge a stored payment method
    async fn sale(&self, request: &SaleRequest) -> GatewayResult<SaleApproval>;

    /// Reverse an unsettled transaction
    async fn void(&self, transaction_id: &str) -> GatewayResult<()>;
}

/// HTTP client for the gateway's transaction endpoint
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    async fn transact(&self, fields: &[(&str, &str)]) -> GatewayResult<GatewayResponse> {
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 1);
        form.push(("security_key", self.config.security_key.as_str()));
        form.extend_from_slice(fields);

        let response = self
            .http
            .post(&self.config.endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        GatewayResponse::parse(&body)
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn sale(&self, request: &SaleRequest) -> GatewayResult<SaleApproval> {
        let amount = bizdir_shared::format_dollars(request.amount_cents);

        let mut fields = vec![
            ("type", "sale"),
            ("amount", amount.as_str()),
            ("customer_vault_id", request.customer_vault_id.as_str()),
            ("currency", "USD"),
            ("order_description", request.order_description.as_str()),
        ];
        if let Some(email) = request.email.as_deref() {
            fields.push(("email", email));
        }
        if let Some(order_id) = request.order_id.as_deref() {
            fields.push(("orderid", order_id));
        }

        tracing::info!(
            amount = %amount,
            mode = self.config.mode.as_str(),
            "Submitting gateway sale against stored payment method"
        );

        let parsed = self.transact(&fields).await?;
        let result = parsed.into_approval();

        match &result {
            Ok(approval) => tracing::info!(
                transaction_id = ?approval.transaction_id,
                "Gateway sale approved"
            ),
            Err(e) => tracing::warn!(error = %e, "Gateway sale not approved"),
        }

        result
    }

    async fn void(&self, transaction_id: &str) -> GatewayResult<()> {
        let parsed = self
            .transact(&[
                ("type", "void"),
                ("transactionid", transaction_id),
                ("void_reason", "user_cancel"),
            ])
            .await?;

        parsed.into_approval().map(|_| ())
    }
}
