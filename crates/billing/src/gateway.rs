//! Payment gateway wire format
//!
//! The gateway's transaction endpoint answers with `key=value&...` text.
//! Only the fields the plan-change flow consumes are kept.

use std::collections::HashMap;

use crate::error::{GatewayError, GatewayResult};

/// `response` value signalling an approved transaction
pub const RESPONSE_APPROVED: &str = "1";

const GENERIC_DECLINE_MESSAGE: &str = "Payment was declined";

/// Processor response codes and their customer-facing messages
const RESPONSE_CODE_MESSAGES: &[(&str, &str)] = &[
    ("100", "Transaction was approved"),
    ("200", "Transaction was declined by processor"),
    ("201", "Do not honor"),
    ("202", "Insufficient funds"),
    ("203", "Over limit"),
    ("204", "Transaction not allowed"),
    ("220", "Incorrect payment information"),
    ("221", "No such card issuer"),
    ("222", "No card number on file with issuer"),
    ("223", "Expired card"),
    ("224", "Invalid expiration date"),
    ("225", "Invalid card security code"),
    ("226", "Invalid PIN"),
    ("240", "Call issuer for further information"),
    ("250", "Pick up card"),
    ("251", "Lost card"),
    ("252", "Stolen card"),
    ("253", "Fraudulent card"),
    ("260", "Declined with further instructions available"),
    ("261", "Declined - Stop all recurring payments"),
    ("262", "Declined - Stop this recurring program"),
    ("263", "Declined - Update cardholder data available"),
    ("264", "Declined - Retry in a few days"),
    ("300", "Transaction was rejected by gateway"),
    ("400", "Transaction error returned by processor"),
    ("410", "Invalid merchant configuration"),
    ("411", "Merchant account is inactive"),
    ("420", "Communication error"),
    ("421", "Communication error with issuer"),
    ("430", "Duplicate transaction at processor"),
    ("440", "Processor format error"),
    ("441", "Invalid transaction information"),
    ("460", "Processor feature not available"),
    ("461", "Unsupported card type"),
];

/// Look up the message for a processor response code.
///
/// Unknown codes fall back to the gateway's own `responsetext`, and to a
/// generic message when that is empty too.
pub fn decline_message(code: Option<&str>, response_text: Option<&str>) -> String {
    code.and_then(|code| {
        RESPONSE_CODE_MESSAGES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, message)| message.to_string())
    })
    .or_else(|| {
        response_text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(String::from)
    })
    .unwrap_or_else(|| GENERIC_DECLINE_MESSAGE.to_string())
}

/// Decoded transaction response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayResponse {
    pub response: Option<String>,
    pub response_code: Option<String>,
    pub response_text: Option<String>,
    pub transaction_id: Option<String>,
    pub customer_vault_id: Option<String>,
    pub subscription_id: Option<String>,
}

impl GatewayResponse {
    /// Parse a `key=value&...` response body
    pub fn parse(body: &str) -> GatewayResult<Self> {
        let fields: HashMap<String, String> = url::form_urlencoded::parse(body.trim().as_bytes())
            .into_owned()
            .collect();

        if fields.is_empty() {
            return Err(GatewayError::Malformed("empty response body".to_string()));
        }

        let take = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            response: take("response"),
            response_code: take("response_code"),
            response_text: take("responsetext"),
            transaction_id: take("transactionid"),
            customer_vault_id: take("customer_vault_id"),
            subscription_id: take("subscription_id"),
        })
    }

    pub fn is_approved(&self) -> bool {
        self.response.as_deref() == Some(RESPONSE_APPROVED)
    }

    pub fn decline_message(&self) -> String {
        decline_message(self.response_code.as_deref(), self.response_text.as_deref())
    }

    /// Convert into an approval, or the matching decline error
    pub fn into_approval(self) -> GatewayResult<SaleApproval> {
        if !self.is_approved() {
            return Err(GatewayError::Declined {
                message: self.decline_message(),
                code: self.response_code,
            });
        }

        Ok(SaleApproval {
            transaction_id: self.transaction_id,
            response_text: self.response_text,
        })
    }
}

/// A charge the gateway accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleApproval {
    /// Missing only when the gateway omitted `transactionid` from an approval
    pub transaction_id: Option<String>,
    pub response_text: Option<String>,
}
