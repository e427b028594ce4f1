use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle value of a subject as advanced by the external payment workflow.
///
/// The orchestrator only reads this register, except for the initial
/// `awaiting-payment` write and the cancellation compensation back to
/// `neutral`. Values the workflow is not known to produce are kept verbatim in
/// `Unrecognized` so they can be reported as protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusValue {
    Neutral,
    AwaitingPayment,
    PaymentAcknowledged,
    EntitlementActive,
    Unrecognized(String),
}

impl StatusValue {
    pub fn as_str(&self) -> &str {
        match self {
            StatusValue::Neutral => "neutral",
            StatusValue::AwaitingPayment => "awaiting-payment",
            StatusValue::PaymentAcknowledged => "payment-acknowledged",
            StatusValue::EntitlementActive => "entitlement-active",
            StatusValue::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for StatusValue {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "neutral" => StatusValue::Neutral,
            "awaiting-payment" => StatusValue::AwaitingPayment,
            "payment-acknowledged" => StatusValue::PaymentAcknowledged,
            "entitlement-active" => StatusValue::EntitlementActive,
            _ => StatusValue::Unrecognized(raw),
        }
    }
}

impl From<&str> for StatusValue {
    fn from(raw: &str) -> Self {
        StatusValue::from(raw.to_string())
    }
}

impl From<StatusValue> for String {
    fn from(value: StatusValue) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
