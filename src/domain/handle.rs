use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque token linking a local session to an external payment transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplication key handed to the entitlement ledger.
///
/// Derived from the correlation ID, so every orchestrator instance acting on
/// the same payment presents the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn entitlement(correlation_id: &CorrelationId) -> Self {
        Self(format!("entitlement:{}", correlation_id.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted record used only to resume orchestration after a restart.
///
/// Never the source of truth: the status register is always re-read before
/// anything is resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDurableHandle {
    pub owner_id: String,
    pub subject_id: String,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    /// Set once the side effect failed. A failed flow is never auto-resumed;
    /// only `cancel` or a fresh `start` moves past it.
    #[serde(default)]
    pub failed: bool,
}

impl LocalDurableHandle {
    pub fn new(
        owner_id: impl Into<String>,
        subject_id: impl Into<String>,
        correlation_id: CorrelationId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            subject_id: subject_id.into(),
            correlation_id,
            created_at,
            failed: false,
        }
    }

    /// True once the handle is strictly older than `ttl` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) > ttl,
            // A TTL too large for chrono never expires.
            Err(_) => false,
        }
    }
}
