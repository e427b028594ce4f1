use crate::domain::credits::Credits;
use crate::error::{OrchestratorError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Tunables for the orchestrator and the artifact set it waits on.
///
/// Every field has a default, so an empty TOML document is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Interval shared by the payment and generation poll loops.
    pub poll_interval_ms: u64,
    /// Maximum age of a persisted handle that may still be resumed.
    pub staleness_ttl_secs: u64,
    /// Credits granted per successful payment.
    pub entitlement_credits: Credits,
    /// Named artifacts that must all be non-empty for generation to count as done.
    pub artifacts: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4_000,
            staleness_ttl_secs: 300,
            entitlement_credits: Credits::ONE,
            artifacts: [
                "executive_summary",
                "market_analysis",
                "financial_plan",
                "operations_plan",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(OrchestratorError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.artifacts.is_empty() {
            return Err(OrchestratorError::Config(
                "at least one artifact must be configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn staleness_ttl(&self) -> Duration {
        Duration::from_secs(self.staleness_ttl_secs)
    }
}
