//! Enforcer configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnforcerError, Result};
use crate::poll::PollSpec;

/// Poll parameters and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// 3s because instance startup takes well under a minute.
    pub instance_running: PollSpec,
    /// 20s because database creation takes tens of minutes.
    pub database_available: PollSpec,
    pub http_available: PollSpec,
    /// Used right after creating a load balancer.
    pub load_balancer_visible: PollSpec,
    pub transient_retry_delay_secs: u64,
    /// Concurrent reconciliations in a fleet run.
    pub max_concurrency: usize,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            instance_running: PollSpec::bounded(3, 20),
            database_available: PollSpec::unbounded(20),
            http_available: PollSpec::bounded(1, 240),
            load_balancer_visible: PollSpec::bounded(1, 30),
            transient_retry_delay_secs: 5,
            max_concurrency: 4,
        }
    }
}

impl EnforcerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EnforcerError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| EnforcerError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, spec) in [
            ("instance_running", &self.instance_running),
            ("database_available", &self.database_available),
            ("http_available", &self.http_available),
            ("load_balancer_visible", &self.load_balancer_visible),
        ] {
            if spec.interval_secs == 0 {
                return Err(EnforcerError::Config(format!(
                    "{}.interval_secs must be greater than 0",
                    name
                )));
            }
            if spec.max_attempts == Some(0) {
                return Err(EnforcerError::Config(format!(
                    "{}.max_attempts must be greater than 0",
                    name
                )));
            }
        }
        if self.max_concurrency == 0 {
            return Err(EnforcerError::Config(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transient_retry_delay(&self) -> Duration {
        Duration::from_secs(self.transient_retry_delay_secs)
    }
}
