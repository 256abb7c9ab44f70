//! Reconciliation engine tuning.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Reconciliation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Correlation buffer entry lifetime in seconds
    #[serde(default = "default_correlation_ttl")]
    pub correlation_ttl_secs: u64,

    /// Processed-event log retention in days
    #[serde(default = "default_event_retention")]
    pub event_retention_days: i64,

    /// Interval between sweep runs in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl ReconciliationConfig {
    /// Get the correlation TTL as Duration
    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation_ttl_secs)
    }

    /// Get the sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate reconciliation configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.correlation_ttl_secs == 0 {
            return Err(ValidationError::InvalidCorrelationTtl);
        }
        if self.event_retention_days <= 0 {
            return Err(ValidationError::InvalidEventRetention);
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            correlation_ttl_secs: default_correlation_ttl(),
            event_retention_days: default_event_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_correlation_ttl() -> u64 {
    86_400
}

fn default_event_retention() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    3_600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReconciliationConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_ttl_fails() {
        let config = ReconciliationConfig {
            correlation_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_retention_fails() {
        let config = ReconciliationConfig {
            event_retention_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
