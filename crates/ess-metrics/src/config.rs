use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, MetricsResult};

/// Configuration for the usage-statistics reporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Start reporting right away instead of waiting for an admin to join.
    pub enabled: bool,
    /// Global opt-out: never collect or submit anything.
    pub opt_out: bool,
    /// Log full error chains instead of one-line messages.
    pub debug: bool,
    /// Seconds between reports.
    pub interval_secs: u64,
    /// Seconds to wait after the first admin joins when not `enabled`.
    pub deferred_delay_secs: u64,
    /// Where reports are said to go; shown in the startup notice.
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            opt_out: false,
            debug: false,
            interval_secs: 600,
            deferred_delay_secs: 300,
            endpoint: "http://metrics.essentials3.net".into(),
        }
    }
}

impl MetricsConfig {
    /// Parse a `[metrics]`-style TOML table.
    pub fn from_toml_str(s: &str) -> MetricsResult<Self> {
        toml::from_str(s).map_err(|e| MetricsError::Config(e.to_string()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn deferred_delay(&self) -> Duration {
        Duration::from_secs(self.deferred_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = MetricsConfig::default();
        assert!(!c.enabled);
        assert!(!c.opt_out);
        assert_eq!(c.interval(), Duration::from_secs(600));
        assert_eq!(c.deferred_delay(), Duration::from_secs(300));
    }

    #[test]
    fn parse_partial_toml() {
        let c = MetricsConfig::from_toml_str("enabled = true\ninterval_secs = 60").unwrap();
        assert!(c.enabled);
        assert_eq!(c.interval(), Duration::from_secs(60));
        assert_eq!(c.deferred_delay_secs, 300);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let c = MetricsConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(c.interval(), Duration::from_secs(1));
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = MetricsConfig::from_toml_str("enabled = \"yes\"").unwrap_err();
        assert!(matches!(err, MetricsError::Config(_)));
    }
}
