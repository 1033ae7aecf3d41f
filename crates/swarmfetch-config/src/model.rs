//! Typed configuration models.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarmfetch_core::FetchPolicy;

use crate::defaults;

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Fetch timing and caller-level policy.
    pub fetch: FetchSettings,
    /// Swarm client tuning.
    pub transport: TransportSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Timing policy handed to the fetch engine.
    #[must_use]
    pub const fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            metadata_timeout: Duration::from_secs(self.fetch.metadata_timeout_secs),
            tick_interval: Duration::from_millis(self.fetch.tick_interval_ms),
            stall_timeout: match self.fetch.stall_timeout_secs {
                Some(secs) => Some(Duration::from_secs(secs)),
                None => None,
            },
        }
    }
}

/// Fetch timing plus the retry and concurrency policy applied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    /// Upper bound on the metadata wait in seconds.
    pub metadata_timeout_secs: u64,
    /// Progress sampling cadence in milliseconds.
    pub tick_interval_ms: u64,
    /// Fail a transfer idle for this many seconds; unset disables the check.
    pub stall_timeout_secs: Option<u64>,
    /// Fetches allowed to run at once.
    pub max_concurrent_fetches: usize,
    /// Resubmissions after a retryable failure.
    pub retry_attempts: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: defaults::METADATA_TIMEOUT_SECS,
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
            stall_timeout_secs: None,
            max_concurrent_fetches: defaults::MAX_CONCURRENT_FETCHES,
            retry_attempts: defaults::RETRY_ATTEMPTS,
        }
    }
}

/// Swarm client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct TransportSettings {
    /// Established peer connections per swarm.
    pub max_peers_per_swarm: u32,
    /// Never upload to other peers.
    pub disable_upload: bool,
    /// Restrict connections to IPv4.
    pub disable_ipv6: bool,
    /// Discover peers through the DHT.
    pub enable_dht: bool,
    /// Fixed listen port; unset picks an ephemeral one.
    pub listen_port: Option<u16>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_peers_per_swarm: defaults::MAX_PEERS_PER_SWARM,
            disable_upload: true,
            disable_ipv6: true,
            enable_dht: true,
            listen_port: None,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `pretty` or `json`; unset picks by build profile.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_cover_every_section() {
        let config = AppConfig::default();
        assert_eq!(config.fetch.metadata_timeout_secs, 120);
        assert_eq!(config.fetch.tick_interval_ms, 1_000);
        assert_eq!(config.fetch.max_concurrent_fetches, 4);
        assert_eq!(config.transport.max_peers_per_swarm, 31);
        assert!(config.transport.disable_upload);
        assert!(config.transport.enable_dht);
        assert_eq!(config.fetch_policy(), FetchPolicy::default());
    }

    #[test]
    fn partial_documents_fill_defaults() -> Result<(), serde_json::Error> {
        let config: AppConfig = serde_json::from_value(json!({
            "fetch": { "stall_timeout_secs": 30 },
            "logging": { "format": "json" }
        }))?;
        assert_eq!(config.fetch.metadata_timeout_secs, 120);
        assert_eq!(
            config.fetch_policy().stall_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.logging.level, "info");
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<AppConfig>(json!({
            "fetch": { "metadata_timeout": 5 }
        }));
        assert!(result.is_err());
    }
}
