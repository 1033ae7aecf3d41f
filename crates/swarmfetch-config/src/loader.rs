//! Layered configuration loading.
//!
//! # Design
//! - Defaults, then an optional JSON file, then `SWARMFETCH_*` variables.
//! - Validation runs once on the merged result.
//! - Environment input is injectable so tests never touch the process env.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;
use crate::validate::{parse_flag, parse_number, parse_optional_number, validate};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SWARMFETCH_";

/// Builder that merges the configuration layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Loader with no file and no environment overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader seeded with the `SWARMFETCH_*` variables of this process.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self::new().with_env(std::env::vars())
    }

    /// Read the given JSON document before applying overrides.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Add environment overrides; keys without the prefix are ignored.
    #[must_use]
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.into();
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                self.env.insert(name.to_string(), value.into());
            }
        }
        self
    }

    /// Merge every layer and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] for an unreadable
    /// file and [`ConfigError::InvalidField`] for a bad override or a merged
    /// value that fails validation.
    pub fn load(&self) -> ConfigResult<AppConfig> {
        let mut config = match &self.file {
            Some(path) => read_file(path)?,
            None => AppConfig::default(),
        };
        for (name, raw) in &self.env {
            if apply_override(&mut config, name, raw)? {
                debug!(variable = %format!("{ENV_PREFIX}{name}"), "applied environment override");
            }
        }
        validate(&config)?;
        Ok(config)
    }
}

fn read_file(path: &Path) -> ConfigResult<AppConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded configuration file");
    Ok(config)
}

/// Apply one override; returns `false` for names this crate does not own.
fn apply_override(config: &mut AppConfig, name: &str, raw: &str) -> ConfigResult<bool> {
    match name {
        "METADATA_TIMEOUT_SECS" => {
            config.fetch.metadata_timeout_secs =
                parse_number(raw, "fetch", "metadata_timeout_secs")?;
        }
        "TICK_INTERVAL_MS" => {
            config.fetch.tick_interval_ms = parse_number(raw, "fetch", "tick_interval_ms")?;
        }
        "STALL_TIMEOUT_SECS" => {
            config.fetch.stall_timeout_secs =
                parse_optional_number(raw, "fetch", "stall_timeout_secs")?;
        }
        "MAX_CONCURRENT_FETCHES" => {
            config.fetch.max_concurrent_fetches =
                parse_number(raw, "fetch", "max_concurrent_fetches")?;
        }
        "RETRY_ATTEMPTS" => {
            config.fetch.retry_attempts = parse_number(raw, "fetch", "retry_attempts")?;
        }
        "MAX_PEERS_PER_SWARM" => {
            config.transport.max_peers_per_swarm =
                parse_number(raw, "transport", "max_peers_per_swarm")?;
        }
        "DISABLE_UPLOAD" => {
            config.transport.disable_upload = parse_flag(raw, "transport", "disable_upload")?;
        }
        "DISABLE_IPV6" => {
            config.transport.disable_ipv6 = parse_flag(raw, "transport", "disable_ipv6")?;
        }
        "ENABLE_DHT" => {
            config.transport.enable_dht = parse_flag(raw, "transport", "enable_dht")?;
        }
        "LISTEN_PORT" => {
            config.transport.listen_port = parse_optional_number(raw, "transport", "listen_port")?;
        }
        "LOG_LEVEL" => config.logging.level = raw.trim().to_string(),
        "LOG_FORMAT" => {
            let format = raw.trim().to_ascii_lowercase();
            config.logging.format = (!format.is_empty()).then_some(format);
        }
        _ => return Ok(false),
    }
    Ok(true)
}
