//! Subscriber installation and logging configuration.
//!
//! # Design
//! - One entry point installs the global subscriber in pretty or JSON form.
//! - Output goes to stderr; stdout is reserved for command results.
//! - `RUST_LOG` wins over the configured level when present.
//! - The build identifier is recorded once and read back by later callers.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for example,
/// because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let _ = BUILD_SHA.set(config.build_sha.to_string());

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(
                tracing_fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    tracing::debug!(build_sha = build_sha(), format = %config.format, "logging initialised");
    Ok(())
}

/// Build identifier recorded during logging initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Filter directive (e.g. `info`, `swarmfetch_engine=debug`).
    pub level: &'a str,
    /// Output format for the fmt layer.
    pub format: LogFormat,
    /// Build identifier recorded in structured logs.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON objects, one per line.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty for debug builds, JSON for release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow!("unknown log format '{other}'")),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() -> Result<()> {
        assert_eq!("json".parse::<LogFormat>()?, LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>()?, LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        Ok(())
    }

    #[test]
    fn default_config_uses_info_level() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.format, LogFormat::infer());
    }

    #[test]
    fn second_install_is_rejected() {
        let config = LoggingConfig {
            level: "debug",
            format: LogFormat::Pretty,
            build_sha: "abc123",
        };
        let first = init_logging(&config);
        let second = init_logging(&config);
        assert!(first.is_ok());
        assert!(second.is_err());
        assert_eq!(build_sha(), "abc123");
    }
}
