//! Validation helpers and value parsing for configuration overrides.

use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;

/// Log formats accepted by the telemetry layer.
pub const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Reject values that would stall or break the engine.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    if config.fetch.metadata_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "fetch",
            "metadata_timeout_secs",
            Some("0".into()),
            "must be greater than zero",
        ));
    }
    if config.fetch.tick_interval_ms == 0 {
        return Err(ConfigError::invalid(
            "fetch",
            "tick_interval_ms",
            Some("0".into()),
            "must be greater than zero",
        ));
    }
    if config.fetch.max_concurrent_fetches == 0 {
        return Err(ConfigError::invalid(
            "fetch",
            "max_concurrent_fetches",
            Some("0".into()),
            "must be greater than zero",
        ));
    }
    if config.fetch.stall_timeout_secs == Some(0) {
        return Err(ConfigError::invalid(
            "fetch",
            "stall_timeout_secs",
            Some("0".into()),
            "must be greater than zero when set",
        ));
    }
    if config.transport.max_peers_per_swarm == 0 {
        return Err(ConfigError::invalid(
            "transport",
            "max_peers_per_swarm",
            Some("0".into()),
            "must be greater than zero",
        ));
    }
    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "logging",
            "level",
            None,
            "must not be empty",
        ));
    }
    if let Some(format) = config.logging.format.as_deref()
        && !LOG_FORMATS.contains(&format)
    {
        return Err(ConfigError::invalid(
            "logging",
            "format",
            Some(format.to_string()),
            "must be 'pretty' or 'json'",
        ));
    }
    Ok(())
}

/// Parse an unsigned number from an override value.
pub(crate) fn parse_number<T: FromStr>(
    raw: &str,
    section: &'static str,
    field: &'static str,
) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| {
        ConfigError::invalid(
            section,
            field,
            Some(raw.to_string()),
            "must be an unsigned integer",
        )
    })
}

/// Parse an optional number where an empty string or `0` means unset.
pub(crate) fn parse_optional_number<T: FromStr + PartialEq + Default>(
    raw: &str,
    section: &'static str,
    field: &'static str,
) -> ConfigResult<Option<T>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: T = parse_number(raw, section, field)?;
    Ok((value != T::default()).then_some(value))
}

/// Parse a boolean flag (`true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`).
pub(crate) fn parse_flag(
    raw: &str,
    section: &'static str,
    field: &'static str,
) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            section,
            field,
            Some(raw.to_string()),
            "must be a boolean",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(result: ConfigResult<()>) -> Option<(&'static str, &'static str)> {
        match result {
            Err(ConfigError::InvalidField { section, field, .. }) => Some((section, field)),
            _ => None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn zero_durations_and_caps_are_rejected() {
        let mut config = AppConfig::default();
        config.fetch.tick_interval_ms = 0;
        assert_eq!(
            invalid_field(validate(&config)),
            Some(("fetch", "tick_interval_ms"))
        );

        let mut config = AppConfig::default();
        config.fetch.metadata_timeout_secs = 0;
        assert_eq!(
            invalid_field(validate(&config)),
            Some(("fetch", "metadata_timeout_secs"))
        );

        let mut config = AppConfig::default();
        config.fetch.max_concurrent_fetches = 0;
        assert_eq!(
            invalid_field(validate(&config)),
            Some(("fetch", "max_concurrent_fetches"))
        );
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut config = AppConfig::default();
        config.logging.format = Some("xml".into());
        match validate(&config) {
            Err(ConfigError::InvalidField { field, value, .. }) => {
                assert_eq!(field, "format");
                assert_eq!(value.as_deref(), Some("xml"));
            }
            other => panic!("expected invalid format, got {other:?}"),
        }
    }

    #[test]
    fn flag_and_number_parsing() -> ConfigResult<()> {
        assert!(parse_flag(" YES ", "transport", "enable_dht")?);
        assert!(!parse_flag("0", "transport", "enable_dht")?);
        assert!(parse_flag("maybe", "transport", "enable_dht").is_err());

        assert_eq!(parse_number::<u64>("42", "fetch", "retry_attempts")?, 42);
        assert!(parse_number::<u64>("-1", "fetch", "retry_attempts").is_err());

        assert_eq!(
            parse_optional_number::<u16>("0", "transport", "listen_port")?,
            None
        );
        assert_eq!(
            parse_optional_number::<u16>("6881", "transport", "listen_port")?,
            Some(6881)
        );
        assert_eq!(
            parse_optional_number::<u16>("", "transport", "listen_port")?,
            None
        );
        Ok(())
    }
}
