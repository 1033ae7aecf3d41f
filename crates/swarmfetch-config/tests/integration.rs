use std::io::Write;
use std::time::Duration;

use swarmfetch_config::{ConfigError, ConfigLoader};

fn write_config(contents: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn file_values_are_layered_under_environment() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_config(
        r#"{
            "fetch": { "metadata_timeout_secs": 30, "max_concurrent_fetches": 2 },
            "transport": { "max_peers_per_swarm": 50 },
            "logging": { "level": "debug", "format": "pretty" }
        }"#,
    )?;

    let config = ConfigLoader::new()
        .with_file(file.path())
        .with_env([
            ("SWARMFETCH_METADATA_TIMEOUT_SECS", "45"),
            ("SWARMFETCH_STALL_TIMEOUT_SECS", "600"),
        ])
        .load()?;

    assert_eq!(config.fetch.metadata_timeout_secs, 45);
    assert_eq!(config.fetch.max_concurrent_fetches, 2);
    assert_eq!(config.transport.max_peers_per_swarm, 50);
    assert_eq!(config.logging.level, "debug");

    let policy = config.fetch_policy();
    assert_eq!(policy.metadata_timeout, Duration::from_secs(45));
    assert_eq!(policy.tick_interval, Duration::from_secs(1));
    assert_eq!(policy.stall_timeout, Some(Duration::from_secs(600)));
    Ok(())
}

#[test]
fn malformed_file_reports_parse_error() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_config("{ \"fetch\": ")?;
    let result = ConfigLoader::new().with_file(file.path()).load();
    match result {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn invalid_merged_value_is_rejected_after_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_config(r#"{ "fetch": { "tick_interval_ms": 500 } }"#)?;
    let result = ConfigLoader::new()
        .with_file(file.path())
        .with_env([("SWARMFETCH_TICK_INTERVAL_MS", "0")])
        .load();
    assert!(matches!(
        result,
        Err(ConfigError::InvalidField {
            section: "fetch",
            field: "tick_interval_ms",
            ..
        })
    ));
    Ok(())
}
