//! Default values for every configuration field.

pub(crate) const METADATA_TIMEOUT_SECS: u64 = 120;
pub(crate) const TICK_INTERVAL_MS: u64 = 1_000;
pub(crate) const MAX_CONCURRENT_FETCHES: usize = 4;
pub(crate) const RETRY_ATTEMPTS: u32 = 0;

/// Established-connection cap per swarm.
pub(crate) const MAX_PEERS_PER_SWARM: u32 = 31;

pub(crate) const LOG_LEVEL: &str = "info";
