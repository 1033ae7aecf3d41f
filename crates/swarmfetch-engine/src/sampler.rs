//! Progress sampling: turns raw byte counters into rate-aware snapshots.

use chrono::Utc;
use swarmfetch_core::{ProgressSnapshot, SwarmSession};
use tokio::time::Instant;
use uuid::Uuid;

/// Raw counters read from a swarm session at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    /// Bytes verified so far.
    pub bytes_completed: u64,
    /// Total payload size; zero while unknown.
    pub total_length: u64,
    /// Connected peers.
    pub peers: usize,
}

impl CounterReading {
    /// Read every counter from a session.
    #[must_use]
    pub fn from_session(session: &dyn SwarmSession) -> Self {
        Self {
            bytes_completed: session.bytes_completed(),
            total_length: session.total_length(),
            peers: session.peer_count(),
        }
    }
}

/// Per-fetch sampler state carried between ticks.
#[derive(Debug)]
pub struct ProgressSampler {
    request_id: Uuid,
    tick: u64,
    last_bytes: u64,
    last_at: Instant,
    rate_bps: f64,
}

impl ProgressSampler {
    /// Start sampling from a baseline byte count taken at `started_at`.
    #[must_use]
    pub const fn new(request_id: Uuid, baseline_bytes: u64, started_at: Instant) -> Self {
        Self {
            request_id,
            tick: 0,
            last_bytes: baseline_bytes,
            last_at: started_at,
            rate_bps: 0.0,
        }
    }

    /// Number of samples taken so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    /// Produce the snapshot for one tick.
    ///
    /// A tick that observes no elapsed time keeps the previous rate and leaves
    /// the baseline untouched; otherwise the rate is recomputed, so a stalled
    /// tick reports zero.
    pub fn sample(&mut self, reading: CounterReading, now: Instant) -> ProgressSnapshot {
        self.tick += 1;

        let elapsed = now.saturating_duration_since(self.last_at).as_secs_f64();
        if elapsed > 0.0 {
            let delta = reading.bytes_completed.saturating_sub(self.last_bytes);
            #[allow(clippy::cast_precision_loss)]
            let rate = delta as f64 / elapsed;
            self.rate_bps = rate;
            self.last_bytes = reading.bytes_completed;
            self.last_at = now;
        }

        ProgressSnapshot {
            request_id: self.request_id,
            tick: self.tick,
            percent_done: percent_done(reading.bytes_completed, reading.total_length),
            bytes_completed: reading.bytes_completed,
            total_bytes: reading.total_length,
            peers: reading.peers,
            rate_bps: self.rate_bps,
            sampled_at: Utc::now(),
        }
    }
}

/// Completion percentage clamped to `0.0..=100.0`; zero when the total is unknown.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub const fn percent_done(bytes_completed: u64, total_length: u64) -> f64 {
    if total_length == 0 {
        0.0
    } else {
        (bytes_completed as f64 / total_length as f64 * 100.0).clamp(0.0, 100.0)
    }
}
