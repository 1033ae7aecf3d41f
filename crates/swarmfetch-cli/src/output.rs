//! Progress rendering and formatting helpers.

use std::io::{self, Write};

use swarmfetch_core::{ProgressSink, ProgressSnapshot};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;

/// Transfer rate with a `B/s`, `KB/s` or `MB/s` unit and two decimals.
pub(crate) fn format_rate(bytes_per_second: f64) -> String {
    if bytes_per_second < KIB {
        format!("{bytes_per_second:.2} B/s")
    } else if bytes_per_second < MIB {
        format!("{:.2} KB/s", bytes_per_second / KIB)
    } else {
        format!("{:.2} MB/s", bytes_per_second / MIB)
    }
}

pub(crate) fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes_to_f64(bytes) / MIB)
}

/// Single-line summary of one snapshot.
pub(crate) fn progress_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "Progress: {:.2}% ({}/{}) - Peers: {} - Speed: {}",
        snapshot.percent_done,
        format_megabytes(snapshot.bytes_completed),
        format_megabytes(snapshot.total_bytes),
        snapshot.peers,
        format_rate(snapshot.rate_bps)
    )
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}

/// Writes snapshots to stderr.
///
/// A single fetch redraws one line in place; concurrent fetches print one
/// labelled line per tick so their output does not overwrite each other.
#[derive(Debug, Clone)]
pub(crate) enum ProgressPrinter {
    Inline,
    Labelled(String),
    Silent,
}

impl ProgressPrinter {
    pub(crate) fn finish(&self) {
        if matches!(self, Self::Inline) {
            let _ = writeln!(io::stderr().lock());
        }
    }
}

impl ProgressSink for ProgressPrinter {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let mut stderr = io::stderr().lock();
        let _ = match self {
            Self::Inline => write!(stderr, "\r{}", progress_line(snapshot)),
            Self::Labelled(label) => writeln!(stderr, "[{label}] {}", progress_line(snapshot)),
            Self::Silent => return,
        };
        let _ = stderr.flush();
    }
}
