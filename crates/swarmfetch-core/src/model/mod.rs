//! Core fetch domain types and DTOs shared across the workspace.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::FetchError;

/// Default bound on the metadata wait.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(120);
/// Default progress sampling cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Receiver of progress snapshots emitted while a fetch is transferring.
///
/// Sinks are invoked from the fetch task itself; callers that need to hop onto
/// another execution context (e.g. a UI thread) must do so inside the sink.
pub trait ProgressSink: Send + Sync {
    /// Deliver one snapshot.
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot);
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressSnapshot> {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        // A dropped receiver only means the caller stopped listening.
        let _ = self.send(snapshot.clone());
    }
}

/// One download attempt for a magnet identifier.
#[derive(Clone)]
pub struct FetchRequest {
    /// Identifier assigned when the request is created.
    pub id: Uuid,
    /// Opaque magnet locator handed to the transport.
    pub magnet: String,
    /// Directory the transport writes content under.
    pub destination: PathBuf,
    /// Optional receiver for progress snapshots.
    pub sink: Option<Arc<dyn ProgressSink>>,
}

impl FetchRequest {
    /// Build a request without a progress sink.
    #[must_use]
    pub fn new(magnet: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            magnet: magnet.into(),
            destination: destination.into(),
            sink: None,
        }
    }

    /// Attach a progress sink to the request.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Deliver a snapshot to the sink, if one was supplied.
    pub fn emit(&self, snapshot: &ProgressSnapshot) {
        if let Some(sink) = &self.sink {
            sink.on_progress(snapshot);
        }
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FetchRequest")
            .field("id", &self.id)
            .field("magnet", &self.magnet)
            .field("destination", &self.destination)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Point-in-time progress of a transferring fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Request the snapshot belongs to.
    pub request_id: Uuid,
    /// 1-based sampling tick that produced the snapshot.
    pub tick: u64,
    /// Completion percentage in `0.0..=100.0`.
    pub percent_done: f64,
    /// Bytes verified so far.
    pub bytes_completed: u64,
    /// Total payload size; zero while unknown.
    pub total_bytes: u64,
    /// Connected peers at sample time.
    pub peers: usize,
    /// Instantaneous transfer rate in bytes per second.
    pub rate_bps: f64,
    /// Wall-clock time of the sample.
    pub sampled_at: DateTime<Utc>,
}

/// Shape of a completed download on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// A single file named after the swarm.
    SingleFile,
    /// A directory named after the swarm containing every file.
    Directory,
}

/// Terminal result of one fetch request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The transfer finished and the content lives at `path`.
    Completed {
        /// Final on-disk location.
        path: PathBuf,
        /// Whether `path` is a file or a directory.
        kind: CompletionKind,
    },
    /// The caller cancelled before completion.
    Cancelled,
    /// The fetch failed.
    Failed(FetchError),
}

impl FetchOutcome {
    /// Final path when the fetch completed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Completed { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Terminal state matching the outcome.
    #[must_use]
    pub const fn state(&self) -> FetchState {
        match self {
            Self::Completed { .. } => FetchState::Completed,
            Self::Cancelled => FetchState::Cancelled,
            Self::Failed(_) => FetchState::Failed,
        }
    }

    /// Convert into a `Result`, treating cancellation as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure when the fetch failed.
    pub fn into_result(self) -> Result<Option<PathBuf>, FetchError> {
        match self {
            Self::Completed { path, .. } => Ok(Some(path)),
            Self::Cancelled => Ok(None),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Lifecycle of a fetch as driven by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    /// Joining the swarm for the magnet identifier.
    Joining,
    /// Waiting for file metadata from the swarm.
    AwaitingMetadata,
    /// Pulling data and sampling progress.
    Transferring,
    /// Transfer finished.
    Completed,
    /// Caller cancelled the fetch.
    Cancelled,
    /// Fetch failed.
    Failed,
}

impl FetchState {
    /// Whether no further transitions can occur.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Phase associated with a non-terminal state.
    #[must_use]
    pub const fn phase(self) -> Option<FetchPhase> {
        match self {
            Self::Joining => Some(FetchPhase::Joining),
            Self::AwaitingMetadata => Some(FetchPhase::AwaitingMetadata),
            Self::Transferring => Some(FetchPhase::Transferring),
            Self::Completed | Self::Cancelled | Self::Failed => None,
        }
    }
}

impl Display for FetchState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Joining => "joining",
            Self::AwaitingMetadata => "awaiting_metadata",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        })
    }
}

/// Working phase recorded on transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    /// Preparing the destination and joining the swarm.
    Joining,
    /// Waiting for metadata.
    AwaitingMetadata,
    /// Transferring data.
    Transferring,
}

impl Display for FetchPhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Joining => "joining",
            Self::AwaitingMetadata => "awaiting metadata",
            Self::Transferring => "transferring",
        })
    }
}

/// Individual file within a swarm payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Path relative to the payload root.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

/// File layout resolved from swarm metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLayout {
    /// Payload name advertised by the swarm.
    pub name: String,
    /// Files making up the payload.
    pub files: Vec<LayoutEntry>,
}

impl FileLayout {
    /// Layout for a payload consisting of exactly one file.
    #[must_use]
    pub fn single(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        Self {
            files: vec![LayoutEntry {
                path: PathBuf::from(&name),
                size,
            }],
            name,
        }
    }

    /// Whether the payload is a single file rather than a directory tree.
    #[must_use]
    pub const fn is_single_file(&self) -> bool {
        self.files.len() <= 1
    }

    /// Sum of every file size in the layout.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|entry| entry.size).sum()
    }
}

/// Timing policy applied to every fetch run by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPolicy {
    /// Upper bound on the metadata wait.
    pub metadata_timeout: Duration,
    /// Progress sampling cadence.
    pub tick_interval: Duration,
    /// Fail a transfer after this long without new bytes; `None` waits forever.
    pub stall_timeout: Option<Duration>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            stall_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn snapshot(tick: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            request_id: Uuid::nil(),
            tick,
            percent_done: 50.0,
            bytes_completed: 512,
            total_bytes: 1_024,
            peers: 2,
            rate_bps: 128.0,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn closure_and_channel_sinks_receive_snapshots() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let request = FetchRequest::new("magnet:?xt=urn:btih:demo", "/downloads").with_sink(
            Arc::new(move |snapshot: &ProgressSnapshot| {
                recorder.lock().expect("sink mutex").push(snapshot.tick);
            }),
        );
        request.emit(&snapshot(1));
        request.emit(&snapshot(2));
        assert_eq!(*seen.lock().expect("sink mutex"), vec![1, 2]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = FetchRequest::new("magnet:?xt=urn:btih:demo", "/downloads")
            .with_sink(Arc::new(tx));
        request.emit(&snapshot(7));
        assert_eq!(rx.try_recv().expect("snapshot delivered").tick, 7);
    }

    #[test]
    fn request_without_sink_ignores_emit() {
        let request = FetchRequest::new("magnet:?xt=urn:btih:demo", "/downloads");
        request.emit(&snapshot(1));
        assert!(format!("{request:?}").contains("sink: false"));
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(!FetchState::Joining.is_terminal());
        assert!(!FetchState::AwaitingMetadata.is_terminal());
        assert!(!FetchState::Transferring.is_terminal());
        assert!(FetchState::Completed.is_terminal());
        assert!(FetchState::Cancelled.is_terminal());
        assert!(FetchState::Failed.is_terminal());
        assert_eq!(FetchState::Failed.phase(), None);
        assert_eq!(
            FetchState::Transferring.phase(),
            Some(FetchPhase::Transferring)
        );
    }

    #[test]
    fn layout_shape_helpers() {
        let single = FileLayout::single("ubuntu.iso", 4_096);
        assert!(single.is_single_file());
        assert_eq!(single.total_size(), 4_096);

        let pack = FileLayout {
            name: "pack".into(),
            files: vec![
                LayoutEntry {
                    path: PathBuf::from("a.txt"),
                    size: 10,
                },
                LayoutEntry {
                    path: PathBuf::from("nested/b.txt"),
                    size: 20,
                },
            ],
        };
        assert!(!pack.is_single_file());
        assert_eq!(pack.total_size(), 30);
    }

    #[test]
    fn outcome_conversions() {
        let done = FetchOutcome::Completed {
            path: PathBuf::from("/downloads/ubuntu.iso"),
            kind: CompletionKind::SingleFile,
        };
        assert_eq!(done.state(), FetchState::Completed);
        assert_eq!(done.path(), Some(Path::new("/downloads/ubuntu.iso")));
        assert!(matches!(FetchOutcome::Cancelled.into_result(), Ok(None)));
    }

    #[test]
    fn snapshot_serializes_with_snake_case_fields() {
        let value = serde_json::to_value(snapshot(3)).expect("serialize snapshot");
        assert_eq!(value["tick"], 3);
        assert_eq!(value["bytes_completed"], 512);
        assert_eq!(value["rate_bps"], 128.0);
    }

    #[test]
    fn default_policy_matches_documented_constants() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.metadata_timeout, Duration::from_secs(120));
        assert_eq!(policy.tick_interval, Duration::from_secs(1));
        assert!(policy.stall_timeout.is_none());
    }
}
