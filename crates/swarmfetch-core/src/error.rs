//! Error types for swarm transports and fetch operations.

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::model::FetchPhase;

/// Failure reported by a swarm transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The magnet identifier could not be parsed.
    #[error("malformed magnet identifier: {reason}")]
    MalformedMagnet {
        /// Static reason describing what was wrong with the identifier.
        reason: &'static str,
    },
    /// No peers or trackers could be reached while joining.
    #[error("swarm unreachable")]
    Unreachable {
        /// Info hash of the swarm that could not be joined.
        info_hash: String,
    },
    /// The session was already closed when the call was made.
    #[error("swarm session closed")]
    Closed,
    /// The underlying swarm library reported a failure.
    #[error("swarm backend failure during {operation}")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl TransportError {
    /// Wrap a backend failure with the operation that produced it.
    pub fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;

/// Classified terminal failure for a single fetch request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The magnet identifier could not be turned into a swarm session.
    #[error("failed to join swarm")]
    Join {
        /// Request that failed.
        request_id: Uuid,
        /// Transport failure raised by `join`.
        #[source]
        source: TransportError,
    },
    /// Metadata was not resolved before the deadline expired.
    #[error("timed out waiting for swarm metadata after {}s", .waited.as_secs())]
    MetadataTimeout {
        /// Request that failed.
        request_id: Uuid,
        /// Deadline that elapsed.
        waited: Duration,
    },
    /// The transport failed after the swarm was joined.
    #[error("swarm transport failed while {phase}")]
    Transport {
        /// Request that failed.
        request_id: Uuid,
        /// Phase in which the failure surfaced.
        phase: FetchPhase,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// The destination directory could not be prepared.
    #[error("failed to prepare destination directory")]
    Storage {
        /// Request that failed.
        request_id: Uuid,
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The transport reported completion without a file layout.
    #[error("swarm reported completion without a file layout")]
    LayoutUnavailable {
        /// Request that failed.
        request_id: Uuid,
    },
    /// No bytes arrived for longer than the configured stall timeout.
    #[error("transfer stalled for {}s", .idle.as_secs())]
    Stalled {
        /// Request that failed.
        request_id: Uuid,
        /// Time spent without progress.
        idle: Duration,
    },
    /// The task driving the fetch terminated abnormally.
    #[error("fetch task aborted")]
    TaskAborted {
        /// Request that failed.
        request_id: Uuid,
        /// Join failure detail.
        detail: String,
    },
}

impl FetchError {
    /// Identifier of the request the failure belongs to.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        match self {
            Self::Join { request_id, .. }
            | Self::MetadataTimeout { request_id, .. }
            | Self::Transport { request_id, .. }
            | Self::Storage { request_id, .. }
            | Self::LayoutUnavailable { request_id }
            | Self::Stalled { request_id, .. }
            | Self::TaskAborted { request_id, .. } => *request_id,
        }
    }

    /// Whether resubmitting a fresh request may plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Join { .. } | Self::MetadataTimeout { .. } | Self::Stalled { .. }
        )
    }
}

/// Convenience alias for fetch results.
pub type FetchResult<T> = Result<T, FetchError>;
