#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Fetch engine: runs one cancellable task per magnet link and reports
//! progress snapshots followed by exactly one terminal outcome.

mod coordinator;
/// Bounded metadata wait.
pub mod metadata;
/// Completion detection and final path resolution.
pub mod resolver;
/// Rate-aware progress sampling.
pub mod sampler;
/// Transport implementations and construction.
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use swarmfetch_core::{
    FetchError, FetchOutcome, FetchPolicy, FetchRequest, FetchState, ProgressSink, SwarmTransport,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::coordinator::FetchTask;

pub use session::TransportOptions;

/// Launches fetches against one swarm transport under a shared timing policy.
#[derive(Clone)]
pub struct FetchEngine {
    transport: Arc<dyn SwarmTransport>,
    policy: FetchPolicy,
}

impl FetchEngine {
    /// Engine using the default policy (two minute metadata wait, one second ticks).
    #[must_use]
    pub fn new(transport: Arc<dyn SwarmTransport>) -> Self {
        Self::with_policy(transport, FetchPolicy::default())
    }

    /// Engine using an explicit policy.
    #[must_use]
    pub const fn with_policy(transport: Arc<dyn SwarmTransport>, policy: FetchPolicy) -> Self {
        Self { transport, policy }
    }

    /// Policy applied to every fetch started by this engine.
    #[must_use]
    pub const fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Spawn a fetch task for `request` and return immediately.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle detaches the task; it keeps running until it reaches a
    /// terminal state.
    #[must_use]
    pub fn start_fetch(&self, request: FetchRequest) -> FetchHandle {
        self.spawn(request, CancellationToken::new())
    }

    /// Like [`FetchEngine::start_fetch`], but the fetch is also cancelled
    /// when `parent` is.
    #[must_use]
    pub fn start_child_fetch(
        &self,
        request: FetchRequest,
        parent: &CancellationToken,
    ) -> FetchHandle {
        self.spawn(request, parent.child_token())
    }

    /// Convenience wrapper building the request from its parts.
    #[must_use]
    pub fn fetch(
        &self,
        magnet: impl Into<String>,
        destination: impl Into<PathBuf>,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> FetchHandle {
        let mut request = FetchRequest::new(magnet, destination);
        request.sink = sink;
        self.start_fetch(request)
    }

    fn spawn(&self, request: FetchRequest, cancel: CancellationToken) -> FetchHandle {
        let id = request.id;
        let (state_tx, state_rx) = watch::channel(FetchState::Joining);
        let span = info_span!(
            "fetch",
            request_id = %id,
            destination = %request.destination.display()
        );
        let task = FetchTask::new(
            request,
            Arc::clone(&self.transport),
            self.policy,
            cancel.clone(),
            state_tx,
        );
        let join = tokio::spawn(task.run().instrument(span));
        FetchHandle {
            id,
            cancel,
            state: state_rx,
            task: join,
        }
    }
}

/// Handle to a running fetch.
#[derive(Debug)]
pub struct FetchHandle {
    id: Uuid,
    cancel: CancellationToken,
    state: watch::Receiver<FetchState>,
    task: JoinHandle<FetchOutcome>,
}

impl FetchHandle {
    /// Identifier of the request being fetched.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation. Observed at the next suspension point; calling it
    /// after the fetch finished has no effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this fetch, for wiring into other shutdown paths.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Most recent lifecycle state.
    #[must_use]
    pub fn state(&self) -> FetchState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.clone()
    }

    /// Whether the task has produced its outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> FetchOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => FetchOutcome::Failed(FetchError::TaskAborted {
                request_id: self.id,
                detail: err.to_string(),
            }),
        }
    }
}
