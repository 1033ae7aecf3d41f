//! State machine driving one fetch request from join to terminal outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use swarmfetch_core::{
    FetchError, FetchOutcome, FetchPhase, FetchPolicy, FetchRequest, FetchState, MagnetLink,
    SwarmSession, SwarmTransport,
};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metadata::{self, MetadataWait};
use crate::resolver::{CompletionResolver, Resolution};
use crate::sampler::{CounterReading, ProgressSampler};

// `tokio::time::interval` panics on a zero period.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct FetchTask {
    request: FetchRequest,
    transport: Arc<dyn SwarmTransport>,
    policy: FetchPolicy,
    cancel: CancellationToken,
    state: watch::Sender<FetchState>,
}

impl FetchTask {
    pub(crate) fn new(
        request: FetchRequest,
        transport: Arc<dyn SwarmTransport>,
        policy: FetchPolicy,
        cancel: CancellationToken,
        state: watch::Sender<FetchState>,
    ) -> Self {
        Self {
            request,
            transport,
            policy,
            cancel,
            state,
        }
    }

    /// Run to completion. The returned outcome is the last thing the task
    /// produces; no snapshot is emitted after it.
    pub(crate) async fn run(self) -> FetchOutcome {
        let outcome = self.join_and_drive().await;
        self.transition(outcome.state());
        match &outcome {
            FetchOutcome::Completed { path, kind } => {
                info!(path = %path.display(), kind = ?kind, "fetch completed");
            }
            FetchOutcome::Cancelled => info!("fetch cancelled"),
            FetchOutcome::Failed(err) => {
                warn!(error = %err, retryable = err.is_retryable(), "fetch failed");
            }
        }
        outcome
    }

    async fn join_and_drive(&self) -> FetchOutcome {
        let request_id = self.request.id;
        self.transition(FetchState::Joining);
        if self.cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        let destination = &self.request.destination;
        if let Err(source) = tokio::fs::create_dir_all(destination).await {
            return FetchOutcome::Failed(FetchError::Storage {
                request_id,
                path: destination.clone(),
                source,
            });
        }

        let mut session = match self.transport.join(&self.request.magnet, destination).await {
            Ok(session) => session,
            Err(source) => {
                return FetchOutcome::Failed(FetchError::Join { request_id, source });
            }
        };

        // A panicking sink or transport must not skip the close below.
        let driven = AssertUnwindSafe(self.drive(session.as_mut()))
            .catch_unwind()
            .await;
        session.close().await;
        let outcome = driven.unwrap_or_else(|panic| {
            FetchOutcome::Failed(FetchError::TaskAborted {
                request_id,
                detail: panic_detail(panic.as_ref()),
            })
        });
        debug!(state = %outcome.state(), "swarm session closed");
        outcome
    }

    async fn drive(&self, session: &mut dyn SwarmSession) -> FetchOutcome {
        let request_id = self.request.id;
        if self.cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        self.transition(FetchState::AwaitingMetadata);
        let deadline = self.policy.metadata_timeout;
        match metadata::acquire(session, &self.cancel, deadline).await {
            MetadataWait::Resolved => {}
            MetadataWait::Cancelled => return FetchOutcome::Cancelled,
            MetadataWait::TimedOut => {
                return FetchOutcome::Failed(FetchError::MetadataTimeout {
                    request_id,
                    waited: deadline,
                });
            }
            MetadataWait::Failed(source) => {
                return FetchOutcome::Failed(FetchError::Transport {
                    request_id,
                    phase: FetchPhase::AwaitingMetadata,
                    source,
                });
            }
        }

        if self.cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }
        if let Err(source) = session.begin_transfer().await {
            return FetchOutcome::Failed(FetchError::Transport {
                request_id,
                phase: FetchPhase::Transferring,
                source,
            });
        }
        self.transition(FetchState::Transferring);
        self.transfer(session).await
    }

    async fn transfer(&self, session: &mut dyn SwarmSession) -> FetchOutcome {
        let request_id = self.request.id;
        let resolver = CompletionResolver::new(&self.request.destination, self.fallback_name());
        let tick = self.policy.tick_interval.max(MIN_TICK_INTERVAL);

        let started = Instant::now();
        let baseline = session.bytes_completed();
        let mut sampler = ProgressSampler::new(request_id, baseline, started);
        let mut stall = StallWatch::new(self.policy.stall_timeout, baseline, started);
        let mut ticker = tokio::time::interval_at(started + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return FetchOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            let reading = CounterReading::from_session(session);
            let snapshot = sampler.sample(reading, now);
            debug!(
                tick = snapshot.tick,
                percent = snapshot.percent_done,
                bytes = snapshot.bytes_completed,
                total = snapshot.total_bytes,
                peers = snapshot.peers,
                rate_bps = snapshot.rate_bps,
                "progress sample"
            );
            self.request.emit(&snapshot);

            match resolver.resolve(session) {
                Resolution::Continue => {}
                Resolution::Complete { path, kind } => {
                    return FetchOutcome::Completed { path, kind };
                }
                Resolution::MissingLayout => {
                    return FetchOutcome::Failed(FetchError::LayoutUnavailable { request_id });
                }
            }

            if let Some(idle) = stall.observe(reading.bytes_completed, now) {
                return FetchOutcome::Failed(FetchError::Stalled { request_id, idle });
            }
        }
    }

    fn transition(&self, next: FetchState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "fetch state changed");
        }
    }

    fn fallback_name(&self) -> String {
        MagnetLink::parse(&self.request.magnet).map_or_else(
            |_| self.request.id.to_string(),
            |link| link.info_hash().to_owned(),
        )
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "fetch panicked".to_string())
}

/// Tracks the last time the byte counter moved forward.
#[derive(Debug)]
struct StallWatch {
    limit: Option<Duration>,
    best_bytes: u64,
    progressed_at: Instant,
}

impl StallWatch {
    const fn new(limit: Option<Duration>, baseline: u64, started: Instant) -> Self {
        Self {
            limit,
            best_bytes: baseline,
            progressed_at: started,
        }
    }

    /// Returns the idle time once it reaches the limit.
    fn observe(&mut self, bytes_completed: u64, now: Instant) -> Option<Duration> {
        let limit = self.limit?;
        if bytes_completed > self.best_bytes {
            self.best_bytes = bytes_completed;
            self.progressed_at = now;
            return None;
        }
        let idle = now.saturating_duration_since(self.progressed_at);
        (idle >= limit).then_some(idle)
    }
}
