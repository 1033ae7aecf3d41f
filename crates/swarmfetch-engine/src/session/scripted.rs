//! Scripted, in-memory swarm transport used to exercise the coordinator.
//!
//! Byte counts follow a time-indexed script measured from the moment
//! `begin_transfer` is first called, so tests running on a paused tokio clock
//! see a deterministic sequence of readings on every tick.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use swarmfetch_core::{
    FileLayout, MagnetLink, SwarmSession, SwarmTransport, TransportError, TransportResult,
};
use tokio::time::Instant;

/// How `await_metadata` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataScript {
    /// Metadata is available immediately.
    #[default]
    Immediate,
    /// Metadata arrives after the given delay.
    After(Duration),
    /// Metadata never arrives.
    Never,
    /// Resolution fails with a transport error.
    Fail,
}

/// Counter values that take effect `at` after the transfer began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStep {
    /// Offset from the first `begin_transfer` call.
    pub at: Duration,
    /// Bytes reported from this point on.
    pub bytes_completed: u64,
    /// Peers reported from this point on.
    pub peers: usize,
    /// Whether the session reports completion from this point on.
    pub complete: bool,
}

impl ProgressStep {
    /// Step reporting `bytes_completed` with one peer.
    #[must_use]
    pub const fn at(at: Duration, bytes_completed: u64) -> Self {
        Self {
            at,
            bytes_completed,
            peers: 1,
            complete: false,
        }
    }

    /// Override the reported peer count.
    #[must_use]
    pub const fn with_peers(mut self, peers: usize) -> Self {
        self.peers = peers;
        self
    }

    /// Mark the step as the completion point.
    #[must_use]
    pub const fn completed(mut self) -> Self {
        self.complete = true;
        self
    }
}

/// Full behaviour of one scripted session.
#[derive(Debug, Clone)]
pub struct SessionScript {
    /// Layout reported once metadata resolved.
    pub layout: FileLayout,
    /// Total length override; defaults to the layout size.
    pub total_length: Option<u64>,
    /// Metadata behaviour.
    pub metadata: MetadataScript,
    /// Time-indexed counter values, ordered by `at`.
    pub steps: Vec<ProgressStep>,
    /// Report completion without ever exposing a layout.
    pub withhold_layout: bool,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            layout: FileLayout::single("payload.bin", 1_000),
            total_length: None,
            metadata: MetadataScript::Immediate,
            steps: Vec::new(),
            withhold_layout: false,
        }
    }
}

impl SessionScript {
    /// Script for `layout` with default behaviour.
    #[must_use]
    pub fn new(layout: FileLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Replace the metadata behaviour.
    #[must_use]
    pub const fn with_metadata(mut self, metadata: MetadataScript) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the counter steps.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<ProgressStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Override the reported total length.
    #[must_use]
    pub const fn with_total_length(mut self, total: u64) -> Self {
        self.total_length = Some(total);
        self
    }
}

/// Shared record of the calls made against scripted sessions.
#[derive(Debug, Default)]
pub struct CallLog {
    joins: AtomicUsize,
    begin_transfers: AtomicUsize,
    closes: AtomicUsize,
    completion_checks: AtomicUsize,
    join_dirs: Mutex<Vec<PathBuf>>,
}

impl CallLog {
    /// Sessions created through `join`.
    #[must_use]
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    /// `begin_transfer` calls across all sessions.
    #[must_use]
    pub fn begin_transfers(&self) -> usize {
        self.begin_transfers.load(Ordering::SeqCst)
    }

    /// `close` calls across all sessions.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// `is_complete` calls, one per processed tick.
    #[must_use]
    pub fn completion_checks(&self) -> usize {
        self.completion_checks.load(Ordering::SeqCst)
    }

    /// Download directories passed to `join`, in call order.
    #[must_use]
    pub fn join_dirs(&self) -> Vec<PathBuf> {
        self.join_dirs
            .lock()
            .map(|dirs| dirs.clone())
            .unwrap_or_default()
    }
}

/// How `join` behaves for well-formed magnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinScript {
    /// Join succeeds.
    #[default]
    Accept,
    /// Join fails as if no peer or tracker answered.
    Unreachable,
}

/// Transport handing out [`ScriptedSession`]s built from one script.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: SessionScript,
    join: JoinScript,
    calls: Arc<CallLog>,
}

impl ScriptedTransport {
    /// Transport whose sessions follow `script`.
    #[must_use]
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            join: JoinScript::Accept,
            calls: Arc::new(CallLog::default()),
        }
    }

    /// Replace the join behaviour.
    #[must_use]
    pub const fn with_join(mut self, join: JoinScript) -> Self {
        self.join = join;
        self
    }

    /// Call log shared by every session this transport creates.
    #[must_use]
    pub fn calls(&self) -> Arc<CallLog> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SwarmTransport for ScriptedTransport {
    async fn join(
        &self,
        magnet: &str,
        download_dir: &Path,
    ) -> TransportResult<Box<dyn SwarmSession>> {
        let link = MagnetLink::parse(magnet)?;
        if self.join == JoinScript::Unreachable {
            return Err(TransportError::Unreachable {
                info_hash: link.info_hash().to_string(),
            });
        }
        self.calls.joins.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut dirs) = self.calls.join_dirs.lock() {
            dirs.push(download_dir.to_path_buf());
        }
        Ok(Box::new(
            ScriptedSession::new(self.script.clone()).with_calls(Arc::clone(&self.calls)),
        ))
    }
}

/// In-memory session driven by a [`SessionScript`].
#[derive(Debug)]
pub struct ScriptedSession {
    script: SessionScript,
    calls: Arc<CallLog>,
    metadata_ready: bool,
    transfer_started: Option<Instant>,
    closed: bool,
}

impl ScriptedSession {
    /// Standalone session with its own call log.
    #[must_use]
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            calls: Arc::new(CallLog::default()),
            metadata_ready: false,
            transfer_started: None,
            closed: false,
        }
    }

    /// Record into a shared call log instead of a private one.
    #[must_use]
    pub fn with_calls(mut self, calls: Arc<CallLog>) -> Self {
        self.calls = calls;
        self
    }

    /// Call log for this session.
    #[must_use]
    pub fn calls(&self) -> Arc<CallLog> {
        Arc::clone(&self.calls)
    }

    fn current_step(&self) -> Option<&ProgressStep> {
        let started = self.transfer_started?;
        let elapsed = Instant::now().saturating_duration_since(started);
        self.script
            .steps
            .iter()
            .take_while(|step| step.at <= elapsed)
            .last()
    }
}

#[async_trait]
impl SwarmSession for ScriptedSession {
    async fn await_metadata(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.script.metadata {
            MetadataScript::Immediate => {}
            MetadataScript::After(delay) => tokio::time::sleep(delay).await,
            MetadataScript::Never => std::future::pending::<()>().await,
            MetadataScript::Fail => {
                return Err(TransportError::backend(
                    "await_metadata",
                    "scripted metadata failure",
                ));
            }
        }
        self.metadata_ready = true;
        Ok(())
    }

    async fn begin_transfer(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.metadata_ready {
            return Err(TransportError::backend(
                "begin_transfer",
                "metadata not resolved",
            ));
        }
        self.calls.begin_transfers.fetch_add(1, Ordering::SeqCst);
        if self.transfer_started.is_none() {
            self.transfer_started = Some(Instant::now());
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn bytes_completed(&self) -> u64 {
        self.current_step().map_or(0, |step| step.bytes_completed)
    }

    fn total_length(&self) -> u64 {
        if self.metadata_ready {
            self.script
                .total_length
                .unwrap_or_else(|| self.script.layout.total_size())
        } else {
            0
        }
    }

    fn peer_count(&self) -> usize {
        self.current_step().map_or(0, |step| step.peers)
    }

    fn is_complete(&self) -> bool {
        self.calls.completion_checks.fetch_add(1, Ordering::SeqCst);
        self.current_step().is_some_and(|step| step.complete)
    }

    fn file_layout(&self) -> Option<FileLayout> {
        (self.metadata_ready && !self.script.withhold_layout).then(|| self.script.layout.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGNET: &str = "magnet:?xt=urn:btih:3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0&dn=demo";

    #[tokio::test]
    async fn malformed_magnet_is_rejected_at_join() {
        let transport = ScriptedTransport::new(SessionScript::default());
        let result = transport.join("magnet:?dn=broken", Path::new("/tmp")).await;
        assert!(matches!(
            result,
            Err(TransportError::MalformedMagnet { .. })
        ));
        assert_eq!(transport.calls().joins(), 0);
    }

    #[tokio::test]
    async fn unreachable_join_reports_info_hash() {
        let transport =
            ScriptedTransport::new(SessionScript::default()).with_join(JoinScript::Unreachable);
        match transport.join(MAGNET, Path::new("/tmp")).await {
            Err(TransportError::Unreachable { info_hash }) => {
                assert_eq!(info_hash, "3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0");
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("join should fail"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counters_follow_the_script() -> TransportResult<()> {
        let script = SessionScript::new(FileLayout::single("ubuntu.iso", 3_000)).with_steps(vec![
            ProgressStep::at(Duration::from_secs(1), 1_000).with_peers(4),
            ProgressStep::at(Duration::from_secs(2), 3_000).completed(),
        ]);
        let mut session = ScriptedSession::new(script);
        assert_eq!(session.total_length(), 0);
        assert!(session.file_layout().is_none());
        assert!(session.begin_transfer().await.is_err(), "needs metadata");

        session.await_metadata().await?;
        session.begin_transfer().await?;
        assert_eq!(session.total_length(), 3_000);
        assert_eq!(session.bytes_completed(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(session.bytes_completed(), 1_000);
        assert_eq!(session.peer_count(), 4);
        assert!(!session.is_complete());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(session.is_complete());
        assert_eq!(session.calls().completion_checks(), 2);

        session.close().await;
        session.close().await;
        assert_eq!(session.calls().closes(), 2);
        assert!(matches!(
            session.begin_transfer().await,
            Err(TransportError::Closed)
        ));
        Ok(())
    }
}
