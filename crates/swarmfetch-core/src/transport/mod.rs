//! Swarm capability traits implemented by transport adapters.

use std::path::Path;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::model::FileLayout;

/// Entry point into a swarm library (e.g. a `BitTorrent` session).
#[async_trait]
pub trait SwarmTransport: Send + Sync {
    /// Join the swarm identified by `magnet`, storing content under `download_dir`.
    ///
    /// Fails with [`crate::TransportError::MalformedMagnet`] when the
    /// identifier cannot be parsed, or another transport error when the swarm
    /// cannot be reached.
    async fn join(
        &self,
        magnet: &str,
        download_dir: &Path,
    ) -> TransportResult<Box<dyn SwarmSession>>;
}

/// Joined swarm session for one magnet identifier.
///
/// Counter reads are cheap and non-blocking; the async methods are the only
/// suspension points.
#[async_trait]
pub trait SwarmSession: Send {
    /// Resolve once the payload name, size and file layout are known.
    ///
    /// Carries no timeout of its own; callers bound the wait externally.
    async fn await_metadata(&mut self) -> TransportResult<()>;

    /// Start pulling data. Idempotent; valid once metadata is available.
    async fn begin_transfer(&mut self) -> TransportResult<()>;

    /// Release every resource tied to the session. Safe to call repeatedly.
    async fn close(&mut self);

    /// Bytes verified so far.
    fn bytes_completed(&self) -> u64;

    /// Total payload size, or zero while unknown.
    fn total_length(&self) -> u64;

    /// Currently connected peers.
    fn peer_count(&self) -> usize;

    /// Whether every byte of the payload has been verified.
    fn is_complete(&self) -> bool;

    /// Payload layout; `None` until metadata resolved.
    fn file_layout(&self) -> Option<FileLayout>;
}
