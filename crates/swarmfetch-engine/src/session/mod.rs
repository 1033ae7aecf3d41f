//! Transport implementations behind the [`SwarmTransport`] seam.
//!
//! The scripted transport is always compiled; it backs the test suites and
//! lets callers run the coordinator without network access. The librqbit
//! transport is compiled with the `rqbit` feature.

#[cfg(feature = "rqbit")]
pub mod rqbit;
pub mod scripted;

use std::sync::Arc;

use swarmfetch_core::{SwarmTransport, TransportResult};

/// Client tuning applied when a network transport is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Upper bound on established peer connections per swarm.
    pub max_peers_per_swarm: u32,
    /// Never serve pieces to other peers.
    pub disable_upload: bool,
    /// Restrict peer connections to IPv4.
    pub disable_ipv6: bool,
    /// Use the distributed hash table for peer discovery.
    pub enable_dht: bool,
    /// Fixed listen port; `None` lets the OS pick one.
    pub listen_port: Option<u16>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_peers_per_swarm: 31,
            disable_upload: true,
            disable_ipv6: true,
            enable_dht: true,
            listen_port: None,
        }
    }
}

/// Build the network transport compiled into this binary.
///
/// # Errors
///
/// Returns [`swarmfetch_core::TransportError::Backend`] when the client cannot start, or when
/// no network transport was compiled in.
#[allow(clippy::unused_async)]
pub async fn create_transport(
    options: &TransportOptions,
) -> TransportResult<Arc<dyn SwarmTransport>> {
    #[cfg(feature = "rqbit")]
    {
        let transport = rqbit::RqbitTransport::new(options).await?;
        Ok(Arc::new(transport))
    }

    #[cfg(not(feature = "rqbit"))]
    {
        let _ = options;
        Err(swarmfetch_core::TransportError::backend(
            "create_transport",
            "no network transport compiled in; rebuild with the `rqbit` feature",
        ))
    }
}
