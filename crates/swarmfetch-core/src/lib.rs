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

//! Transport-agnostic fetch interfaces and DTOs.
//!
//! Layout: `model` (requests, snapshots, outcomes, policy), `magnet`
//! (magnet link validation), `transport` (swarm capability traits),
//! `error` (transport and fetch error taxonomy).

pub mod error;
pub mod magnet;
pub mod model;
pub mod transport;

pub use error::{FetchError, FetchResult, TransportError, TransportResult};
pub use magnet::MagnetLink;
pub use model::{
    CompletionKind, FetchOutcome, FetchPhase, FetchPolicy, FetchRequest, FetchState, FileLayout,
    LayoutEntry, ProgressSink, ProgressSnapshot,
};
pub use transport::{SwarmSession, SwarmTransport};
