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

//! File and environment backed configuration for swarmfetch.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (JSON file plus
//! `SWARMFETCH_*` overrides), `validate.rs` (validation and value parsing),
//! `error.rs` (`ConfigError`).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use model::{AppConfig, FetchSettings, LoggingSettings, TransportSettings};
