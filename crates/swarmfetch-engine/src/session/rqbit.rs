//! Swarm transport backed by the librqbit client.
//!
//! One librqbit session is shared by every fetch started through a transport.
//! `await_metadata` first lists the magnet to learn its layout, then adds the
//! resolved torrent paused under the folder the payload must end up in;
//! `begin_transfer` unpauses.
//!
//! librqbit writes into an explicit output folder as-is, so multi-file
//! payloads get a `<destination>/<name>` folder of their own while single
//! files land directly in the destination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use librqbit::{
    AddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session,
    SessionOptions,
};
use swarmfetch_core::{
    FileLayout, LayoutEntry, MagnetLink, SwarmSession, SwarmTransport, TransportError,
    TransportResult,
};
use tracing::{debug, warn};

type ManagedTorrentHandle = Arc<ManagedTorrent>;

use super::TransportOptions;
use crate::resolver::contained_name;

/// [`SwarmTransport`] over a shared librqbit session.
pub struct RqbitTransport {
    session: Arc<Session>,
}

impl RqbitTransport {
    /// Start the librqbit client with the given tuning.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Backend`] if the client cannot be started.
    pub async fn new(options: &TransportOptions) -> TransportResult<Self> {
        let default_dir = std::env::temp_dir().join("swarmfetch");
        debug!(
            max_peers = options.max_peers_per_swarm,
            disable_ipv6 = options.disable_ipv6,
            "librqbit has no per-swarm peer cap or IPv4-only switch; using its defaults"
        );
        let session = Session::new_with_opts(default_dir, session_options(options))
            .await
            .map_err(|err| TransportError::backend("create_session", err))?;
        Ok(Self { session })
    }
}

#[async_trait]
impl SwarmTransport for RqbitTransport {
    async fn join(
        &self,
        magnet: &str,
        download_dir: &Path,
    ) -> TransportResult<Box<dyn SwarmSession>> {
        let link = MagnetLink::parse(magnet)?;
        debug!(info_hash = link.info_hash(), "joining swarm");
        Ok(Box::new(RqbitSession {
            session: Arc::clone(&self.session),
            link,
            output_folder: download_dir.to_path_buf(),
            payload_name: None,
            torrent: None,
            closed: false,
        }))
    }
}

struct RqbitSession {
    session: Arc<Session>,
    link: MagnetLink,
    output_folder: PathBuf,
    payload_name: Option<String>,
    torrent: Option<(usize, ManagedTorrentHandle)>,
    closed: bool,
}

impl RqbitSession {
    fn handle(&self) -> Option<&ManagedTorrentHandle> {
        self.torrent.as_ref().map(|(_, handle)| handle)
    }
}

#[async_trait]
impl SwarmSession for RqbitSession {
    async fn await_metadata(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.torrent.is_some() {
            return Ok(());
        }
        let listed = self
            .session
            .add_torrent(
                AddTorrent::from_url(self.link.as_str()),
                Some(AddTorrentOptions {
                    list_only: true,
                    ..AddTorrentOptions::default()
                }),
            )
            .await
            .map_err(|err| TransportError::backend("list_torrent", err))?;
        let listed = match listed {
            AddTorrentResponse::ListOnly(listed) => listed,
            AddTorrentResponse::Added(id, handle)
            | AddTorrentResponse::AlreadyManaged(id, handle) => {
                self.torrent = Some((id, handle));
                return Ok(());
            }
        };

        let advertised = listed
            .info
            .name
            .as_ref()
            .map(|name| String::from_utf8_lossy(&name.0[..]).into_owned());
        let file_count = listed.info.files.as_ref().map_or(1, Vec::len);
        let name = payload_name(advertised.as_deref(), &self.link);
        let folder = payload_folder(&self.output_folder, &name, file_count);
        debug!(
            info_hash = self.link.info_hash(),
            files = file_count,
            folder = %folder.display(),
            "metadata resolved"
        );

        let trackers = self.link.trackers();
        let options = AddTorrentOptions {
            paused: true,
            overwrite: true,
            output_folder: Some(folder.to_string_lossy().into_owned()),
            trackers: (!trackers.is_empty()).then(|| trackers.to_vec()),
            initial_peers: (!listed.seen_peers.is_empty()).then_some(listed.seen_peers),
            ..AddTorrentOptions::default()
        };
        let response = self
            .session
            .add_torrent(AddTorrent::from_bytes(listed.torrent_bytes), Some(options))
            .await
            .map_err(|err| TransportError::backend("add_torrent", err))?;
        match response {
            AddTorrentResponse::Added(id, handle)
            | AddTorrentResponse::AlreadyManaged(id, handle) => {
                self.payload_name = Some(name);
                self.torrent = Some((id, handle));
                Ok(())
            }
            AddTorrentResponse::ListOnly(_) => Err(TransportError::backend(
                "add_torrent",
                "librqbit returned a list-only response",
            )),
        }
    }

    async fn begin_transfer(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let Some(handle) = self.handle() else {
            return Err(TransportError::backend(
                "begin_transfer",
                "metadata not resolved",
            ));
        };
        if !handle.is_paused() {
            return Ok(());
        }
        self.session
            .unpause(handle)
            .await
            .map_err(|err| TransportError::backend("unpause", err))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some((id, _)) = self.torrent.take()
            && let Err(err) = self.session.delete(id.into(), false).await
        {
            warn!(
                info_hash = self.link.info_hash(),
                error = %err,
                "failed to forget torrent"
            );
        }
    }

    fn bytes_completed(&self) -> u64 {
        self.handle().map_or(0, |handle| handle.stats().progress_bytes)
    }

    fn total_length(&self) -> u64 {
        self.handle().map_or(0, |handle| handle.stats().total_bytes)
    }

    fn peer_count(&self) -> usize {
        self.handle()
            .and_then(|handle| handle.stats().live)
            .map_or(0, |live| live.snapshot.peer_stats.live)
    }

    fn is_complete(&self) -> bool {
        self.handle()
            .is_some_and(|handle| handle.stats().finished)
    }

    fn file_layout(&self) -> Option<FileLayout> {
        let handle = self.handle()?;
        let files = handle
            .with_metadata(|meta| {
                meta.file_infos
                    .iter()
                    .map(|file| LayoutEntry {
                        path: file.relative_filename.clone(),
                        size: file.len,
                    })
                    .collect::<Vec<_>>()
            })
            .ok()?;
        let name = self
            .payload_name
            .clone()
            .unwrap_or_else(|| payload_name(handle.name().as_deref(), &self.link));
        Some(FileLayout { name, files })
    }
}

/// Name the resolver will join onto the destination: the advertised name
/// reduced to plain path components, else the magnet's `dn`, else the hash.
fn payload_name(advertised: Option<&str>, link: &MagnetLink) -> String {
    advertised
        .and_then(contained_name)
        .or_else(|| link.display_name().and_then(contained_name))
        .map_or_else(
            || link.info_hash().to_owned(),
            |name| name.to_string_lossy().into_owned(),
        )
}

/// Folder handed to librqbit so files end up where the resolver looks.
fn session_options(options: &TransportOptions) -> SessionOptions {
    SessionOptions {
        disable_dht: !options.enable_dht,
        disable_upload: options.disable_upload,
        listen_port_range: options
            .listen_port
            .map(|port| port..port.saturating_add(1)),
        ..SessionOptions::default()
    }
}

fn payload_folder(destination: &Path, name: &str, file_count: usize) -> PathBuf {
    if file_count > 1 {
        destination.join(name)
    } else {
        destination.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{CompletionResolver, Resolution};
    use swarmfetch_core::CompletionKind;

    const PACK: &str = "magnet:?xt=urn:btih:3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0&dn=from-magnet";
    const BARE: &str = "magnet:?xt=urn:btih:3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0";

    fn link(magnet: &str) -> MagnetLink {
        MagnetLink::parse(magnet).expect("valid magnet")
    }

    #[test]
    fn multi_file_payload_gets_its_own_folder() {
        let dest = Path::new("/downloads");
        assert_eq!(
            payload_folder(dest, "pack", 3),
            PathBuf::from("/downloads/pack")
        );
        assert_eq!(payload_folder(dest, "ubuntu.iso", 1), PathBuf::from("/downloads"));
    }

    #[test]
    fn folder_matches_resolved_directory() {
        let dest = Path::new("/downloads");
        let name = payload_name(Some("pack"), &link(PACK));
        let resolver = CompletionResolver::new(dest, "unused");
        let layout = FileLayout {
            name: name.clone(),
            files: vec![
                LayoutEntry {
                    path: PathBuf::from("a.bin"),
                    size: 1,
                },
                LayoutEntry {
                    path: PathBuf::from("b.bin"),
                    size: 1,
                },
            ],
        };
        assert_eq!(
            resolver.resolve_layout(&layout),
            Resolution::Complete {
                path: payload_folder(dest, &name, layout.files.len()),
                kind: CompletionKind::Directory,
            }
        );
    }

    #[test]
    fn transport_options_reach_the_client() {
        let defaults = session_options(&TransportOptions::default());
        assert!(defaults.disable_upload);
        assert!(!defaults.disable_dht);
        assert!(defaults.listen_port_range.is_none());

        let seeding = session_options(&TransportOptions {
            disable_upload: false,
            enable_dht: false,
            listen_port: Some(6881),
            ..TransportOptions::default()
        });
        assert!(!seeding.disable_upload);
        assert!(seeding.disable_dht);
        assert_eq!(seeding.listen_port_range, Some(6881..6882));
    }

    #[test]
    fn payload_name_falls_back_in_order() {
        assert_eq!(payload_name(Some("../../pack"), &link(PACK)), "pack");
        assert_eq!(payload_name(Some(".."), &link(PACK)), "from-magnet");
        assert_eq!(payload_name(None, &link(PACK)), "from-magnet");
        assert_eq!(
            payload_name(None, &link(BARE)),
            "3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0"
        );
    }
}
