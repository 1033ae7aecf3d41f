//! Completion detection and final path resolution.

use std::path::{Component, Path, PathBuf};

use swarmfetch_core::{CompletionKind, FileLayout, SwarmSession};

/// Decision produced after each sampling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Transfer still in progress; keep ticking.
    Continue,
    /// Transfer finished; content lives at `path`.
    Complete {
        /// Final on-disk location.
        path: PathBuf,
        /// Whether `path` is a file or a directory.
        kind: CompletionKind,
    },
    /// The session claims completion but has no layout to resolve a path from.
    MissingLayout,
}

/// Resolves completion for fetches writing under one destination directory.
#[derive(Debug, Clone)]
pub struct CompletionResolver {
    destination: PathBuf,
    fallback_name: String,
}

impl CompletionResolver {
    /// `fallback_name` is used when the advertised payload name has no usable
    /// path component (for example `..` or an empty string).
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>, fallback_name: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            fallback_name: fallback_name.into(),
        }
    }

    /// Query the session and decide whether the fetch is done.
    #[must_use]
    pub fn resolve(&self, session: &dyn SwarmSession) -> Resolution {
        if !session.is_complete() {
            return Resolution::Continue;
        }
        session
            .file_layout()
            .map_or(Resolution::MissingLayout, |layout| self.resolve_layout(&layout))
    }

    /// Final location for a completed layout.
    #[must_use]
    pub fn resolve_layout(&self, layout: &FileLayout) -> Resolution {
        let kind = if layout.is_single_file() {
            CompletionKind::SingleFile
        } else {
            CompletionKind::Directory
        };
        let name = contained_name(&layout.name)
            .unwrap_or_else(|| PathBuf::from(&self.fallback_name));
        Resolution::Complete {
            path: self.destination.join(name),
            kind,
        }
    }
}

/// Keep only the normal components of an advertised name so the result stays
/// inside the destination directory.
pub(crate) fn contained_name(name: &str) -> Option<PathBuf> {
    let cleaned: PathBuf = Path::new(name)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if cleaned.as_os_str().is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmfetch_core::LayoutEntry;

    fn pack(files: usize) -> FileLayout {
        FileLayout {
            name: "pack".into(),
            files: (0..files)
                .map(|idx| LayoutEntry {
                    path: PathBuf::from(format!("disc{idx}/track.flac")),
                    size: 100,
                })
                .collect(),
        }
    }

    #[test]
    fn single_file_resolves_to_file_path() {
        let resolver = CompletionResolver::new("/downloads", "fallback");
        assert_eq!(
            resolver.resolve_layout(&FileLayout::single("ubuntu.iso", 1)),
            Resolution::Complete {
                path: PathBuf::from("/downloads/ubuntu.iso"),
                kind: CompletionKind::SingleFile,
            }
        );
    }

    #[test]
    fn multi_file_resolves_to_directory_regardless_of_count() {
        let resolver = CompletionResolver::new("/downloads", "fallback");
        for count in [2, 3, 17] {
            assert_eq!(
                resolver.resolve_layout(&pack(count)),
                Resolution::Complete {
                    path: PathBuf::from("/downloads/pack"),
                    kind: CompletionKind::Directory,
                }
            );
        }
    }

    #[test]
    fn hostile_names_stay_inside_destination() {
        let resolver = CompletionResolver::new("/downloads", "3b24");
        let escaped = FileLayout::single("../../etc/passwd", 1);
        assert_eq!(
            resolver.resolve_layout(&escaped),
            Resolution::Complete {
                path: PathBuf::from("/downloads/etc/passwd"),
                kind: CompletionKind::SingleFile,
            }
        );

        let empty = FileLayout::single("..", 1);
        assert_eq!(
            resolver.resolve_layout(&empty),
            Resolution::Complete {
                path: PathBuf::from("/downloads/3b24"),
                kind: CompletionKind::SingleFile,
            }
        );
    }
}
