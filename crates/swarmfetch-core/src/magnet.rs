//! Magnet link validation.
//!
//! Transports treat magnet identifiers as opaque, but they still need to tell a
//! malformed identifier apart from an unreachable swarm. `MagnetLink::parse`
//! performs that syntactic check and extracts the pieces worth logging.

use std::fmt::{self, Display, Formatter};

use data_encoding::BASE32;
use url::Url;

use crate::error::{TransportError, TransportResult};

const BTIH_PREFIX: &str = "urn:btih:";

/// Parsed view of a magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    raw: String,
    info_hash: String,
    display_name: Option<String>,
    trackers: Vec<String>,
}

impl MagnetLink {
    /// Validate a magnet URI and extract its info hash, name and trackers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedMagnet`] when the input is not a
    /// `magnet:` URI carrying a `urn:btih:` exact topic with a 40-character hex
    /// or 32-character base32 info hash.
    pub fn parse(input: &str) -> TransportResult<Self> {
        let trimmed = input.trim();
        let url = Url::parse(trimmed).map_err(|_| TransportError::MalformedMagnet {
            reason: "not a valid URI",
        })?;
        if url.scheme() != "magnet" {
            return Err(TransportError::MalformedMagnet {
                reason: "scheme must be magnet",
            });
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if info_hash.is_none() => {
                    if let Some(hash) = value.strip_prefix(BTIH_PREFIX) {
                        info_hash = Some(normalize_info_hash(hash)?);
                    }
                }
                "dn" if display_name.is_none() && !value.trim().is_empty() => {
                    display_name = Some(value.trim().to_string());
                }
                "tr" if !value.is_empty() => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or(TransportError::MalformedMagnet {
            reason: "missing urn:btih exact topic",
        })?;

        Ok(Self {
            raw: trimmed.to_string(),
            info_hash,
            display_name,
            trackers,
        })
    }

    /// Original URI as supplied by the caller (whitespace trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lowercase hex info hash.
    #[must_use]
    pub fn info_hash(&self) -> &str {
        &self.info_hash
    }

    /// `dn` parameter, when present.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// `tr` parameters in the order supplied.
    #[must_use]
    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }
}

impl Display for MagnetLink {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(formatter, "{name} ({})", self.info_hash),
            None => formatter.write_str(&self.info_hash),
        }
    }
}

fn normalize_info_hash(hash: &str) -> TransportResult<String> {
    let bytes = match hash.len() {
        40 => hex::decode(hash).map_err(|_| TransportError::MalformedMagnet {
            reason: "info hash is not valid hex",
        })?,
        32 => BASE32
            .decode(hash.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::MalformedMagnet {
                reason: "info hash is not valid base32",
            })?,
        _ => {
            return Err(TransportError::MalformedMagnet {
                reason: "info hash must be 40 hex or 32 base32 characters",
            });
        }
    };
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU: &str = "magnet:?xt=urn:btih:3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0&dn=ubuntu-22.04-desktop-amd64.iso";

    #[test]
    fn parses_hex_magnet_with_name() {
        let link = MagnetLink::parse(UBUNTU).expect("valid magnet");
        assert_eq!(link.info_hash(), "3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0");
        assert_eq!(link.display_name(), Some("ubuntu-22.04-desktop-amd64.iso"));
        assert!(link.trackers().is_empty());
        assert_eq!(link.as_str(), UBUNTU);
    }

    #[test]
    fn uppercase_hex_is_normalized_and_trackers_collected() {
        let link = MagnetLink::parse(
            "magnet:?xt=urn:btih:3B245504CF5F11BBDBE1201CEA6A6BF45AEE1BC0&tr=udp%3A%2F%2Ftracker.example%3A1337&tr=http%3A%2F%2Fother.example%2Fannounce",
        )
        .expect("valid magnet");
        assert_eq!(link.info_hash(), "3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0");
        assert_eq!(
            link.trackers(),
            &[
                "udp://tracker.example:1337".to_string(),
                "http://other.example/announce".to_string()
            ]
        );
        assert_eq!(link.display_name(), None);
    }

    #[test]
    fn base32_hash_decodes_to_hex() {
        // 20 zero bytes encode to 32 'A' characters.
        let link = MagnetLink::parse("magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
            .expect("valid base32 magnet");
        assert_eq!(link.info_hash(), "0".repeat(40));
    }

    #[test]
    fn base32_and_hex_forms_agree() {
        let upper = MagnetLink::parse("magnet:?xt=urn:btih:HMSFKBGPL4I3XW7BEAOOU2TL6RNO4G6A")
            .expect("valid base32 magnet");
        let lower = MagnetLink::parse("magnet:?xt=urn:btih:hmsfkbgpl4i3xw7beaoou2tl6rno4g6a")
            .expect("lowercase base32 is accepted");
        assert_eq!(upper.info_hash(), "3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0");
        assert_eq!(lower.info_hash(), upper.info_hash());
    }

    #[test]
    fn rejects_malformed_identifiers() {
        let cases = [
            ("not a uri", "not a valid URI"),
            ("https://example.com/?xt=urn:btih:abc", "scheme must be magnet"),
            ("magnet:?dn=nothing", "missing urn:btih exact topic"),
            (
                "magnet:?xt=urn:btih:1234",
                "info hash must be 40 hex or 32 base32 characters",
            ),
            (
                "magnet:?xt=urn:btih:11111111111111111111111111111111",
                "info hash is not valid base32",
            ),
            (
                "magnet:?xt=urn:btih:zz245504cf5f11bbdbe1201cea6a6bf45aee1bc0",
                "info hash is not valid hex",
            ),
        ];
        for (input, expected) in cases {
            match MagnetLink::parse(input) {
                Err(TransportError::MalformedMagnet { reason }) => {
                    assert_eq!(reason, expected, "input {input}");
                }
                other => panic!("expected malformed magnet for {input}, got {other:?}"),
            }
        }
    }

    #[test]
    fn display_prefers_name() {
        let link = MagnetLink::parse(UBUNTU).expect("valid magnet");
        assert_eq!(
            link.to_string(),
            "ubuntu-22.04-desktop-amd64.iso (3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0)"
        );
    }
}
