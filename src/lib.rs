//! DeepMark media-provenance kernel.
//!
//! This crate implements the provenance and duplicate-detection core for a
//! media-sharing platform: deciding whether an upload is original content, a
//! duplicate, or a re-upload of someone else's media.
//!
//! # Architecture
//!
//! Three independent channels tie an upload back to its first publisher:
//!
//! 1. **Content fingerprint**: SHA-256 over the facial geometry of sampled
//!    frames, canonically serialized. A unique column in the provenance
//!    store makes the first writer win, even across accounts.
//! 2. **Blind watermark**: the 16-hex provenance id carried in the LL2 band
//!    of a two-level Haar decomposition of sampled luminance planes. Survives
//!    re-muxing and mild transcoding and needs no key to read.
//! 3. **Metadata stamp**: two encrypted copies of the provenance id (one
//!    under the uploader's key, one under the master key) in the image EXIF
//!    `UserComment` or the video container `copyright` tag.
//!
//! The [`ingest::Decider`] composes the three channels into an accept/reject
//! verdict with a per-user warning counter.
//!
//! # Module Structure
//!
//! - `keyvault`: master key + envelope-encrypted per-user keys
//! - `media`: frame substrate and container codecs
//! - `fingerprint`: facial-geometry content hash
//! - `watermark`: DWT-Haar embed/extract
//! - `stamp`: EXIF and container-tag provenance payloads
//! - `store`: relational state (users, posts, provenance, activities)
//! - `blob`: published-media storage boundary
//! - `ingest`: the decision machine

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod blob;
pub mod config;
pub mod fingerprint;
pub mod ingest;
pub mod keyvault;
pub mod media;
pub mod stamp;
pub mod store;
pub mod watermark;

pub use blob::{BlobStore, FilesystemBlobStore};
pub use config::DeepmarkConfig;
pub use ingest::{Decider, IngestOutcome};
pub use keyvault::{KeyVault, MasterKey, UserCipher};
pub use store::Store;

// -------------------- Media types --------------------

/// Media kind accepted by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// Classify a declared content type. Anything outside `image/*` and
    /// `video/*` is unsupported.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.starts_with("image/") {
            Some(MediaType::Image)
        } else if content_type.starts_with("video/") {
            Some(MediaType::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Provenance ids --------------------

/// 16-hex-character identifier naming one accepted upload.
///
/// Short enough to ride in a 128-bit watermark, random enough that minting
/// collisions are not a practical concern (the store's primary key still
/// rejects them).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProvenanceId(String);

impl ProvenanceId {
    pub const LEN: usize = 16;

    /// Mint a fresh id: first 16 hex chars of SHA-256 over a v4 UUID.
    pub fn mint() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let digest = Sha256::digest(uuid.to_string().as_bytes());
        ProvenanceId(hex::encode(digest)[..Self::LEN].to_string())
    }

    /// Accept an externally supplied id (recovered from a watermark or a
    /// decrypted stamp token).
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(anyhow!("provenance id must be 16 hex characters"));
        }
        Ok(ProvenanceId(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProvenanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// -------------------- Verdicts --------------------

/// Maximum strikes before an account is locked read-only.
pub const WARNING_LIMIT: u32 = 3;

/// Rejection category surfaced to the transport layer.
///
/// These are business verdicts, not errors: the decider returns them inside
/// `Ok`. Only transient and fatal conditions travel as `Err`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectKind {
    /// Content type is neither image/* nor video/*.
    UnsupportedMedia,
    /// The provenance belongs to the uploader.
    DuplicateSelf,
    /// The provenance belongs to someone else.
    TheftDetected,
    /// The uploader's warning counter reached the limit.
    LockedOut,
}

impl RejectKind {
    pub fn status_code(&self) -> u16 {
        match self {
            RejectKind::UnsupportedMedia => 415,
            RejectKind::DuplicateSelf => 409,
            RejectKind::TheftDetected => 406,
            RejectKind::LockedOut => 403,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectKind::UnsupportedMedia => "UNSUPPORTED_MEDIA",
            RejectKind::DuplicateSelf => "DUPLICATE_SELF",
            RejectKind::TheftDetected => "THEFT_DETECTED",
            RejectKind::LockedOut => "LOCKED_OUT",
        }
    }
}

// -------------------- Username discipline --------------------

/// A conforming username is a local handle: lowercase alphanumerics plus
/// `[._-]`, 3 to 50 characters, starting alphanumeric.
pub fn validate_username(username: &str) -> Result<()> {
    // Compile once for hot paths.
    static USERNAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re =
        USERNAME_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9._-]{2,49}$").unwrap());

    if !re.is_match(username) {
        return Err(anyhow!("username must match ^[a-z0-9][a-z0-9._-]{{2,49}}$"));
    }
    Ok(())
}

// -------------------- Helpers --------------------

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
