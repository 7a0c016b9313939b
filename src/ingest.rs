//! The ingest decision machine.
//!
//! Composes the stamp, watermark and fingerprint channels into a verdict.
//! Checks run in a fixed order and the first match wins:
//!
//! 1. locked-out gate (warning at the limit)
//! 2. content-type gate
//! 3. metadata stamp (user token -> self-duplicate; master token -> theft)
//! 4. watermark (video only)
//! 5. stamp + embed + publish, then the provenance insert whose unique
//!    content-hash constraint is the final arbiter across accounts
//!
//! Business verdicts come back inside `Ok` as [`IngestOutcome`]; only
//! transient/fatal conditions are `Err`. Publication is a compensating
//! transaction: on a losing race the decider removes the blob and the post
//! row it just created, so a rejected ingest leaves no trace.

use anyhow::{anyhow, Result};

use crate::blob::{BlobStore, FilesystemBlobStore};
use crate::config::DeepmarkConfig;
use crate::fingerprint::{self, face_backend, FaceBackend};
use crate::keyvault::KeyVault;
use crate::media::codec;
use crate::stamp::{self, StampPayload};
use crate::store::{Post, ProvenanceInsert, ProvenanceOwner, Store, User};
use crate::watermark::{self, WatermarkParams, WatermarkReadout};
use crate::{sha256_hex, MediaType, ProvenanceId, RejectKind, WARNING_LIMIT};

/// Verdict on one upload.
#[derive(Debug)]
pub enum IngestOutcome {
    Accepted(Post),
    Rejected { kind: RejectKind, detail: String },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted(_))
    }
}

fn rejected(kind: RejectKind, detail: impl Into<String>) -> IngestOutcome {
    IngestOutcome::Rejected {
        kind,
        detail: detail.into(),
    }
}

pub struct Decider {
    vault: KeyVault,
    store: Store,
    blobs: Box<dyn BlobStore>,
    face: Box<dyn FaceBackend>,
    fingerprint_stride: usize,
    watermark: WatermarkParams,
}

impl Decider {
    pub fn new(
        vault: KeyVault,
        store: Store,
        blobs: Box<dyn BlobStore>,
        face: Box<dyn FaceBackend>,
        fingerprint_stride: usize,
        watermark: WatermarkParams,
    ) -> Self {
        Self {
            vault,
            store,
            blobs,
            face,
            fingerprint_stride,
            watermark,
        }
    }

    pub fn from_config(config: &DeepmarkConfig) -> Result<Self> {
        Ok(Self::new(
            KeyVault::new(config.master_key()?),
            Store::open(&config.db_path)?,
            Box::new(FilesystemBlobStore::new(config.blob_root.clone())?),
            face_backend(&config.face_backend)?,
            config.fingerprint_stride,
            config.watermark,
        ))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Signup: mints the sealed per-user key along with the row.
    pub fn register_user(
        &mut self,
        name: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User> {
        if self
            .store
            .find_user_by_username_or_email(username, email)?
            .is_some()
        {
            return Err(anyhow!("username or email is already registered"));
        }
        let sealed = self.vault.generate_user_key()?;
        self.store
            .create_user(name, username, email, password_hash, &sealed)
    }

    /// Run the full decision procedure for one upload.
    pub fn ingest(
        &mut self,
        username: &str,
        filename: &str,
        content_type: &str,
        caption: &str,
        bytes: &[u8],
    ) -> Result<IngestOutcome> {
        let user = self
            .store
            .user_by_username(username)?
            .ok_or_else(|| anyhow!("unknown user '{}'", username))?;

        if user.is_locked_out() {
            return Ok(rejected(
                RejectKind::LockedOut,
                "user can't access account, limit reached",
            ));
        }

        let Some(media_type) = MediaType::from_content_type(content_type) else {
            return Ok(rejected(
                RejectKind::UnsupportedMedia,
                "media is not an image or a video",
            ));
        };

        match media_type {
            MediaType::Image => self.ingest_image(&user, filename, caption, bytes),
            MediaType::Video => self.ingest_video(&user, filename, caption, bytes),
        }
    }

    fn ingest_video(
        &mut self,
        user: &User,
        filename: &str,
        caption: &str,
        bytes: &[u8],
    ) -> Result<IngestOutcome> {
        let mut clip = match codec::decode(bytes) {
            Ok(clip) => clip,
            Err(err) => {
                log::debug!("rejecting undecodable video from {}: {:#}", user.username, err);
                return Ok(rejected(RejectKind::UnsupportedMedia, "media is unreadable"));
            }
        };

        let content_hash =
            fingerprint::fingerprint_clip(&clip, self.face.as_mut(), self.fingerprint_stride)?;

        // channel 1: metadata stamp
        let stamp = stamp::read_stamp(MediaType::Video, bytes)?;
        if let Some(payload) = stamp.payload() {
            if let Some(outcome) = self.check_stamp_payload(user, &payload, &content_hash)? {
                return Ok(outcome);
            }
        }

        // channel 2: watermark
        match watermark::extract_clip(&clip, &self.watermark) {
            WatermarkReadout::Manipulated => {
                log::warn!("manipulated watermark carrier from {}", user.username);
                return Ok(rejected(RejectKind::TheftDetected, "you don't own this media"));
            }
            WatermarkReadout::Id(recovered) => {
                if let Some(outcome) =
                    self.check_recovered_id(user, &recovered, &content_hash)?
                {
                    return Ok(outcome);
                }
            }
            WatermarkReadout::Absent => {}
        }

        // stamp & publish
        let id = ProvenanceId::mint();
        watermark::embed_clip(&mut clip, id.as_str(), &self.watermark)?;
        let marked = codec::encode(&clip)?;
        let payload = self.payload_for(user, &id)?;
        let stamped = stamp::write_stamp(MediaType::Video, &marked, &payload)?;
        let media_url = self.blobs.put(
            &user.username,
            &extension_for(filename, MediaType::Video),
            &stamped,
        )?;

        self.persist(user, &media_url, caption, MediaType::Video, &id, &content_hash)
    }

    fn ingest_image(
        &mut self,
        user: &User,
        filename: &str,
        caption: &str,
        bytes: &[u8],
    ) -> Result<IngestOutcome> {
        if let Err(err) = image::load_from_memory(bytes) {
            log::debug!("rejecting undecodable image from {}: {}", user.username, err);
            return Ok(rejected(RejectKind::UnsupportedMedia, "media is unreadable"));
        }

        // images fingerprint as a plain byte hash; the uniqueness gate still
        // catches exact re-uploads even with the EXIF stripped
        let content_hash = sha256_hex(bytes);

        let stamp = stamp::read_stamp(MediaType::Image, bytes)?;
        if let Some(payload) = stamp.payload() {
            if let Some(outcome) = self.check_stamp_payload(user, &payload, &content_hash)? {
                return Ok(outcome);
            }
        }

        let id = ProvenanceId::mint();
        let payload = self.payload_for(user, &id)?;
        let stamped = stamp::write_stamp(MediaType::Image, bytes, &payload)?;
        let media_url = self.blobs.put(
            &user.username,
            &extension_for(filename, MediaType::Image),
            &stamped,
        )?;

        self.persist(user, &media_url, caption, MediaType::Image, &id, &content_hash)
    }

    /// Decide on a well-formed two-token stamp. `None` means the stamp says
    /// nothing actionable and the pipeline continues.
    fn check_stamp_payload(
        &mut self,
        user: &User,
        payload: &StampPayload,
        content_hash: &str,
    ) -> Result<Option<IngestOutcome>> {
        let user_cipher = self.vault.user_cipher(&user.security_key)?;
        if let Some(id_text) = user_cipher.decrypt(&payload.user_token) {
            // stamped for this user
            if let Ok(id) = ProvenanceId::parse(&id_text) {
                if self.store.provenance_by_id(&id)?.is_some() {
                    return Ok(Some(rejected(
                        RejectKind::DuplicateSelf,
                        "post was already uploaded",
                    )));
                }
            }
            // the referenced post is gone; the master copy has the last word
        }

        let Some(id_text) = self.vault.master_cipher().decrypt(&payload.master_token) else {
            // neither copy opens: not one of our stamps
            return Ok(None);
        };
        let Ok(id) = ProvenanceId::parse(&id_text) else {
            return Ok(None);
        };
        let Some(owner) = self.store.provenance_owner_by_id(&id)? else {
            // stamp outlived its post
            return Ok(None);
        };
        // stamped for someone else
        Ok(Some(self.reject_as_theft(user, &owner, content_hash)?))
    }

    /// Decide on a provenance id recovered from the watermark.
    fn check_recovered_id(
        &mut self,
        user: &User,
        recovered: &str,
        content_hash: &str,
    ) -> Result<Option<IngestOutcome>> {
        let resolved = match ProvenanceId::parse(recovered) {
            Ok(id) => self.store.provenance_owner_by_id(&id)?,
            Err(_) => None,
        };
        let Some(owner) = resolved else {
            // a mark we cannot resolve is still a mark: the uploader did not
            // make this file
            return Ok(Some(rejected(
                RejectKind::TheftDetected,
                "you don't own this media",
            )));
        };
        if owner.post.user_id == user.user_id {
            return Ok(Some(rejected(
                RejectKind::DuplicateSelf,
                "post was already uploaded",
            )));
        }
        Ok(Some(self.reject_as_theft(user, &owner, content_hash)?))
    }

    /// Third-party re-upload: notify the owner, and strike the uploader when
    /// the content no longer matches the original (a tampered copy).
    fn reject_as_theft(
        &mut self,
        user: &User,
        owner: &ProvenanceOwner,
        content_hash: &str,
    ) -> Result<IngestOutcome> {
        log::warn!(
            "theft detected: {} re-uploaded post {} of {}",
            user.username,
            owner.post.id,
            owner.owner.username
        );
        self.store.append_theft_activity(
            &owner.owner.username,
            &user.username,
            &user.profile_picture,
            &owner.post,
        )?;
        if owner.record.content_hash != content_hash {
            let warning = self.store.bump_warning(user.user_id)?;
            return Ok(rejected(
                RejectKind::TheftDetected,
                format!(
                    "you don't own this media, you have only {} chance remaining",
                    WARNING_LIMIT.saturating_sub(warning)
                ),
            ));
        }
        Ok(rejected(RejectKind::TheftDetected, "you don't own this media"))
    }

    fn payload_for(&self, user: &User, id: &ProvenanceId) -> Result<StampPayload> {
        let user_cipher = self.vault.user_cipher(&user.security_key)?;
        Ok(StampPayload::new(
            user_cipher.encrypt(id.as_str())?,
            self.vault.master_cipher().encrypt(id.as_str())?,
        ))
    }

    /// Steps 5-6: post row, then the provenance insert whose unique hash
    /// constraint arbitrates the cross-account race. On a lost race the
    /// blob and the post row are compensated away before the verdict.
    fn persist(
        &mut self,
        user: &User,
        media_url: &str,
        caption: &str,
        media_type: MediaType,
        id: &ProvenanceId,
        content_hash: &str,
    ) -> Result<IngestOutcome> {
        let post = self
            .store
            .insert_post(user.user_id, media_url, caption, media_type)?;

        match self.store.insert_provenance(id, post.id, content_hash)? {
            ProvenanceInsert::Inserted => {
                log::info!(
                    "accepted {} upload {} from {} (provenance {})",
                    media_type,
                    post.id,
                    user.username,
                    id
                );
                Ok(IngestOutcome::Accepted(post))
            }
            ProvenanceInsert::DuplicateHash => {
                if let Err(err) = self.blobs.delete(media_url) {
                    // orphan blobs are tolerated; the rows are not
                    log::warn!("compensating blob delete failed: {:#}", err);
                }
                self.store.delete_post(post.id)?;

                let Some(owner) = self.store.provenance_owner_by_hash(content_hash)? else {
                    return Err(anyhow!(
                        "content hash collided but the owning row is gone"
                    ));
                };
                if owner.post.user_id == user.user_id {
                    return Ok(rejected(
                        RejectKind::DuplicateSelf,
                        "post was already uploaded",
                    ));
                }
                self.store.append_theft_activity(
                    &owner.owner.username,
                    &user.username,
                    &user.profile_picture,
                    &owner.post,
                )?;
                Ok(rejected(RejectKind::TheftDetected, "you don't own this media"))
            }
        }
    }
}

fn extension_for(filename: &str, media_type: MediaType) -> String {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| {
            *ext != filename && !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| {
            match media_type {
                MediaType::Image => "jpg",
                MediaType::Video => "mp4",
            }
            .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvault::MasterKey;

    fn test_decider() -> Decider {
        let dir = tempfile::tempdir().unwrap();
        let blob_root = dir.path().join("blobs");
        // the tempdir guard is dropped, but these unit tests never write blobs
        Decider::new(
            KeyVault::new(MasterKey::from_bytes([5u8; 32])),
            Store::open(":memory:").unwrap(),
            Box::new(FilesystemBlobStore::new(blob_root).unwrap()),
            face_backend("stub").unwrap(),
            fingerprint::DEFAULT_STRIDE,
            WatermarkParams::default(),
        )
    }

    #[test]
    fn unknown_users_are_fatal() {
        let mut decider = test_decider();
        assert!(decider
            .ingest("ghost", "a.mp4", "video/mp4", "", b"irrelevant")
            .is_err());
    }

    #[test]
    fn locked_out_users_are_gated_before_ingest() {
        let mut decider = test_decider();
        let user = decider
            .register_user("Mallory", "mallory", "m@example.com", "hash")
            .unwrap();
        for _ in 0..3 {
            decider.store_mut().bump_warning(user.user_id).unwrap();
        }
        let outcome = decider
            .ingest("mallory", "a.mp4", "video/mp4", "", b"irrelevant")
            .unwrap();
        let IngestOutcome::Rejected { kind, .. } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(kind, RejectKind::LockedOut);
    }

    #[test]
    fn unsupported_content_types_are_rejected() {
        let mut decider = test_decider();
        decider
            .register_user("Alice", "alice", "a@example.com", "hash")
            .unwrap();
        let outcome = decider
            .ingest("alice", "a.pdf", "application/pdf", "", b"%PDF-")
            .unwrap();
        let IngestOutcome::Rejected { kind, detail } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(kind, RejectKind::UnsupportedMedia);
        assert_eq!(detail, "media is not an image or a video");
    }

    #[test]
    fn unreadable_media_is_rejected() {
        let mut decider = test_decider();
        decider
            .register_user("Alice", "alice", "a@example.com", "hash")
            .unwrap();
        let video = decider
            .ingest("alice", "a.mp4", "video/mp4", "", b"not a container")
            .unwrap();
        assert!(matches!(
            video,
            IngestOutcome::Rejected {
                kind: RejectKind::UnsupportedMedia,
                ..
            }
        ));
        let image = decider
            .ingest("alice", "a.jpg", "image/jpeg", "", b"not a jpeg")
            .unwrap();
        assert!(matches!(
            image,
            IngestOutcome::Rejected {
                kind: RejectKind::UnsupportedMedia,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut decider = test_decider();
        decider
            .register_user("Alice", "alice", "a@example.com", "hash")
            .unwrap();
        assert!(decider
            .register_user("Other", "alice", "other@example.com", "hash")
            .is_err());
        assert!(decider
            .register_user("Other", "other", "a@example.com", "hash")
            .is_err());
    }

    #[test]
    fn extensions_come_from_the_filename() {
        assert_eq!(extension_for("clip.MOV", MediaType::Video), "mov");
        assert_eq!(extension_for("cat.jpeg", MediaType::Image), "jpeg");
        assert_eq!(extension_for("noext", MediaType::Video), "mp4");
        assert_eq!(extension_for("weird.ta r", MediaType::Image), "jpg");
    }
}
