//! Content fingerprint: what a video *shows*, not how it was encoded.
//!
//! Every k-th frame is orientation-normalized and run through a face
//! backend; the resulting geometry records are serialized as canonical JSON
//! and hashed with SHA-256. The hash is the content-uniqueness key the
//! provenance store enforces globally.
//!
//! Determinism contract: a fixed backend, a fixed stride and bitwise-equal
//! input frames must produce bitwise-equal hashes. Serialization therefore
//! uses lexicographically sorted keys and compact separators: struct fields
//! below are declared in key order (serde emits declaration order) and
//! landmark groups live in a `BTreeMap`.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::media::VideoClip;
use crate::sha256_hex;

pub mod backend;
pub mod backends;

pub use backend::{face_backend, FaceBackend};

/// Default sampling stride: every 5th frame.
pub const DEFAULT_STRIDE: usize = 5;

/// Axis-aligned face bounding box in pixel coordinates.
///
/// Field order is the serialization order; keep it sorted.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FaceRect {
    pub bottom: i64,
    pub left: i64,
    pub right: i64,
    pub top: i64,
}

impl FaceRect {
    pub fn new(top: i64, right: i64, bottom: i64, left: i64) -> Self {
        Self {
            bottom,
            left,
            right,
            top,
        }
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

/// One detected face: bounding box plus named landmark groups, each a list
/// of `[x, y]` pixel points.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FaceRecord {
    pub landmarks: BTreeMap<String, Vec<[i64; 2]>>,
    pub rect: FaceRect,
}

/// Geometry of one sampled frame. An empty `faces` list is a valid record;
/// face-free footage still fingerprints deterministically.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FrameRecord {
    pub faces: Vec<FaceRecord>,
    pub frame: usize,
}

/// Fingerprint a decoded clip: 64 lowercase hex characters.
pub fn fingerprint_clip(
    clip: &VideoClip,
    backend: &mut dyn FaceBackend,
    stride: usize,
) -> Result<String> {
    let records = geometry_records(clip, backend, stride)?;
    Ok(hash_records(&records)?)
}

/// The per-frame geometry pass, exposed separately for tooling.
pub fn geometry_records(
    clip: &VideoClip,
    backend: &mut dyn FaceBackend,
    stride: usize,
) -> Result<Vec<FrameRecord>> {
    let stride = stride.max(1);
    let mut records = Vec::new();
    for (idx, frame) in clip.frames.iter().enumerate() {
        if idx % stride != 0 {
            continue;
        }
        let normalized;
        let frame = if frame.is_portrait() {
            normalized = frame.rotate90_cw();
            &normalized
        } else {
            frame
        };
        let faces = backend.detect(&frame.luma(), frame.width(), frame.height())?;
        records.push(FrameRecord { faces, frame: idx });
    }
    Ok(records)
}

/// Canonical JSON (sorted keys, no insignificant whitespace) then SHA-256.
pub fn hash_records(records: &[FrameRecord]) -> Result<String> {
    let json = serde_json::to_string(records)?;
    Ok(sha256_hex(json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Frame;

    fn clip_with(frames: Vec<Frame>) -> VideoClip {
        VideoClip {
            frames,
            fps: 30,
            tags: BTreeMap::new(),
            format_name: "dmkv".to_string(),
        }
    }

    fn flat_frame(w: u32, h: u32, value: u8) -> Frame {
        Frame::new(vec![value; (w * h * 3) as usize], w, h).unwrap()
    }

    #[test]
    fn record_serialization_is_canonical() {
        let mut landmarks = BTreeMap::new();
        landmarks.insert("nose_tip".to_string(), vec![[3, 4]]);
        landmarks.insert("chin".to_string(), vec![[1, 2]]);
        let record = FrameRecord {
            faces: vec![FaceRecord {
                landmarks,
                rect: FaceRect::new(1, 8, 9, 2),
            }],
            frame: 0,
        };
        let json = serde_json::to_string(&vec![record]).unwrap();
        assert_eq!(
            json,
            r#"[{"faces":[{"landmarks":{"chin":[[1,2]],"nose_tip":[[3,4]]},"rect":{"bottom":9,"left":2,"right":8,"top":1}}],"frame":0}]"#
        );
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let clip = clip_with(vec![flat_frame(64, 48, 10); 12]);
        let mut backend_a = face_backend("stub").unwrap();
        let mut backend_b = face_backend("stub").unwrap();
        let a = fingerprint_clip(&clip, backend_a.as_mut(), 5).unwrap();
        let b = fingerprint_clip(&clip, backend_b.as_mut(), 5).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn stride_selects_every_kth_frame() {
        let clip = clip_with(vec![flat_frame(64, 48, 10); 11]);
        let mut backend = face_backend("stub").unwrap();
        let records = geometry_records(&clip, backend.as_mut(), 5).unwrap();
        let sampled: Vec<usize> = records.iter().map(|r| r.frame).collect();
        assert_eq!(sampled, vec![0, 5, 10]);
    }

    #[test]
    fn different_content_hashes_differently() {
        let mut backend = face_backend("stub").unwrap();
        let a = fingerprint_clip(&clip_with(vec![flat_frame(64, 48, 10); 6]), backend.as_mut(), 5)
            .unwrap();
        let b = fingerprint_clip(&clip_with(vec![flat_frame(64, 48, 10); 11]), backend.as_mut(), 5)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn faceless_footage_still_hashes() {
        let clip = clip_with(vec![flat_frame(64, 48, 10); 3]);
        let mut backend = face_backend("luma").unwrap();
        let records = geometry_records(&clip, backend.as_mut(), 5).unwrap();
        assert!(records.iter().all(|r| r.faces.is_empty()));
        assert_eq!(hash_records(&records).unwrap().len(), 64);
    }

    #[test]
    fn portrait_frames_are_rotated_before_detection() {
        // portrait and its rotation give identical geometry input
        let portrait = clip_with(vec![flat_frame(48, 64, 10)]);
        let landscape = clip_with(vec![flat_frame(48, 64, 10).rotate90_cw()]);
        let mut backend = face_backend("stub").unwrap();
        let a = fingerprint_clip(&portrait, backend.as_mut(), 1).unwrap();
        let b = fingerprint_clip(&landscape, backend.as_mut(), 1).unwrap();
        assert_eq!(a, b);
    }
}
