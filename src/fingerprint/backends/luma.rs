//! Luminance-projection face finder.
//!
//! A deterministic stand-in detector for deployments without a landmark
//! model: finds the dominant bright blob by row/column projection and fits
//! the fixed landmark template into its bounding box. It is not a
//! biometric - the fingerprint only needs stable geometry per input, and
//! a real model drops in through the `FaceBackend` seam.

use anyhow::{anyhow, Result};

use super::landmarks_for_rect;
use crate::fingerprint::backend::FaceBackend;
use crate::fingerprint::{FaceRecord, FaceRect};

/// Luma lift over the frame mean that counts as "bright".
const THRESHOLD_LIFT: u8 = 24;

/// Minimum blob side length in pixels.
const MIN_SIDE: i64 = 16;

#[derive(Default)]
pub struct LumaBackend;

impl LumaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FaceBackend for LumaBackend {
    fn name(&self) -> &'static str {
        "luma"
    }

    fn detect(&mut self, luma: &[u8], width: u32, height: u32) -> Result<Vec<FaceRecord>> {
        let w = width as usize;
        let h = height as usize;
        if luma.len() != w * h {
            return Err(anyhow!(
                "luma plane length mismatch: expected {}, got {}",
                w * h,
                luma.len()
            ));
        }
        if w == 0 || h == 0 {
            return Ok(vec![]);
        }

        let mean = (luma.iter().map(|&v| v as u64).sum::<u64>() / (w * h) as u64) as u8;
        let threshold = mean.saturating_add(THRESHOLD_LIFT);
        if threshold == u8::MAX {
            return Ok(vec![]);
        }

        let mut row_counts = vec![0usize; h];
        let mut col_counts = vec![0usize; w];
        for (j, row) in luma.chunks_exact(w).enumerate() {
            for (i, &v) in row.iter().enumerate() {
                if v > threshold {
                    row_counts[j] += 1;
                    col_counts[i] += 1;
                }
            }
        }

        let Some((top, bottom)) = longest_run(&row_counts, w / 16) else {
            return Ok(vec![]);
        };
        let Some((left, right)) = longest_run(&col_counts, h / 16) else {
            return Ok(vec![]);
        };

        let rect = FaceRect::new(top as i64, right as i64, bottom as i64, left as i64);
        if rect.width() < MIN_SIDE || rect.height() < MIN_SIDE {
            return Ok(vec![]);
        }

        Ok(vec![FaceRecord {
            landmarks: landmarks_for_rect(&rect),
            rect,
        }])
    }
}

/// Longest contiguous run of indices whose count clears the floor, returned
/// as a half-open-ish `(first, last)` pair of inclusive bounds.
fn longest_run(counts: &[usize], floor: usize) -> Option<(usize, usize)> {
    let floor = floor.max(1);
    let mut best: Option<(usize, usize)> = None;
    let mut start: Option<usize> = None;
    for (i, &count) in counts.iter().enumerate() {
        if count >= floor {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            extend_best(&mut best, s, i - 1);
        }
    }
    if let Some(s) = start {
        extend_best(&mut best, s, counts.len() - 1);
    }
    best
}

fn extend_best(best: &mut Option<(usize, usize)>, start: usize, end: usize) {
    let len = end - start + 1;
    let current = best.map(|(s, e)| e - s + 1).unwrap_or(0);
    if len > current {
        *best = Some((start, end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_with_patch(
        w: usize,
        h: usize,
        base: u8,
        patch: u8,
        (top, left, bottom, right): (usize, usize, usize, usize),
    ) -> Vec<u8> {
        let mut luma = vec![base; w * h];
        for j in top..=bottom {
            for i in left..=right {
                luma[j * w + i] = patch;
            }
        }
        luma
    }

    #[test]
    fn flat_plane_has_no_faces() {
        let mut backend = LumaBackend::new();
        let faces = backend.detect(&vec![80u8; 64 * 48], 64, 48).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn bright_patch_is_boxed() {
        let mut backend = LumaBackend::new();
        let luma = plane_with_patch(64, 64, 40, 220, (10, 12, 40, 44));
        let faces = backend.detect(&luma, 64, 64).unwrap();
        assert_eq!(faces.len(), 1);
        let rect = &faces[0].rect;
        assert_eq!((rect.top, rect.left, rect.bottom, rect.right), (10, 12, 40, 44));
        assert_eq!(faces[0].landmarks.len(), 9);
    }

    #[test]
    fn tiny_blobs_are_ignored() {
        let mut backend = LumaBackend::new();
        let luma = plane_with_patch(64, 64, 40, 220, (10, 10, 14, 14));
        assert!(backend.detect(&luma, 64, 64).unwrap().is_empty());
    }

    #[test]
    fn detection_is_deterministic() {
        let luma = plane_with_patch(64, 64, 40, 220, (8, 8, 40, 40));
        let mut a = LumaBackend::new();
        let mut b = LumaBackend::new();
        assert_eq!(
            a.detect(&luma, 64, 64).unwrap(),
            b.detect(&luma, 64, 64).unwrap()
        );
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let mut backend = LumaBackend::new();
        assert!(backend.detect(&[0u8; 10], 4, 4).is_err());
    }
}
