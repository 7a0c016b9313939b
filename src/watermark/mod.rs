//! Blind frequency-domain watermark.
//!
//! The 16-character provenance id rides in the LL2 band of a two-level Haar
//! decomposition of the luminance plane, one bit per coefficient: +α·|v| for
//! a one, −α·|v| for a zero. Every m-th frame carries the full payload, so
//! recovery is a majority vote across sampled frames and survives losing
//! almost half of the carriers.
//!
//! The channel is deliberately keyless - anyone can read it. What protects
//! the platform is the collision with the provenance store, not secrecy of
//! the mark; confidentiality lives in the metadata stamp instead.

use anyhow::Result;
use std::collections::HashMap;

use crate::media::{Frame, VideoClip};

pub mod dwt;
pub mod threshold;

use dwt::{dwt2, idwt2, Plane};
use threshold::adaptive_threshold;

/// Default carrier stride: every 15th frame.
pub const DEFAULT_STRIDE: usize = 15;
/// Default embedding strength.
pub const DEFAULT_ALPHA: f64 = 1.0;
/// Payload length in characters (128 bits).
pub const PAYLOAD_LEN: usize = 16;

/// Bit i lands at LL2[4 + i/32][4 + i%32].
const BIT_ROW0: usize = 4;
const BIT_COL0: usize = 4;
const BITS_PER_ROW: usize = 32;

/// Extraction scans this LL2 window row-major.
const SCAN_ROWS: std::ops::Range<usize> = 4..20;
const SCAN_COLS: std::ops::Range<usize> = 4..36;

/// Frames whose LL2 is flatter than this carry no signal.
const FLATNESS_FLOOR: f64 = 0.5;

/// Candidates shorter than this are thresholding noise.
const MIN_RECOVERED: usize = 9;
const MIN_CANDIDATES: usize = 3;
const MIN_AGREEMENT: usize = 2;

#[derive(Clone, Copy, Debug)]
pub struct WatermarkParams {
    pub stride: usize,
    pub alpha: f64,
}

impl Default for WatermarkParams {
    fn default() -> Self {
        Self {
            stride: DEFAULT_STRIDE,
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// Outcome of a blind extraction pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatermarkReadout {
    /// No watermark signal found.
    Absent,
    /// A full payload recovered by majority vote.
    Id(String),
    /// Frames agree on a damaged (truncated) payload: the carrier was
    /// present but the video has been tampered with.
    Manipulated,
}

/// Embed `id` into every m-th frame in place. Frames too small to hold the
/// payload pass through unchanged.
pub fn embed_clip(clip: &mut VideoClip, id: &str, params: &WatermarkParams) -> Result<()> {
    let bits = id_bits(id);
    let stride = params.stride.max(1);
    for (idx, frame) in clip.frames.iter_mut().enumerate() {
        if idx % stride != 0 {
            continue;
        }
        *frame = embed_frame(frame, &bits, params.alpha)?;
    }
    Ok(())
}

/// Blind extraction over every m-th frame.
pub fn extract_clip(clip: &VideoClip, params: &WatermarkParams) -> WatermarkReadout {
    let stride = params.stride.max(1);
    let mut candidates = Vec::new();
    for (idx, frame) in clip.frames.iter().enumerate() {
        if idx % stride != 0 {
            continue;
        }
        if let Some(recovered) = extract_frame(frame) {
            if recovered.len() >= MIN_RECOVERED {
                let cut = recovered.len().min(PAYLOAD_LEN);
                candidates.push(recovered[..cut].to_string());
            }
        }
    }
    vote(candidates)
}

/// Majority vote over per-frame candidates.
fn vote(candidates: Vec<String>) -> WatermarkReadout {
    if candidates.len() < MIN_CANDIDATES {
        return WatermarkReadout::Absent;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for candidate in &candidates {
        *counts.entry(candidate.as_str()).or_insert(0) += 1;
    }
    // first candidate reaching the top count wins (stable under ties)
    let top = counts.values().copied().max().unwrap_or(0);
    if top < MIN_AGREEMENT {
        return WatermarkReadout::Absent;
    }
    let winner = candidates
        .iter()
        .find(|c| counts[c.as_str()] == top)
        .expect("top count came from candidates");
    if winner.len() < PAYLOAD_LEN {
        WatermarkReadout::Manipulated
    } else {
        WatermarkReadout::Id(winner.clone())
    }
}

/// MSB-first bit expansion, one byte per character.
fn id_bits(id: &str) -> Vec<bool> {
    let mut bits = Vec::with_capacity(id.len() * 8);
    for c in id.chars() {
        let code = c as u32;
        if code > 255 {
            continue;
        }
        for shift in (0..8).rev() {
            bits.push((code >> shift) & 1 == 1);
        }
    }
    bits
}

fn embed_frame(frame: &Frame, bits: &[bool], alpha: f64) -> Result<Frame> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;

    let mut yuv = frame.to_yuv();
    let y = Plane::from_u8(&yuv.y, width, height);
    let mut level1 = dwt2(&y);
    let mut level2 = dwt2(&level1.ll);

    let (w2, h2) = (level2.ll.width(), level2.ll.height());
    if w2 * h2 < bits.len() {
        // not enough coefficients for the payload
        return Ok(frame.clone());
    }

    for (i, bit) in bits.iter().enumerate() {
        let row = BIT_ROW0 + i / BITS_PER_ROW;
        let col = BIT_COL0 + i % BITS_PER_ROW;
        if row < h2 && col < w2 {
            let v = level2.ll.get(row, col);
            let delta = alpha * v.abs();
            level2.ll.set(row, col, if *bit { v + delta } else { v - delta });
        }
    }

    level1.replace_ll(idwt2(&level2));
    let rebuilt = idwt2(&level1);
    yuv.y = rebuilt.to_u8_clipped();
    Ok(yuv.to_bgr())
}

fn extract_frame(frame: &Frame) -> Option<String> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;

    let y = Plane::from_u8(&frame.luma(), width, height);
    let level2 = dwt2(&dwt2(&y).ll);
    if level2.ll.std() < FLATNESS_FLOOR {
        return None;
    }

    let (w2, h2) = (level2.ll.width(), level2.ll.height());
    // 8-bit view with wrap-around (truncate, then mod 256)
    let wrapped: Vec<u8> = level2
        .ll
        .data()
        .iter()
        .map(|&v| (v as i64).rem_euclid(256) as u8)
        .collect();
    let mask = adaptive_threshold(&wrapped, w2, h2, 11, 2.0);

    let mut bits = Vec::new();
    for row in SCAN_ROWS {
        for col in SCAN_COLS {
            if row < h2 && col < w2 {
                bits.push(mask[row * w2 + col]);
            }
        }
    }

    let mut recovered = String::new();
    for chunk in bits.chunks(8) {
        if chunk.len() < 8 {
            break;
        }
        let byte = chunk.iter().fold(0u8, |acc, &b| (acc << 1) | b as u8);
        if (32..=126).contains(&byte) {
            recovered.push(byte as char);
        }
    }
    if recovered.is_empty() {
        None
    } else {
        Some(recovered)
    }
}
