//! Frame substrate and container codecs.
//!
//! Decoded video lives in memory as a [`VideoClip`]: BGR frames plus the
//! container-level tag map. Codecs (`raw`, and `ffmpeg` behind the
//! `codec-ffmpeg` feature) move clips in and out of byte streams; everything
//! above this module works on pixels and tags only.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

pub mod codec;
#[cfg(feature = "codec-ffmpeg")]
pub(crate) mod ffmpeg;
pub mod raw;

/// One decoded frame, 8-bit BGR, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))? as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "BGR frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Portrait-captured frames are taller than wide.
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Rotate 90 degrees clockwise (portrait normalization).
    pub fn rotate90_cw(&self) -> Frame {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut out = vec![0u8; self.data.len()];
        // dst(i, j) = src(h - 1 - j, i); dst is h wide, w tall
        for i in 0..w {
            for j in 0..h {
                let src = ((h - 1 - j) * w + i) * 3;
                let dst = (i * h + j) * 3;
                out[dst..dst + 3].copy_from_slice(&self.data[src..src + 3]);
            }
        }
        Frame {
            data: out,
            width: self.height,
            height: self.width,
        }
    }

    /// Luminance plane (BT.601), one byte per pixel.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|bgr| {
                let b = bgr[0] as f64;
                let g = bgr[1] as f64;
                let r = bgr[2] as f64;
                clamp_u8(0.299 * r + 0.587 * g + 0.114 * b)
            })
            .collect()
    }

    /// Full planar YUV conversion (BT.601, 8-bit, 4:4:4).
    pub fn to_yuv(&self) -> YuvImage {
        let pixels = (self.width * self.height) as usize;
        let mut y = Vec::with_capacity(pixels);
        let mut u = Vec::with_capacity(pixels);
        let mut v = Vec::with_capacity(pixels);
        for bgr in self.data.chunks_exact(3) {
            let b = bgr[0] as f64;
            let g = bgr[1] as f64;
            let r = bgr[2] as f64;
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            y.push(clamp_u8(luma));
            u.push(clamp_u8(0.492 * (b - luma) + 128.0));
            v.push(clamp_u8(0.877 * (r - luma) + 128.0));
        }
        YuvImage {
            y,
            u,
            v,
            width: self.width,
            height: self.height,
        }
    }
}

/// Planar YUV image; the watermark codec rewrites the Y plane only.
pub struct YuvImage {
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl YuvImage {
    pub fn to_bgr(&self) -> Frame {
        let mut data = Vec::with_capacity(self.y.len() * 3);
        for i in 0..self.y.len() {
            let y = self.y[i] as f64;
            let u = self.u[i] as f64 - 128.0;
            let v = self.v[i] as f64 - 128.0;
            let r = y + 1.140 * v;
            let g = y - 0.395 * u - 0.581 * v;
            let b = y + 2.032 * u;
            data.push(clamp_u8(b));
            data.push(clamp_u8(g));
            data.push(clamp_u8(r));
        }
        Frame {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

/// A decoded video: frames, frame rate, container tags and the name of the
/// container they came from. Re-encoding preserves fps and resolution.
pub struct VideoClip {
    pub frames: Vec<Frame>,
    pub fps: u32,
    pub tags: BTreeMap<String, String>,
    pub format_name: String,
}

impl VideoClip {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn clamp_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(w: u32, h: u32, bgr: [u8; 3]) -> Frame {
        let data: Vec<u8> = (0..(w * h) as usize).flat_map(|_| bgr).collect();
        Frame::new(data, w, h).unwrap()
    }

    #[test]
    fn frame_length_is_checked() {
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::new(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn gray_survives_yuv_round_trip() {
        let frame = solid_frame(4, 2, [128, 128, 128]);
        let yuv = frame.to_yuv();
        assert!(yuv.y.iter().all(|&y| y == 128));
        assert!(yuv.u.iter().all(|&u| u == 128));
        assert!(yuv.v.iter().all(|&v| v == 128));
        assert_eq!(yuv.to_bgr(), frame);
    }

    #[test]
    fn color_round_trip_is_close() {
        let frame = solid_frame(2, 2, [40, 90, 200]);
        let back = frame.to_yuv().to_bgr();
        for (a, b) in frame.data().iter().zip(back.data()) {
            assert!((*a as i16 - *b as i16).abs() <= 2, "{} vs {}", a, b);
        }
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let mut data = Vec::new();
        for px in 0..6u8 {
            data.extend_from_slice(&[px, px, px]);
        }
        // 3 wide, 2 tall:
        //   0 1 2
        //   3 4 5
        let frame = Frame::new(data, 3, 2).unwrap();
        let rotated = frame.rotate90_cw();
        assert_eq!(rotated.width(), 2);
        assert_eq!(rotated.height(), 3);
        // clockwise:
        //   3 0
        //   4 1
        //   5 2
        let values: Vec<u8> = rotated.data().iter().step_by(3).copied().collect();
        assert_eq!(values, vec![3, 0, 4, 1, 5, 2]);
    }

    #[test]
    fn portrait_detection() {
        assert!(solid_frame(2, 4, [0, 0, 0]).is_portrait());
        assert!(!solid_frame(4, 2, [0, 0, 0]).is_portrait());
        assert!(!solid_frame(4, 4, [0, 0, 0]).is_portrait());
    }
}
