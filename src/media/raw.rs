//! Planar capture container (`dmkv`).
//!
//! A deliberately simple, lossless, deterministic container: fixed-size
//! header, JSON tag map, then raw BGR frames. Fixtures and constrained
//! deployments use it directly; real-world containers go through the
//! ffmpeg codec (`codec-ffmpeg` feature). Byte-identical clips encode to
//! byte-identical streams, which the fingerprint determinism tests rely on.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

use super::{Frame, VideoClip};

pub const FORMAT_NAME: &str = "dmkv";

const MAGIC: &[u8; 4] = b"DMKV";
const VERSION: u8 = 1;

pub fn sniff(bytes: &[u8]) -> bool {
    bytes.len() > MAGIC.len() && &bytes[..4] == MAGIC
}

pub fn encode(clip: &VideoClip) -> Result<Vec<u8>> {
    let (width, height) = match clip.frames.first() {
        Some(frame) => (frame.width(), frame.height()),
        None => return Err(anyhow!("refusing to encode a clip with no frames")),
    };
    for frame in &clip.frames {
        if frame.width() != width || frame.height() != height {
            return Err(anyhow!(
                "all frames must share dimensions: {}x{} vs {}x{}",
                width,
                height,
                frame.width(),
                frame.height()
            ));
        }
    }

    let tags_json = serde_json::to_vec(&clip.tags)?;

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&clip.fps.to_le_bytes());
    out.extend_from_slice(&(clip.frames.len() as u32).to_le_bytes());
    out.extend_from_slice(&(tags_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&tags_json);
    for frame in &clip.frames {
        out.extend_from_slice(frame.data());
    }
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<VideoClip> {
    let (width, height, fps, frame_count, tags, mut cursor) = decode_header(bytes)?;

    let frame_len = width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("dmkv frame dimensions overflow"))? as usize;

    let mut frames = Vec::with_capacity(frame_count as usize);
    for _ in 0..frame_count {
        let data = read_slice(bytes, &mut cursor, frame_len)?.to_vec();
        frames.push(Frame::new(data, width, height)?);
    }
    if cursor != bytes.len() {
        return Err(anyhow!("dmkv stream has trailing bytes"));
    }

    Ok(VideoClip {
        frames,
        fps,
        tags,
        format_name: FORMAT_NAME.to_string(),
    })
}

/// Read the tag map without touching frame data.
pub fn probe_tags(bytes: &[u8]) -> Result<BTreeMap<String, String>> {
    let (_, _, _, _, tags, _) = decode_header(bytes)?;
    Ok(tags)
}

type Header = (u32, u32, u32, u32, BTreeMap<String, String>, usize);

fn decode_header(bytes: &[u8]) -> Result<Header> {
    let mut cursor = 0usize;
    let magic = read_slice(bytes, &mut cursor, 4)?;
    if magic != MAGIC {
        return Err(anyhow!("not a dmkv stream"));
    }
    let version = read_slice(bytes, &mut cursor, 1)?[0];
    if version != VERSION {
        return Err(anyhow!("unsupported dmkv version {}", version));
    }
    let width = read_u32(bytes, &mut cursor)?;
    let height = read_u32(bytes, &mut cursor)?;
    let fps = read_u32(bytes, &mut cursor)?;
    let frame_count = read_u32(bytes, &mut cursor)?;
    let tags_len = read_u32(bytes, &mut cursor)? as usize;
    let tags_json = read_slice(bytes, &mut cursor, tags_len)?;
    let tags: BTreeMap<String, String> = serde_json::from_slice(tags_json)
        .map_err(|_| anyhow!("dmkv tag map is not valid JSON"))?;
    Ok((width, height, fps, frame_count, tags, cursor))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    if cursor.checked_add(len).map_or(true, |end| end > bytes.len()) {
        return Err(anyhow!("truncated dmkv stream"));
    }
    let out = &bytes[*cursor..*cursor + len];
    *cursor += len;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_clip() -> VideoClip {
        let frames = (0..4u8)
            .map(|n| {
                let data: Vec<u8> = (0..2 * 2 * 3).map(|i| n.wrapping_mul(40).wrapping_add(i)).collect();
                Frame::new(data, 2, 2).unwrap()
            })
            .collect();
        let mut tags = BTreeMap::new();
        tags.insert("copyright".to_string(), "deepmark-test".to_string());
        VideoClip {
            frames,
            fps: 24,
            tags,
            format_name: FORMAT_NAME.to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_everything() {
        let clip = sample_clip();
        let bytes = encode(&clip).unwrap();
        assert!(sniff(&bytes));

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.fps, 24);
        assert_eq!(decoded.frame_count(), 4);
        assert_eq!(decoded.tags, clip.tags);
        assert_eq!(decoded.format_name, FORMAT_NAME);
        for (a, b) in clip.frames.iter().zip(&decoded.frames) {
            assert_eq!(a.data(), b.data());
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let clip = sample_clip();
        assert_eq!(encode(&clip).unwrap(), encode(&clip).unwrap());
    }

    #[test]
    fn probe_reads_tags_only() {
        let bytes = encode(&sample_clip()).unwrap();
        let tags = probe_tags(&bytes).unwrap();
        assert_eq!(tags.get("copyright").map(String::as_str), Some("deepmark-test"));
    }

    #[test]
    fn truncated_streams_are_rejected() {
        let bytes = encode(&sample_clip()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode(&bytes[..10]).is_err());
        assert!(decode(b"not a clip").is_err());
    }

    #[test]
    fn empty_clip_is_rejected() {
        let clip = VideoClip {
            frames: vec![],
            fps: 30,
            tags: BTreeMap::new(),
            format_name: FORMAT_NAME.to_string(),
        };
        assert!(encode(&clip).is_err());
    }
}
