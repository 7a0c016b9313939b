//! Container codec dispatch.
//!
//! The `dmkv` planar container is sniffed by magic and handled in-tree.
//! Everything else needs the ffmpeg backend (`codec-ffmpeg` feature).

use anyhow::Result;
use std::collections::BTreeMap;

use super::{raw, VideoClip};

/// Decode a video byte stream into frames + tags.
pub fn decode(bytes: &[u8]) -> Result<VideoClip> {
    if raw::sniff(bytes) {
        return raw::decode(bytes);
    }
    #[cfg(feature = "codec-ffmpeg")]
    {
        super::ffmpeg::decode(bytes)
    }
    #[cfg(not(feature = "codec-ffmpeg"))]
    {
        anyhow::bail!("unrecognized video container (build with codec-ffmpeg for real-world formats)")
    }
}

/// Re-emit a clip in its source container family.
pub fn encode(clip: &VideoClip) -> Result<Vec<u8>> {
    if clip.format_name == raw::FORMAT_NAME {
        return raw::encode(clip);
    }
    #[cfg(feature = "codec-ffmpeg")]
    {
        super::ffmpeg::encode(clip)
    }
    #[cfg(not(feature = "codec-ffmpeg"))]
    {
        anyhow::bail!(
            "cannot encode container '{}' (build with codec-ffmpeg)",
            clip.format_name
        )
    }
}

/// Read container-level tags and the probed format name without decoding
/// frame data.
pub fn probe_tags(bytes: &[u8]) -> Result<(BTreeMap<String, String>, String)> {
    if raw::sniff(bytes) {
        return Ok((raw::probe_tags(bytes)?, raw::FORMAT_NAME.to_string()));
    }
    #[cfg(feature = "codec-ffmpeg")]
    {
        super::ffmpeg::probe(bytes)
    }
    #[cfg(not(feature = "codec-ffmpeg"))]
    {
        anyhow::bail!("unrecognized video container (build with codec-ffmpeg for real-world formats)")
    }
}

/// Rewrite container-level tags, stream-copying media data.
pub fn remux_with_tags(bytes: &[u8], tags: BTreeMap<String, String>) -> Result<Vec<u8>> {
    if raw::sniff(bytes) {
        let mut clip = raw::decode(bytes)?;
        clip.tags = tags;
        return raw::encode(&clip);
    }
    #[cfg(feature = "codec-ffmpeg")]
    {
        super::ffmpeg::remux_with_tags(bytes, tags)
    }
    #[cfg(not(feature = "codec-ffmpeg"))]
    {
        anyhow::bail!("unrecognized video container (build with codec-ffmpeg for real-world formats)")
    }
}
