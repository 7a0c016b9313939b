//! Container-level provenance stamps.
//!
//! One read/write pair over both media kinds. Image stamps live in the EXIF
//! `UserComment` as JSON under a `deepmark` key; video stamps live in the
//! container's global `copyright` tag. Either way the value is the
//! two-token payload from [`payload::StampPayload`].

use anyhow::Result;
use serde_json::{Map, Value};

use crate::media::codec;
use crate::MediaType;

pub mod exif;
pub mod payload;

pub use payload::StampPayload;

/// Structured provenance read back from a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stamp {
    /// The `deepmark` object from the image EXIF.
    Image { deepmark: Map<String, Value> },
    /// The raw `copyright` tag from the video container.
    Video { copyright: String },
    /// No stamp, or a stamp too malformed to read.
    Absent,
}

impl Stamp {
    /// Decode the two-token payload, if this stamp carries a well-formed one.
    pub fn payload(&self) -> Option<StampPayload> {
        match self {
            Stamp::Image { deepmark } => {
                let value = deepmark.get("copyright")?.as_str()?;
                StampPayload::decode_image(value)
            }
            Stamp::Video { copyright } => StampPayload::decode_video(copyright),
            Stamp::Absent => None,
        }
    }
}

/// Read the provenance stamp out of a media blob. Malformed metadata reads
/// as [`Stamp::Absent`]; only infrastructure failures (an unreadable video
/// container) surface as errors.
pub fn read_stamp(media_type: MediaType, bytes: &[u8]) -> Result<Stamp> {
    match media_type {
        MediaType::Image => Ok(read_image_stamp(bytes)),
        MediaType::Video => read_video_stamp(bytes),
    }
}

/// Write a payload into a media blob, returning the stamped bytes.
pub fn write_stamp(
    media_type: MediaType,
    bytes: &[u8],
    payload: &StampPayload,
) -> Result<Vec<u8>> {
    match media_type {
        MediaType::Image => write_image_stamp(bytes, payload),
        MediaType::Video => write_video_stamp(bytes, payload),
    }
}

fn read_image_stamp(bytes: &[u8]) -> Stamp {
    let Some(comment) = exif::read_user_comment(bytes) else {
        return Stamp::Absent;
    };
    let text = comment
        .strip_prefix(exif::ASCII_PREFIX.as_slice())
        .unwrap_or(&comment);
    let Ok(text) = std::str::from_utf8(text) else {
        return Stamp::Absent;
    };
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text.trim()) else {
        return Stamp::Absent;
    };
    match object.get("deepmark") {
        Some(Value::Object(deepmark)) => Stamp::Image {
            deepmark: deepmark.clone(),
        },
        _ => Stamp::Absent,
    }
}

fn write_image_stamp(bytes: &[u8], payload: &StampPayload) -> Result<Vec<u8>> {
    let mut deepmark = Map::new();
    deepmark.insert(
        "copyright".to_string(),
        Value::String(payload.encode_image()),
    );
    let mut wrapper = Map::new();
    wrapper.insert("deepmark".to_string(), Value::Object(deepmark));

    let mut comment = exif::ASCII_PREFIX.to_vec();
    comment.extend_from_slice(serde_json::to_string(&Value::Object(wrapper))?.as_bytes());
    exif::write_user_comment(bytes, &comment)
}

fn read_video_stamp(bytes: &[u8]) -> Result<Stamp> {
    let (tags, _format_name) = codec::probe_tags(bytes)?;
    match tags.get("copyright") {
        Some(copyright) => Ok(Stamp::Video {
            copyright: copyright.clone(),
        }),
        None => Ok(Stamp::Absent),
    }
}

fn write_video_stamp(bytes: &[u8], payload: &StampPayload) -> Result<Vec<u8>> {
    let (existing, _format_name) = codec::probe_tags(bytes)?;
    // merge, dropping the transcoder's own tag
    let mut merged = existing;
    merged.remove("encoder");
    merged.insert("copyright".to_string(), payload.encode_video());
    codec::remux_with_tags(bytes, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{raw, Frame, VideoClip};
    use std::collections::BTreeMap;

    fn sample_payload() -> StampPayload {
        StampPayload::new("UserTok=".to_string(), "MasterTok=".to_string())
    }

    fn sample_video(tags: BTreeMap<String, String>) -> Vec<u8> {
        let clip = VideoClip {
            frames: vec![Frame::new(vec![50u8; 48], 4, 4).unwrap()],
            fps: 30,
            tags,
            format_name: raw::FORMAT_NAME.to_string(),
        };
        raw::encode(&clip).unwrap()
    }

    fn bare_jpeg() -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        let app0: &[u8] = b"JFIF\0\x01\x02\x00\x00\x01\x00\x01\x00\x00";
        out.extend_from_slice(&[0xFF, 0xE0]);
        out.extend_from_slice(&((app0.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(app0);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    #[test]
    fn video_stamp_round_trips() {
        let stamped =
            write_stamp(MediaType::Video, &sample_video(BTreeMap::new()), &sample_payload())
                .unwrap();
        let stamp = read_stamp(MediaType::Video, &stamped).unwrap();
        assert_eq!(
            stamp,
            Stamp::Video {
                copyright: "deepmarkUserTok=MasterTok=".to_string()
            }
        );
        assert_eq!(stamp.payload(), Some(sample_payload()));
    }

    #[test]
    fn image_stamp_round_trips() {
        let stamped =
            write_stamp(MediaType::Image, &bare_jpeg(), &sample_payload()).unwrap();
        let stamp = read_stamp(MediaType::Image, &stamped).unwrap();
        let Stamp::Image { deepmark } = &stamp else {
            panic!("expected an image stamp, got {:?}", stamp);
        };
        assert_eq!(
            deepmark.get("copyright").and_then(Value::as_str),
            Some("sUserTok=MasterTok=")
        );
        assert_eq!(stamp.payload(), Some(sample_payload()));
    }

    #[test]
    fn unstamped_media_reads_absent() {
        assert_eq!(
            read_stamp(MediaType::Image, &bare_jpeg()).unwrap(),
            Stamp::Absent
        );
        assert_eq!(
            read_stamp(MediaType::Video, &sample_video(BTreeMap::new())).unwrap(),
            Stamp::Absent
        );
    }

    #[test]
    fn video_write_merges_and_drops_encoder() {
        let mut tags = BTreeMap::new();
        tags.insert("encoder".to_string(), "somelib 1.2".to_string());
        tags.insert("title".to_string(), "holiday".to_string());
        let stamped =
            write_stamp(MediaType::Video, &sample_video(tags), &sample_payload()).unwrap();
        let (read_back, _) = codec::probe_tags(&stamped).unwrap();
        assert_eq!(read_back.get("title").map(String::as_str), Some("holiday"));
        assert!(read_back.get("encoder").is_none());
        assert!(read_back.get("copyright").unwrap().starts_with("deepmark"));
    }

    #[test]
    fn restamping_keeps_exactly_two_tokens() {
        let video = sample_video(BTreeMap::new());
        let once = write_stamp(MediaType::Video, &video, &sample_payload()).unwrap();
        let other = StampPayload::new("NewUser=".to_string(), "NewMaster=".to_string());
        let twice = write_stamp(MediaType::Video, &once, &other).unwrap();
        let stamp = read_stamp(MediaType::Video, &twice).unwrap();
        assert_eq!(stamp.payload(), Some(other));
    }

    #[test]
    fn malformed_copyright_has_no_payload() {
        let mut tags = BTreeMap::new();
        tags.insert("copyright".to_string(), "deepmarkonly-one-token=".to_string());
        let stamp = read_stamp(MediaType::Video, &sample_video(tags)).unwrap();
        assert!(matches!(stamp, Stamp::Video { .. }));
        assert_eq!(stamp.payload(), None);
    }
}
