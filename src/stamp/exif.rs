//! JPEG EXIF `UserComment` access.
//!
//! Reading goes through the exif parser and tolerates arbitrary camera
//! output. Writing splices a fresh APP1 segment (minimal little-endian
//! TIFF: IFD0 -> Exif IFD -> UserComment) directly after SOI, replacing any
//! existing Exif APP1; all other segments pass through byte-identical, so
//! the image stays decodable by anything that could decode it before.

use anyhow::{anyhow, Result};
use std::io::Cursor;

/// 8-byte encoding prefix of the EXIF UserComment value.
pub const ASCII_PREFIX: &[u8; 8] = b"ASCII\0\0\0";

const MARKER_SOI: u8 = 0xD8;
const MARKER_APP1: u8 = 0xE1;
const MARKER_SOS: u8 = 0xDA;

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_USER_COMMENT: u16 = 0x9286;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;

/// Raw UserComment bytes (prefix included), or `None` when the image has no
/// EXIF or no comment. Parser failures read as "no stamp" - a stamp that
/// cannot be parsed is absent by definition.
pub fn read_user_comment(jpeg: &[u8]) -> Option<Vec<u8>> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(jpeg))
        .ok()?;
    let field = exif.get_field(exif::Tag::UserComment, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Undefined(bytes, _) => Some(bytes.clone()),
        _ => None,
    }
}

/// Re-emit the JPEG with `UserComment` set to `comment` (caller includes the
/// encoding prefix).
pub fn write_user_comment(jpeg: &[u8], comment: &[u8]) -> Result<Vec<u8>> {
    let (segments, tail) = split_segments(jpeg)?;

    let app1 = build_exif_app1(comment)?;

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&[0xFF, MARKER_SOI]);
    out.extend_from_slice(&app1);
    for (marker, raw) in &segments {
        if *marker == MARKER_APP1 && is_exif_payload(raw) {
            continue;
        }
        out.extend_from_slice(&[0xFF, *marker]);
        let len = (raw.len() + 2) as u16;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(raw);
    }
    out.extend_from_slice(tail);
    Ok(out)
}

/// Header segments up to SOS (marker, payload without length bytes), plus
/// the verbatim tail from SOS onward.
fn split_segments(jpeg: &[u8]) -> Result<(Vec<(u8, &[u8])>, &[u8])> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != MARKER_SOI {
        return Err(anyhow!("not a JPEG stream"));
    }
    let mut segments = Vec::new();
    let mut cursor = 2usize;
    loop {
        if cursor == jpeg.len() {
            // header-only stream (no scan data)
            return Ok((segments, &jpeg[jpeg.len()..]));
        }
        if cursor + 2 > jpeg.len() || jpeg[cursor] != 0xFF {
            return Err(anyhow!("malformed JPEG segment structure"));
        }
        let marker = jpeg[cursor + 1];
        if marker == MARKER_SOS {
            return Ok((segments, &jpeg[cursor..]));
        }
        if marker == 0xD9 {
            // EOI with no scan: keep it as the tail
            return Ok((segments, &jpeg[cursor..]));
        }
        if cursor + 4 > jpeg.len() {
            return Err(anyhow!("truncated JPEG segment header"));
        }
        let len = u16::from_be_bytes([jpeg[cursor + 2], jpeg[cursor + 3]]) as usize;
        if len < 2 || cursor + 2 + len > jpeg.len() {
            return Err(anyhow!("truncated JPEG segment payload"));
        }
        segments.push((marker, &jpeg[cursor + 4..cursor + 2 + len]));
        cursor += 2 + len;
    }
}

fn is_exif_payload(payload: &[u8]) -> bool {
    payload.starts_with(b"Exif\0\0")
}

/// APP1 segment bytes (marker + length + payload) carrying a minimal EXIF
/// block with one UserComment entry.
fn build_exif_app1(comment: &[u8]) -> Result<Vec<u8>> {
    // TIFF layout, little-endian, all offsets from the TIFF header:
    //   0  header (8)
    //   8  IFD0: count + ExifIFD pointer + next (18)
    //  26  Exif IFD: count + UserComment + next (18)
    //  44  comment bytes (when longer than 4)
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    // IFD0
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&TAG_EXIF_IFD.to_le_bytes());
    tiff.extend_from_slice(&TYPE_LONG.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    // Exif IFD
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&TAG_USER_COMMENT.to_le_bytes());
    tiff.extend_from_slice(&TYPE_UNDEFINED.to_le_bytes());
    tiff.extend_from_slice(&(comment.len() as u32).to_le_bytes());
    if comment.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..comment.len()].copy_from_slice(comment);
        tiff.extend_from_slice(&inline);
    } else {
        tiff.extend_from_slice(&44u32.to_le_bytes());
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
    if comment.len() > 4 {
        tiff.extend_from_slice(comment);
    }

    let payload_len = 6 + tiff.len();
    let segment_len = payload_len + 2;
    if segment_len > u16::MAX as usize {
        return Err(anyhow!("EXIF payload too large for an APP1 segment"));
    }

    let mut out = Vec::with_capacity(4 + payload_len);
    out.extend_from_slice(&[0xFF, MARKER_APP1]);
    out.extend_from_slice(&(segment_len as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SOI + APP0(JFIF) + EOI: structurally a JPEG, no scan data.
    fn bare_jpeg() -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        let app0: &[u8] = b"JFIF\0\x01\x02\x00\x00\x01\x00\x01\x00\x00";
        out.extend_from_slice(&[0xFF, 0xE0]);
        out.extend_from_slice(&((app0.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(app0);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn comment_with_prefix(text: &str) -> Vec<u8> {
        let mut out = ASCII_PREFIX.to_vec();
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn write_then_read_round_trips() {
        let comment = comment_with_prefix(r#"{"deepmark":{"copyright":"sA=B="}}"#);
        let stamped = write_user_comment(&bare_jpeg(), &comment).unwrap();
        assert_eq!(read_user_comment(&stamped), Some(comment));
    }

    #[test]
    fn rewriting_replaces_the_previous_comment() {
        let first = comment_with_prefix("first");
        let second = comment_with_prefix("second");
        let stamped = write_user_comment(&bare_jpeg(), &first).unwrap();
        let restamped = write_user_comment(&stamped, &second).unwrap();
        assert_eq!(read_user_comment(&restamped), Some(second));
        // only one Exif APP1 remains
        let (segments, _) = split_segments(&restamped).unwrap();
        let exif_count = segments
            .iter()
            .filter(|(m, p)| *m == MARKER_APP1 && is_exif_payload(p))
            .count();
        assert_eq!(exif_count, 1);
    }

    #[test]
    fn unstamped_jpeg_reads_none() {
        assert_eq!(read_user_comment(&bare_jpeg()), None);
    }

    #[test]
    fn non_jpeg_input_is_rejected() {
        assert!(write_user_comment(b"PNG not jpeg", b"x").is_err());
        assert_eq!(read_user_comment(b"PNG not jpeg"), None);
    }

    #[test]
    fn foreign_segments_survive_stamping() {
        let jpeg = bare_jpeg();
        let stamped = write_user_comment(&jpeg, &comment_with_prefix("x")).unwrap();
        let (segments, _) = split_segments(&stamped).unwrap();
        // JFIF APP0 still present after the new APP1
        assert!(segments.iter().any(|(m, p)| *m == 0xE0 && p.starts_with(b"JFIF")));
    }
}
