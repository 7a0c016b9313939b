//! FFmpeg-backed container codec.
//!
//! Handles every container/codec libav knows: decode to BGR frames, probe
//! container tags, stream-copy remux with rewritten tags, and re-encode for
//! watermark emission. Re-encoding drops audio; tag rewriting does not
//! (it stream-copies every audio/video/subtitle stream).
//!
//! libav works on paths, so byte streams pass through request-scoped scratch
//! files that are deleted on every exit path.

use anyhow::{anyhow, Context as _, Result};
use ffmpeg_next as ffmpeg;
use std::collections::BTreeMap;
use std::io::Write;

use super::{Frame, VideoClip};

fn init() -> Result<()> {
    ffmpeg::init().context("initialize ffmpeg")?;
    Ok(())
}

fn scratch_file(bytes: &[u8], suffix: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("deepmark-")
        .suffix(suffix)
        .tempfile()
        .context("create scratch media file")?;
    file.write_all(bytes).context("write scratch media file")?;
    file.flush()?;
    Ok(file)
}

/// Container tags + probed format name (full comma list, e.g.
/// "mov,mp4,m4a,3gp,3g2,mj2").
pub(crate) fn probe(bytes: &[u8]) -> Result<(BTreeMap<String, String>, String)> {
    init()?;
    let input = scratch_file(bytes, ".bin")?;
    let ictx = ffmpeg::format::input(&input.path())
        .context("open media stream with ffmpeg")?;
    let format_name = ictx.format().name().to_string();
    let tags = ictx
        .metadata()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok((tags, format_name))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<VideoClip> {
    init()?;
    let input = scratch_file(bytes, ".bin")?;
    let mut ictx = ffmpeg::format::input(&input.path())
        .context("open media stream with ffmpeg")?;

    let format_name = ictx.format().name().to_string();
    let tags: BTreeMap<String, String> = ictx
        .metadata()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let (stream_index, fps, mut decoder) = {
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("media has no video track"))?;
        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() > 0 && rate.numerator() > 0 {
            (rate.numerator() as f64 / rate.denominator() as f64).round() as u32
        } else {
            30
        };
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        (stream.index(), fps.max(1), decoder)
    };

    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::util::format::pixel::Pixel::BGR24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .context("create ffmpeg scaler")?;

    let mut frames = Vec::new();
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder
            .send_packet(&packet)
            .context("send packet to ffmpeg decoder")?;
        drain_decoder(&mut decoder, &mut scaler, &mut frames)?;
    }
    decoder.send_eof().context("flush ffmpeg decoder")?;
    drain_decoder(&mut decoder, &mut scaler, &mut frames)?;

    if frames.is_empty() {
        return Err(anyhow!("media decoded to zero frames"));
    }

    Ok(VideoClip {
        frames,
        fps,
        tags,
        format_name,
    })
}

fn drain_decoder(
    decoder: &mut ffmpeg::decoder::Video,
    scaler: &mut ffmpeg::software::scaling::Context,
    frames: &mut Vec<Frame>,
) -> Result<()> {
    let mut decoded = ffmpeg::frame::Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let mut bgr = ffmpeg::frame::Video::empty();
        scaler.run(&decoded, &mut bgr).context("scale frame to BGR")?;
        frames.push(frame_to_bgr(&bgr)?);
    }
    Ok(())
}

fn frame_to_bgr(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        return Frame::new(data.to_vec(), width, height);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Frame::new(pixels, width, height)
}

/// Stream-copy remux with a rewritten global tag map.
pub(crate) fn remux_with_tags(
    bytes: &[u8],
    tags: BTreeMap<String, String>,
) -> Result<Vec<u8>> {
    init()?;
    let input = scratch_file(bytes, ".bin")?;
    let mut ictx = ffmpeg::format::input(&input.path())
        .context("open media stream with ffmpeg")?;

    let suffix = container_suffix(ictx.format().name());
    let output = tempfile::Builder::new()
        .prefix("deepmark-")
        .suffix(&suffix)
        .tempfile()
        .context("create scratch output file")?;
    let mut octx = ffmpeg::format::output(&output.path())
        .context("open ffmpeg output")?;

    let mut stream_mapping = vec![-1i32; ictx.nb_streams() as usize];
    let mut ist_time_bases = vec![ffmpeg::Rational(0, 1); ictx.nb_streams() as usize];
    let mut ost_index = 0i32;
    for (ist_index, ist) in ictx.streams().enumerate() {
        let medium = ist.parameters().medium();
        if medium != ffmpeg::media::Type::Video
            && medium != ffmpeg::media::Type::Audio
            && medium != ffmpeg::media::Type::Subtitle
        {
            continue;
        }
        stream_mapping[ist_index] = ost_index;
        ist_time_bases[ist_index] = ist.time_base();
        ost_index += 1;
        let mut ost = octx.add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))?;
        ost.set_parameters(ist.parameters());
        // codec_tag from the source container may be invalid in the target
        unsafe {
            (*ost.parameters().as_mut_ptr()).codec_tag = 0;
        }
    }

    let mut dict = ffmpeg::Dictionary::new();
    for (k, v) in &tags {
        dict.set(k, v);
    }
    octx.set_metadata(dict);
    octx.write_header().context("write container header")?;

    for (stream, mut packet) in ictx.packets() {
        let ist_index = stream.index();
        let ost_index = stream_mapping[ist_index];
        if ost_index < 0 {
            continue;
        }
        let ost = octx
            .stream(ost_index as usize)
            .ok_or_else(|| anyhow!("output stream vanished"))?;
        packet.rescale_ts(ist_time_bases[ist_index], ost.time_base());
        packet.set_position(-1);
        packet.set_stream(ost_index as usize);
        packet
            .write_interleaved(&mut octx)
            .context("write stream-copied packet")?;
    }
    octx.write_trailer().context("write container trailer")?;

    std::fs::read(output.path()).context("read remuxed output")
}

/// Re-encode a clip (MPEG-4 video, no audio), carrying the clip's tag map.
pub(crate) fn encode(clip: &VideoClip) -> Result<Vec<u8>> {
    init()?;
    let first = clip
        .frames
        .first()
        .ok_or_else(|| anyhow!("refusing to encode a clip with no frames"))?;
    let width = first.width();
    let height = first.height();
    let fps = clip.fps.max(1) as i32;

    let suffix = container_suffix(&clip.format_name);
    let output = tempfile::Builder::new()
        .prefix("deepmark-")
        .suffix(&suffix)
        .tempfile()
        .context("create scratch output file")?;
    let mut octx = ffmpeg::format::output(&output.path())
        .context("open ffmpeg output")?;

    let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
        .ok_or_else(|| anyhow!("mpeg4 encoder unavailable"))?;
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

    let (ost_index, mut encoder) = {
        let mut ost = octx.add_stream(codec)?;
        let mut encoder = ffmpeg::codec::context::Context::from_parameters(ost.parameters())
            .context("create mpeg4 encoder context")?
            .encoder()
            .video()
            .context("open mpeg4 video encoder")?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ffmpeg::util::format::pixel::Pixel::YUV420P);
        encoder.set_time_base(ffmpeg::Rational(1, fps));
        encoder.set_frame_rate(Some(ffmpeg::Rational(fps, 1)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open mpeg4 encoder")?;
        ost.set_parameters(&encoder);
        (ost.index(), encoder)
    };

    let mut dict = ffmpeg::Dictionary::new();
    for (k, v) in &clip.tags {
        dict.set(k, v);
    }
    octx.set_metadata(dict);
    octx.write_header().context("write container header")?;

    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        ffmpeg::util::format::pixel::Pixel::BGR24,
        width,
        height,
        ffmpeg::util::format::pixel::Pixel::YUV420P,
        width,
        height,
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .context("create ffmpeg scaler")?;

    let ost_time_base = octx
        .stream(ost_index)
        .ok_or_else(|| anyhow!("output stream vanished"))?
        .time_base();

    for (pts, frame) in clip.frames.iter().enumerate() {
        if frame.width() != width || frame.height() != height {
            return Err(anyhow!("all frames must share dimensions"));
        }
        let mut src = ffmpeg::frame::Video::new(
            ffmpeg::util::format::pixel::Pixel::BGR24,
            width,
            height,
        );
        fill_bgr_plane(&mut src, frame)?;
        let mut dst = ffmpeg::frame::Video::empty();
        scaler.run(&src, &mut dst).context("scale frame to YUV420P")?;
        dst.set_pts(Some(pts as i64));
        encoder.send_frame(&dst).context("send frame to encoder")?;
        drain_encoder(&mut encoder, &mut octx, ost_index, fps, ost_time_base)?;
    }
    encoder.send_eof().context("flush encoder")?;
    drain_encoder(&mut encoder, &mut octx, ost_index, fps, ost_time_base)?;
    octx.write_trailer().context("write container trailer")?;

    std::fs::read(output.path()).context("read encoded output")
}

fn drain_encoder(
    encoder: &mut ffmpeg::encoder::video::Encoder,
    octx: &mut ffmpeg::format::context::Output,
    ost_index: usize,
    fps: i32,
    ost_time_base: ffmpeg::Rational,
) -> Result<()> {
    let mut packet = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(ost_index);
        packet.rescale_ts(ffmpeg::Rational(1, fps), ost_time_base);
        packet
            .write_interleaved(octx)
            .context("write encoded packet")?;
    }
    Ok(())
}

fn fill_bgr_plane(dst: &mut ffmpeg::frame::Video, src: &Frame) -> Result<()> {
    let width = src.width() as usize;
    let height = src.height() as usize;
    let row_bytes = width * 3;
    let stride = dst.stride(0) as usize;
    let data = dst.data_mut(0);
    for row in 0..height {
        let from = &src.data()[row * row_bytes..(row + 1) * row_bytes];
        let to = data
            .get_mut(row * stride..row * stride + row_bytes)
            .ok_or_else(|| anyhow!("encoder frame plane is too small"))?;
        to.copy_from_slice(from);
    }
    Ok(())
}

/// Pick a scratch-file suffix for the primary format token so libav infers
/// the right muxer.
fn container_suffix(format_name: &str) -> String {
    let primary = format_name.split(',').next().unwrap_or("mp4").trim();
    match primary {
        "" | "mov" | "mp4" | "m4a" | "3gp" | "3g2" | "mj2" => ".mp4".to_string(),
        other => format!(".{}", other),
    }
}
