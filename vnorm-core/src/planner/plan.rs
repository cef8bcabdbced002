//! The stream walk of the planner: decides copy vs re-encode per stream and
//! assembles the map directives and per-output overrides of the main
//! toolchain command.

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::capabilities::Capabilities;
use crate::catalog::VideoCodec;
use crate::command::{MapDirective, StreamKind, StreamOverride, StreamSelector};
use crate::error::{Error, Result};
use crate::metadata::{sanitize_language, sanitize_title};
use crate::options::{MetadataStrippingMode, ProcessingOptions, ReencodeMode};
use crate::planner::pixels;
use crate::planner::validate::{AudioAnalysis, StreamsAnalysis, VideoAnalysis};
use crate::probe::{AudioStream, FileInfo, Stream, SubtitleStream, VideoStream};

pub(crate) const VIDEO_CRF_H264: u32 = 18;
pub(crate) const VIDEO_CRF_HEVC: u32 = 20;
pub(crate) const VIDEO_PRESET: &str = "medium";
pub(crate) const AAC_VBR_QUALITY: u32 = 5;
pub(crate) const AAC_VBR_CUTOFF_HZ: u32 = 20_000;
pub(crate) const AAC_BITRATE_PER_CHANNEL: u64 = 64_000;

/// Subtitle codecs the toolchain can convert into the one subtitle codec
/// the target container supports.
const TEXT_SUBTITLE_CODECS: [&str; 7] =
  ["mov_text", "subrip", "srt", "ass", "ssa", "webvtt", "text"];

/// A stream tracked for the re-encode-if-smaller measurement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeCheckEntry {
  /// Stream index in the source file.
  pub input_index: usize,
  /// Kind-relative index in the transcoded output.
  pub output_index: usize,
  /// Work-file extension for extracting the original stream.
  pub extension: &'static str,
  /// The original cannot be copied back into the target container.
  pub needs_reencode_for_mp4: bool,
  pub kind: StreamKind,
}

#[derive(Debug, Default)]
pub(crate) struct CommandPlan {
  pub maps: Vec<MapDirective>,
  pub overrides: Vec<StreamOverride>,
  pub map_metadata: Option<i32>,
  pub map_chapters: Option<i32>,
  pub size_checks: Vec<SizeCheckEntry>,
}

struct Decision {
  reencode: bool,
  /// True when keeping the original stream would break the output contract
  /// (as opposed to merely skipping an optional normalization).
  required: bool,
}

fn video_decision(
  analysis: &VideoAnalysis,
  options: &ProcessingOptions,
  compatible: bool,
) -> Decision {
  let in_result = analysis
    .codec
    .map_or(false, |c| options.result_video_codecs.contains(&c));
  let mp4_muxable = analysis.codec.map_or(false, VideoCodec::supports_mp4_muxing);
  let required = !in_result || !mp4_muxable || !compatible || analysis.nonstandard_pix_fmt;
  let mode = options.video_reencode_mode != ReencodeMode::AvoidReencoding;
  Decision {
    reencode: required || mode || analysis.optional_reencode(),
    required,
  }
}

fn audio_decision(
  analysis: &AudioAnalysis,
  options: &ProcessingOptions,
  compatible: bool,
) -> Decision {
  let in_result = analysis
    .codec
    .map_or(false, |c| options.result_audio_codecs.contains(&c));
  let mp4_muxable = analysis.codec.map_or(false, |c| c.supports_mp4_muxing());
  let required = !in_result || !mp4_muxable || !compatible;
  let mode = options.audio_reencode_mode != ReencodeMode::AvoidReencoding;
  Decision {
    reencode: required || mode || analysis.optional_reencode(),
    required,
  }
}

/// H.264 profile implied by the output pixel format.
fn h264_profile(pix_fmt: &str) -> &'static str {
  match pix_fmt {
    "yuv420p" => "high",
    "yuv420p10le" => "high10",
    "yuv422p" | "yuv422p10le" => "high422",
    _ => "high444",
  }
}

fn assemble_video_filters(
  stream: &VideoStream,
  analysis: &VideoAnalysis,
  target_pix_fmt: &str,
) -> Option<String> {
  let mut parts: Vec<String> = Vec::new();
  if analysis.deinterlace {
    parts.push("bwdif".into());
  }
  if let Some((num, den)) = analysis.fps_limit {
    parts.push(if den == 1 {
      format!("fps={num}")
    } else {
      format!("fps={num}/{den}")
    });
  }
  let full_range = matches!(stream.color_range.as_deref(), Some("pc") | Some("jpeg"));
  if analysis.hdr_remap {
    if let Some((w, h)) = analysis.resize {
      parts.push(format!("scale=w={w}:h={h}"));
    }
    parts.push(pixels::hdr_to_sdr_chain(target_pix_fmt, false));
  } else {
    match (analysis.resize, full_range) {
      (Some((w, h)), true) => parts.push(format!("scale=w={w}:h={h}")),
      (Some((w, h)), false) => parts.push(format!("scale=w={w}:h={h}:out_range=pc")),
      (None, false) => parts.push("scale=out_range=pc".into()),
      (None, true) => {}
    }
  }
  if analysis.fix_sample_aspect {
    parts.push("setsar=1".into());
  }
  if parts.is_empty() {
    None
  } else {
    Some(parts.join(","))
  }
}

fn video_reencode_override(
  stream: &VideoStream,
  analysis: &VideoAnalysis,
  options: &ProcessingOptions,
  caps: &Capabilities,
  out_index: usize,
) -> Result<StreamOverride> {
  let target = options.canonical_video_codec();
  if !caps.can_encode_video(target) {
    return Err(Error::Configuration(format!(
      "toolchain has no encoder for {target}"
    )));
  }
  let props = stream.pix_fmt.as_deref().and_then(pixels::pix_fmt_properties);
  let pix_fmt = pixels::choose_pix_fmt(
    props,
    options.maximum_bits_per_channel,
    options.maximum_chroma_subsampling,
    target,
  );
  let mut o = StreamOverride::for_stream(StreamSelector::at(StreamKind::Video, out_index));
  o.codec = target.encoder_name().map(str::to_owned);
  o.pix_fmt = Some(pix_fmt.to_owned());
  o.color_range = Some("pc".into());
  match target {
    VideoCodec::H264 => {
      o.crf = Some(VIDEO_CRF_H264);
      o.preset = Some(VIDEO_PRESET.into());
      o.profile = Some(h264_profile(pix_fmt).into());
    }
    VideoCodec::Hevc => {
      o.crf = Some(VIDEO_CRF_HEVC);
      o.preset = Some(VIDEO_PRESET.into());
    }
    _ => {}
  }
  o.filter = assemble_video_filters(stream, analysis, pix_fmt);
  Ok(o)
}

fn audio_reencode_override(
  stream: &AudioStream,
  analysis: &AudioAnalysis,
  options: &ProcessingOptions,
  caps: &Capabilities,
  out_index: usize,
) -> Result<StreamOverride> {
  let target = options.canonical_audio_codec();
  if !caps.can_encode_audio(target) {
    return Err(Error::Configuration(format!(
      "toolchain has no encoder for {target}"
    )));
  }
  let encoder = caps.preferred_aac_encoder();
  let mut o = StreamOverride::for_stream(StreamSelector::at(StreamKind::Audio, out_index));
  o.codec = Some(encoder.to_owned());
  if encoder == "libfdk_aac" {
    o.vbr = Some(AAC_VBR_QUALITY);
    o.profile = Some("lc".into());
    if AAC_VBR_QUALITY >= 4 {
      o.cutoff = Some(AAC_VBR_CUTOFF_HZ);
    }
  } else {
    let channels_out = analysis
      .downmix_to
      .map(u64::from)
      .unwrap_or_else(|| if stream.channels > 0 { stream.channels as u64 } else { 2 });
    o.bitrate = Some(channels_out * AAC_BITRATE_PER_CHANNEL);
  }
  o.channels = analysis.downmix_to;
  o.sample_rate = analysis.resample_to;
  Ok(o)
}

fn copy_override(selector: StreamSelector) -> StreamOverride {
  let mut o = StreamOverride::for_stream(selector);
  o.codec = Some("copy".into());
  o
}

/// Sanitized title/language pairs carried onto a kept subtitle stream when
/// the source's metadata tables are being dropped.
fn subtitle_metadata(stream: &SubtitleStream) -> Vec<(String, String)> {
  let mut pairs = Vec::new();
  if let Some(title) = stream.tags.title.as_deref().and_then(sanitize_title) {
    pairs.push(("title".to_owned(), title));
  }
  if let Some(language) = stream.tags.language.as_deref().and_then(sanitize_language) {
    pairs.push(("language".to_owned(), language));
  }
  pairs
}

/// Walks the streams in input order and produces the main command plan.
/// `compat[i]` is the container-compatibility verdict for source stream `i`.
pub(crate) fn build_plan(
  info: &FileInfo,
  options: &ProcessingOptions,
  caps: &Capabilities,
  compat: &[bool],
  analysis: &StreamsAnalysis,
) -> Result<CommandPlan> {
  let preserve = options.try_preserve_unrecognized_streams;
  let mut plan = CommandPlan::default();

  if options.metadata_stripping_mode.strips_metadata() {
    plan.map_metadata = Some(-1);
    plan.map_chapters = Some(-1);
  } else {
    plan.map_metadata = Some(0);
    plan.map_chapters = Some(0);
  }

  if preserve {
    plan.maps.push(MapDirective::whole_input(0));
  }

  let mut video_out = 0usize;
  let mut audio_out = 0usize;
  let mut subtitle_out = 0usize;

  for (index, stream) in info.streams.iter().enumerate() {
    let compatible = compat.get(index).copied().unwrap_or(false);
    let any = StreamSelector::at(StreamKind::Any, index);
    match stream {
      Stream::Video(v) if v.is_thumbnail_stream() => {
        let keep =
          options.metadata_stripping_mode == MetadataStrippingMode::None && compatible;
        if keep {
          if !preserve {
            plan.maps.push(MapDirective::stream(0, any));
          }
          plan
            .overrides
            .push(copy_override(StreamSelector::at(StreamKind::Video, video_out)));
          video_out += 1;
        } else if preserve {
          plan.maps.push(MapDirective::exclude(0, any));
        }
      }
      Stream::Video(v) => {
        let stream_analysis = analysis
          .video
          .get(&index)
          .ok_or_else(|| Error::Validation(format!("video stream {index} was not analyzed")))?;
        let decision = video_decision(stream_analysis, options, compatible);
        if !preserve {
          plan.maps.push(MapDirective::stream(0, any));
        }
        if decision.reencode {
          plan.overrides.push(video_reencode_override(
            v,
            stream_analysis,
            options,
            caps,
            video_out,
          )?);
          if options.video_reencode_mode == ReencodeMode::SelectSmallest && !decision.required {
            plan.size_checks.push(SizeCheckEntry {
              input_index: index,
              output_index: video_out,
              extension: stream_analysis
                .codec
                .map_or("mkv", VideoCodec::writable_extension),
              needs_reencode_for_mp4: !stream_analysis
                .codec
                .map_or(false, VideoCodec::supports_mp4_muxing),
              kind: StreamKind::Video,
            });
          }
        } else {
          plan
            .overrides
            .push(copy_override(StreamSelector::at(StreamKind::Video, video_out)));
        }
        video_out += 1;
      }
      Stream::Audio(a) => {
        if options.remove_audio_streams {
          if preserve {
            plan.maps.push(MapDirective::exclude(0, any));
          }
          continue;
        }
        let stream_analysis = analysis
          .audio
          .get(&index)
          .ok_or_else(|| Error::Validation(format!("audio stream {index} was not analyzed")))?;
        let decision = audio_decision(stream_analysis, options, compatible);
        if !preserve {
          plan.maps.push(MapDirective::stream(0, any));
        }
        if decision.reencode {
          plan.overrides.push(audio_reencode_override(
            a,
            stream_analysis,
            options,
            caps,
            audio_out,
          )?);
          if options.audio_reencode_mode == ReencodeMode::SelectSmallest && !decision.required {
            plan.size_checks.push(SizeCheckEntry {
              input_index: index,
              output_index: audio_out,
              extension: stream_analysis
                .codec
                .map_or("mka", |c| c.writable_extension()),
              needs_reencode_for_mp4: !stream_analysis
                .codec
                .map_or(false, |c| c.supports_mp4_muxing()),
              kind: StreamKind::Audio,
            });
          }
        } else {
          plan
            .overrides
            .push(copy_override(StreamSelector::at(StreamKind::Audio, audio_out)));
        }
        audio_out += 1;
      }
      Stream::Subtitle(s) => {
        if !preserve {
          continue;
        }
        let name = s.codec_name.as_deref().unwrap_or("");
        let selector = StreamSelector::at(StreamKind::Subtitle, subtitle_out);
        if compatible {
          let mut o = copy_override(selector);
          if options.metadata_stripping_mode.strips_metadata() {
            o.metadata = subtitle_metadata(s);
          }
          plan.overrides.push(o);
          subtitle_out += 1;
        } else if TEXT_SUBTITLE_CODECS.contains(&name) && caps.encode_mov_text {
          let mut o = StreamOverride::for_stream(selector);
          o.codec = Some("mov_text".into());
          if options.metadata_stripping_mode.strips_metadata() {
            o.metadata = subtitle_metadata(s);
          }
          plan.overrides.push(o);
          subtitle_out += 1;
        } else {
          debug!("dropping subtitle stream {index} ({name}): no path into the target container");
          plan.maps.push(MapDirective::exclude(0, any));
        }
      }
      Stream::Unrecognized(u) => {
        if !preserve {
          continue;
        }
        let keep =
          options.metadata_stripping_mode == MetadataStrippingMode::None && compatible;
        if !keep {
          debug!("dropping {} stream {index}", u.codec_type);
          plan.maps.push(MapDirective::exclude(0, any));
        }
      }
    }
  }

  Ok(plan)
}
