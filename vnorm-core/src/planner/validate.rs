//! Per-stream validation and re-encode trigger analysis.


use std::collections::BTreeMap;

use crate::catalog::{AudioCodec, VideoCodec};
use crate::error::{Error, Result};
use crate::options::ProcessingOptions;
use crate::planner::pixels;
use crate::probe::{AudioStream, FileInfo, Stream, VideoStream};

#[derive(Debug, Default)]
pub(crate) struct VideoAnalysis {
  pub codec: Option<VideoCodec>,
  pub thumbnail: bool,
  pub resize: Option<(i64, i64)>,
  pub fps_limit: Option<(i64, i64)>,
  pub bits_excess: bool,
  pub chroma_excess: bool,
  pub hdr_remap: bool,
  pub nonstandard_pix_fmt: bool,
  pub deinterlace: bool,
  pub fix_sample_aspect: bool,
}

impl VideoAnalysis {
  /// A trigger the planner may skip when size-compare keeps the original.
  pub fn optional_reencode(&self) -> bool {
    self.resize.is_some()
      || self.fps_limit.is_some()
      || self.bits_excess
      || self.chroma_excess
      || self.hdr_remap
      || self.deinterlace
      || self.fix_sample_aspect
  }
}

#[derive(Debug, Default)]
pub(crate) struct AudioAnalysis {
  pub codec: Option<AudioCodec>,
  pub downmix_to: Option<u32>,
  pub resample_to: Option<u32>,
}

impl AudioAnalysis {
  pub fn optional_reencode(&self) -> bool {
    self.downmix_to.is_some() || self.resample_to.is_some()
  }
}

#[derive(Debug, Default)]
pub(crate) struct StreamsAnalysis {
  pub video: BTreeMap<usize, VideoAnalysis>,
  pub audio: BTreeMap<usize, AudioAnalysis>,
  /// Playable video streams (attached pictures and scrubbing thumbnails
  /// excluded).
  pub video_count: u32,
  pub audio_count: u32,
  pub any_optional_reencode: bool,
}

fn check_range<T: PartialOrd + std::fmt::Display>(
  what: &str,
  value: T,
  min: Option<T>,
  max: Option<T>,
) -> Result<()> {
  if let Some(min) = min {
    if value < min {
      return Err(Error::Validation(format!("{what} {value} is under the minimum {min}")));
    }
  }
  if let Some(max) = max {
    if value > max {
      return Err(Error::Validation(format!("{what} {value} exceeds the maximum {max}")));
    }
  }
  Ok(())
}

fn analyze_video(
  index: usize,
  stream: &VideoStream,
  container_duration: Option<f64>,
  options: &ProcessingOptions,
  invalid: &mut Vec<String>,
) -> Result<VideoAnalysis> {
  if stream.is_thumbnail_stream() {
    // cover art and scrubbing thumbnails are exempt from source validation
    return Ok(VideoAnalysis {
      codec: stream.codec_name.as_deref().and_then(VideoCodec::from_probe_name),
      thumbnail: true,
      ..VideoAnalysis::default()
    });
  }

  let codec = stream.codec_name.as_deref().and_then(VideoCodec::from_probe_name);
  match codec {
    Some(c) if options.source_video_codecs.contains(&c) => {}
    _ => invalid.push(format!(
      "video stream {index}: codec {:?} not accepted",
      stream.codec_name.as_deref().unwrap_or("unknown")
    )),
  }

  let rules = &options.video_source_validation;
  let dimension_rules = rules.min_width.is_some()
    || rules.max_width.is_some()
    || rules.min_height.is_some()
    || rules.max_height.is_some()
    || rules.min_pixel_count.is_some()
    || rules.max_pixel_count.is_some();
  let has_dimensions = stream.width > 0 && stream.height > 0;
  if dimension_rules && !has_dimensions {
    return Err(Error::Validation(format!(
      "video stream {index}: dimensions unknown but dimension bounds are configured"
    )));
  }
  if has_dimensions {
    check_range(&format!("video stream {index} width"), stream.width, rules.min_width, rules.max_width)?;
    check_range(&format!("video stream {index} height"), stream.height, rules.min_height, rules.max_height)?;
    check_range(
      &format!("video stream {index} pixel count"),
      stream.width * stream.height,
      rules.min_pixel_count,
      rules.max_pixel_count,
    )?;
  }
  let duration = stream.duration.or(container_duration);
  if rules.min_duration.is_some() || rules.max_duration.is_some() {
    let Some(duration) = duration else {
      return Err(Error::Validation(format!(
        "video stream {index}: duration unknown but duration bounds are configured"
      )));
    };
    check_range(&format!("video stream {index} duration"), duration, rules.min_duration, rules.max_duration)?;
  }

  let resize = match options.resize_options {
    Some(bounds) => {
      if !has_dimensions {
        return Err(Error::Validation(format!(
          "video stream {index}: cannot resize a stream with unknown dimensions"
        )));
      }
      pixels::fit_resize(stream.width, stream.height, bounds)
    }
    None => None,
  };
  let fps_limit = options
    .fps_options
    .and_then(|fps| pixels::limit_fps(stream.fps_num, stream.fps_den, fps.mode, fps.target_fps));
  let props = stream.pix_fmt.as_deref().and_then(pixels::pix_fmt_properties);
  let interlaced = matches!(
    stream.field_order.as_deref(),
    Some("tt") | Some("bb") | Some("tb") | Some("bt") | Some("interlaced")
  );

  Ok(VideoAnalysis {
    codec,
    thumbnail: false,
    resize,
    fps_limit,
    bits_excess: pixels::bits_exceed(props, options.maximum_bits_per_channel),
    chroma_excess: pixels::chroma_exceeds(props, options.maximum_chroma_subsampling),
    hdr_remap: options.remap_hdr_to_sdr
      && pixels::is_hdr(stream.color_transfer.as_deref(), stream.color_primaries.as_deref()),
    nonstandard_pix_fmt: props.is_none(),
    deinterlace: options.force_progressive_frames && interlaced,
    fix_sample_aspect: options.force_square_pixels
      && stream.sar_num > 0
      && stream.sar_den > 0
      && stream.sar_num != stream.sar_den,
  })
}

fn analyze_audio(
  index: usize,
  stream: &AudioStream,
  container_duration: Option<f64>,
  options: &ProcessingOptions,
  invalid: &mut Vec<String>,
) -> Result<AudioAnalysis> {
  let codec = stream
    .codec_name
    .as_deref()
    .and_then(|name| AudioCodec::from_probe(name, stream.profile.as_deref()));
  match codec {
    Some(c) if options.source_audio_codecs.contains(&c) => {}
    _ => invalid.push(format!(
      "audio stream {index}: codec {:?} not accepted",
      stream.codec_name.as_deref().unwrap_or("unknown")
    )),
  }

  let rules = &options.audio_source_validation;
  if rules.min_duration.is_some() || rules.max_duration.is_some() {
    let Some(duration) = stream.duration.or(container_duration) else {
      return Err(Error::Validation(format!(
        "audio stream {index}: duration unknown but duration bounds are configured"
      )));
    };
    check_range(&format!("audio stream {index} duration"), duration, rules.min_duration, rules.max_duration)?;
  }

  let downmix_to = options.max_channels.filter(|max| stream.channels > i64::from(*max));
  let resample_to = options.max_sample_rate.filter(|max| stream.sample_rate > i64::from(*max));

  Ok(AudioAnalysis {
    codec,
    downmix_to,
    resample_to,
  })
}

/// Walks every stream, enforcing the source validation rules and collecting
/// the per-stream re-encode triggers the later stages consume.
pub(crate) fn analyze(info: &FileInfo, options: &ProcessingOptions) -> Result<StreamsAnalysis> {
  let mut out = StreamsAnalysis::default();
  let mut invalid: Vec<String> = Vec::new();

  for (index, stream) in info.streams.iter().enumerate() {
    match stream {
      Stream::Video(v) => {
        let analysis = analyze_video(index, v, info.duration, options, &mut invalid)?;
        if !analysis.thumbnail {
          out.video_count += 1;
          out.any_optional_reencode |= analysis.optional_reencode();
        }
        out.video.insert(index, analysis);
      }
      Stream::Audio(a) => {
        let analysis = analyze_audio(index, a, info.duration, options, &mut invalid)?;
        out.audio_count += 1;
        out.any_optional_reencode |= analysis.optional_reencode();
        out.audio.insert(index, analysis);
      }
      Stream::Subtitle(_) | Stream::Unrecognized(_) => {}
    }
  }

  check_range(
    "video stream count",
    out.video_count,
    options.video_source_validation.min_streams,
    options.video_source_validation.max_streams,
  )?;
  check_range(
    "audio stream count",
    out.audio_count,
    options.audio_source_validation.min_streams,
    options.audio_source_validation.max_streams,
  )?;

  if out.video_count == 0 && out.audio_count == 0 {
    return Err(Error::Validation("no audio or video streams".into()));
  }
  if !invalid.is_empty() {
    return Err(Error::Validation(invalid.join("; ")));
  }

  Ok(out)
}

/// Re-checks the maximum-length bounds against the duration measured by the
/// full-decode pass, which is authoritative over the probe's estimate.
pub(crate) fn check_measured_duration(measured: f64, options: &ProcessingOptions) -> Result<()> {
  if let Some(max) = options.video_source_validation.max_duration {
    if measured > max {
      return Err(Error::Validation(format!(
        "measured duration {measured:.3}s exceeds the video maximum {max:.3}s"
      )));
    }
  }
  if let Some(max) = options.audio_source_validation.max_duration {
    if measured > max {
      return Err(Error::Validation(format!(
        "measured duration {measured:.3}s exceeds the audio maximum {max:.3}s"
      )));
    }
  }
  Ok(())
}
