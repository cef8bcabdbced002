//! Probe adapter: runs the probe binary over a media file and parses its
//! JSON output into the [`FileInfo`] model the planner consumes.


use std::path::Path;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};
use crate::toolchain::toolchain;

/// Sentinel for integer fields the probe did not report.
pub const MISSING: i64 = -1;

/// Everything the probe reports about one media file.
#[derive(Debug, Clone)]
pub struct FileInfo {
  pub format_name: String,
  pub duration: Option<f64>,
  pub streams: Vec<Stream>,
}

impl FileInfo {
  /// Duration of the longest stream, falling back to the container duration.
  pub fn effective_duration(&self) -> Option<f64> {
    let stream_max = self
      .streams
      .iter()
      .filter_map(Stream::duration)
      .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));
    stream_max.or(self.duration)
  }
}

/// Stream disposition flags packed into a bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disposition(u32);

impl Disposition {
  pub const DEFAULT: Disposition = Disposition(1);
  pub const DUB: Disposition = Disposition(1 << 1);
  pub const ORIGINAL: Disposition = Disposition(1 << 2);
  pub const COMMENT: Disposition = Disposition(1 << 3);
  pub const LYRICS: Disposition = Disposition(1 << 4);
  pub const KARAOKE: Disposition = Disposition(1 << 5);
  pub const FORCED: Disposition = Disposition(1 << 6);
  pub const HEARING_IMPAIRED: Disposition = Disposition(1 << 7);
  pub const VISUAL_IMPAIRED: Disposition = Disposition(1 << 8);
  pub const CLEAN_EFFECTS: Disposition = Disposition(1 << 9);
  pub const ATTACHED_PIC: Disposition = Disposition(1 << 10);
  pub const TIMED_THUMBNAILS: Disposition = Disposition(1 << 11);
  pub const CAPTIONS: Disposition = Disposition(1 << 12);
  pub const DESCRIPTIONS: Disposition = Disposition(1 << 13);
  pub const METADATA: Disposition = Disposition(1 << 14);
  pub const DEPENDENT: Disposition = Disposition(1 << 15);
  pub const STILL_IMAGE: Disposition = Disposition(1 << 16);
  pub const NON_DIEGETIC: Disposition = Disposition(1 << 17);
  pub const MULTILAYER: Disposition = Disposition(1 << 18);

  /// Dispositions that disqualify a video stream as a thumbnail source.
  pub const BAD_THUMBNAIL_CANDIDATE: Disposition = Disposition(
    Self::DUB.0
      | Self::COMMENT.0
      | Self::LYRICS.0
      | Self::KARAOKE.0
      | Self::FORCED.0
      | Self::HEARING_IMPAIRED.0
      | Self::VISUAL_IMPAIRED.0
      | Self::CLEAN_EFFECTS.0
      | Self::NON_DIEGETIC.0
      | Self::CAPTIONS.0
      | Self::DESCRIPTIONS.0
      | Self::METADATA.0
      | Self::DEPENDENT.0
      | Self::MULTILAYER.0,
  );

  pub const fn union(self, other: Disposition) -> Disposition {
    Disposition(self.0 | other.0)
  }

  pub const fn intersects(self, mask: Disposition) -> bool {
    self.0 & mask.0 != 0
  }
}

/// Tags the planner cares about, pulled out of the probe's `tags` subobject.
#[derive(Debug, Clone, Default)]
pub struct StreamTags {
  pub language: Option<String>,
  pub title: Option<String>,
  pub alpha_mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VideoStream {
  pub codec_name: Option<String>,
  pub codec_tag: Option<String>,
  pub profile: Option<String>,
  pub width: i64,
  pub height: i64,
  pub fps_num: i64,
  pub fps_den: i64,
  pub sar_num: i64,
  pub sar_den: i64,
  pub pix_fmt: Option<String>,
  pub color_range: Option<String>,
  pub color_transfer: Option<String>,
  pub color_primaries: Option<String>,
  pub color_space: Option<String>,
  pub field_order: Option<String>,
  pub bits_per_raw_sample: i64,
  pub duration: Option<f64>,
  pub tags: StreamTags,
  pub disposition: Disposition,
}

impl VideoStream {
  pub fn is_attached_pic(&self) -> bool {
    self.disposition.intersects(Disposition::ATTACHED_PIC)
  }

  pub fn is_timed_thumbnails(&self) -> bool {
    self.disposition.intersects(Disposition::TIMED_THUMBNAILS)
  }

  pub fn is_still_image(&self) -> bool {
    self.disposition.intersects(Disposition::STILL_IMAGE)
  }

  pub fn is_default(&self) -> bool {
    self.disposition.intersects(Disposition::DEFAULT)
  }

  pub fn is_bad_candidate_for_thumbnail(&self) -> bool {
    self.disposition.intersects(Disposition::BAD_THUMBNAIL_CANDIDATE)
  }

  /// Attached pictures and scrubbing thumbnails are not playable video.
  pub fn is_thumbnail_stream(&self) -> bool {
    self.is_attached_pic() || self.is_timed_thumbnails()
  }

  pub fn fps(&self) -> Option<f64> {
    if self.fps_num > 0 && self.fps_den > 0 {
      Some(self.fps_num as f64 / self.fps_den as f64)
    } else {
      None
    }
  }

  /// Sample aspect ratio as a float, 1.0 when square or unknown.
  pub fn sar(&self) -> f64 {
    if self.sar_num > 0 && self.sar_den > 0 {
      self.sar_num as f64 / self.sar_den as f64
    } else {
      1.0
    }
  }
}

#[derive(Debug, Clone)]
pub struct AudioStream {
  pub codec_name: Option<String>,
  pub codec_tag: Option<String>,
  pub profile: Option<String>,
  pub channels: i64,
  pub sample_rate: i64,
  pub channel_layout: Option<String>,
  pub duration: Option<f64>,
  pub tags: StreamTags,
  pub disposition: Disposition,
}

impl AudioStream {
  pub fn is_default(&self) -> bool {
    self.disposition.intersects(Disposition::DEFAULT)
  }
}

#[derive(Debug, Clone)]
pub struct SubtitleStream {
  pub codec_name: Option<String>,
  pub codec_tag: Option<String>,
  pub duration: Option<f64>,
  pub tags: StreamTags,
  pub disposition: Disposition,
}

/// A stream the probe typed as something other than video/audio/subtitle.
/// `shorthand` is the selector character for the stream kind: `d` for data,
/// `t` for attachments, `\0` when no kind-specific selector exists.
#[derive(Debug, Clone)]
pub struct UnrecognizedStream {
  pub codec_name: Option<String>,
  pub codec_type: String,
  pub shorthand: char,
  pub tags: StreamTags,
  pub disposition: Disposition,
}

#[derive(Debug, Clone)]
pub enum Stream {
  Video(VideoStream),
  Audio(AudioStream),
  Subtitle(SubtitleStream),
  Unrecognized(UnrecognizedStream),
}

impl Stream {
  pub fn codec_name(&self) -> Option<&str> {
    match self {
      Stream::Video(s) => s.codec_name.as_deref(),
      Stream::Audio(s) => s.codec_name.as_deref(),
      Stream::Subtitle(s) => s.codec_name.as_deref(),
      Stream::Unrecognized(s) => s.codec_name.as_deref(),
    }
  }

  pub fn tags(&self) -> &StreamTags {
    match self {
      Stream::Video(s) => &s.tags,
      Stream::Audio(s) => &s.tags,
      Stream::Subtitle(s) => &s.tags,
      Stream::Unrecognized(s) => &s.tags,
    }
  }

  pub fn duration(&self) -> Option<f64> {
    match self {
      Stream::Video(s) => s.duration,
      Stream::Audio(s) => s.duration,
      Stream::Subtitle(s) => s.duration,
      Stream::Unrecognized(_) => None,
    }
  }

  pub fn as_video(&self) -> Option<&VideoStream> {
    match self {
      Stream::Video(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_audio(&self) -> Option<&AudioStream> {
    match self {
      Stream::Audio(s) => Some(s),
      _ => None,
    }
  }
}

// Raw models mirroring the probe's JSON schema. Everything is optional at
// this layer; sentinel substitution happens in the conversion below.

#[derive(Debug, Deserialize)]
struct RawProbe {
  format: Option<RawFormat>,
  #[serde(default)]
  streams: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
  format_name: Option<String>,
  duration: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDisposition {
  #[serde(default)]
  default: i32,
  #[serde(default)]
  dub: i32,
  #[serde(default)]
  original: i32,
  #[serde(default)]
  comment: i32,
  #[serde(default)]
  lyrics: i32,
  #[serde(default)]
  karaoke: i32,
  #[serde(default)]
  forced: i32,
  #[serde(default)]
  hearing_impaired: i32,
  #[serde(default)]
  visual_impaired: i32,
  #[serde(default)]
  clean_effects: i32,
  #[serde(default)]
  attached_pic: i32,
  #[serde(default)]
  timed_thumbnails: i32,
  #[serde(default)]
  captions: i32,
  #[serde(default)]
  descriptions: i32,
  #[serde(default)]
  metadata: i32,
  #[serde(default)]
  dependent: i32,
  #[serde(default)]
  still_image: i32,
  #[serde(default)]
  non_diegetic: i32,
  #[serde(default)]
  multilayer: i32,
}

impl RawDisposition {
  fn to_bitset(&self) -> Disposition {
    let mut bits = Disposition::default();
    let mut set = |on: i32, flag: Disposition| {
      if on != 0 {
        bits = bits.union(flag);
      }
    };
    set(self.default, Disposition::DEFAULT);
    set(self.dub, Disposition::DUB);
    set(self.original, Disposition::ORIGINAL);
    set(self.comment, Disposition::COMMENT);
    set(self.lyrics, Disposition::LYRICS);
    set(self.karaoke, Disposition::KARAOKE);
    set(self.forced, Disposition::FORCED);
    set(self.hearing_impaired, Disposition::HEARING_IMPAIRED);
    set(self.visual_impaired, Disposition::VISUAL_IMPAIRED);
    set(self.clean_effects, Disposition::CLEAN_EFFECTS);
    set(self.attached_pic, Disposition::ATTACHED_PIC);
    set(self.timed_thumbnails, Disposition::TIMED_THUMBNAILS);
    set(self.captions, Disposition::CAPTIONS);
    set(self.descriptions, Disposition::DESCRIPTIONS);
    set(self.metadata, Disposition::METADATA);
    set(self.dependent, Disposition::DEPENDENT);
    set(self.still_image, Disposition::STILL_IMAGE);
    set(self.non_diegetic, Disposition::NON_DIEGETIC);
    set(self.multilayer, Disposition::MULTILAYER);
    bits
  }
}

#[derive(Debug, Deserialize, Default)]
struct RawTags {
  language: Option<String>,
  title: Option<String>,
  alpha_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
  codec_type: Option<String>,
  codec_name: Option<String>,
  codec_tag_string: Option<String>,
  profile: Option<String>,
  width: Option<i64>,
  height: Option<i64>,
  r_frame_rate: Option<String>,
  sample_aspect_ratio: Option<String>,
  duration: Option<String>,
  color_range: Option<String>,
  color_transfer: Option<String>,
  color_primaries: Option<String>,
  color_space: Option<String>,
  pix_fmt: Option<String>,
  field_order: Option<String>,
  bits_per_raw_sample: Option<String>,
  channels: Option<i64>,
  sample_rate: Option<String>,
  channel_layout: Option<String>,
  #[serde(default)]
  disposition: RawDisposition,
  #[serde(default)]
  tags: RawTags,
}

/// Parses `num/den` rationals, rejecting non-positive sides.
fn parse_frame_rate(s: Option<&str>) -> (i64, i64) {
  let Some(s) = s else { return (MISSING, MISSING) };
  let Some((num, den)) = s.split_once('/') else {
    return (MISSING, MISSING);
  };
  match (num.parse::<i64>(), den.parse::<i64>()) {
    (Ok(n), Ok(d)) if n > 0 && d > 0 => (n, d),
    _ => (MISSING, MISSING),
  }
}

/// Parses `num:den` aspect ratios: 1:1 when missing, -1:-1 when malformed
/// or non-positive.
fn parse_aspect_ratio(s: Option<&str>) -> (i64, i64) {
  let Some(s) = s else { return (1, 1) };
  let Some((num, den)) = s.split_once(':') else {
    return (MISSING, MISSING);
  };
  match (num.parse::<i64>(), den.parse::<i64>()) {
    (Ok(n), Ok(d)) if n > 0 && d > 0 => (n, d),
    _ => (MISSING, MISSING),
  }
}

fn parse_duration(s: Option<&str>) -> Option<f64> {
  s.and_then(|s| s.parse::<f64>().ok()).filter(|d| d.is_finite() && *d >= 0.0)
}

fn convert_stream(raw: RawStream) -> Stream {
  let disposition = raw.disposition.to_bitset();
  let tags = StreamTags {
    language: raw.tags.language,
    title: raw.tags.title,
    alpha_mode: raw.tags.alpha_mode,
  };
  let codec_tag = raw
    .codec_tag_string
    .filter(|t| !t.is_empty() && t.as_str() != "[0][0][0][0]");
  let duration = parse_duration(raw.duration.as_deref());
  match raw.codec_type.as_deref() {
    Some("video") => {
      let (fps_num, fps_den) = parse_frame_rate(raw.r_frame_rate.as_deref());
      let (sar_num, sar_den) = parse_aspect_ratio(raw.sample_aspect_ratio.as_deref());
      Stream::Video(VideoStream {
        codec_name: raw.codec_name,
        codec_tag,
        profile: raw.profile,
        width: raw.width.unwrap_or(MISSING),
        height: raw.height.unwrap_or(MISSING),
        fps_num,
        fps_den,
        sar_num,
        sar_den,
        pix_fmt: raw.pix_fmt,
        color_range: raw.color_range,
        color_transfer: raw.color_transfer,
        color_primaries: raw.color_primaries,
        color_space: raw.color_space,
        field_order: raw.field_order,
        bits_per_raw_sample: raw
          .bits_per_raw_sample
          .and_then(|b| b.parse::<i64>().ok())
          .unwrap_or(MISSING),
        duration,
        tags,
        disposition,
      })
    }
    Some("audio") => Stream::Audio(AudioStream {
      codec_name: raw.codec_name,
      codec_tag,
      profile: raw.profile,
      channels: raw.channels.unwrap_or(MISSING),
      sample_rate: raw.sample_rate.and_then(|r| r.parse::<i64>().ok()).unwrap_or(MISSING),
      channel_layout: raw.channel_layout,
      duration,
      tags,
      disposition,
    }),
    Some("subtitle") => Stream::Subtitle(SubtitleStream {
      codec_name: raw.codec_name,
      codec_tag,
      duration,
      tags,
      disposition,
    }),
    other => {
      let codec_type = other.unwrap_or("").to_owned();
      let shorthand = match codec_type.as_str() {
        "data" => 'd',
        "attachment" => 't',
        _ => '\0',
      };
      Stream::Unrecognized(UnrecognizedStream {
        codec_name: raw.codec_name,
        codec_type,
        shorthand,
        tags,
        disposition,
      })
    }
  }
}

/// Parses the probe's JSON document into [`FileInfo`].
pub(crate) fn parse_probe_json(json: &str) -> Result<FileInfo> {
  let raw: RawProbe =
    serde_json::from_str(json).map_err(|e| Error::Probe(format!("malformed probe output: {e}")))?;
  let format = raw
    .format
    .ok_or_else(|| Error::Probe("probe output has no format object".into()))?;
  let format_name = format
    .format_name
    .ok_or_else(|| Error::Probe("probe output has no format_name".into()))?;
  Ok(FileInfo {
    format_name,
    duration: parse_duration(format.duration.as_deref()),
    streams: raw.streams.into_iter().map(convert_stream).collect(),
  })
}

/// Probes one media file.
pub async fn probe_file(path: &Path, cancel: &CancellationToken) -> Result<FileInfo> {
  let tc = toolchain()?;
  let args: Vec<String> = crate::into_vec![
    "-v",
    "error",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
    path.display().to_string(),
  ];
  let output = tc.pool().run_to_strings(&tc.prober, &args, true, cancel).await?;
  if output.exit_code != Some(0) {
    return Err(Error::Toolchain {
      program: tc.prober.display().to_string(),
      args,
      exit_code: output.exit_code,
      stderr: output.stderr,
      stdout: Some(output.stdout),
    });
  }
  trace!("probed {}: {} bytes of JSON", path.display(), output.stdout.len());
  parse_probe_json(&output.stdout)
}
