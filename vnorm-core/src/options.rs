//! Immutable processing configuration. A record is built from a preset plus
//! explicit overrides and validated once; the planner re-validates at entry
//! so a hand-assembled record cannot smuggle an inconsistent state through.


use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::catalog::{AudioCodec, MediaContainer, VideoCodec};
use crate::error::{Error, Result};
use crate::progress::ProgressTag;

/// Per-kind re-encode policy.
#[derive(
  PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum ReencodeMode {
  /// Re-encode every stream of this kind.
  #[strum(serialize = "always")]
  Always,
  /// Copy whenever the stream is acceptable as-is.
  #[strum(serialize = "avoid")]
  AvoidReencoding,
  /// Re-encode, then keep whichever of original and re-encode is smaller.
  #[strum(serialize = "smallest")]
  SelectSmallest,
}

#[derive(
  PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum BitsPerChannel {
  #[strum(serialize = "preserve")]
  Preserve,
  #[strum(serialize = "8")]
  Limit8,
  #[strum(serialize = "10")]
  Limit10,
  #[strum(serialize = "12")]
  Limit12,
}

impl BitsPerChannel {
  /// The numeric bound, `None` when preserving.
  pub const fn limit(self) -> Option<u32> {
    match self {
      BitsPerChannel::Preserve => None,
      BitsPerChannel::Limit8 => Some(8),
      BitsPerChannel::Limit10 => Some(10),
      BitsPerChannel::Limit12 => Some(12),
    }
  }
}

#[derive(
  PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum ChromaSubsampling {
  #[strum(serialize = "preserve")]
  Preserve,
  #[strum(serialize = "420")]
  Limit420,
  #[strum(serialize = "422")]
  Limit422,
  #[strum(serialize = "444")]
  Limit444,
}

impl ChromaSubsampling {
  /// Density rank of the bound: 420 < 422 < 444. `None` when preserving.
  pub const fn rank(self) -> Option<u32> {
    match self {
      ChromaSubsampling::Preserve => None,
      ChromaSubsampling::Limit420 => Some(0),
      ChromaSubsampling::Limit422 => Some(1),
      ChromaSubsampling::Limit444 => Some(2),
    }
  }
}

#[derive(
  PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum MetadataStrippingMode {
  /// Keep metadata, chapters and thumbnail streams.
  #[strum(serialize = "none")]
  None,
  /// Keep metadata and chapters, drop thumbnail streams.
  #[strum(serialize = "thumbnail-only")]
  ThumbnailOnly,
  /// Strip metadata when the file is remuxed anyway.
  #[strum(serialize = "preferred")]
  Preferred,
  /// Strip metadata, remuxing just for that if necessary.
  #[strum(serialize = "required")]
  Required,
}

impl MetadataStrippingMode {
  /// Thumbnail streams survive only the `None` mode.
  pub const fn drops_thumbnails(self) -> bool {
    !matches!(self, MetadataStrippingMode::None)
  }

  pub const fn strips_metadata(self) -> bool {
    matches!(self, MetadataStrippingMode::Preferred | MetadataStrippingMode::Required)
  }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum FpsLimitMode {
  /// Force the target rate outright when the source exceeds it.
  LimitToExact,
  /// Divide the source rate by the smallest integer that brings it at or
  /// under the target, keeping frame timing exact.
  LimitByIntegerDivision,
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize)]
pub struct FpsOptions {
  pub mode: FpsLimitMode,
  pub target_fps: u32,
}

/// Upper bounds for fit-inside resizing; aspect ratio is preserved.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ResizeOptions {
  pub width: u32,
  pub height: u32,
}

/// Acceptance bounds for the video streams of a source.
#[derive(PartialEq, Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct VideoSourceValidation {
  pub min_streams: Option<u32>,
  pub max_streams: Option<u32>,
  pub min_width: Option<i64>,
  pub max_width: Option<i64>,
  pub min_height: Option<i64>,
  pub max_height: Option<i64>,
  pub min_pixel_count: Option<i64>,
  pub max_pixel_count: Option<i64>,
  pub min_duration: Option<f64>,
  pub max_duration: Option<f64>,
}

/// Acceptance bounds for the audio streams of a source.
#[derive(PartialEq, Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct AudioSourceValidation {
  pub min_streams: Option<u32>,
  pub max_streams: Option<u32>,
  pub min_duration: Option<f64>,
  pub max_duration: Option<f64>,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressTag, f64) + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
pub struct ProcessingOptions {
  pub source_video_codecs: Vec<VideoCodec>,
  pub source_audio_codecs: Vec<AudioCodec>,
  pub source_formats: Vec<MediaContainer>,
  pub result_video_codecs: Vec<VideoCodec>,
  pub result_audio_codecs: Vec<AudioCodec>,
  pub result_formats: Vec<MediaContainer>,
  pub video_reencode_mode: ReencodeMode,
  pub audio_reencode_mode: ReencodeMode,
  pub maximum_bits_per_channel: BitsPerChannel,
  pub maximum_chroma_subsampling: ChromaSubsampling,
  pub fps_options: Option<FpsOptions>,
  pub resize_options: Option<ResizeOptions>,
  pub remap_hdr_to_sdr: bool,
  pub max_channels: Option<u32>,
  pub max_sample_rate: Option<u32>,
  pub metadata_stripping_mode: MetadataStrippingMode,
  pub force_progressive_download: bool,
  pub try_preserve_unrecognized_streams: bool,
  pub force_validate_all_streams: bool,
  pub remove_audio_streams: bool,
  pub force_square_pixels: bool,
  pub force_progressive_frames: bool,
  pub video_source_validation: VideoSourceValidation,
  pub audio_source_validation: AudioSourceValidation,
  pub throw_when_reencode_optional: bool,
  #[serde(skip)]
  pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for ProcessingOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProcessingOptions")
      .field("result_video_codecs", &self.result_video_codecs)
      .field("result_audio_codecs", &self.result_audio_codecs)
      .field("result_formats", &self.result_formats)
      .field("video_reencode_mode", &self.video_reencode_mode)
      .field("audio_reencode_mode", &self.audio_reencode_mode)
      .field("metadata_stripping_mode", &self.metadata_stripping_mode)
      .finish_non_exhaustive()
  }
}

fn dedup_in_order<T: Copy + Eq + std::hash::Hash>(list: &mut Vec<T>) {
  *list = list.iter().copied().unique().collect();
}

fn check_bounds<T: PartialOrd + fmt::Display>(name: &str, min: Option<T>, max: Option<T>) -> Result<()> {
  if let (Some(min), Some(max)) = (&min, &max) {
    if min > max {
      return Err(Error::Configuration(format!(
        "{name}: minimum {min} exceeds maximum {max}"
      )));
    }
  }
  Ok(())
}

impl ProcessingOptions {
  /// Accept-everything baseline: keep the source unchanged whenever the
  /// container and codecs allow it.
  pub fn preserve() -> ProcessingOptions {
    ProcessingOptions {
      source_video_codecs: VideoCodec::ALL.to_vec(),
      source_audio_codecs: AudioCodec::ALL.to_vec(),
      source_formats: MediaContainer::ALL.to_vec(),
      result_video_codecs: VideoCodec::ALL.to_vec(),
      result_audio_codecs: AudioCodec::ALL.to_vec(),
      result_formats: MediaContainer::ALL.to_vec(),
      video_reencode_mode: ReencodeMode::AvoidReencoding,
      audio_reencode_mode: ReencodeMode::AvoidReencoding,
      maximum_bits_per_channel: BitsPerChannel::Preserve,
      maximum_chroma_subsampling: ChromaSubsampling::Preserve,
      fps_options: None,
      resize_options: None,
      remap_hdr_to_sdr: false,
      max_channels: None,
      max_sample_rate: None,
      metadata_stripping_mode: MetadataStrippingMode::None,
      force_progressive_download: false,
      try_preserve_unrecognized_streams: true,
      force_validate_all_streams: false,
      remove_audio_streams: false,
      force_square_pixels: false,
      force_progressive_frames: false,
      video_source_validation: VideoSourceValidation::default(),
      audio_source_validation: AudioSourceValidation::default(),
      throw_when_reencode_optional: false,
      progress_callback: None,
    }
  }

  /// Standardizing preset: every source lands in an H.264/AAC mp4, copying
  /// streams that already comply.
  pub fn standard_h264_aac_mp4() -> ProcessingOptions {
    ProcessingOptions {
      result_video_codecs: vec![VideoCodec::H264],
      result_audio_codecs: vec![AudioCodec::AacLc, AudioCodec::Aac],
      result_formats: vec![MediaContainer::Mp4],
      metadata_stripping_mode: MetadataStrippingMode::ThumbnailOnly,
      force_progressive_download: true,
      ..ProcessingOptions::preserve()
    }
  }

  /// Applies `overrides` on top of this record, producing a validated copy.
  pub fn with_overrides(&self, overrides: OptionsOverrides) -> Result<ProcessingOptions> {
    let mut merged = self.clone();
    overrides.apply(&mut merged);
    merged.normalize()?;
    Ok(merged)
  }

  /// Deduplicates list fields in place and checks every construction
  /// invariant.
  pub fn normalize(&mut self) -> Result<()> {
    dedup_in_order(&mut self.source_video_codecs);
    dedup_in_order(&mut self.source_audio_codecs);
    dedup_in_order(&mut self.source_formats);
    dedup_in_order(&mut self.result_video_codecs);
    dedup_in_order(&mut self.result_audio_codecs);
    dedup_in_order(&mut self.result_formats);
    self.validate()
  }

  /// Checks the construction invariants without mutating.
  pub fn validate(&self) -> Result<()> {
    for (name, empty) in [
      ("source_video_codecs", self.source_video_codecs.is_empty()),
      ("source_audio_codecs", self.source_audio_codecs.is_empty()),
      ("source_formats", self.source_formats.is_empty()),
      ("result_video_codecs", self.result_video_codecs.is_empty()),
      ("result_audio_codecs", self.result_audio_codecs.is_empty()),
      ("result_formats", self.result_formats.is_empty()),
    ] {
      if empty {
        return Err(Error::Configuration(format!("{name} must not be empty")));
      }
    }

    let canonical_video = self.result_video_codecs[0];
    if !canonical_video.is_encodable() {
      return Err(Error::Configuration(format!(
        "first result video codec {canonical_video} is not encodable"
      )));
    }
    let canonical_audio = self.result_audio_codecs[0];
    if !canonical_audio.is_encodable() {
      return Err(Error::Configuration(format!(
        "first result audio codec {canonical_audio} is not encodable"
      )));
    }
    let canonical_format = self.result_formats[0];
    if !canonical_format.supports_writing() {
      return Err(Error::Configuration(format!(
        "first result format {canonical_format} is not writable"
      )));
    }

    if let Some(fps) = &self.fps_options {
      if fps.target_fps == 0 {
        return Err(Error::Configuration("fps target must be at least 1".into()));
      }
    }
    if let Some(resize) = &self.resize_options {
      if resize.width == 0 || resize.height == 0 {
        return Err(Error::Configuration("resize bounds must be at least 1x1".into()));
      }
    }
    if self.max_channels == Some(0) {
      return Err(Error::Configuration("max_channels must be at least 1".into()));
    }
    if self.max_sample_rate == Some(0) {
      return Err(Error::Configuration("max_sample_rate must be at least 1".into()));
    }

    let v = &self.video_source_validation;
    check_bounds("video stream count", v.min_streams, v.max_streams)?;
    check_bounds("video width", v.min_width, v.max_width)?;
    check_bounds("video height", v.min_height, v.max_height)?;
    check_bounds("video pixel count", v.min_pixel_count, v.max_pixel_count)?;
    check_bounds("video duration", v.min_duration, v.max_duration)?;
    let a = &self.audio_source_validation;
    check_bounds("audio stream count", a.min_streams, a.max_streams)?;
    check_bounds("audio duration", a.min_duration, a.max_duration)?;

    Ok(())
  }

  /// The canonical output container: the head of `result_formats`.
  pub fn canonical_format(&self) -> MediaContainer {
    self.result_formats[0]
  }

  /// The canonical video re-encode target: the head of `result_video_codecs`.
  pub fn canonical_video_codec(&self) -> VideoCodec {
    self.result_video_codecs[0]
  }

  pub fn canonical_audio_codec(&self) -> AudioCodec {
    self.result_audio_codecs[0]
  }
}

/// Overrides merged into a preset to produce a new record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptionsOverrides {
  pub video_reencode_mode: Option<ReencodeMode>,
  pub audio_reencode_mode: Option<ReencodeMode>,
  pub maximum_bits_per_channel: Option<BitsPerChannel>,
  pub maximum_chroma_subsampling: Option<ChromaSubsampling>,
  pub fps_options: Option<FpsOptions>,
  pub resize_options: Option<ResizeOptions>,
  pub remap_hdr_to_sdr: Option<bool>,
  pub max_channels: Option<u32>,
  pub max_sample_rate: Option<u32>,
  pub metadata_stripping_mode: Option<MetadataStrippingMode>,
  pub force_progressive_download: Option<bool>,
  pub try_preserve_unrecognized_streams: Option<bool>,
  pub force_validate_all_streams: Option<bool>,
  pub remove_audio_streams: Option<bool>,
  pub force_square_pixels: Option<bool>,
  pub force_progressive_frames: Option<bool>,
  pub throw_when_reencode_optional: Option<bool>,
}

impl OptionsOverrides {
  fn apply(self, target: &mut ProcessingOptions) {
    macro_rules! merge {
      ($($field:ident),* $(,)?) => {
        $(
          if let Some(value) = self.$field {
            target.$field = value;
          }
        )*
      };
    }
    merge!(
      video_reencode_mode,
      audio_reencode_mode,
      maximum_bits_per_channel,
      maximum_chroma_subsampling,
      remap_hdr_to_sdr,
      metadata_stripping_mode,
      force_progressive_download,
      try_preserve_unrecognized_streams,
      force_validate_all_streams,
      remove_audio_streams,
      force_square_pixels,
      force_progressive_frames,
      throw_when_reencode_optional,
    );
    if self.fps_options.is_some() {
      target.fps_options = self.fps_options;
    }
    if self.resize_options.is_some() {
      target.resize_options = self.resize_options;
    }
    if self.max_channels.is_some() {
      target.max_channels = self.max_channels;
    }
    if self.max_sample_rate.is_some() {
      target.max_sample_rate = self.max_sample_rate;
    }
  }
}
