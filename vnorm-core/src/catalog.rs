//! Closed enumerations of the video codecs, audio codecs and container
//! formats the pipeline understands. Dispatch is closed: there is no open
//! extension point, every decision in the planner matches on these types.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Video codecs the pipeline can recognize in a source. Encodable members
/// come first so result lists keep a stable "writable first" ordering.
#[derive(
  PartialEq, Eq, Hash, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum VideoCodec {
  #[strum(serialize = "h264")]
  H264,
  #[strum(serialize = "hevc")]
  Hevc,
  #[strum(serialize = "png")]
  Png,
  #[strum(serialize = "mpeg4")]
  Mpeg4,
  #[strum(serialize = "mpeg2video")]
  Mpeg2,
  #[strum(serialize = "mpeg1video")]
  Mpeg1,
  #[strum(serialize = "vp8")]
  Vp8,
  #[strum(serialize = "vp9")]
  Vp9,
  #[strum(serialize = "av1")]
  Av1,
  #[strum(serialize = "vc1")]
  Vc1,
  #[strum(serialize = "mjpeg")]
  Mjpeg,
  #[strum(serialize = "prores")]
  Prores,
}

impl Display for VideoCodec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.display_name())
  }
}

impl VideoCodec {
  /// Every catalog member, encodable members first.
  pub const ALL: [VideoCodec; 12] = [
    VideoCodec::H264,
    VideoCodec::Hevc,
    VideoCodec::Png,
    VideoCodec::Mpeg4,
    VideoCodec::Mpeg2,
    VideoCodec::Mpeg1,
    VideoCodec::Vp8,
    VideoCodec::Vp9,
    VideoCodec::Av1,
    VideoCodec::Vc1,
    VideoCodec::Mjpeg,
    VideoCodec::Prores,
  ];

  /// The codec name as the probe reports it.
  pub const fn probe_name(self) -> &'static str {
    match self {
      VideoCodec::H264 => "h264",
      VideoCodec::Hevc => "hevc",
      VideoCodec::Png => "png",
      VideoCodec::Mpeg4 => "mpeg4",
      VideoCodec::Mpeg2 => "mpeg2video",
      VideoCodec::Mpeg1 => "mpeg1video",
      VideoCodec::Vp8 => "vp8",
      VideoCodec::Vp9 => "vp9",
      VideoCodec::Av1 => "av1",
      VideoCodec::Vc1 => "vc1",
      VideoCodec::Mjpeg => "mjpeg",
      VideoCodec::Prores => "prores",
    }
  }

  pub const fn display_name(self) -> &'static str {
    match self {
      VideoCodec::H264 => "H.264",
      VideoCodec::Hevc => "HEVC",
      VideoCodec::Png => "PNG",
      VideoCodec::Mpeg4 => "MPEG-4 Part 2",
      VideoCodec::Mpeg2 => "MPEG-2",
      VideoCodec::Mpeg1 => "MPEG-1",
      VideoCodec::Vp8 => "VP8",
      VideoCodec::Vp9 => "VP9",
      VideoCodec::Av1 => "AV1",
      VideoCodec::Vc1 => "VC-1",
      VideoCodec::Mjpeg => "Motion JPEG",
      VideoCodec::Prores => "Apple ProRes",
    }
  }

  /// True when the toolchain carries an encoder the planner knows how to
  /// drive for this codec.
  pub const fn is_encodable(self) -> bool {
    matches!(self, VideoCodec::H264 | VideoCodec::Hevc | VideoCodec::Png)
  }

  /// The encoder the planner selects when this codec is the re-encode target.
  pub const fn encoder_name(self) -> Option<&'static str> {
    match self {
      VideoCodec::H264 => Some("libx264"),
      VideoCodec::Hevc => Some("libx265"),
      VideoCodec::Png => Some("png"),
      _ => None,
    }
  }

  /// True when a stream of this codec can be copied into an mp4 container
  /// without recoding.
  pub const fn supports_mp4_muxing(self) -> bool {
    matches!(
      self,
      VideoCodec::H264
        | VideoCodec::Hevc
        | VideoCodec::Mpeg4
        | VideoCodec::Mpeg2
        | VideoCodec::Vp9
        | VideoCodec::Av1
        | VideoCodec::Mjpeg
    )
  }

  /// Extension of a single-stream work file holding a copy of this codec.
  pub const fn writable_extension(self) -> &'static str {
    match self {
      VideoCodec::H264 | VideoCodec::Hevc | VideoCodec::Mpeg4 | VideoCodec::Vp9 | VideoCodec::Av1 => {
        "mp4"
      }
      VideoCodec::Png => "png",
      _ => "mkv",
    }
  }

  /// Match by equality of probe name.
  pub fn from_probe_name(name: &str) -> Option<VideoCodec> {
    Self::ALL.iter().copied().find(|c| c.probe_name() == name)
  }
}

/// Audio codecs, identified by `(probe_name, profile)`. An entry without a
/// profile is a wildcard matching any probed profile of the same name;
/// profiled entries take precedence, so `("aac", "LC")` resolves to
/// [`AudioCodec::AacLc`] and `("aac", "HE-AAC")` falls through to
/// [`AudioCodec::Aac`].
#[derive(
  PartialEq, Eq, Hash, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum AudioCodec {
  #[strum(serialize = "aac_lc")]
  AacLc,
  #[strum(serialize = "aac")]
  Aac,
  #[strum(serialize = "mp3")]
  Mp3,
  #[strum(serialize = "ac3")]
  Ac3,
  #[strum(serialize = "eac3")]
  Eac3,
  #[strum(serialize = "flac")]
  Flac,
  #[strum(serialize = "alac")]
  Alac,
  #[strum(serialize = "opus")]
  Opus,
  #[strum(serialize = "vorbis")]
  Vorbis,
  #[strum(serialize = "dts")]
  Dts,
  #[strum(serialize = "pcm_s16le")]
  PcmS16le,
}

impl Display for AudioCodec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.display_name())
  }
}

impl AudioCodec {
  /// Every catalog member, encodable members first, profiled entries before
  /// their wildcard.
  pub const ALL: [AudioCodec; 11] = [
    AudioCodec::AacLc,
    AudioCodec::Aac,
    AudioCodec::Mp3,
    AudioCodec::Ac3,
    AudioCodec::Eac3,
    AudioCodec::Flac,
    AudioCodec::Alac,
    AudioCodec::Opus,
    AudioCodec::Vorbis,
    AudioCodec::Dts,
    AudioCodec::PcmS16le,
  ];

  pub const fn probe_name(self) -> &'static str {
    match self {
      AudioCodec::AacLc | AudioCodec::Aac => "aac",
      AudioCodec::Mp3 => "mp3",
      AudioCodec::Ac3 => "ac3",
      AudioCodec::Eac3 => "eac3",
      AudioCodec::Flac => "flac",
      AudioCodec::Alac => "alac",
      AudioCodec::Opus => "opus",
      AudioCodec::Vorbis => "vorbis",
      AudioCodec::Dts => "dts",
      AudioCodec::PcmS16le => "pcm_s16le",
    }
  }

  /// The probed profile this entry requires, `None` for a wildcard.
  pub const fn profile(self) -> Option<&'static str> {
    match self {
      AudioCodec::AacLc => Some("LC"),
      _ => None,
    }
  }

  pub const fn display_name(self) -> &'static str {
    match self {
      AudioCodec::AacLc => "AAC (LC)",
      AudioCodec::Aac => "AAC",
      AudioCodec::Mp3 => "MP3",
      AudioCodec::Ac3 => "Dolby Digital",
      AudioCodec::Eac3 => "Dolby Digital Plus",
      AudioCodec::Flac => "FLAC",
      AudioCodec::Alac => "Apple Lossless",
      AudioCodec::Opus => "Opus",
      AudioCodec::Vorbis => "Vorbis",
      AudioCodec::Dts => "DTS",
      AudioCodec::PcmS16le => "PCM 16-bit",
    }
  }

  /// True when the toolchain carries an encoder for this codec.
  pub const fn is_encodable(self) -> bool {
    matches!(self, AudioCodec::AacLc | AudioCodec::Aac)
  }

  pub const fn supports_mp4_muxing(self) -> bool {
    matches!(
      self,
      AudioCodec::AacLc
        | AudioCodec::Aac
        | AudioCodec::Mp3
        | AudioCodec::Ac3
        | AudioCodec::Eac3
        | AudioCodec::Flac
        | AudioCodec::Alac
        | AudioCodec::Opus
    )
  }

  /// Extension of a single-stream work file holding a copy of this codec.
  pub const fn writable_extension(self) -> &'static str {
    match self {
      AudioCodec::AacLc | AudioCodec::Aac | AudioCodec::Alac => "m4a",
      AudioCodec::Mp3 => "mp3",
      AudioCodec::Ac3 => "ac3",
      AudioCodec::Eac3 => "eac3",
      AudioCodec::Flac => "flac",
      AudioCodec::Opus | AudioCodec::Vorbis | AudioCodec::Dts => "mka",
      AudioCodec::PcmS16le => "wav",
    }
  }

  /// Matches `(probe_name, profile)` against the catalog. Profiled entries
  /// win over the wildcard for the same probe name.
  pub fn from_probe(name: &str, profile: Option<&str>) -> Option<AudioCodec> {
    Self::ALL
      .iter()
      .copied()
      .filter(|c| c.probe_name() == name)
      .find(|c| match c.profile() {
        Some(required) => profile == Some(required),
        None => true,
      })
  }
}

/// Container formats. `probe_name` is the format name as the probe declares
/// it, which for several demuxers is a comma-separated list of aliases.
#[derive(
  PartialEq, Eq, Hash, Copy, Clone, Debug, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr,
)]
pub enum MediaContainer {
  #[strum(serialize = "mp4")]
  Mp4,
  #[strum(serialize = "matroska")]
  Matroska,
  #[strum(serialize = "avi")]
  Avi,
  #[strum(serialize = "mpegts")]
  MpegTs,
  #[strum(serialize = "mpeg")]
  Mpeg,
}

impl Display for MediaContainer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.display_name())
  }
}

impl MediaContainer {
  /// Every catalog member, writable members first.
  pub const ALL: [MediaContainer; 5] = [
    MediaContainer::Mp4,
    MediaContainer::Matroska,
    MediaContainer::Avi,
    MediaContainer::MpegTs,
    MediaContainer::Mpeg,
  ];

  pub const fn probe_name(self) -> &'static str {
    match self {
      MediaContainer::Mp4 => "mov,mp4,m4a,3gp,3g2,mj2",
      MediaContainer::Matroska => "matroska,webm",
      MediaContainer::Avi => "avi",
      MediaContainer::MpegTs => "mpegts",
      MediaContainer::Mpeg => "mpeg",
    }
  }

  pub const fn display_name(self) -> &'static str {
    match self {
      MediaContainer::Mp4 => "MP4",
      MediaContainer::Matroska => "Matroska",
      MediaContainer::Avi => "AVI",
      MediaContainer::MpegTs => "MPEG-TS",
      MediaContainer::Mpeg => "MPEG-PS",
    }
  }

  /// True when the toolchain can write this container.
  pub const fn supports_writing(self) -> bool {
    matches!(self, MediaContainer::Mp4)
  }

  /// The muxer name passed to the toolchain's `-f`.
  pub const fn muxer_name(self) -> &'static str {
    match self {
      MediaContainer::Mp4 => "mp4",
      MediaContainer::Matroska => "matroska",
      MediaContainer::Avi => "avi",
      MediaContainer::MpegTs => "mpegts",
      MediaContainer::Mpeg => "mpeg",
    }
  }

  /// Extension given to freshly written files of this container.
  pub const fn primary_extension(self) -> &'static str {
    match self {
      MediaContainer::Mp4 => "mp4",
      MediaContainer::Matroska => "mkv",
      MediaContainer::Avi => "avi",
      MediaContainer::MpegTs => "ts",
      MediaContainer::Mpeg => "mpg",
    }
  }

  /// Extensions a file of this container plausibly carries on disk.
  pub const fn common_extensions(self) -> &'static [&'static str] {
    match self {
      MediaContainer::Mp4 => &["mp4", "m4v", "mov", "m4a", "3gp", "3g2", "mj2"],
      MediaContainer::Matroska => &["mkv", "webm", "mka"],
      MediaContainer::Avi => &["avi"],
      MediaContainer::MpegTs => &["ts", "m2ts", "mts"],
      MediaContainer::Mpeg => &["mpg", "mpeg", "vob"],
    }
  }

  /// Weak comma-list subset match between this format's declared name and a
  /// probed format name: when at least one side is multi-token, any shared
  /// comma-delimited token is a match; two single-token names must be equal.
  pub fn name_matches(self, probed: &str) -> bool {
    weak_name_match(self.probe_name(), probed)
  }

  /// Finds the first catalog container whose declared name matches `probed`.
  pub fn from_probe_name(probed: &str) -> Option<MediaContainer> {
    Self::ALL.iter().copied().find(|f| f.name_matches(probed))
  }
}

/// The comma-token relation behind [`MediaContainer::name_matches`]. Kept as
/// a free function so the symmetry property can be tested directly.
pub(crate) fn weak_name_match(a: &str, b: &str) -> bool {
  let a_tokens: Vec<&str> = a.split(',').filter(|t| !t.is_empty()).collect();
  let b_tokens: Vec<&str> = b.split(',').filter(|t| !t.is_empty()).collect();
  if a_tokens.len() <= 1 && b_tokens.len() <= 1 {
    return a == b;
  }
  a_tokens.iter().any(|t| b_tokens.contains(t))
}
