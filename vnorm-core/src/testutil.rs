//! Shared fixtures for planner and thumbnail tests.

use crate::probe::{
  AudioStream, Disposition, FileInfo, Stream, StreamTags, SubtitleStream, UnrecognizedStream,
  VideoStream,
};

pub(crate) fn video(codec: &str) -> VideoStream {
  VideoStream {
    codec_name: Some(codec.to_owned()),
    codec_tag: None,
    profile: None,
    width: 1920,
    height: 1080,
    fps_num: 30,
    fps_den: 1,
    sar_num: 1,
    sar_den: 1,
    pix_fmt: Some("yuv420p".to_owned()),
    color_range: Some("tv".to_owned()),
    color_transfer: Some("bt709".to_owned()),
    color_primaries: Some("bt709".to_owned()),
    color_space: Some("bt709".to_owned()),
    field_order: Some("progressive".to_owned()),
    bits_per_raw_sample: 8,
    duration: Some(60.0),
    tags: StreamTags::default(),
    disposition: Disposition::DEFAULT,
  }
}

pub(crate) fn hdr_video() -> VideoStream {
  VideoStream {
    codec_name: Some("hevc".to_owned()),
    pix_fmt: Some("yuv420p10le".to_owned()),
    color_transfer: Some("smpte2084".to_owned()),
    color_primaries: Some("bt2020".to_owned()),
    color_space: Some("bt2020nc".to_owned()),
    bits_per_raw_sample: 10,
    ..video("hevc")
  }
}

pub(crate) fn thumbnail_video(codec: &str) -> VideoStream {
  VideoStream {
    disposition: Disposition::ATTACHED_PIC,
    fps_num: -1,
    fps_den: -1,
    width: 600,
    height: 600,
    duration: None,
    ..video(codec)
  }
}

pub(crate) fn audio(codec: &str, profile: Option<&str>, channels: i64, sample_rate: i64) -> AudioStream {
  AudioStream {
    codec_name: Some(codec.to_owned()),
    codec_tag: None,
    profile: profile.map(str::to_owned),
    channels,
    sample_rate,
    channel_layout: None,
    duration: Some(60.0),
    tags: StreamTags::default(),
    disposition: Disposition::default(),
  }
}

pub(crate) fn subtitle(codec: &str) -> SubtitleStream {
  SubtitleStream {
    codec_name: Some(codec.to_owned()),
    codec_tag: None,
    duration: None,
    tags: StreamTags {
      language: Some("eng".to_owned()),
      title: Some("Dialogue".to_owned()),
      alpha_mode: None,
    },
    disposition: Disposition::default(),
  }
}

pub(crate) fn data_stream() -> UnrecognizedStream {
  UnrecognizedStream {
    codec_name: Some("bin_data".to_owned()),
    codec_type: "data".to_owned(),
    shorthand: 'd',
    tags: StreamTags::default(),
    disposition: Disposition::default(),
  }
}

pub(crate) fn file_info(format_name: &str, streams: Vec<Stream>) -> FileInfo {
  FileInfo {
    format_name: format_name.to_owned(),
    duration: Some(60.5),
    streams,
  }
}
