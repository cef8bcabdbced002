//! Pure translation of a structured toolchain command into an argument
//! vector. Nothing here touches the filesystem or spawns anything; the
//! planner assembles a [`ToolCommand`] and the supervisor runs it.


use std::path::PathBuf;

/// Stream kind selector characters: `v`, `a`, `s`, `g`, or none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
  Video,
  Audio,
  Subtitle,
  Global,
  Any,
}

impl StreamKind {
  pub const fn token(self) -> Option<char> {
    match self {
      StreamKind::Video => Some('v'),
      StreamKind::Audio => Some('a'),
      StreamKind::Subtitle => Some('s'),
      StreamKind::Global => Some('g'),
      StreamKind::Any => None,
    }
  }
}

/// Selects output streams for an override: kind, optional index. A missing
/// index is a wildcard and is elided from the argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSelector {
  pub kind: StreamKind,
  pub index: Option<usize>,
}

impl StreamSelector {
  pub const fn of_kind(kind: StreamKind) -> StreamSelector {
    StreamSelector { kind, index: None }
  }

  pub const fn at(kind: StreamKind, index: usize) -> StreamSelector {
    StreamSelector {
      kind,
      index: Some(index),
    }
  }

  /// The `:kind:index` suffix appended to option flags, empty for the
  /// all-streams wildcard.
  pub fn suffix(&self) -> String {
    let mut s = String::new();
    if let Some(token) = self.kind.token() {
      s.push(':');
      s.push(token);
    }
    if let Some(index) = self.index {
      s.push(':');
      s.push_str(&index.to_string());
    }
    s
  }
}

/// One `-map` directive: `input[:kind[:index]]`, negated to exclude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapDirective {
  pub input: usize,
  pub selector: Option<StreamSelector>,
  pub negative: bool,
}

impl MapDirective {
  pub const fn whole_input(input: usize) -> MapDirective {
    MapDirective {
      input,
      selector: None,
      negative: false,
    }
  }

  pub const fn stream(input: usize, selector: StreamSelector) -> MapDirective {
    MapDirective {
      input,
      selector: Some(selector),
      negative: false,
    }
  }

  pub const fn exclude(input: usize, selector: StreamSelector) -> MapDirective {
    MapDirective {
      input,
      selector: Some(selector),
      negative: true,
    }
  }

  fn to_arg(self) -> String {
    let mut s = String::new();
    if self.negative {
      s.push('-');
    }
    s.push_str(&self.input.to_string());
    if let Some(selector) = self.selector {
      s.push_str(&selector.suffix());
    }
    s
  }
}

/// Per-output-stream overrides, emitted in canonical order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamOverride {
  pub selector: Option<StreamSelector>,
  pub codec: Option<String>,
  pub pix_fmt: Option<String>,
  pub color_range: Option<String>,
  pub color_primaries: Option<String>,
  pub color_trc: Option<String>,
  pub colorspace: Option<String>,
  pub crf: Option<u32>,
  pub vbr: Option<u32>,
  pub cutoff: Option<u32>,
  pub bitrate: Option<u64>,
  pub preset: Option<String>,
  pub profile: Option<String>,
  pub filter: Option<String>,
  pub channels: Option<u32>,
  pub sample_rate: Option<u32>,
  pub metadata: Vec<(String, String)>,
}

impl StreamOverride {
  pub fn for_stream(selector: StreamSelector) -> StreamOverride {
    StreamOverride {
      selector: Some(selector),
      ..StreamOverride::default()
    }
  }

  fn suffix(&self) -> String {
    self.selector.map(|s| s.suffix()).unwrap_or_default()
  }

  fn push_args(&self, args: &mut Vec<String>) {
    let sel = self.suffix();
    let mut push = |flag: &str, value: String| {
      args.push(format!("-{flag}{sel}"));
      args.push(value);
    };
    if let Some(v) = &self.codec {
      push("c", v.clone());
    }
    if let Some(v) = &self.pix_fmt {
      push("pix_fmt", v.clone());
    }
    if let Some(v) = &self.color_range {
      push("color_range", v.clone());
    }
    if let Some(v) = &self.color_primaries {
      push("color_primaries", v.clone());
    }
    if let Some(v) = &self.color_trc {
      push("color_trc", v.clone());
    }
    if let Some(v) = &self.colorspace {
      push("colorspace", v.clone());
    }
    if let Some(v) = self.crf {
      push("crf", v.to_string());
    }
    if let Some(v) = self.vbr {
      push("vbr", v.to_string());
    }
    if let Some(v) = self.cutoff {
      push("cutoff", v.to_string());
    }
    if let Some(v) = self.bitrate {
      push("b", v.to_string());
    }
    if let Some(v) = &self.preset {
      push("preset", v.clone());
    }
    if let Some(v) = &self.profile {
      push("profile", v.clone());
    }
    if let Some(v) = &self.filter {
      push("filter", v.clone());
    }
    if let Some(v) = self.channels {
      push("ac", v.to_string());
    }
    if let Some(v) = self.sample_rate {
      push("ar", v.to_string());
    }
    for (key, value) in &self.metadata {
      push("metadata", format!("{key}={value}"));
    }
  }
}

/// Seek applied before the first input; `from_end` seeks are relative to the
/// end of the file and carry a non-positive offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekSpec {
  pub seconds: f64,
  pub from_end: bool,
}

/// A complete toolchain invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCommand {
  pub inputs: Vec<PathBuf>,
  pub seek: Option<SeekSpec>,
  pub map_chapters: Option<i32>,
  pub map_metadata: Option<i32>,
  pub maps: Vec<MapDirective>,
  pub overrides: Vec<StreamOverride>,
  pub video_frames: Option<u32>,
  pub emit_movflags: bool,
  pub progressive_download: bool,
  pub progress_file: Option<PathBuf>,
  pub format: Option<String>,
  pub output: PathBuf,
}

/// `-stats_period` used whenever a progress sink is attached.
pub const PROGRESS_STATS_PERIOD: &str = "0.016";

impl ToolCommand {
  pub fn to_args(&self) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    if let Some(seek) = self.seek {
      args.push(if seek.from_end { "-sseof" } else { "-ss" }.to_owned());
      args.push(format_seconds(seek.seconds));
    }
    for input in &self.inputs {
      args.push("-i".to_owned());
      args.push(input.display().to_string());
    }
    if let Some(n) = self.map_chapters {
      args.push("-map_chapters".to_owned());
      args.push(n.to_string());
    }
    for map in &self.maps {
      args.push("-map".to_owned());
      args.push(map.to_arg());
    }
    if let Some(n) = self.map_metadata {
      args.push("-map_metadata".to_owned());
      args.push(n.to_string());
    }
    for stream_override in &self.overrides {
      stream_override.push_args(&mut args);
    }
    if let Some(n) = self.video_frames {
      args.push("-frames:v".to_owned());
      args.push(n.to_string());
    }
    if self.emit_movflags {
      args.push("-movflags".to_owned());
      args.push(
        if self.progressive_download {
          "+faststart+use_metadata_tags"
        } else {
          "+use_metadata_tags"
        }
        .to_owned(),
      );
    }
    if let Some(progress) = &self.progress_file {
      args.push("-progress".to_owned());
      args.push(progress.display().to_string());
      args.push("-stats_period".to_owned());
      args.push(PROGRESS_STATS_PERIOD.to_owned());
    }
    args.push("-copy_unknown".to_owned());
    args.push("-xerror".to_owned());
    args.push("-hide_banner".to_owned());
    args.push("-y".to_owned());
    if let Some(format) = &self.format {
      args.push("-f".to_owned());
      args.push(format.clone());
    }
    args.push(self.output.display().to_string());
    args
  }
}

fn format_seconds(seconds: f64) -> String {
  // trim the trailing zeros a fixed format would carry
  let s = format!("{seconds:.6}");
  let s = s.trim_end_matches('0').trim_end_matches('.');
  if s.is_empty() || s == "-" {
    "0".to_owned()
  } else {
    s.to_owned()
  }
}
