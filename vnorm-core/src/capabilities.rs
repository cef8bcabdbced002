//! Capability matrix of the installed toolchain: which encoders, decoders,
//! muxers, demuxers and filters are present. Detected once per process by
//! running the probe binary over its listing outputs; the `OnceCell` store
//! publishes the fully-populated record to every reader.


use std::path::Path;
use std::process::Command;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::catalog::{AudioCodec, VideoCodec};
use crate::error::{Error, Result};
use crate::toolchain::toolchain;

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
  // encoders
  pub encode_libx264: bool,
  pub encode_libx265: bool,
  pub encode_png: bool,
  pub encode_libfdk_aac: bool,
  pub encode_aac: bool,
  pub encode_mov_text: bool,
  // muxers
  pub mux_mp4: bool,
  // demuxers
  pub demux_mov: bool,
  pub demux_matroska: bool,
  pub demux_avi: bool,
  pub demux_mpegts: bool,
  pub demux_mpeg: bool,
  // filters
  pub filter_zscale: bool,
  pub filter_scale: bool,
  pub filter_fps: bool,
  pub filter_tonemap: bool,
  pub filter_format: bool,
  pub filter_bwdif: bool,
  pub filter_setsar: bool,
  // decoders, parallel to the catalog orderings
  pub(crate) decodable_video: [bool; VideoCodec::ALL.len()],
  pub(crate) decodable_audio: [bool; AudioCodec::ALL.len()],
}

impl Capabilities {
  pub fn can_decode_video(&self, codec: VideoCodec) -> bool {
    let idx = VideoCodec::ALL.iter().position(|c| *c == codec).expect("catalog member");
    self.decodable_video[idx]
  }

  pub fn can_decode_audio(&self, codec: AudioCodec) -> bool {
    let idx = AudioCodec::ALL.iter().position(|c| *c == codec).expect("catalog member");
    self.decodable_audio[idx]
  }

  pub fn can_encode_video(&self, codec: VideoCodec) -> bool {
    match codec {
      VideoCodec::H264 => self.encode_libx264,
      VideoCodec::Hevc => self.encode_libx265,
      VideoCodec::Png => self.encode_png,
      _ => false,
    }
  }

  pub fn can_encode_audio(&self, codec: AudioCodec) -> bool {
    matches!(codec, AudioCodec::Aac | AudioCodec::AacLc)
      && (self.encode_libfdk_aac || self.encode_aac)
  }

  /// The audio encoder the planner drives: the higher-fidelity one when the
  /// toolchain ships it, the native one otherwise.
  pub fn preferred_aac_encoder(&self) -> &'static str {
    if self.encode_libfdk_aac {
      "libfdk_aac"
    } else {
      "aac"
    }
  }

  /// A fully-populated matrix for tests that exercise planning logic
  /// without a real toolchain.
  #[cfg(test)]
  pub(crate) fn all_enabled() -> Capabilities {
    Capabilities {
      encode_libx264: true,
      encode_libx265: true,
      encode_png: true,
      encode_libfdk_aac: true,
      encode_aac: true,
      encode_mov_text: true,
      mux_mp4: true,
      demux_mov: true,
      demux_matroska: true,
      demux_avi: true,
      demux_mpegts: true,
      demux_mpeg: true,
      filter_zscale: true,
      filter_scale: true,
      filter_fps: true,
      filter_tonemap: true,
      filter_format: true,
      filter_bwdif: true,
      filter_setsar: true,
      decodable_video: [true; VideoCodec::ALL.len()],
      decodable_audio: [true; AudioCodec::ALL.len()],
    }
  }

  /// Builds the matrix from raw listing outputs.
  pub(crate) fn from_listings(
    encoders: &str,
    codecs: &str,
    muxers: &str,
    demuxers: &str,
    filters: &str,
  ) -> Capabilities {
    let mut caps = Capabilities::default();

    for (info, name) in parse_listing_rows(encoders) {
      let kind = info.chars().next().unwrap_or('.');
      match (name.as_str(), kind) {
        ("libx264", 'V') => caps.encode_libx264 = true,
        ("libx265", 'V') => caps.encode_libx265 = true,
        ("png", 'V') => caps.encode_png = true,
        ("libfdk_aac", 'A') => caps.encode_libfdk_aac = true,
        ("aac", 'A') => caps.encode_aac = true,
        ("mov_text", 'S') => caps.encode_mov_text = true,
        _ => {}
      }
    }

    for (info, name) in parse_listing_rows(codecs) {
      if !info.starts_with('D') {
        continue;
      }
      let kind = info.chars().nth(2).unwrap_or('.');
      match kind {
        'V' => {
          for (idx, codec) in VideoCodec::ALL.iter().enumerate() {
            if codec.probe_name() == name {
              caps.decodable_video[idx] = true;
            }
          }
        }
        'A' => {
          for (idx, codec) in AudioCodec::ALL.iter().enumerate() {
            if codec.probe_name() == name {
              caps.decodable_audio[idx] = true;
            }
          }
        }
        _ => {}
      }
    }

    for (info, name) in parse_listing_rows(muxers) {
      if name == "mp4" && info.contains('E') {
        caps.mux_mp4 = true;
      }
    }

    // demuxer names are comma lists of aliases, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    for (info, name) in parse_listing_rows(demuxers) {
      if !info.contains('D') {
        continue;
      }
      for alias in name.split(',') {
        match alias {
          "mov" => caps.demux_mov = true,
          "matroska" => caps.demux_matroska = true,
          "avi" => caps.demux_avi = true,
          "mpegts" => caps.demux_mpegts = true,
          "mpeg" => caps.demux_mpeg = true,
          _ => {}
        }
      }
    }

    for name in parse_filter_names(filters) {
      match name.as_str() {
        "zscale" => caps.filter_zscale = true,
        "scale" => caps.filter_scale = true,
        "fps" => caps.filter_fps = true,
        "tonemap" => caps.filter_tonemap = true,
        "format" => caps.filter_format = true,
        "bwdif" => caps.filter_bwdif = true,
        "setsar" => caps.filter_setsar = true,
        _ => {}
      }
    }

    caps
  }

  fn detect(prober: &Path) -> Result<Capabilities> {
    let encoders = run_listing(prober, "-encoders")?;
    let codecs = run_listing(prober, "-codecs")?;
    let muxers = run_listing(prober, "-muxers")?;
    let demuxers = run_listing(prober, "-demuxers")?;
    let filters = run_listing(prober, "-filters")?;
    let caps = Capabilities::from_listings(&encoders, &codecs, &muxers, &demuxers, &filters);
    debug!("capability matrix detected: {caps:?}");
    Ok(caps)
  }
}

fn run_listing(prober: &Path, flag: &str) -> Result<String> {
  let output = Command::new(prober)
    .args(["-hide_banner", flag])
    .output()
    .map_err(|e| Error::Probe(format!("cannot run capability listing {flag}: {e}")))?;
  if !output.status.success() {
    return Err(Error::Probe(format!(
      "capability listing {flag} exited with {:?}",
      output.status.code()
    )));
  }
  Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Splits a listing with a dashed separator line into `(info, name)` rows.
/// The separator's indentation and dash count give the flag column's offset
/// and width; the name is the first whitespace-delimited token after it.
fn parse_listing_rows(output: &str) -> Vec<(String, String)> {
  let mut rows = Vec::new();
  let mut columns: Option<(usize, usize)> = None;
  for line in output.lines() {
    match columns {
      None => {
        let body = line.trim();
        if !body.is_empty() && body.chars().all(|c| c == '-') {
          let offset = line.find('-').expect("separator contains dashes");
          columns = Some((offset, body.len()));
        }
      }
      Some((offset, width)) => {
        let Some(info) = line.get(offset..offset + width) else {
          continue;
        };
        let Some(name) = line
          .get(offset + width..)
          .and_then(|rest| rest.split_whitespace().next())
        else {
          continue;
        };
        rows.push((info.to_owned(), name.to_owned()));
      }
    }
  }
  rows
}

/// The filter listing has no dashed header; rows are `flags name io ...`
/// where the io column contains an arrow.
fn parse_filter_names(output: &str) -> Vec<String> {
  output
    .lines()
    .filter_map(|line| {
      let mut parts = line.split_whitespace();
      let _flags = parts.next()?;
      let name = parts.next()?;
      let io = parts.next()?;
      io.contains("->").then(|| name.to_owned())
    })
    .collect()
}

static CAPABILITIES: OnceCell<Capabilities> = OnceCell::new();

/// The process-wide capability matrix, detecting it on first access. Every
/// reader observes the record fully populated.
pub fn capabilities() -> Result<&'static Capabilities> {
  CAPABILITIES.get_or_try_init(|| {
    let tc = toolchain()?;
    Capabilities::detect(&tc.prober)
  })
}

/// Injects a pre-built matrix, for callers that hoist detection to
/// configuration time (or for tests). A no-op when the matrix is already
/// populated.
pub fn install_capabilities(caps: Capabilities) -> &'static Capabilities {
  CAPABILITIES.get_or_init(|| caps)
}
