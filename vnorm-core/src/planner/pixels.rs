//! Pixel-format selection, color handling and retiming math for re-encoded
//! video streams.

#[cfg(test)]
mod tests;

use crate::catalog::VideoCodec;
use crate::options::{BitsPerChannel, ChromaSubsampling, FpsLimitMode, ResizeOptions};
use crate::util::{even_floor, gcd};

/// Chroma density, ordered 4:2:0 < 4:2:2 < 4:4:4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Chroma {
  C420,
  C422,
  C444,
}

impl Chroma {
  pub const fn rank(self) -> u32 {
    match self {
      Chroma::C420 => 0,
      Chroma::C422 => 1,
      Chroma::C444 => 2,
    }
  }

  const fn from_rank(rank: u32) -> Chroma {
    match rank {
      0 => Chroma::C420,
      1 => Chroma::C422,
      _ => Chroma::C444,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFmtProps {
  pub chroma: Chroma,
  pub bits: u32,
  pub alpha: bool,
}

/// Properties of the pixel formats the planner recognizes. Anything absent
/// from this table is a non-standard format and forces a re-encode into the
/// chosen grid format.
pub fn pix_fmt_properties(name: &str) -> Option<PixFmtProps> {
  let (chroma, bits, alpha) = match name {
    "yuv420p" | "yuvj420p" | "nv12" | "nv21" => (Chroma::C420, 8, false),
    "yuv420p10le" | "p010le" => (Chroma::C420, 10, false),
    "yuv420p12le" => (Chroma::C420, 12, false),
    "yuv422p" | "yuvj422p" | "uyvy422" | "yuyv422" => (Chroma::C422, 8, false),
    "yuv422p10le" => (Chroma::C422, 10, false),
    "yuv422p12le" => (Chroma::C422, 12, false),
    "yuv444p" | "yuvj444p" => (Chroma::C444, 8, false),
    "yuv444p10le" => (Chroma::C444, 10, false),
    "yuv444p12le" => (Chroma::C444, 12, false),
    "gray" => (Chroma::C420, 8, false),
    "gray10le" => (Chroma::C420, 10, false),
    "rgb24" | "bgr24" | "gbrp" | "0rgb" | "rgb0" => (Chroma::C444, 8, false),
    "gbrp10le" => (Chroma::C444, 10, false),
    "yuva420p" => (Chroma::C420, 8, true),
    "yuva422p" => (Chroma::C422, 8, true),
    "yuva444p" => (Chroma::C444, 8, true),
    "yuva420p10le" => (Chroma::C420, 10, true),
    "yuva444p10le" => (Chroma::C444, 10, true),
    "rgba" | "bgra" | "argb" | "abgr" | "gbrap" => (Chroma::C444, 8, true),
    _ => return None,
  };
  Some(PixFmtProps { chroma, bits, alpha })
}

/// The planar output format for every cell of the (chroma, bits) grid.
pub const fn grid_pix_fmt(chroma: Chroma, bits: u32) -> &'static str {
  match (chroma, bits) {
    (Chroma::C420, 8) => "yuv420p",
    (Chroma::C420, 10) => "yuv420p10le",
    (Chroma::C420, _) => "yuv420p12le",
    (Chroma::C422, 8) => "yuv422p",
    (Chroma::C422, 10) => "yuv422p10le",
    (Chroma::C422, _) => "yuv422p12le",
    (Chroma::C444, 8) => "yuv444p",
    (Chroma::C444, 10) => "yuv444p10le",
    (Chroma::C444, _) => "yuv444p12le",
  }
}

/// Picks the output pixel format for a re-encode: the source's chroma and
/// bit depth, clamped by the configured maxima and by what the target codec
/// can carry (H.264 tops out at 10 bits per channel).
pub fn choose_pix_fmt(
  source: Option<PixFmtProps>,
  max_bits: BitsPerChannel,
  max_chroma: ChromaSubsampling,
  codec: VideoCodec,
) -> &'static str {
  let current = source.unwrap_or(PixFmtProps {
    chroma: Chroma::C420,
    bits: 8,
    alpha: false,
  });
  let mut chroma_rank = current.chroma.rank();
  if let Some(limit) = max_chroma.rank() {
    chroma_rank = chroma_rank.min(limit);
  }
  let mut bits = current.bits;
  if let Some(limit) = max_bits.limit() {
    bits = bits.min(limit);
  }
  if codec == VideoCodec::H264 {
    bits = bits.min(10);
  }
  // snap to the grid
  let bits = match bits {
    0..=8 => 8,
    9 | 10 => 10,
    _ => 12,
  };
  grid_pix_fmt(Chroma::from_rank(chroma_rank), bits)
}

/// Does the source exceed the configured bit depth?
pub fn bits_exceed(source: Option<PixFmtProps>, max_bits: BitsPerChannel) -> bool {
  match (source, max_bits.limit()) {
    (Some(props), Some(limit)) => props.bits > limit,
    _ => false,
  }
}

/// Does the source exceed the configured chroma density?
pub fn chroma_exceeds(source: Option<PixFmtProps>, max_chroma: ChromaSubsampling) -> bool {
  match (source, max_chroma.rank()) {
    (Some(props), Some(limit)) => props.chroma.rank() > limit,
    _ => false,
  }
}

/// High-dynamic-range transfer characteristics (PQ and HLG), plus wide-gamut
/// primaries that imply an HDR grade.
pub fn is_hdr(transfer: Option<&str>, primaries: Option<&str>) -> bool {
  matches!(transfer, Some("smpte2084") | Some("arib-std-b67"))
    || matches!(primaries, Some("bt2020"))
}

/// True when the color metadata names a standard-dynamic-range profile or
/// is absent entirely (absent metadata is treated as SDR).
pub fn is_known_sdr(primaries: Option<&str>, transfer: Option<&str>) -> bool {
  let primaries_sdr = match primaries {
    None => true,
    Some(p) => matches!(p, "bt709" | "smpte170m" | "bt470bg" | "bt470m" | "smpte240m" | "film"),
  };
  let transfer_sdr = match transfer {
    None => true,
    Some(t) => matches!(
      t,
      "bt709" | "smpte170m" | "bt470bg" | "bt470m" | "gamma22" | "gamma28" | "smpte240m"
        | "iec61966-2-1" | "srgb" | "linear"
    ),
  };
  primaries_sdr && transfer_sdr
}

/// The HDR to SDR remap chain: linearize, float GBR planes, BT.709
/// primaries, Mobius tonemap, BT.709 transfer and matrix at PC range, then
/// the chosen output format.
pub fn hdr_to_sdr_chain(target_pix_fmt: &str, preserve_alpha: bool) -> String {
  let float_fmt = if preserve_alpha { "gbrapf32le" } else { "gbrpf32le" };
  format!(
    "zscale=transfer=linear,format={float_fmt},zscale=primaries=709,tonemap=mobius,\
     zscale=transfer=709:matrix=709:range=pc,format={target_pix_fmt}"
  )
}

/// Retimed output rate under an fps cap, `None` when the source is already
/// at or under the target.
pub fn limit_fps(
  fps_num: i64,
  fps_den: i64,
  mode: FpsLimitMode,
  target_fps: u32,
) -> Option<(i64, i64)> {
  if fps_num <= 0 || fps_den <= 0 {
    return None;
  }
  let target = i64::from(target_fps);
  if fps_num <= target * fps_den {
    return None;
  }
  match mode {
    FpsLimitMode::LimitToExact => Some((target, 1)),
    FpsLimitMode::LimitByIntegerDivision => {
      // smallest integer divisor that brings the rate at or under the target
      let div = (fps_num + target * fps_den - 1) / (target * fps_den);
      if div <= 1 {
        return None;
      }
      let g = gcd(fps_num, div);
      Some((fps_num / g, fps_den * (div / g)))
    }
  }
}

/// Fit-inside resize preserving aspect ratio, `None` when the source already
/// fits the bounding box. Output dimensions are floored to even values.
pub fn fit_resize(width: i64, height: i64, bounds: ResizeOptions) -> Option<(i64, i64)> {
  let (bw, bh) = (i64::from(bounds.width), i64::from(bounds.height));
  if width <= bw && height <= bh {
    return None;
  }
  let scale = (bw as f64 / width as f64).min(bh as f64 / height as f64);
  let new_w = even_floor((width as f64 * scale).floor() as i64);
  let new_h = even_floor((height as f64 * scale).floor() as i64);
  Some((new_w.min(bw.max(2)), new_h.min(bh.max(2))))
}
