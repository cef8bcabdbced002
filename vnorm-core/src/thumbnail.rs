//! Secondary pipeline: pick one video stream, seek to a representative
//! moment, and extract a single bounded PNG frame.


use std::path::PathBuf;

use tracing::{debug, info};

use crate::command::{MapDirective, SeekSpec, StreamKind, StreamOverride, StreamSelector, ToolCommand};
use crate::context::FileContext;
use crate::error::{Error, Result};
use crate::planner::pixels;
use crate::probe::{probe_file, FileInfo, Stream, VideoStream};
use crate::toolchain::toolchain;

/// Hard toolchain bound on either output dimension.
const MAX_DIMENSION: i64 = 32767;

/// Default bounding box applied when the caller sets no bounds.
const DEFAULT_BOUND: u32 = 480;

#[derive(Debug, Clone)]
pub struct ThumbnailOptions {
  /// Seek position in seconds from the start.
  pub absolute_seconds: Option<f64>,
  /// Seek position as a fraction of the source duration, in [0, 1].
  pub fraction: Option<f64>,
  /// Whether attached pictures and scrubbing thumbnails are eligible
  /// sources.
  pub include_thumbnail_video_streams: bool,
  pub remap_hdr_to_sdr: bool,
  pub force_square_pixels: bool,
  pub max_width: u32,
  pub max_height: u32,
  /// Decoded-RGBA byte budget for the output frame.
  pub max_pixel_bytes: Option<u64>,
}

impl Default for ThumbnailOptions {
  fn default() -> ThumbnailOptions {
    ThumbnailOptions {
      absolute_seconds: None,
      fraction: None,
      include_thumbnail_video_streams: true,
      remap_hdr_to_sdr: true,
      force_square_pixels: true,
      max_width: DEFAULT_BOUND,
      max_height: DEFAULT_BOUND,
      max_pixel_bytes: None,
    }
  }
}

/// Ascending priority score for thumbnail stream selection; lower wins,
/// ties break by input order.
pub(crate) fn thumbnail_score(stream: &VideoStream, include_thumbnails: bool) -> u32 {
  if stream.is_thumbnail_stream() {
    if include_thumbnails {
      if stream.is_default() {
        0
      } else {
        1
      }
    } else {
      7
    }
  } else if stream.is_still_image() {
    if stream.is_default() {
      2
    } else {
      3
    }
  } else if stream.is_bad_candidate_for_thumbnail() {
    6
  } else if stream.is_default() {
    4
  } else {
    5
  }
}

/// Picks the best-ranked video stream, returning its input index.
pub(crate) fn select_stream<'a>(
  info: &'a FileInfo,
  include_thumbnails: bool,
) -> Option<(usize, &'a VideoStream)> {
  let mut best: Option<(u32, usize, &VideoStream)> = None;
  for (index, stream) in info.streams.iter().enumerate() {
    if let Stream::Video(v) = stream {
      let score = thumbnail_score(v, include_thumbnails);
      if best.map_or(true, |(s, _, _)| score < s) {
        best = Some((score, index, v));
      }
    }
  }
  best.map(|(_, index, stream)| (index, stream))
}

/// The seek timestamp, `None` for stills and thumbnail streams where
/// seeking is meaningless.
pub(crate) fn select_timestamp(
  stream: &VideoStream,
  options: &ThumbnailOptions,
  duration: Option<f64>,
) -> Result<Option<f64>> {
  if stream.is_thumbnail_stream() || stream.is_still_image() {
    return Ok(None);
  }
  let fractional = match options.fraction {
    Some(fraction) => {
      let duration = duration.ok_or_else(|| {
        Error::Validation("cannot seek by fraction: source duration is unknown".into())
      })?;
      Some(fraction.clamp(0.0, 1.0) * duration)
    }
    None => None,
  };
  match (options.absolute_seconds, fractional) {
    (Some(a), Some(f)) => Ok(Some(a.min(f))),
    (Some(a), None) => Ok(Some(a)),
    (None, Some(f)) => Ok(Some(f)),
    (None, None) => Err(Error::Validation(
      "no thumbnail timestamp: set absolute seconds or a fraction".into(),
    )),
  }
}

/// Output dimensions honoring the square-pixel request, the per-side
/// toolchain bound, the bounding box, and the pixel-byte budget.
pub(crate) fn plan_dimensions(stream: &VideoStream, options: &ThumbnailOptions) -> Result<(i64, i64)> {
  if stream.width <= 0 || stream.height <= 0 {
    return Err(Error::Validation(
      "cannot make a thumbnail from a stream with unknown dimensions".into(),
    ));
  }
  let mut width = stream.width;
  let mut height = stream.height;
  if options.force_square_pixels {
    let sar = stream.sar();
    if sar > 1.0 {
      width = ((width as f64) * sar).round() as i64;
    } else if sar < 1.0 {
      height = ((height as f64) / sar).round() as i64;
    }
  }
  width = width.min(MAX_DIMENSION);
  height = height.min(MAX_DIMENSION);

  let (bw, bh) = (i64::from(options.max_width), i64::from(options.max_height));
  if width > bw || height > bh {
    let scale = (bw as f64 / width as f64).min(bh as f64 / height as f64);
    width = ((width as f64) * scale).floor().max(1.0) as i64;
    height = ((height as f64) * scale).floor().max(1.0) as i64;
  }

  if let Some(budget) = options.max_pixel_bytes {
    // 4 bytes per decoded pixel; shrink until the frame fits
    while (width * height * 4) as u64 > budget && width > 1 && height > 1 {
      let factor = (budget as f64 / (width * height * 4) as f64).sqrt();
      let next_w = ((width as f64) * factor).floor().max(1.0) as i64;
      let next_h = ((height as f64) * factor).floor().max(1.0) as i64;
      // always make progress, even when the factor rounds to a no-op
      width = next_w.min(width - 1).max(1);
      height = next_h.min(height - 1).max(1);
    }
  }
  Ok((width, height))
}

fn plan_filters(stream: &VideoStream, options: &ThumbnailOptions, width: i64, height: i64) -> Option<String> {
  let mut parts: Vec<String> = Vec::new();
  if width != stream.width || height != stream.height {
    parts.push(format!("scale=w={width}:h={height}"));
  }
  let sdr = pixels::is_known_sdr(
    stream.color_primaries.as_deref(),
    stream.color_transfer.as_deref(),
  );
  if !sdr && options.remap_hdr_to_sdr {
    let alpha = stream
      .pix_fmt
      .as_deref()
      .and_then(pixels::pix_fmt_properties)
      .map_or(false, |p| p.alpha)
      || stream.tags.alpha_mode.is_some();
    parts.push(pixels::hdr_to_sdr_chain("rgb24", alpha));
  }
  if options.force_square_pixels {
    parts.push("setsar=1".into());
  }
  if parts.is_empty() {
    None
  } else {
    Some(parts.join(","))
  }
}

/// Extracts one frame of the best video stream into a PNG work file.
///
/// Failed attempts walk a retry ladder: the computed seek, then the same
/// offset taken from the end, then whichever end the request was closer to.
/// When every rung fails, the first error is re-raised since it carries the
/// most diagnostic message.
pub async fn extract_thumbnail(ctx: &dyn FileContext, options: &ThumbnailOptions) -> Result<PathBuf> {
  let tc = toolchain()?;
  let cancel = ctx.cancellation().clone();
  let source = ctx.source_file()?;
  let info = probe_file(&source, &cancel).await?;

  let (index, stream) = select_stream(&info, options.include_thumbnail_video_streams)
    .ok_or_else(|| Error::Validation("no video streams to take a thumbnail from".into()))?;
  let duration = info.effective_duration();
  let seek_seconds = select_timestamp(stream, options, duration)?;
  let (width, height) = plan_dimensions(stream, options)?;
  let filters = plan_filters(stream, options, width, height);
  let output = ctx.new_work_file("png")?;
  debug!(
    "thumbnail from stream {index} at {seek_seconds:?}s into {width}x{height} ({})",
    output.display()
  );

  let attempt = |seek: Option<SeekSpec>| {
    let mut video = StreamOverride::for_stream(StreamSelector::of_kind(StreamKind::Video));
    video.codec = Some("png".into());
    video.filter = filters.clone();
    let cmd = ToolCommand {
      inputs: vec![source.clone()],
      seek,
      maps: vec![MapDirective::stream(0, StreamSelector::at(StreamKind::Any, index))],
      overrides: vec![video],
      video_frames: Some(1),
      format: Some("image2".into()),
      output: output.clone(),
      ..ToolCommand::default()
    };
    let args = cmd.to_args();
    let cancel = cancel.clone();
    async move {
      tc.pool()
        .run_with_error::<tokio::fs::File>(&tc.transcoder, &args, None, true, &cancel)
        .await
    }
  };

  let first_error = match attempt(seek_seconds.map(|s| SeekSpec { seconds: s, from_end: false })).await {
    Ok(()) => {
      info!("thumbnail extracted to {}", output.display());
      return Ok(output);
    }
    Err(e) if e.is_cancelled() => return Err(e),
    Err(e) => e,
  };

  if let (Some(seek), Some(total)) = (seek_seconds, duration) {
    match attempt(Some(SeekSpec {
      seconds: seek - total,
      from_end: true,
    }))
    .await
    {
      Ok(()) => return Ok(output),
      Err(e) if e.is_cancelled() => return Err(e),
      Err(_) => {}
    }
    let from_end = seek > total / 2.0;
    match attempt(Some(SeekSpec {
      seconds: 0.0,
      from_end,
    }))
    .await
    {
      Ok(()) => return Ok(output),
      Err(e) if e.is_cancelled() => return Err(e),
      Err(_) => {}
    }
  }

  Err(first_error.attribute_to(ctx.file_id()))
}
