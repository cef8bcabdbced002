//! The processing planner: probes the source, validates it against the
//! configured acceptance rules, walks the streams deciding copy vs
//! re-encode, and drives the toolchain to one of three terminal states:
//! return the original, return a transcode, or fail.

pub(crate) mod pixels;
mod plan;
mod size_check;
mod validate;


use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capabilities::capabilities;
use crate::catalog::{AudioCodec, VideoCodec};
use crate::command::{MapDirective, StreamKind, StreamOverride, StreamSelector, ToolCommand};
use crate::context::FileContext;
use crate::error::{Error, Result};
use crate::options::ProcessingOptions;
use crate::probe::{probe_file, FileInfo, Stream};
use crate::progress::{ProgressReporter, ProgressTag};
use crate::toolchain::{toolchain, Toolchain};

use validate::StreamsAnalysis;

/// Progress budget reserved for the optional full-decode validation pass.
const VALIDATION_RESERVED: f64 = 0.20;
/// Progress budget reserved for per-stream compatibility probing.
const COMPAT_RESERVED: f64 = 0.10;
/// Progress held back for the size-compare and mix passes.
const TAIL_RESERVED: f64 = 0.05;

/// Outcome of a processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
  pub path: PathBuf,
  /// False only when the returned file is byte-identical to the source
  /// (the extension may still have been normalized).
  pub has_changes: bool,
}

/// Transforms the context's source file according to `options`.
pub async fn process(ctx: &dyn FileContext, options: &ProcessingOptions) -> Result<ProcessingResult> {
  match run(ctx, options).await {
    Ok(result) => Ok(result),
    Err(e) => match e {
      // cancellation and environment problems are not the file's fault
      Error::Cancelled | Error::Configuration(_) => Err(e),
      other => Err(other.attribute_to(ctx.file_id())),
    },
  }
}

struct RemuxNeed {
  required: bool,
  guaranteed: bool,
}

/// Stage (f): does the output have to be a fresh container at all, and is
/// that forced by a non-optional reason?
fn compute_remux_need(
  info: &FileInfo,
  analysis: &StreamsAnalysis,
  options: &ProcessingOptions,
) -> RemuxNeed {
  let format_in_result = options
    .result_formats
    .iter()
    .any(|f| f.name_matches(&info.format_name));

  let mut guaranteed_stream_work = false;
  for (index, stream) in info.streams.iter().enumerate() {
    match stream {
      Stream::Video(v) if v.is_thumbnail_stream() => {
        if options.metadata_stripping_mode.drops_thumbnails() {
          guaranteed_stream_work = true;
        }
      }
      Stream::Video(_) => {
        let codec_ok = analysis
          .video
          .get(&index)
          .and_then(|a| a.codec)
          .map_or(false, |c| options.result_video_codecs.contains(&c));
        if !codec_ok || options.video_reencode_mode != crate::options::ReencodeMode::AvoidReencoding {
          guaranteed_stream_work = true;
        }
      }
      Stream::Audio(_) => {
        if options.remove_audio_streams {
          guaranteed_stream_work = true;
          continue;
        }
        let codec_ok = analysis
          .audio
          .get(&index)
          .and_then(|a| a.codec)
          .map_or(false, |c| options.result_audio_codecs.contains(&c));
        if !codec_ok || options.audio_reencode_mode != crate::options::ReencodeMode::AvoidReencoding {
          guaranteed_stream_work = true;
        }
      }
      Stream::Subtitle(_) | Stream::Unrecognized(_) => {}
    }
  }

  let guaranteed = !format_in_result
    || options.metadata_stripping_mode == crate::options::MetadataStrippingMode::Required
    || options.force_progressive_download
    || guaranteed_stream_work;
  RemuxNeed {
    required: guaranteed || analysis.any_optional_reencode,
    guaranteed,
  }
}

/// Stage (g) fast path: every stream provably copies into the target
/// container, so per-stream probing can be skipped.
fn all_known_compatible(info: &FileInfo, options: &ProcessingOptions) -> bool {
  info.streams.iter().all(|stream| match stream {
    Stream::Video(v) => {
      match v.codec_name.as_deref().and_then(VideoCodec::from_probe_name) {
        Some(codec) => {
          codec.supports_mp4_muxing()
            || (v.is_thumbnail_stream() && matches!(codec, VideoCodec::Mjpeg | VideoCodec::Png))
        }
        None => false,
      }
    }
    Stream::Audio(a) => {
      if options.remove_audio_streams {
        return true;
      }
      a.codec_name
        .as_deref()
        .and_then(|name| AudioCodec::from_probe(name, a.profile.as_deref()))
        .map_or(false, |c| c.supports_mp4_muxing())
    }
    Stream::Subtitle(_) | Stream::Unrecognized(_) => false,
  })
}

fn copy_all_override() -> StreamOverride {
  StreamOverride {
    codec: Some("copy".into()),
    ..StreamOverride::default()
  }
}

async fn run(ctx: &dyn FileContext, options: &ProcessingOptions) -> Result<ProcessingResult> {
  options.validate()?;
  let tc = toolchain()?;
  let caps = capabilities()?;
  let cancel = ctx.cancellation().clone();
  let progress = ProgressReporter::new(
    options.progress_callback.clone(),
    ProgressTag {
      file_id: ctx.file_id().to_owned(),
      variant_id: ctx.variant_id().to_owned(),
    },
  );

  // (a) acquire and probe the source
  let source = ctx.source_file()?;
  let mut info = probe_file(&source, &cancel).await?;
  debug!(
    "probed {}: format {}, {} streams",
    source.display(),
    info.format_name,
    info.streams.len()
  );

  // (b) identify the container
  let source_format = options
    .source_formats
    .iter()
    .copied()
    .find(|f| f.name_matches(&info.format_name))
    .ok_or_else(|| Error::Format(format!("unsupported source format {}", info.format_name)))?;

  // (c) normalize a misleading extension, re-probing to catch spoofing
  let mut normalized = source.clone();
  let mut ext_changed = false;
  if !source_format.common_extensions().contains(&ctx.extension()) {
    let renamed = ctx.new_work_file(source_format.primary_extension())?;
    tokio::fs::copy(&source, &renamed).await?;
    let reprobed = probe_file(&renamed, &cancel).await?;
    if reprobed.format_name != info.format_name {
      return Err(Error::Format(format!(
        "format name changed after extension normalization: {} became {}",
        info.format_name, reprobed.format_name
      )));
    }
    info!(
      "normalized extension .{} to .{}",
      ctx.extension(),
      source_format.primary_extension()
    );
    info = reprobed;
    normalized = renamed;
    ext_changed = true;
  }

  // (d) per-stream validation and trigger analysis
  let analysis = validate::analyze(&info, options)?;

  // (e) optional full-decode validation
  let mut duration = info.effective_duration();
  let mut progress_used = 0.0;
  if options.force_validate_all_streams {
    let measured = run_validation_pass(tc, ctx, &normalized, duration, &progress, &cancel).await?;
    progress_used = VALIDATION_RESERVED;
    if let Some(measured) = measured {
      validate::check_measured_duration(measured, options)?;
      duration = Some(measured);
    }
  }

  // (f) remux necessity
  let remux = compute_remux_need(&info, &analysis, options);
  if !remux.required {
    if options.throw_when_reencode_optional {
      return Err(Error::ReencodeOptional);
    }
    progress.report(1.0);
    info!("returning original: no remux or re-encode required");
    return Ok(ProcessingResult {
      path: normalized,
      has_changes: ext_changed,
    });
  }

  // (g) container compatibility per stream
  let compat = if all_known_compatible(&info, options) {
    vec![true; info.streams.len()]
  } else {
    let verdicts =
      probe_compatibility(tc, ctx, &normalized, info.streams.len(), progress_used, &progress, &cancel)
        .await?;
    progress_used += COMPAT_RESERVED;
    verdicts
  };

  // (h) build the override lists
  let plan = plan::build_plan(&info, options, caps, &compat, &analysis)?;

  // (i) run the main command
  let transcoded = ctx.new_work_file(options.canonical_format().primary_extension())?;
  let progress_path = ctx.new_work_file("txt")?;
  let main_cmd = ToolCommand {
    inputs: vec![normalized.clone()],
    map_chapters: plan.map_chapters,
    map_metadata: plan.map_metadata,
    maps: plan.maps.clone(),
    overrides: plan.overrides.clone(),
    emit_movflags: true,
    progressive_download: options.force_progressive_download,
    progress_file: Some(progress_path.clone()),
    output: transcoded.clone(),
    ..ToolCommand::default()
  };
  {
    let range = progress.range(progress_used, 1.0 - TAIL_RESERVED);
    tc.pool()
      .run_raw_with_progress(
        &tc.transcoder,
        &main_cmd.to_args(),
        &progress_path,
        false,
        &cancel,
        |seconds| {
          if let Some(total) = duration.filter(|d| *d > 0.0) {
            range.report(seconds / total);
          }
        },
      )
      .await?;
    range.report(1.0);
  }

  // (j) size-compare pass for streams re-encoded only to try for a smaller file
  let mut final_path = transcoded.clone();
  if !plan.size_checks.is_empty() {
    let decisions =
      size_check::measure(tc, ctx, &normalized, &transcoded, options, &plan.size_checks, &cancel)
        .await?;
    let all_original = decisions.iter().all(|d| d.keep_original);
    let any_original = decisions.iter().any(|d| d.keep_original);
    if all_original && !remux.guaranteed {
      progress.report(1.0);
      info!("every tracked stream is smaller in the source; returning original");
      return Ok(ProcessingResult {
        path: normalized,
        has_changes: ext_changed,
      });
    }
    if any_original {
      let mixed = ctx.new_work_file(options.canonical_format().primary_extension())?;
      let mix_cmd =
        size_check::build_mix_command(&normalized, &transcoded, &plan, &decisions, options, mixed.clone());
      tc.pool()
        .run_with_error::<tokio::fs::File>(&tc.transcoder, &mix_cmd.to_args(), None, false, &cancel)
        .await?;
      final_path = mixed;
    }
  }

  // (k) done
  progress.report(1.0);
  Ok(ProcessingResult {
    path: final_path,
    has_changes: true,
  })
}

/// Stage (e): decode every stream into the null sink with `-xerror`,
/// reporting progress into the reserved prefix and measuring the true
/// duration from the final progress sample.
async fn run_validation_pass(
  tc: &Toolchain,
  ctx: &dyn FileContext,
  source: &std::path::Path,
  duration_estimate: Option<f64>,
  progress: &ProgressReporter,
  cancel: &CancellationToken,
) -> Result<Option<f64>> {
  let progress_path = ctx.new_work_file("txt")?;
  let cmd = ToolCommand {
    inputs: vec![source.to_path_buf()],
    progress_file: Some(progress_path.clone()),
    format: Some("null".into()),
    output: PathBuf::from("-"),
    ..ToolCommand::default()
  };
  let range = progress.range(0.0, VALIDATION_RESERVED);
  let mut measured: f64 = 0.0;
  tc.pool()
    .run_raw_with_progress(
      &tc.transcoder,
      &cmd.to_args(),
      &progress_path,
      true,
      cancel,
      |seconds| {
        measured = measured.max(seconds);
        if let Some(total) = duration_estimate.filter(|d| *d > 0.0) {
          range.report(seconds / total);
        }
      },
    )
    .await?;
  range.report(1.0);
  Ok((measured > 0.0).then_some(measured))
}

/// Stage (g): minimal copy-into-target probe per stream; exit code zero
/// means the stream muxes into the target container.
async fn probe_compatibility(
  tc: &Toolchain,
  ctx: &dyn FileContext,
  source: &std::path::Path,
  stream_count: usize,
  progress_used: f64,
  progress: &ProgressReporter,
  cancel: &CancellationToken,
) -> Result<Vec<bool>> {
  let scratch = ctx.new_work_file("mp4")?;
  let range = progress.range(progress_used, progress_used + COMPAT_RESERVED);
  let mut verdicts = Vec::with_capacity(stream_count);
  for index in 0..stream_count {
    let cmd = ToolCommand {
      inputs: vec![source.to_path_buf()],
      maps: vec![MapDirective::stream(0, StreamSelector::at(StreamKind::Any, index))],
      overrides: vec![copy_all_override()],
      format: Some("mp4".into()),
      output: scratch.clone(),
      ..ToolCommand::default()
    };
    let outcome = tc
      .pool()
      .run_to_strings(&tc.transcoder, &cmd.to_args(), true, cancel)
      .await?;
    debug!(
      "compatibility probe for stream {index}: {}",
      if outcome.success() { "copyable" } else { "needs transcode" }
    );
    verdicts.push(outcome.success());
    range.report((index + 1) as f64 / stream_count as f64);
  }
  Ok(verdicts)
}
