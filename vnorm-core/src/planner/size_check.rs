//! The re-encode-if-smaller measurement pass: extract each tracked stream
//! from both the transcoded result and the normalized source, compare file
//! sizes, and synthesize the final mix command when originals win.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::{MapDirective, StreamKind, StreamOverride, StreamSelector, ToolCommand};
use crate::context::FileContext;
use crate::error::Result;
use crate::options::ProcessingOptions;
use crate::planner::plan::{CommandPlan, SizeCheckEntry};
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SizeDecision {
  pub entry: SizeCheckEntry,
  pub keep_original: bool,
}

fn copy_all_override() -> StreamOverride {
  StreamOverride {
    codec: Some("copy".into()),
    ..StreamOverride::default()
  }
}

async fn extract_stream_size(
  tc: &Toolchain,
  ctx: &dyn FileContext,
  input: &Path,
  map: MapDirective,
  extension: &str,
  cancel: &CancellationToken,
) -> Result<u64> {
  let out = ctx.new_work_file(extension)?;
  let cmd = ToolCommand {
    inputs: vec![input.to_path_buf()],
    maps: vec![map],
    overrides: vec![copy_all_override()],
    output: out.clone(),
    ..ToolCommand::default()
  };
  tc.pool()
    .run_with_error::<tokio::fs::File>(&tc.transcoder, &cmd.to_args(), None, true, cancel)
    .await?;
  Ok(tokio::fs::metadata(&out).await?.len())
}

/// Extracts every tracked stream from both files and records which original
/// came out smaller.
pub(crate) async fn measure(
  tc: &Toolchain,
  ctx: &dyn FileContext,
  source: &Path,
  transcoded: &Path,
  options: &ProcessingOptions,
  entries: &[SizeCheckEntry],
  cancel: &CancellationToken,
) -> Result<Vec<SizeDecision>> {
  let mut decisions = Vec::with_capacity(entries.len());
  for entry in entries {
    let original_size = extract_stream_size(
      tc,
      ctx,
      source,
      MapDirective::stream(0, StreamSelector::at(StreamKind::Any, entry.input_index)),
      entry.extension,
      cancel,
    )
    .await?;
    let target_extension = match entry.kind {
      StreamKind::Video => options.canonical_video_codec().writable_extension(),
      StreamKind::Audio => options.canonical_audio_codec().writable_extension(),
      _ => "mkv",
    };
    let encoded_size = extract_stream_size(
      tc,
      ctx,
      transcoded,
      MapDirective::stream(0, StreamSelector::at(entry.kind, entry.output_index)),
      target_extension,
      cancel,
    )
    .await?;
    let keep_original = original_size < encoded_size && !entry.needs_reencode_for_mp4;
    debug!(
      "size check stream {}: original {original_size}B vs encoded {encoded_size}B -> keep {}",
      entry.input_index,
      if keep_original { "original" } else { "encoded" }
    );
    decisions.push(SizeDecision {
      entry: *entry,
      keep_original,
    });
  }
  Ok(decisions)
}

/// Builds the final command mixing kept-original streams (file 0) into the
/// transcoded result (file 1), preserving the metadata overrides of the
/// main command.
pub(crate) fn build_mix_command(
  source: &Path,
  transcoded: &Path,
  plan: &CommandPlan,
  decisions: &[SizeDecision],
  options: &ProcessingOptions,
  output: std::path::PathBuf,
) -> ToolCommand {
  let mut maps = vec![MapDirective::whole_input(1)];
  for decision in decisions.iter().filter(|d| d.keep_original) {
    maps.push(MapDirective::exclude(
      1,
      StreamSelector::at(decision.entry.kind, decision.entry.output_index),
    ));
    maps.push(MapDirective::stream(
      0,
      StreamSelector::at(StreamKind::Any, decision.entry.input_index),
    ));
  }
  ToolCommand {
    inputs: vec![source.to_path_buf(), transcoded.to_path_buf()],
    maps,
    overrides: vec![copy_all_override()],
    map_metadata: plan.map_metadata,
    map_chapters: plan.map_chapters,
    emit_movflags: true,
    progressive_download: options.force_progressive_download,
    output,
    ..ToolCommand::default()
  }
}
