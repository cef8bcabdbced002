//! Command-line interface over the normalization core: argument parsing,
//! logging setup, toolchain discovery and progress rendering.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{AppSettings, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use path_abs::{PathAbs, PathInfo};
use tracing::level_filters::LevelFilter;

use vnorm_core::{
  configure_with_toolchain, extract_thumbnail, process, BitsPerChannel, ChromaSubsampling,
  FpsLimitMode, FpsOptions, MetadataStrippingMode, OptionsOverrides, ProcessingOptions,
  ReencodeMode, ResizeOptions, ThumbnailOptions, WorkDirContext,
};

#[derive(Parser, Debug)]
#[clap(name = "vnorm", version, setting = AppSettings::DeriveDisplayOrder)]
/// Normalize video files through an external media toolchain.
pub struct Args {
  /// Directory containing the transcoder and probe binaries; searched in
  /// PATH when omitted.
  #[clap(long, parse(from_os_str))]
  pub toolchain_dir: Option<PathBuf>,

  /// Maximum concurrently running toolchain processes.
  #[clap(long, default_value_t = vnorm_core::DEFAULT_MAX_CONCURRENT_PROCESSES)]
  pub max_processes: usize,

  /// Also write a debug-level log file.
  #[clap(long, parse(from_os_str))]
  pub log_file: Option<PathBuf>,

  /// Quiet console output (warnings and errors only).
  #[clap(short, long)]
  pub quiet: bool,

  #[clap(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Remux or re-encode a source into a standardized mp4.
  Normalize {
    #[clap(parse(from_os_str))]
    input: PathBuf,

    /// Output path; defaults to the input name with an mp4 extension.
    #[clap(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Baseline option preset.
    #[clap(long, possible_values = &["preserve", "standard"], default_value = "standard")]
    preset: String,

    /// Re-encode policy for video streams.
    #[clap(long, possible_values = &["always", "avoid", "smallest"])]
    video_mode: Option<ReencodeMode>,

    /// Re-encode policy for audio streams.
    #[clap(long, possible_values = &["always", "avoid", "smallest"])]
    audio_mode: Option<ReencodeMode>,

    /// Tonemap HDR sources down to SDR.
    #[clap(long)]
    remap_hdr_to_sdr: bool,

    /// Upper bound on bits per channel.
    #[clap(long, possible_values = &["preserve", "8", "10", "12"])]
    max_bits: Option<BitsPerChannel>,

    /// Upper bound on chroma subsampling density.
    #[clap(long, possible_values = &["preserve", "420", "422", "444"])]
    max_chroma: Option<ChromaSubsampling>,

    /// Fit video inside this width (requires --max-height).
    #[clap(long, requires = "max-height")]
    max_width: Option<u32>,

    /// Fit video inside this height (requires --max-width).
    #[clap(long, requires = "max-width")]
    max_height: Option<u32>,

    /// Cap the frame rate at this many frames per second.
    #[clap(long)]
    fps_limit: Option<u32>,

    /// Force the fps cap exactly instead of dividing the source rate.
    #[clap(long, requires = "fps-limit")]
    fps_exact: bool,

    /// Downmix audio to at most this many channels.
    #[clap(long)]
    max_channels: Option<u32>,

    /// Resample audio to at most this rate.
    #[clap(long)]
    max_sample_rate: Option<u32>,

    /// Metadata stripping policy.
    #[clap(long, possible_values = &["none", "thumbnail-only", "preferred", "required"])]
    metadata: Option<MetadataStrippingMode>,

    /// Lay the file out for progressive download.
    #[clap(long)]
    faststart: bool,

    /// Fully decode every stream before processing.
    #[clap(long)]
    validate_streams: bool,

    /// Drop all audio streams.
    #[clap(long)]
    remove_audio: bool,
  },
  /// Extract a single PNG frame.
  Thumbnail {
    #[clap(parse(from_os_str))]
    input: PathBuf,

    /// Output path; defaults to the input name with a png extension.
    #[clap(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Seek position in seconds.
    #[clap(long)]
    at: Option<f64>,

    /// Seek position as a fraction of the duration.
    #[clap(long)]
    fraction: Option<f64>,

    #[clap(long, default_value_t = 480)]
    max_width: u32,

    #[clap(long, default_value_t = 480)]
    max_height: u32,

    /// Keep HDR color instead of tonemapping to SDR.
    #[clap(long)]
    no_hdr_remap: bool,

    /// Allow embedded cover art as the thumbnail source.
    #[clap(long)]
    include_cover_art: bool,
  },
}

/// Finds the directory holding the toolchain binaries: an explicit flag
/// wins, otherwise the first PATH entry that contains the transcoder.
fn resolve_toolchain_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
  if let Some(dir) = explicit {
    return Ok(dir);
  }
  let transcoder = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
  let path = env::var_os("PATH").context("PATH is not set and no --toolchain-dir given")?;
  for dir in env::split_paths(&path) {
    if dir.join(transcoder).is_file() {
      return Ok(dir);
    }
  }
  bail!("no toolchain found in PATH; pass --toolchain-dir");
}

fn progress_bar() -> ProgressBar {
  let bar = ProgressBar::new(1000);
  bar.set_style(
    ProgressStyle::with_template("{wide_bar:.cyan/blue} {percent:>3}%")
      .expect("static progress template parses"),
  );
  bar
}

fn work_dir_for(input: &Path) -> PathBuf {
  env::temp_dir().join(format!(
    "vnorm-{}-{}",
    std::process::id(),
    input.file_stem().and_then(|s| s.to_str()).unwrap_or("work")
  ))
}

async fn run_normalize(
  input: PathBuf,
  output: Option<PathBuf>,
  options: ProcessingOptions,
) -> anyhow::Result<()> {
  let input = PathAbs::new(&input)
    .with_context(|| format!("cannot resolve input path {}", input.display()))?
    .as_path()
    .to_path_buf();
  let output = output.unwrap_or_else(|| input.with_extension("normalized.mp4"));
  let work_dir = work_dir_for(&input);
  let ctx = WorkDirContext::new(input.clone(), work_dir.clone(), "normalize")?;

  let bar = progress_bar();
  let bar_handle = bar.clone();
  let mut options = options;
  options.progress_callback = Some(Arc::new(
    move |_tag: &vnorm_core::ProgressTag, fraction: f64| {
      bar_handle.set_position((fraction * 1000.0) as u64);
    },
  ));

  let result = process(&ctx, &options).await;
  bar.finish_and_clear();
  let result = result?;

  if result.path == input {
    println!("{}: already normalized, nothing to do", input.display());
  } else {
    tokio::fs::copy(&result.path, &output)
      .await
      .with_context(|| format!("cannot write output to {}", output.display()))?;
    println!("{} -> {}", input.display(), output.display());
  }
  let _ = tokio::fs::remove_dir_all(&work_dir).await;
  Ok(())
}

async fn run_thumbnail(
  input: PathBuf,
  output: Option<PathBuf>,
  options: ThumbnailOptions,
) -> anyhow::Result<()> {
  let input = PathAbs::new(&input)
    .with_context(|| format!("cannot resolve input path {}", input.display()))?
    .as_path()
    .to_path_buf();
  let output = output.unwrap_or_else(|| input.with_extension("png"));
  let work_dir = work_dir_for(&input);
  let ctx = WorkDirContext::new(input.clone(), work_dir.clone(), "thumbnail")?;

  let path = extract_thumbnail(&ctx, &options).await?;
  tokio::fs::copy(&path, &output)
    .await
    .with_context(|| format!("cannot write thumbnail to {}", output.display()))?;
  println!("{} -> {}", input.display(), output.display());
  let _ = tokio::fs::remove_dir_all(&work_dir).await;
  Ok(())
}

pub fn run() -> anyhow::Result<()> {
  let args = Args::parse();
  let console_level = if args.quiet { LevelFilter::WARN } else { LevelFilter::INFO };
  vnorm_core::logging::init_logging(console_level, args.log_file.clone());

  let toolchain_dir = resolve_toolchain_dir(args.toolchain_dir.clone())?;
  configure_with_toolchain(&toolchain_dir, args.max_processes)?;

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("cannot build async runtime")?;

  match args.command {
    Command::Normalize {
      input,
      output,
      preset,
      video_mode,
      audio_mode,
      remap_hdr_to_sdr,
      max_bits,
      max_chroma,
      max_width,
      max_height,
      fps_limit,
      fps_exact,
      max_channels,
      max_sample_rate,
      metadata,
      faststart,
      validate_streams,
      remove_audio,
    } => {
      let base = match preset.as_str() {
        "preserve" => ProcessingOptions::preserve(),
        _ => ProcessingOptions::standard_h264_aac_mp4(),
      };
      let overrides = OptionsOverrides {
        video_reencode_mode: video_mode,
        audio_reencode_mode: audio_mode,
        maximum_bits_per_channel: max_bits,
        maximum_chroma_subsampling: max_chroma,
        fps_options: fps_limit.map(|target_fps| FpsOptions {
          mode: if fps_exact {
            FpsLimitMode::LimitToExact
          } else {
            FpsLimitMode::LimitByIntegerDivision
          },
          target_fps,
        }),
        resize_options: max_width.zip(max_height).map(|(width, height)| ResizeOptions {
          width,
          height,
        }),
        remap_hdr_to_sdr: remap_hdr_to_sdr.then_some(true),
        max_channels,
        max_sample_rate,
        metadata_stripping_mode: metadata,
        force_progressive_download: faststart.then_some(true),
        force_validate_all_streams: validate_streams.then_some(true),
        remove_audio_streams: remove_audio.then_some(true),
        ..OptionsOverrides::default()
      };
      let options = base.with_overrides(overrides)?;
      runtime.block_on(run_normalize(input, output, options))
    }
    Command::Thumbnail {
      input,
      output,
      at,
      fraction,
      max_width,
      max_height,
      no_hdr_remap,
      include_cover_art,
    } => {
      let options = ThumbnailOptions {
        absolute_seconds: at,
        // default to a tenth of the way in when nothing is requested
        fraction: fraction.or(if at.is_none() { Some(0.1) } else { None }),
        include_thumbnail_video_streams: include_cover_art,
        remap_hdr_to_sdr: !no_hdr_remap,
        max_width,
        max_height,
        ..ThumbnailOptions::default()
      };
      runtime.block_on(run_thumbnail(input, output, options))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn arguments_are_consistent() {
    Args::command().debug_assert();
  }

  #[test]
  fn normalize_flags_parse() {
    let args = Args::parse_from([
      "vnorm",
      "normalize",
      "clip.mkv",
      "--preset",
      "standard",
      "--max-bits",
      "8",
      "--max-chroma",
      "420",
      "--fps-limit",
      "60",
      "--remap-hdr-to-sdr",
    ]);
    match args.command {
      Command::Normalize {
        max_bits,
        max_chroma,
        fps_limit,
        remap_hdr_to_sdr,
        ..
      } => {
        assert_eq!(max_bits, Some(BitsPerChannel::Limit8));
        assert_eq!(max_chroma, Some(ChromaSubsampling::Limit420));
        assert_eq!(fps_limit, Some(60));
        assert!(remap_hdr_to_sdr);
      }
      other => panic!("unexpected command: {other:?}"),
    }
  }
}
