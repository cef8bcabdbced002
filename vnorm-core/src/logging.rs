//! Opt-in logging initialization. The library itself only emits `tracing`
//! events; a host embedding the core brings its own subscriber, while the
//! CLI calls [`init_logging`] to get a console layer plus an optional
//! non-blocking file layer.

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

// Keep the non-blocking writer alive for the process lifetime
static WORKER_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

pub const DEFAULT_CONSOLE_LEVEL: LevelFilter = LevelFilter::INFO;
pub const DEFAULT_FILE_LEVEL: LevelFilter = LevelFilter::DEBUG;

fn filter_for(level: LevelFilter) -> EnvFilter {
  // RUST_LOG wins over the configured level
  if let Ok(directives) = env::var("RUST_LOG") {
    if let Ok(filter) = EnvFilter::try_new(&directives) {
      return filter;
    }
  }
  EnvFilter::try_new(format!("vnorm_core={level},vnorm_cli={level},vnorm={level}"))
    .expect("static filter directives parse")
}

/// Installs the global subscriber: compact console output on stderr, and a
/// debug-level file appender when `log_file` is given. Calling twice is an
/// error, like any global subscriber installation.
pub fn init_logging(console_level: LevelFilter, log_file: Option<PathBuf>) {
  let console_layer = fmt::layer()
    .compact()
    .with_ansi(std::io::stderr().is_terminal())
    .with_target(false)
    .with_file(false)
    .without_time()
    .with_writer(std::io::stderr)
    .with_filter(filter_for(console_level));

  let file_layer = log_file.map(|path| {
    let directory = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(PathBuf::from)
      .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "vnorm.log".to_owned());
    let appender = RollingFileAppender::new(Rotation::NEVER, directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    WORKER_GUARD.set(guard).expect("logging initialized twice");
    fmt::layer()
      .with_ansi(false)
      .with_target(true)
      .with_level(true)
      .with_writer(non_blocking)
      .with_filter(filter_for(DEFAULT_FILE_LEVEL))
  });

  tracing_subscriber::registry()
    .with(file_layer)
    .with(console_layer)
    .init();

  tracing::debug!("logging initialized");
}
