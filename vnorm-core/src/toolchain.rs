//! Process-wide toolchain configuration. Set exactly once, before any
//! processing call; the paths and the process pool live for the rest of the
//! process.

use std::path::{Path, PathBuf};

use cfg_if::cfg_if;
use once_cell::sync::OnceCell;
use path_abs::PathAbs;
use tracing::info;

use crate::error::{Error, Result};
use crate::process::ProcessPool;

/// Default bound on concurrently running toolchain processes.
pub const DEFAULT_MAX_CONCURRENT_PROCESSES: usize = 32;

cfg_if! {
  if #[cfg(windows)] {
    const TRANSCODER_FILE_NAME: &str = "ffmpeg.exe";
    const PROBER_FILE_NAME: &str = "ffprobe.exe";
  } else {
    const TRANSCODER_FILE_NAME: &str = "ffmpeg";
    const PROBER_FILE_NAME: &str = "ffprobe";
  }
}

#[derive(Debug)]
pub struct Toolchain {
  pub transcoder: PathBuf,
  pub prober: PathBuf,
  pool: ProcessPool,
}

impl Toolchain {
  pub fn pool(&self) -> &ProcessPool {
    &self.pool
  }
}

static TOOLCHAIN: OnceCell<Toolchain> = OnceCell::new();

/// Records absolute paths to the transcoder and probe binaries found in
/// `directory` and sizes the process pool. Single-shot: a second call is a
/// configuration error, as is a directory missing either binary.
pub fn configure_with_toolchain(directory: &Path, max_concurrent_processes: usize) -> Result<()> {
  let directory = PathAbs::new(directory)
    .map_err(|e| Error::Configuration(format!("cannot resolve toolchain directory: {e}")))?;
  let transcoder = directory.as_path().join(TRANSCODER_FILE_NAME);
  let prober = directory.as_path().join(PROBER_FILE_NAME);
  for binary in [&transcoder, &prober] {
    if !binary.is_file() {
      return Err(Error::Configuration(format!(
        "toolchain binary not found: {}",
        binary.display()
      )));
    }
  }
  if max_concurrent_processes == 0 {
    return Err(Error::Configuration("max_concurrent_processes must be at least 1".into()));
  }
  let toolchain = Toolchain {
    transcoder,
    prober,
    pool: ProcessPool::new(max_concurrent_processes),
  };
  TOOLCHAIN
    .set(toolchain)
    .map_err(|_| Error::Configuration("toolchain is already configured".into()))?;
  info!(
    "toolchain configured from {} ({} concurrent processes)",
    directory.as_path().display(),
    max_concurrent_processes
  );
  Ok(())
}

/// The configured toolchain, or a configuration error when `configure` has
/// not run yet.
pub(crate) fn toolchain() -> Result<&'static Toolchain> {
  TOOLCHAIN
    .get()
    .ok_or_else(|| Error::Configuration("toolchain is not configured".into()))
}
