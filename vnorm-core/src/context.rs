//! The seam to the host file-processor framework: source handout, work-file
//! allocation, identity and cancellation. The core only ever talks to the
//! trait; [`WorkDirContext`] is the concrete context used by the CLI and by
//! tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub trait FileContext: Send + Sync {
  /// The source as a readable file on disk.
  fn source_file(&self) -> Result<PathBuf>;

  /// Allocates a fresh work-file path with the given extension (no dot).
  /// The file's lifetime is owned by the context; partially written work
  /// files after a failure are the context's cleanup problem.
  fn new_work_file(&self, extension: &str) -> Result<PathBuf>;

  /// The source file's extension as the host recorded it, without the dot,
  /// lowercased. Empty when the source has none.
  fn extension(&self) -> &str;

  fn file_id(&self) -> &str;

  fn variant_id(&self) -> &str;

  fn cancellation(&self) -> &CancellationToken;
}

/// A [`FileContext`] backed by a plain work directory.
#[derive(Debug)]
pub struct WorkDirContext {
  source: PathBuf,
  work_dir: PathBuf,
  extension: String,
  file_id: String,
  variant_id: String,
  counter: AtomicU32,
  cancel: CancellationToken,
}

impl WorkDirContext {
  pub fn new(source: PathBuf, work_dir: PathBuf, variant_id: &str) -> Result<WorkDirContext> {
    if !source.is_file() {
      return Err(Error::Validation(format!("source file not found: {}", source.display())));
    }
    std::fs::create_dir_all(&work_dir)?;
    let extension = source
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_lowercase)
      .unwrap_or_default();
    let file_id = source
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or("source")
      .to_owned();
    Ok(WorkDirContext {
      source,
      work_dir,
      extension,
      file_id,
      variant_id: variant_id.to_owned(),
      counter: AtomicU32::new(0),
      cancel: CancellationToken::new(),
    })
  }

  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  /// The token handed to processing calls; cancel it to abort them.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }
}

impl FileContext for WorkDirContext {
  fn source_file(&self) -> Result<PathBuf> {
    Ok(self.source.clone())
  }

  fn new_work_file(&self, extension: &str) -> Result<PathBuf> {
    let n = self.counter.fetch_add(1, Ordering::Relaxed);
    Ok(self.work_dir.join(format!("work-{n:04}.{extension}")))
  }

  fn extension(&self) -> &str {
    &self.extension
  }

  fn file_id(&self) -> &str {
    &self.file_id
  }

  fn variant_id(&self) -> &str {
    &self.variant_id
  }

  fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }
}
