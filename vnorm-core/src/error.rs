//! This module contains the common error type for the processing pipeline.

use std::io;

use thiserror::Error;

/// All failure modes of the pipeline. Every variant except [`Error::Cancelled`]
/// carries a human-readable message plus whatever diagnostic properties the
/// failure site had on hand.
#[derive(Error, Debug)]
pub enum Error {
  /// The toolchain was not configured, was configured twice, or an option
  /// record failed validation at construction.
  #[error("configuration error: {0}")]
  Configuration(String),
  /// The source container is not accepted, or its declared format does not
  /// survive extension normalization.
  #[error("format error: {0}")]
  Format(String),
  /// A stream count, dimension, duration or codec bound was violated.
  #[error("validation error: {0}")]
  Validation(String),
  /// A toolchain process exited with a non-zero status.
  #[error("toolchain exited with {}: {program} {}\n{stderr}", exit_code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")), args.join(" "))]
  Toolchain {
    program: String,
    args: Vec<String>,
    exit_code: Option<i32>,
    stderr: String,
    stdout: Option<String>,
  },
  /// Probe output was missing an expected field or a capability listing was
  /// unparseable.
  #[error("probe error: {0}")]
  Probe(String),
  /// Not a failure: the planner determined no re-encode was required and the
  /// caller asked to be told about it.
  #[error("no re-encode required for this source")]
  ReencodeOptional,
  /// The operation was cancelled by the caller. Never wrapped.
  #[error("operation cancelled")]
  Cancelled,
  /// Filesystem trouble while staging work files.
  #[error("i/o error: {0}")]
  Io(#[from] io::Error),
  /// A lower-level failure attributable to a single source file.
  #[error("processing failed for file {file_id}: {source}")]
  FileProcessing {
    file_id: String,
    #[source]
    source: Box<Error>,
  },
}

impl Error {
  /// Wraps this error as attributable to `file_id`. [`Error::Cancelled`]
  /// propagates unchanged, as do errors already attributed.
  pub fn attribute_to(self, file_id: &str) -> Error {
    match self {
      Error::Cancelled => Error::Cancelled,
      e @ Error::FileProcessing { .. } => e,
      other => Error::FileProcessing {
        file_id: file_id.to_owned(),
        source: Box::new(other),
      },
    }
  }

  /// True when the error is the cancellation signal.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Error::Cancelled)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
