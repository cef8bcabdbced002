//! Toolchain-driven video normalization: probe a media file, decide per
//! stream whether it can be copied into the target container or must be
//! re-encoded, and drive the external transcoder to a normalized (or
//! untouched) result.
//!
//! The crate exposes three operations on top of a one-shot toolchain
//! configuration:
//!
//! - [`configure_with_toolchain`] records the transcoder/probe binaries and
//!   bounds process parallelism,
//! - [`process`] runs the planner over a [`FileContext`]'s source file,
//! - [`extract_thumbnail`] pulls a single bounded PNG frame.

pub mod capabilities;
pub mod catalog;
pub mod command;
pub mod context;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod options;
mod planner;
mod process;
pub mod probe;
mod progress;
pub mod thumbnail;
mod toolchain;
mod util;

#[cfg(test)]
pub(crate) mod testutil;

pub use capabilities::{capabilities, Capabilities};
pub use context::{FileContext, WorkDirContext};
pub use error::{Error, Result};
pub use options::{
  AudioSourceValidation, BitsPerChannel, ChromaSubsampling, FpsLimitMode, FpsOptions,
  MetadataStrippingMode, OptionsOverrides, ProcessingOptions, ReencodeMode, ResizeOptions,
  VideoSourceValidation,
};
pub use planner::{process, ProcessingResult};
pub use probe::{probe_file, FileInfo, Stream};
pub use progress::ProgressTag;
pub use thumbnail::{extract_thumbnail, ThumbnailOptions};
pub use toolchain::{configure_with_toolchain, DEFAULT_MAX_CONCURRENT_PROCESSES};
