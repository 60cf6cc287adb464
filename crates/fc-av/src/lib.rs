//! # fc-av
//!
//! External media tool management for the framecatcher pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and the backend diagnostics (nvidia-smi, vulkaninfo, python3).
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support and concurrently drained stdout/stderr.
//! - **Scratch space** ([`ScratchDir`]) -- per-job temporary directory removed
//!   on drop.
//! - **Metadata parsing** ([`metadata`]) -- best-effort parsing of the ffprobe
//!   banner into [`VideoMetadata`].
//! - **Media operations** ([`MediaTool`], [`Ffmpeg`]) -- validation, metadata,
//!   fixed-rate frame sampling, single-frame encoding and thumbnails.

pub mod command;
pub mod media;
pub mod metadata;
pub mod scratch;
pub mod tools;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use media::{EncoderProfile, Ffmpeg, MediaTool, RateControl};
pub use metadata::VideoMetadata;
pub use scratch::ScratchDir;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
