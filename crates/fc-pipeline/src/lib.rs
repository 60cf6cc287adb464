//! # fc-pipeline
//!
//! The video-to-frames pipeline.
//!
//! This crate provides:
//!
//! - **[`ProgressTracker`]** -- concurrency-safe per-job progress fraction
//!   and cancellation flag.
//! - **[`Backend`] / [`BackendDispatcher`]** -- hardware-acceleration
//!   detection, accelerated single-frame encoding with per-frame CPU
//!   fallback, utilization reporting.
//! - **[`FrameProcessor`]** -- per sampled frame: timestamp, encode,
//!   thumbnail, dimensions, quality score, record assembly.
//! - **[`Orchestrator`]** -- the job state machine driving validation,
//!   metadata, sampling, bounded-parallel frame work and the bulk persist.

pub mod backend;
pub mod frame;
pub mod orchestrator;
pub mod quality;
pub mod tracker;

// Re-export key types at the crate root.
pub use backend::{Backend, BackendDispatcher, CapabilityProbe, DispatcherSettings, EncodedFrame, HostProbe};
pub use frame::{FrameProcessor, FrameSettings};
pub use orchestrator::{JobOutcome, Orchestrator, PipelineSettings};
pub use tracker::{ProgressEntry, ProgressTracker};
