//! fc-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for all other fc-* crates,
//! providing typed identifiers, fixed-point seconds, the job and frame
//! domain models, a unified error type, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod time;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use models::*;
pub use time::FixedSeconds;
