//! Database query modules.

pub mod frames;
pub mod jobs;
