//! Framecatcher - video-to-frames extraction pipeline
//!
//! This library crate exposes the application wiring for the binary and for
//! integration testing.

pub mod context;
