//! fc-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, row mapping, query modules for jobs and frames, and
//! [`SqliteRecordStore`], the [`fc_store::RecordStore`] the pipeline uses.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use store::SqliteRecordStore;
