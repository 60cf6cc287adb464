//! # fc-store
//!
//! Storage seams consumed by the framecatcher pipeline.
//!
//! - [`RecordStore`] -- job and frame records keyed by numeric id.
//! - [`BlobStore`] -- frame and thumbnail files keyed by a path string.
//! - [`LocalBlobStore`] -- the filesystem implementation of [`BlobStore`].
//!
//! Both traits are synchronous; implementations are expected to be cheap to
//! call from async code the way the pipeline calls its database.

pub mod local;

pub use local::LocalBlobStore;

use fc_core::{Frame, Job, JobId, NewFrame, NewJob, Result};

/// Persistence for jobs and their frames.
pub trait RecordStore: Send + Sync {
    fn create_job(&self, job: NewJob) -> Result<Job>;

    /// Persist every mutable field of `job` and refresh `updated_at`.
    fn update_job(&self, job: &Job) -> Result<()>;

    fn find_job_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// Insert a batch atomically; either every frame is stored or none is.
    fn save_frames(&self, frames: &[NewFrame]) -> Result<Vec<Frame>>;

    fn count_frames_by_job(&self, job: JobId) -> Result<u64>;

    /// Frames of a job ordered by frame number.
    fn list_frames_by_job(&self, job: JobId) -> Result<Vec<Frame>>;

    /// Returns the number of frames removed.
    fn delete_frames_by_job(&self, job: JobId) -> Result<u64>;
}

/// Byte-addressable file storage for frames and thumbnails.
pub trait BlobStore: Send + Sync {
    /// Create the directory layout for a job and return its base path.
    fn create_job_layout(&self, job: JobId) -> Result<String>;

    /// Store an encoded or raw frame; `extension` names its file type.
    fn store(&self, job: JobId, frame_number: u64, data: &[u8], extension: &str) -> Result<String>;

    fn store_thumbnail(&self, job: JobId, frame_number: u64, data: &[u8]) -> Result<String>;

    /// Read back a file previously returned by [`store`](Self::store) or
    /// [`store_thumbnail`](Self::store_thumbnail).
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Deleting a path that does not exist succeeds.
    fn delete(&self, path: &str) -> Result<()>;

    /// Remove everything stored for a job.
    fn delete_job(&self, job: JobId) -> Result<()>;
}
