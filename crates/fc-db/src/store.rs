//! [`RecordStore`] backed by the SQLite pool.

use fc_core::{Frame, Job, JobId, NewFrame, NewJob, Result};
use fc_store::RecordStore;

use crate::pool::{get_conn, DbPool};
use crate::queries::{frames, jobs};

/// SQLite implementation of the pipeline's record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for queries outside the [`RecordStore`] surface.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl RecordStore for SqliteRecordStore {
    fn create_job(&self, job: NewJob) -> Result<Job> {
        let conn = get_conn(&self.pool)?;
        jobs::create_job(&conn, &job)
    }

    fn update_job(&self, job: &Job) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        jobs::update_job(&conn, job).map(|_| ())
    }

    fn find_job_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let conn = get_conn(&self.pool)?;
        jobs::get_job(&conn, id)
    }

    fn save_frames(&self, batch: &[NewFrame]) -> Result<Vec<Frame>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let conn = get_conn(&self.pool)?;
        frames::insert_frames(&conn, batch)
    }

    fn count_frames_by_job(&self, job: JobId) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        frames::count_frames_by_job(&conn, job)
    }

    fn list_frames_by_job(&self, job: JobId) -> Result<Vec<Frame>> {
        let conn = get_conn(&self.pool)?;
        frames::list_frames_by_job(&conn, job)
    }

    fn delete_frames_by_job(&self, job: JobId) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        frames::delete_frames_by_job(&conn, job)
    }
}
