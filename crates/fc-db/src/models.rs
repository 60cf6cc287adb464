//! Row mapping for the `jobs` and `frames` tables, plus aggregate shapes
//! returned by the listing queries.

use fc_core::{FixedSeconds, Frame, FrameId, Job, JobId, JobStatus};
use serde::Serialize;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn get_u32(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<u32>> {
    let v: Option<i64> = row.get(idx)?;
    Ok(v.map(|n| n.max(0) as u32))
}

fn get_u64(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<u64> {
    let v: i64 = row.get(idx)?;
    Ok(v.max(0) as u64)
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

pub const JOB_COLS: &str = "id, name, original_filename, video_path, file_size,
    duration_ms, frame_rate, width, height, codec, status, created_at, updated_at";

pub fn job_from_row(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let status: String = row.get(10)?;
    let duration: Option<i64> = row.get(5)?;
    Ok(Job {
        id: JobId::new(row.get(0)?),
        name: row.get(1)?,
        original_filename: row.get(2)?,
        video_path: row.get(3)?,
        file_size: get_u64(row, 4)?,
        duration: duration.map(FixedSeconds::from_millis),
        frame_rate: get_u32(row, 6)?,
        width: get_u32(row, 7)?,
        height: get_u32(row, 8)?,
        codec: row.get(9)?,
        status: status.parse::<JobStatus>().map_err(|e| conversion_err(10, e))?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

pub const FRAME_COLS: &str = "id, job_id, filename, file_path, timestamp_ms, frame_number,
    width, height, file_size, format, quality_score, is_favorite, thumbnail_path,
    created_at, updated_at";

pub fn frame_from_row(row: &rusqlite::Row) -> rusqlite::Result<Frame> {
    Ok(Frame {
        id: FrameId::new(row.get(0)?),
        job_id: JobId::new(row.get(1)?),
        filename: row.get(2)?,
        file_path: row.get(3)?,
        timestamp: FixedSeconds::from_millis(row.get(4)?),
        frame_number: get_u64(row, 5)?,
        width: get_u32(row, 6)?.unwrap_or(0),
        height: get_u32(row, 7)?.unwrap_or(0),
        file_size: get_u64(row, 8)?,
        format: row.get(9)?,
        quality_score: row.get(10)?,
        is_favorite: row.get(11)?,
        thumbnail_path: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Per-job frame totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub count: u64,
    pub total_bytes: u64,
    pub favorites: u64,
    /// `None` when the job has no frames.
    pub avg_quality: Option<f64>,
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.processing + self.completed + self.failed + self.cancelled
    }
}
