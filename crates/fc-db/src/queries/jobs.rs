//! Job record operations.

use chrono::Utc;
use fc_core::{Error, Job, JobId, JobStatus, NewJob, Result};
use rusqlite::Connection;

use crate::models::{job_from_row, StatusCounts, JOB_COLS};

/// Create a new job in the `processing` state.
pub fn create_job(conn: &Connection, new: &NewJob) -> Result<Job> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO jobs (name, original_filename, video_path, file_size, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'processing', ?5, ?5)",
        rusqlite::params![
            new.name,
            new.original_filename,
            new.video_path,
            new.file_size as i64,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Job {
        id: JobId::new(conn.last_insert_rowid()),
        name: new.name.clone(),
        original_filename: new.original_filename.clone(),
        video_path: new.video_path.clone(),
        file_size: new.file_size,
        duration: None,
        frame_rate: None,
        width: None,
        height: None,
        codec: None,
        status: JobStatus::Processing,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {JOB_COLS} FROM jobs WHERE id = ?1");
    let result = conn.query_row(&q, [id.get()], job_from_row);
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Overwrite a job's mutable fields and bump `updated_at`.
///
/// Returns the new `updated_at`; a missing job is [`Error::NotFound`].
pub fn update_job(conn: &Connection, job: &Job) -> Result<String> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET name = ?1, file_size = ?2, duration_ms = ?3, frame_rate = ?4,
                width = ?5, height = ?6, codec = ?7, status = ?8, updated_at = ?9
             WHERE id = ?10",
            rusqlite::params![
                job.name,
                job.file_size as i64,
                job.duration.map(|d| d.as_millis()),
                job.frame_rate,
                job.width,
                job.height,
                job.codec,
                job.status.as_str(),
                &now,
                job.id.get(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if n == 0 {
        return Err(Error::not_found("job", job.id));
    }
    Ok(now)
}

/// List jobs, newest first, with pagination.
///
/// `status` filters exactly. `name` keeps jobs whose name contains it,
/// ignoring ASCII case; `%` and `_` in it match literally.
pub fn list_jobs(
    conn: &Connection,
    status: Option<JobStatus>,
    name: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Job>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(s) = status {
        params_vec.push(Box::new(s.as_str().to_string()));
        clauses.push(format!("status = ?{}", params_vec.len()));
    }
    if let Some(n) = name {
        params_vec.push(Box::new(format!("%{}%", escape_like(n))));
        clauses.push(format!("name LIKE ?{} ESCAPE '\\'", params_vec.len()));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    params_vec.push(Box::new(limit));
    let limit_idx = params_vec.len();
    params_vec.push(Box::new(offset));
    let offset_idx = params_vec.len();

    let q = format!(
        "SELECT {JOB_COLS} FROM jobs{where_clause}
         ORDER BY created_at DESC, id DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), job_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Count jobs per status.
pub fn count_jobs_by_status(conn: &Connection) -> Result<StatusCounts> {
    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
        let n = n.max(0) as u64;
        match status.parse::<JobStatus>()? {
            JobStatus::Processing => counts.processing = n,
            JobStatus::Completed => counts.completed = n,
            JobStatus::Failed => counts.failed = n,
            JobStatus::Cancelled => counts.cancelled = n,
        }
    }
    Ok(counts)
}

/// Delete a job; its frames go with it.
pub fn delete_job(conn: &Connection, id: JobId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM jobs WHERE id = ?1", [id.get()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
