//! Frame record operations.

use chrono::Utc;
use fc_core::{Error, FixedSeconds, Frame, FrameId, JobId, NewFrame, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{frame_from_row, FrameStats, FRAME_COLS};

/// Insert a batch of frames in one transaction.
///
/// A duplicate `(job_id, frame_number)` aborts the whole batch.
pub fn insert_frames(conn: &Connection, frames: &[NewFrame]) -> Result<Vec<Frame>> {
    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut saved = Vec::with_capacity(frames.len());
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO frames (job_id, filename, file_path, timestamp_ms, frame_number,
                    width, height, file_size, format, quality_score, is_favorite,
                    thumbnail_path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?12)",
            )
            .map_err(|e| Error::database(e.to_string()))?;

        for f in frames {
            stmt.execute(rusqlite::params![
                f.job_id.get(),
                f.filename,
                f.file_path,
                f.timestamp.as_millis(),
                f.frame_number as i64,
                f.width,
                f.height,
                f.file_size as i64,
                f.format,
                f.quality_score,
                f.thumbnail_path,
                &now,
            ])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::Conflict(format!(
                        "frame {} of job {} already exists",
                        f.frame_number, f.job_id
                    ))
                }
                other => Error::database(other.to_string()),
            })?;

            saved.push(Frame {
                id: FrameId::new(tx.last_insert_rowid()),
                job_id: f.job_id,
                filename: f.filename.clone(),
                file_path: f.file_path.clone(),
                timestamp: f.timestamp,
                frame_number: f.frame_number,
                width: f.width,
                height: f.height,
                file_size: f.file_size,
                format: f.format.clone(),
                quality_score: f.quality_score,
                is_favorite: false,
                thumbnail_path: f.thumbnail_path.clone(),
                created_at: now.clone(),
                updated_at: now.clone(),
            });
        }
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(saved)
}

/// Get a frame by ID.
pub fn get_frame(conn: &Connection, id: FrameId) -> Result<Option<Frame>> {
    let q = format!("SELECT {FRAME_COLS} FROM frames WHERE id = ?1");
    conn.query_row(&q, [id.get()], frame_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Count the frames stored for a job.
pub fn count_frames_by_job(conn: &Connection, job: JobId) -> Result<u64> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM frames WHERE job_id = ?1",
            [job.get()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n.max(0) as u64)
}

/// All frames of a job in frame-number order.
pub fn list_frames_by_job(conn: &Connection, job: JobId) -> Result<Vec<Frame>> {
    list_frames(conn, job, false, 0, i64::MAX)
}

/// Page through a job's frames, optionally favorites only.
pub fn list_frames(
    conn: &Connection,
    job: JobId,
    favorites_only: bool,
    offset: i64,
    limit: i64,
) -> Result<Vec<Frame>> {
    let filter = if favorites_only {
        " AND is_favorite = 1"
    } else {
        ""
    };
    let q = format!(
        "SELECT {FRAME_COLS} FROM frames WHERE job_id = ?1{filter}
         ORDER BY frame_number ASC LIMIT ?2 OFFSET ?3"
    );

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![job.get(), limit, offset], frame_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Frames of a job whose timestamp lies in `[start, end]`, in frame order.
pub fn list_frames_in_range(
    conn: &Connection,
    job: JobId,
    start: FixedSeconds,
    end: FixedSeconds,
) -> Result<Vec<Frame>> {
    if start > end {
        return Err(Error::Validation(format!(
            "range start {start}s is after its end {end}s"
        )));
    }
    let q = format!(
        "SELECT {FRAME_COLS} FROM frames
         WHERE job_id = ?1 AND timestamp_ms BETWEEN ?2 AND ?3
         ORDER BY frame_number ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![job.get(), start.as_millis(), end.as_millis()],
            frame_from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The `limit` highest-scoring frames of a job, best first.
pub fn top_quality_frames(conn: &Connection, job: JobId, limit: i64) -> Result<Vec<Frame>> {
    let q = format!(
        "SELECT {FRAME_COLS} FROM frames WHERE job_id = ?1
         ORDER BY quality_score DESC, frame_number ASC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![job.get(), limit], frame_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Set or clear the favorite flag of several frames in one transaction.
///
/// Unknown ids are skipped; returns how many frames were updated.
pub fn set_favorites(conn: &Connection, ids: &[FrameId], favorite: bool) -> Result<u64> {
    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut updated = 0;
    {
        let mut stmt = tx
            .prepare("UPDATE frames SET is_favorite = ?1, updated_at = ?2 WHERE id = ?3")
            .map_err(|e| Error::database(e.to_string()))?;
        for id in ids {
            updated += stmt
                .execute(rusqlite::params![favorite, &now, id.get()])
                .map_err(|e| Error::database(e.to_string()))? as u64;
        }
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(updated)
}

/// Delete every frame of a job, returning how many were removed.
pub fn delete_frames_by_job(conn: &Connection, job: JobId) -> Result<u64> {
    let n = conn
        .execute("DELETE FROM frames WHERE job_id = ?1", [job.get()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n as u64)
}

/// Count, total size, favorites and mean quality of a job's frames.
pub fn frame_stats(conn: &Connection, job: JobId) -> Result<FrameStats> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(file_size), 0), COALESCE(SUM(is_favorite), 0),
                AVG(quality_score)
         FROM frames WHERE job_id = ?1",
        [job.get()],
        |row| {
            Ok(FrameStats {
                count: row.get::<_, i64>(0)?.max(0) as u64,
                total_bytes: row.get::<_, i64>(1)?.max(0) as u64,
                favorites: row.get::<_, i64>(2)?.max(0) as u64,
                avg_quality: row.get(3)?,
            })
        },
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::jobs;
    use fc_core::{FixedSeconds, NewJob};

    fn setup() -> (crate::pool::DbPool, JobId) {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let job = jobs::create_job(
            &conn,
            &NewJob {
                name: "clip".into(),
                original_filename: "clip.mp4".into(),
                video_path: "/videos/clip.mp4".into(),
                file_size: 100,
            },
        )
        .unwrap();
        (pool, job.id)
    }

    fn frame(job: JobId, n: u64, score: f64) -> NewFrame {
        NewFrame {
            job_id: job,
            filename: format!("clip_00_00_{n:02}_frame_{n:06}.heic"),
            file_path: format!("/store/albums/{job}/frames/original/frame_{n:06}.heic"),
            timestamp: FixedSeconds::from_frame(n, 1.0),
            frame_number: n,
            width: 1280,
            height: 720,
            file_size: 1000 + n,
            format: "heic".into(),
            quality_score: score,
            thumbnail_path: None,
        }
    }

    #[test]
    fn insert_and_list_in_order() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();

        let batch = vec![frame(job, 2, 0.5), frame(job, 0, 0.5), frame(job, 1, 0.5)];
        let saved = insert_frames(&conn, &batch).unwrap();
        assert_eq!(saved.len(), 3);

        let listed = list_frames_by_job(&conn, job).unwrap();
        let numbers: Vec<u64> = listed.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(listed[2].timestamp.to_string(), "2.000");
        assert_eq!(count_frames_by_job(&conn, job).unwrap(), 3);

        let one = get_frame(&conn, saved[0].id).unwrap().unwrap();
        assert_eq!(one.frame_number, 2);
        assert!(!one.is_favorite);
    }

    #[test]
    fn duplicate_frame_number_rolls_back_batch() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();

        insert_frames(&conn, &[frame(job, 0, 0.1)]).unwrap();
        let err = insert_frames(&conn, &[frame(job, 1, 0.1), frame(job, 0, 0.1)]).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(count_frames_by_job(&conn, job).unwrap(), 1);
    }

    #[test]
    fn favorites_and_paging() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();
        let saved = insert_frames(&conn, &(0..5).map(|n| frame(job, n, 0.2)).collect::<Vec<_>>()).unwrap();

        let ids = [saved[1].id, saved[3].id, saved[4].id, FrameId::new(9999)];
        assert_eq!(set_favorites(&conn, &ids, true).unwrap(), 3);
        assert_eq!(set_favorites(&conn, &[saved[4].id], false).unwrap(), 1);

        let favs = list_frames(&conn, job, true, 0, 10).unwrap();
        assert_eq!(favs.iter().map(|f| f.frame_number).collect::<Vec<_>>(), vec![1, 3]);
        assert!(get_frame(&conn, saved[1].id).unwrap().unwrap().is_favorite);

        let page = list_frames(&conn, job, false, 2, 2).unwrap();
        assert_eq!(page.iter().map(|f| f.frame_number).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn range_is_inclusive_and_ordered() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();
        insert_frames(&conn, &(0..6).rev().map(|n| frame(job, n, 0.3)).collect::<Vec<_>>()).unwrap();

        let hits = list_frames_in_range(
            &conn,
            job,
            FixedSeconds::from_millis(1000),
            FixedSeconds::from_millis(3500),
        )
        .unwrap();
        assert_eq!(hits.iter().map(|f| f.frame_number).collect::<Vec<_>>(), vec![1, 2, 3]);

        let exact = list_frames_in_range(&conn, job, FixedSeconds::ZERO, FixedSeconds::ZERO).unwrap();
        assert_eq!(exact.len(), 1);

        let past_end = FixedSeconds::from_millis(60_000);
        assert!(list_frames_in_range(&conn, job, past_end, past_end).unwrap().is_empty());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();
        let err = list_frames_in_range(
            &conn,
            job,
            FixedSeconds::from_millis(2000),
            FixedSeconds::from_millis(1000),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn stats_and_ranking() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();

        let empty = frame_stats(&conn, job).unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.avg_quality, None);

        insert_frames(&conn, &[frame(job, 0, 0.2), frame(job, 1, 0.8), frame(job, 2, 0.5)]).unwrap();
        let stats = frame_stats(&conn, job).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_bytes, 3003);
        assert_eq!(stats.favorites, 0);
        assert!((stats.avg_quality.unwrap() - 0.5).abs() < 1e-9);

        let top = top_quality_frames(&conn, job, 2).unwrap();
        assert_eq!(top.iter().map(|f| f.frame_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn delete_by_job_and_cascade() {
        let (pool, job) = setup();
        let conn = get_conn(&pool).unwrap();
        insert_frames(&conn, &[frame(job, 0, 0.1), frame(job, 1, 0.1)]).unwrap();

        assert_eq!(delete_frames_by_job(&conn, job).unwrap(), 2);
        assert_eq!(count_frames_by_job(&conn, job).unwrap(), 0);

        insert_frames(&conn, &[frame(job, 0, 0.1)]).unwrap();
        jobs::delete_job(&conn, job).unwrap();
        assert_eq!(count_frames_by_job(&conn, job).unwrap(), 0);
    }
}
