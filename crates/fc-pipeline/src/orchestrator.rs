//! The job state machine.
//!
//! A run validates the source, merges its metadata into the job, samples
//! frames into a scratch directory, post-processes them on a bounded set of
//! tasks and bulk-persists the resulting records. Cancellation is
//! cooperative: it only withholds frame tasks that have not started yet.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fc_av::{MediaTool, ScratchDir};
use fc_core::config::Config;
use fc_core::{Error, Job, JobId, JobStatus, NewFrame, Result};
use fc_store::{BlobStore, RecordStore};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crate::backend::BackendDispatcher;
use crate::frame::{sanitize_name, FrameProcessor, FrameSettings};
use crate::tracker::ProgressTracker;

/// Progress never reported before the bulk persist finishes.
const PRE_PERSIST_CEILING: f64 = 0.95;

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_parallel_frames: usize,
    /// Parent for per-job scratch dirs; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub frame: FrameSettings,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallel_frames: config.extraction.max_parallel_frames.max(1),
            scratch_dir: config.extraction.scratch_dir.clone(),
            frame: FrameSettings {
                frames_per_second: config.extraction.frames_per_second,
                quality: config.encode.quality,
                thumbnail_width: config.thumbnail.width,
                thumbnail_height: config.thumbnail.height,
                thumbnail_quality: config.thumbnail.quality,
            },
        }
    }
}

/// Summary of a run that reached a terminal status other than failed.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: Job,
    pub frames_saved: usize,
    /// `ceil(duration x rate)`, or the sampled count when the duration is unknown.
    pub frames_expected: usize,
    /// Frames never started because cancellation was requested.
    pub frames_skipped: usize,
    /// Frames whose processing failed.
    pub frames_dropped: usize,
}

/// Drives extraction jobs.
#[derive(Clone)]
pub struct Orchestrator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    media: Arc<dyn MediaTool>,
    dispatcher: Arc<BackendDispatcher>,
    tracker: Arc<ProgressTracker>,
    processor: FrameProcessor,
    settings: PipelineSettings,
    running: Arc<Mutex<HashSet<JobId>>>,
}

/// Marks a job as being driven; released on drop.
struct RunGuard {
    running: Arc<Mutex<HashSet<JobId>>>,
    job: JobId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.job);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Fresh,
    Retry,
}

impl Orchestrator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        media: Arc<dyn MediaTool>,
        dispatcher: Arc<BackendDispatcher>,
        tracker: Arc<ProgressTracker>,
        settings: PipelineSettings,
    ) -> Self {
        let processor = FrameProcessor::new(
            Arc::clone(&media),
            Arc::clone(&blobs),
            Arc::clone(&dispatcher),
            settings.frame.clone(),
        );
        Self {
            records,
            blobs,
            media,
            dispatcher,
            tracker,
            processor,
            settings,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn dispatcher(&self) -> &Arc<BackendDispatcher> {
        &self.dispatcher
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Run a job that is still `processing` and wait for it to finish.
    pub async fn run_job(&self, id: JobId) -> Result<JobOutcome> {
        let guard = self.acquire(id)?;
        self.drive(id, RunKind::Fresh, guard).await
    }

    /// Run a job in the background.
    ///
    /// The run guard and tracker entry exist before this returns, so a
    /// second start fails with [`Error::Conflict`] and a cancellation
    /// requested right away is honoured.
    pub fn start_job(&self, id: JobId) -> Result<JoinHandle<Result<JobOutcome>>> {
        self.spawn(id, RunKind::Fresh)
    }

    /// Re-run a `failed` or `cancelled` job after clearing its earlier frames.
    pub async fn retry_job(&self, id: JobId) -> Result<JobOutcome> {
        let guard = self.acquire(id)?;
        self.drive(id, RunKind::Retry, guard).await
    }

    /// [`Orchestrator::retry_job`] in the background, with the guarantees
    /// of [`Orchestrator::start_job`].
    pub fn start_retry(&self, id: JobId) -> Result<JoinHandle<Result<JobOutcome>>> {
        self.spawn(id, RunKind::Retry)
    }

    /// Progress in `[0.0, 1.0]`; 0.0 for jobs the tracker does not know.
    pub fn progress(&self, id: JobId) -> f64 {
        self.tracker.progress(id)
    }

    /// Stop dispatching new frames for `id`. Returns `false` if the job is
    /// not tracked.
    pub fn request_cancellation(&self, id: JobId) -> bool {
        let found = self.tracker.request_cancellation(id);
        if found {
            tracing::info!(job_id = %id, "Cancellation requested");
        }
        found
    }

    /// Drop the tracker entry a finished run left behind.
    pub fn clear_progress(&self, id: JobId) {
        self.tracker.remove(id);
    }

    pub fn is_running(&self, id: JobId) -> bool {
        self.running.lock().contains(&id)
    }

    fn spawn(&self, id: JobId, kind: RunKind) -> Result<JoinHandle<Result<JobOutcome>>> {
        let guard = self.acquire(id)?;
        let this = self.clone();
        Ok(tokio::spawn(async move { this.drive(id, kind, guard).await }))
    }

    /// Claim `id` and reset its tracker entry.
    ///
    /// The entry is only reset here, never later in the run, so a
    /// cancellation flag set once this returns is never lost.
    fn acquire(&self, id: JobId) -> Result<RunGuard> {
        if !self.running.lock().insert(id) {
            return Err(Error::Conflict(format!("job {id} is already running")));
        }
        self.tracker.start(id);
        Ok(RunGuard {
            running: Arc::clone(&self.running),
            job: id,
        })
    }

    async fn drive(&self, id: JobId, kind: RunKind, _guard: RunGuard) -> Result<JobOutcome> {
        let mut job = match self.prepare(id, kind) {
            Ok(job) => job,
            Err(e) => {
                self.tracker.remove(id);
                return Err(e);
            }
        };
        tracing::info!(job_id = %id, video = %job.video_path, "Job started");

        match self.execute(&mut job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Job failed");
                let persisted = job
                    .transition(JobStatus::Failed)
                    .and_then(|()| self.records.update_job(&job));
                if let Err(store_err) = persisted {
                    tracing::warn!(job_id = %id, "Could not mark job failed: {store_err}");
                }
                self.tracker.remove(id);
                Err(e)
            }
        }
    }

    /// Check the job may run as `kind` and move it to `processing`.
    fn prepare(&self, id: JobId, kind: RunKind) -> Result<Job> {
        let mut job = self
            .records
            .find_job_by_id(id)?
            .ok_or_else(|| Error::not_found("job", id))?;

        match kind {
            RunKind::Fresh if job.status != JobStatus::Processing => {
                return Err(Error::Conflict(format!(
                    "job {id} is {}; only processing jobs can be run",
                    job.status
                )));
            }
            RunKind::Retry => {
                if !job.status.is_retryable() {
                    return Err(Error::Conflict(format!(
                        "job {id} is {}; only failed or cancelled jobs can be retried",
                        job.status
                    )));
                }
                self.clear_previous_frames(id)?;
            }
            RunKind::Fresh => {}
        }

        job.transition(JobStatus::Processing)?;
        self.records.update_job(&job)?;
        Ok(job)
    }

    async fn execute(&self, job: &mut Job) -> Result<JobOutcome> {
        let id = job.id;
        let video = PathBuf::from(&job.video_path);

        if !self.media.validate(&video).await {
            return Err(Error::InvalidMedia(format!(
                "{} is not a decodable video",
                video.display()
            )));
        }

        let meta = self.media.extract_metadata(&video).await?;
        if meta.duration.is_some_and(|d| !d.is_positive()) {
            return Err(Error::InvalidMedia(format!(
                "{} has zero duration",
                video.display()
            )));
        }
        job.duration = meta.duration;
        job.frame_rate = meta.frame_rate;
        job.width = meta.width;
        job.height = meta.height;
        job.codec = meta.codec;
        if meta.file_size > 0 {
            job.file_size = meta.file_size;
        }
        self.records.update_job(job)?;
        tracing::debug!(
            job_id = %id,
            duration = ?job.duration,
            width = ?job.width,
            height = ?job.height,
            "Metadata merged"
        );

        self.blobs.create_job_layout(id)?;

        let scratch = ScratchDir::new(id, self.settings.scratch_dir.as_deref())?;
        let result = self.process_frames(job, &video, &scratch).await;
        if let Err(e) = scratch.close() {
            tracing::warn!(job_id = %id, "Could not remove scratch dir: {e}");
        }
        let run = result?;

        let saved = self.records.save_frames(&run.frames)?;

        // `job` stays `processing` until the final status is stored.
        let mut finished = job.clone();
        if run.skipped > 0 {
            finished.transition(JobStatus::Cancelled)?;
            self.records.update_job(&finished)?;
            *job = finished;
            tracing::info!(
                job_id = %id,
                saved = saved.len(),
                skipped = run.skipped,
                "Job cancelled"
            );
        } else {
            finished.transition(JobStatus::Completed)?;
            self.records.update_job(&finished)?;
            *job = finished;
            self.tracker.complete(id);
            tracing::info!(
                job_id = %id,
                saved = saved.len(),
                dropped = run.dropped,
                "Job completed"
            );
        }

        Ok(JobOutcome {
            job: job.clone(),
            frames_saved: saved.len(),
            frames_expected: run.expected,
            frames_skipped: run.skipped,
            frames_dropped: run.dropped,
        })
    }

    async fn process_frames(&self, job: &Job, video: &Path, scratch: &ScratchDir) -> Result<FrameRun> {
        let id = job.id;
        let rate = self.settings.frame.frames_per_second;

        let mut raw = self.media.extract_frames(video, scratch.path(), rate).await?;
        let expected = match job.duration {
            Some(d) => d.expected_samples(rate) as usize,
            None => raw.len(),
        };
        if raw.len() > expected {
            tracing::debug!(
                job_id = %id,
                sampled = raw.len(),
                expected,
                "Discarding samples past the expected count"
            );
            raw.truncate(expected);
        }
        tracing::info!(job_id = %id, frames = raw.len(), "Frames sampled");

        let total = raw.len();
        let denominator = expected.max(1) as f64;
        let name = sanitize_name(&job.name);
        let permits = Arc::new(Semaphore::new(self.settings.max_parallel_frames));
        let settled = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        let mut skipped = 0;

        for (i, path) in raw.into_iter().enumerate() {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|_| Error::Internal("frame semaphore closed".into()))?;
            if self.tracker.is_cancelled(id) {
                skipped = total - i;
                tracing::info!(job_id = %id, skipped, "Cancelled; withholding remaining frames");
                break;
            }

            let processor = self.processor.clone();
            let tracker = Arc::clone(&self.tracker);
            let settled = Arc::clone(&settled);
            let name = name.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = processor.process(id, &name, &path).await;
                let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
                tracker.advance(id, (done as f64 / denominator).min(PRE_PERSIST_CEILING));
                (path, result)
            });
        }

        let mut frames: Vec<NewFrame> = Vec::with_capacity(total);
        let mut dropped = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(frame))) => frames.push(frame),
                Ok((path, Err(e))) => {
                    dropped += 1;
                    tracing::warn!(job_id = %id, file = %path.display(), "Frame dropped: {e}");
                }
                Err(e) => {
                    dropped += 1;
                    tracing::error!(job_id = %id, "Frame task panicked: {e}");
                }
            }
        }
        frames.sort_by_key(|f| f.frame_number);

        Ok(FrameRun {
            frames,
            expected,
            skipped,
            dropped,
        })
    }

    /// Remove stored files and records left by an earlier run.
    fn clear_previous_frames(&self, id: JobId) -> Result<()> {
        let frames = self.records.list_frames_by_job(id)?;
        for frame in &frames {
            self.blobs.delete(&frame.file_path)?;
            if let Some(thumb) = &frame.thumbnail_path {
                self.blobs.delete(thumb)?;
            }
        }
        let removed = self.records.delete_frames_by_job(id)?;
        if removed > 0 {
            tracing::info!(job_id = %id, removed, "Cleared frames from previous run");
        }
        Ok(())
    }
}

struct FrameRun {
    frames: Vec<NewFrame>,
    expected: usize,
    skipped: usize,
    dropped: usize,
}
