//! In-memory progress and cancellation table.
//!
//! One entry per job id, created when a run starts. Entries are removed
//! when a run fails and left in place (at 1.0) after success until the
//! caller clears them. Nothing here survives a restart.

use dashmap::DashMap;
use fc_core::JobId;

/// Progress and cancellation state of one job run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEntry {
    /// Fraction in `[0.0, 1.0]`.
    pub progress: f64,
    pub cancelled: bool,
}

/// Thread-safe map from job id to [`ProgressEntry`].
#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: DashMap<JobId, ProgressEntry>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset `job` to progress 0.0, not cancelled.
    pub fn start(&self, job: JobId) {
        self.entries.insert(
            job,
            ProgressEntry {
                progress: 0.0,
                cancelled: false,
            },
        );
    }

    /// Raise the job's progress to `fraction`; never moves backwards.
    ///
    /// Unknown jobs are ignored so a late frame task cannot resurrect an
    /// entry removed by a failed run.
    pub fn advance(&self, job: JobId, fraction: f64) {
        if let Some(mut entry) = self.entries.get_mut(&job) {
            let f = fraction.clamp(0.0, 1.0);
            if f > entry.progress {
                entry.progress = f;
            }
        }
    }

    /// Set the job's progress to 1.0.
    pub fn complete(&self, job: JobId) {
        if let Some(mut entry) = self.entries.get_mut(&job) {
            entry.progress = 1.0;
        }
    }

    /// Current progress, 0.0 for unknown jobs.
    pub fn progress(&self, job: JobId) -> f64 {
        self.entries.get(&job).map(|e| e.progress).unwrap_or(0.0)
    }

    pub fn entry(&self, job: JobId) -> Option<ProgressEntry> {
        self.entries.get(&job).map(|e| *e)
    }

    /// Flag the job as cancelled. Returns `false` if it is not tracked.
    pub fn request_cancellation(&self, job: JobId) -> bool {
        match self.entries.get_mut(&job) {
            Some(mut entry) => {
                entry.cancelled = true;
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, job: JobId) -> bool {
        self.entries.get(&job).map(|e| e.cancelled).unwrap_or(false)
    }

    pub fn remove(&self, job: JobId) -> Option<ProgressEntry> {
        self.entries.remove(&job).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
