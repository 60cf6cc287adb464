//! Job and frame domain models shared by the pipeline and the stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::{FrameId, JobId};
use crate::time::FixedSeconds;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
    /// Cancellation withheld at least one sampled frame.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Processing -> Processing` covers starting a freshly created job.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Failed, Processing)
                | (Cancelled, Processing)
        )
    }

    /// Whether an explicit retry may restart a job in this state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(Error::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One video's end-to-end extraction run.
///
/// Metadata fields stay `None` until extraction succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub original_filename: String,
    pub video_path: String,
    pub file_size: u64,
    pub duration: Option<FixedSeconds>,
    pub frame_rate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Move to `next`, rejecting illegal transitions with [`Error::Conflict`].
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Conflict(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Fields required to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub original_filename: String,
    pub video_path: String,
    pub file_size: u64,
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Format tag recorded for frames encoded by the CPU path.
pub const FALLBACK_CPU_FORMAT: &str = "fallback-cpu";

/// Format tag recorded for raw sampled images stored unmodified.
pub const RAW_FORMAT: &str = "jpg";

/// One sampled, encoded image plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub job_id: JobId,
    pub filename: String,
    pub file_path: String,
    pub timestamp: FixedSeconds,
    pub frame_number: u64,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub format: String,
    pub quality_score: f64,
    pub is_favorite: bool,
    pub thumbnail_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A frame assembled by the pipeline, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFrame {
    pub job_id: JobId,
    pub filename: String,
    pub file_path: String,
    pub timestamp: FixedSeconds,
    pub frame_number: u64,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub format: String,
    pub quality_score: f64,
    pub thumbnail_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus) -> Job {
        Job {
            id: JobId::new(1),
            name: "clip".into(),
            original_filename: "clip.mp4".into(),
            video_path: "/videos/clip.mp4".into(),
            file_size: 1024,
            duration: None,
            frame_rate: None,
            width: None,
            height: None,
            codec: None,
            status,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn status_string_roundtrip() {
        for s in [
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn completed_is_terminal() {
        let mut j = job(JobStatus::Completed);
        let err = j.transition(JobStatus::Processing).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(j.status, JobStatus::Completed);
    }

    #[test]
    fn retry_transitions() {
        let mut failed = job(JobStatus::Failed);
        failed.transition(JobStatus::Processing).unwrap();
        assert_eq!(failed.status, JobStatus::Processing);

        let mut cancelled = job(JobStatus::Cancelled);
        cancelled.transition(JobStatus::Processing).unwrap();

        assert!(JobStatus::Failed.is_retryable());
        assert!(!JobStatus::Completed.is_retryable());
        assert!(!JobStatus::Processing.is_retryable());
    }

    #[test]
    fn failed_cannot_complete_directly() {
        let mut j = job(JobStatus::Failed);
        assert!(j.transition(JobStatus::Completed).is_err());
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
