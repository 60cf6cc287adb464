//! Unified error type for framecatcher.
//!
//! All crates funnel their failures into [`Error`]. The pipeline decides per
//! variant whether a failure is fatal to a job, recovered per frame, or
//! downgraded silently (see [`Error::is_job_fatal`]).

use std::fmt;

/// Unified error type covering all failure modes in framecatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "frame").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation conflicts with the current state of a resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The source video is unreadable or has no positive duration.
    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    /// An external tool (ffmpeg, ffprobe, nvidia-smi) failed to run, exited
    /// non-zero, or timed out.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description, usually the tool's stderr.
        message: String,
    },

    /// A hardware-acceleration backend could not service a request.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A record store operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A blob store operation failed.
    #[error("Storage error [{path}]: {message}")]
    Storage {
        /// Blob path the operation targeted.
        path: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error aborts the job it occurs in.
    ///
    /// Backend failures are always downgraded to the CPU path and never
    /// end a job.
    pub fn is_job_fatal(&self) -> bool {
        !matches!(self, Error::BackendUnavailable(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Storage`].
    pub fn storage(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Storage {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("job", 42);
        assert_eq!(err.to_string(), "job not found: 42");
    }

    #[test]
    fn conflict_display() {
        let err = Error::Conflict("job 7 is already running".into());
        assert_eq!(err.to_string(), "Conflict: job 7 is already running");
    }

    #[test]
    fn invalid_media_display() {
        let err = Error::InvalidMedia("zero duration".into());
        assert_eq!(err.to_string(), "Invalid media: zero duration");
        assert!(err.is_job_fatal());
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
    }

    #[test]
    fn backend_unavailable_is_not_fatal() {
        let err = Error::BackendUnavailable("hevc_nvenc missing".into());
        assert!(!err.is_job_fatal());
    }

    #[test]
    fn database_display() {
        let err = Error::database("connection refused");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn storage_display() {
        let err = Error::storage("albums/1/frame_000001.heic", "disk full");
        assert_eq!(
            err.to_string(),
            "Storage error [albums/1/frame_000001.heic]: disk full"
        );
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
