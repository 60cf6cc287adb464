use clap::{Parser, Subcommand};
use fc_core::{FrameId, JobId, JobStatus};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framecatcher")]
#[command(author, version, about = "Extract, encode and index frames from video files")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract frames from a video into a new job
    Extract {
        /// Video file to process
        #[arg(required = true)]
        video: PathBuf,

        /// Display name for the job (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Re-run a failed or cancelled job
    Retry {
        /// Job to retry
        job: JobId,
    },

    /// Probe a video file and display its metadata
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List jobs, newest first
    Jobs {
        /// Only jobs with this status (processing, completed, failed, cancelled)
        #[arg(long)]
        status: Option<JobStatus>,

        /// Only jobs whose name contains this text (case-insensitive)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "0")]
        offset: i64,

        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// List the frames of a job
    Frames {
        /// Job whose frames to list
        job: JobId,

        /// Only favorite frames
        #[arg(long, conflicts_with_all = ["top", "from", "to"])]
        favorites: bool,

        /// Show the N highest-quality frames, best first
        #[arg(long, value_name = "N", conflicts_with_all = ["from", "to"])]
        top: Option<i64>,

        /// Only frames at or after this many seconds
        #[arg(long, value_name = "SECONDS")]
        from: Option<f64>,

        /// Only frames at or before this many seconds
        #[arg(long, value_name = "SECONDS")]
        to: Option<f64>,

        #[arg(long, default_value = "0")]
        offset: i64,

        #[arg(long, default_value = "100")]
        limit: i64,
    },

    /// Mark frames as favorite
    Favorite {
        /// Frames to mark
        #[arg(required = true)]
        frames: Vec<FrameId>,

        /// Clear the favorite flag instead
        #[arg(long)]
        unset: bool,
    },

    /// Copy a stored frame (or its thumbnail) out of the blob store
    Export {
        /// Frame to export
        frame: FrameId,

        /// Destination file
        output: PathBuf,

        /// Export the thumbnail instead of the full frame
        #[arg(long)]
        thumbnail: bool,
    },

    /// Delete a job, its frames and its stored files
    Delete {
        /// Job to delete
        job: JobId,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Detect the hardware acceleration backend
    Backend,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
