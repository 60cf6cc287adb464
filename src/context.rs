//! Application context.
//!
//! [`AppContext`] wires configuration, the SQLite pool, the blob store, the
//! media tool and the backend dispatcher into one [`Orchestrator`]. It only
//! holds `Arc`s and is cheap to clone.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use fc_av::{Ffmpeg, MediaTool, ToolRegistry};
use fc_core::config::Config;
use fc_core::{Job, NewJob};
use fc_db::pool::{init_pool, DbPool};
use fc_db::SqliteRecordStore;
use fc_pipeline::{
    BackendDispatcher, CapabilityProbe, DispatcherSettings, HostProbe, Orchestrator,
    PipelineSettings, ProgressTracker,
};
use fc_store::{LocalBlobStore, RecordStore};

/// Everything a CLI command needs to run or inspect jobs.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db: DbPool,
    pub records: Arc<SqliteRecordStore>,
    pub blobs: Arc<LocalBlobStore>,
    pub dispatcher: Arc<BackendDispatcher>,
    pub orchestrator: Orchestrator,
}

impl AppContext {
    /// Build the production context: SQLite at `storage.db_path`, files under
    /// `storage.base_path`, ffmpeg from the tool registry, host capability probe.
    pub fn from_config(config: Config) -> Result<Self> {
        let registry = ToolRegistry::discover(&config.tools);
        let media = Ffmpeg::from_registry(&registry).context("ffmpeg and ffprobe are required")?;
        let probe = HostProbe::from_registry(&registry);
        let db = open_db(&config)?;
        Ok(Self::with_parts(config, db, Arc::new(media), Arc::new(probe)))
    }

    /// Build a context around an explicit pool, media tool and probe.
    pub fn with_parts(
        config: Config,
        db: DbPool,
        media: Arc<dyn MediaTool>,
        probe: Arc<dyn CapabilityProbe>,
    ) -> Self {
        let records = Arc::new(SqliteRecordStore::new(db.clone()));
        let blobs = Arc::new(LocalBlobStore::new(config.storage.base_path.clone()));
        let dispatcher = Arc::new(BackendDispatcher::new(
            DispatcherSettings::from_config(&config),
            probe,
            Arc::clone(&media),
            blobs.clone(),
        ));
        let orchestrator = Orchestrator::new(
            records.clone(),
            blobs.clone(),
            media,
            Arc::clone(&dispatcher),
            Arc::new(ProgressTracker::new()),
            PipelineSettings::from_config(&config),
        );

        Self {
            config: Arc::new(config),
            db,
            records,
            blobs,
            dispatcher,
            orchestrator,
        }
    }

    /// Create a `processing` job for `video`. The display name defaults to
    /// the file stem.
    pub fn register_video(&self, video: &Path, name: Option<String>) -> Result<Job> {
        let meta = std::fs::metadata(video)
            .with_context(|| format!("Cannot read video {}", video.display()))?;
        if !meta.is_file() {
            anyhow::bail!("Not a file: {}", video.display());
        }
        let video_path = video
            .canonicalize()
            .unwrap_or_else(|_| video.to_path_buf());
        let original_filename = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = name.unwrap_or_else(|| {
            video
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "video".into())
        });

        let job = self.records.create_job(NewJob {
            name,
            original_filename,
            video_path: video_path.to_string_lossy().to_string(),
            file_size: meta.len(),
        })?;
        tracing::info!(job_id = %job.id, video = %job.video_path, "Job registered");
        Ok(job)
    }
}

/// Open the SQLite pool at `storage.db_path`, creating parent directories.
pub fn open_db(config: &Config) -> Result<DbPool> {
    let path = &config.storage.db_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db_path = path.to_string_lossy();
    tracing::debug!("Opening database at {}", db_path);
    Ok(init_pool(&db_path)?)
}

/// Load the config file (or defaults) and apply `FC_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env();
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }
    config
}
