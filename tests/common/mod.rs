//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temp storage
//! root, a placeholder video file and a full [`AppContext`] driven by a
//! scripted media tool.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fc_av::fake::FakeMediaTool;
use fc_core::config::Config;
use fc_core::Job;
use fc_db::pool::{init_memory_pool, DbPool};
use fc_pipeline::{Backend, CapabilityProbe};
use framecatcher::context::AppContext;
use tempfile::TempDir;

/// [`CapabilityProbe`] reporting a fixed set of backends.
#[derive(Default)]
pub struct StaticProbe {
    available: HashSet<Backend>,
}

impl StaticProbe {
    /// No accelerated backend: every frame goes through the CPU path.
    pub fn cpu_only() -> Self {
        Self::default()
    }

    pub fn with(backend: Backend) -> Self {
        Self {
            available: HashSet::from([backend]),
        }
    }
}

#[async_trait]
impl CapabilityProbe for StaticProbe {
    async fn is_available(&self, backend: Backend) -> bool {
        self.available.contains(&backend)
    }

    async fn utilization(&self, _backend: Backend) -> Option<f64> {
        None
    }
}

/// Test harness wrapping an [`AppContext`] backed by an in-memory database.
pub struct TestHarness {
    pub ctx: AppContext,
    pub media: Arc<FakeMediaTool>,
    pub db: DbPool,
    pub config: Config,
    pub video: PathBuf,
    pub dir: TempDir,
}

impl TestHarness {
    /// CPU-only harness with default settings.
    pub async fn new(media: FakeMediaTool) -> Self {
        Self::build(media, StaticProbe::cpu_only(), |_| {}).await
    }

    /// Harness with a custom probe and config tweaks applied on top of the
    /// defaults. The dispatcher is initialized before returning.
    pub async fn build(
        media: FakeMediaTool,
        probe: StaticProbe,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.base_path = dir.path().join("storage");
        config.extraction.scratch_dir = Some(dir.path().join("scratch"));
        configure(&mut config);

        let video = dir.path().join("Beach Trip.mp4");
        std::fs::write(&video, b"placeholder video bytes").expect("failed to write video");

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let media = Arc::new(media);
        let ctx = AppContext::with_parts(config.clone(), db.clone(), media.clone(), Arc::new(probe));
        ctx.dispatcher.initialize().await;

        Self {
            ctx,
            media,
            db,
            config,
            video,
            dir,
        }
    }

    /// A second context over the same database and storage, with a
    /// different media tool. Used to re-run a job after a scripted failure.
    pub async fn reopen(&self, media: FakeMediaTool) -> (AppContext, Arc<FakeMediaTool>) {
        let media = Arc::new(media);
        let ctx = AppContext::with_parts(
            self.config.clone(),
            self.db.clone(),
            media.clone(),
            Arc::new(StaticProbe::cpu_only()),
        );
        ctx.dispatcher.initialize().await;
        (ctx, media)
    }

    /// Register the placeholder video as a new job.
    pub fn new_job(&self) -> Job {
        self.ctx
            .register_video(&self.video, None)
            .expect("failed to register video")
    }
}
