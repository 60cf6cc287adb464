//! Hardware-acceleration backends and the per-frame encode dispatcher.
//!
//! [`Backend`] is the tagged variant; its one capability is producing the
//! ffmpeg [`EncoderProfile`] for an HEVC single-frame encode. The
//! [`BackendDispatcher`] detects the best backend once, runs accelerated
//! encodes on a bounded pool shared by all jobs, and falls back to the CPU
//! encoder for any frame whose accelerated encode fails.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fc_av::{EncoderProfile, MediaTool, RateControl, ToolCommand, ToolRegistry};
use fc_core::config::Config;
use fc_core::{Error, JobId, Result, FALLBACK_CPU_FORMAT};
use fc_store::BlobStore;
use parking_lot::RwLock;
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Timeout for capability and utilization probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// An encoding path. `Cpu` is always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Intel,
    Nvidia,
    Amd,
    Cpu,
}

impl Backend {
    /// Accelerated backends in detection priority order.
    pub const ACCELERATED: [Backend; 3] = [Backend::Intel, Backend::Nvidia, Backend::Amd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Intel => "intel",
            Backend::Nvidia => "nvidia",
            Backend::Amd => "amd",
            Backend::Cpu => "cpu",
        }
    }

    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Backend::Cpu)
    }

    /// ffmpeg flags for encoding one frame on this backend.
    pub fn profile(&self) -> EncoderProfile {
        match self {
            Backend::Intel => EncoderProfile {
                label: "intel",
                hwaccel_args: vec!["-hwaccel", "qsv"],
                encoder: "hevc_qsv",
                rate_control: RateControl::GlobalQuality,
            },
            Backend::Nvidia => EncoderProfile {
                label: "nvidia",
                hwaccel_args: vec!["-hwaccel", "cuda"],
                encoder: "hevc_nvenc",
                rate_control: RateControl::ConstantQuality,
            },
            Backend::Amd => EncoderProfile {
                label: "amd",
                hwaccel_args: vec!["-init_hw_device", "vulkan", "-hwaccel", "vulkan"],
                encoder: "hevc_vulkan",
                rate_control: RateControl::Qp,
            },
            Backend::Cpu => EncoderProfile::cpu(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Capability probing
// ---------------------------------------------------------------------------

/// Host checks used to pick a backend and report its load.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Whether `backend` can be used on this host.
    async fn is_available(&self, backend: Backend) -> bool;

    /// Instantaneous utilization in `[0.0, 1.0]`, if the backend reports one.
    async fn utilization(&self, backend: Backend) -> Option<f64>;
}

/// [`CapabilityProbe`] that inspects the real host.
///
/// - Intel: the OpenVINO runtime imports in python3, or
///   `INTEL_OPENVINO_DIR` names an existing directory.
/// - Nvidia: `nvidia-smi` exits successfully.
/// - AMD: `vulkaninfo --summary` exits successfully.
#[derive(Debug, Clone, Default)]
pub struct HostProbe {
    python: Option<PathBuf>,
    nvidia_smi: Option<PathBuf>,
    vulkaninfo: Option<PathBuf>,
}

impl HostProbe {
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        Self {
            python: registry.path("python3").map(Path::to_path_buf),
            nvidia_smi: registry.path("nvidia-smi").map(Path::to_path_buf),
            vulkaninfo: registry.path("vulkaninfo").map(Path::to_path_buf),
        }
    }

    async fn exits_ok(tool: Option<&PathBuf>, args: &[&str]) -> bool {
        let Some(path) = tool else {
            return false;
        };
        let mut cmd = ToolCommand::new(path.clone());
        cmd.args(args.iter().copied()).timeout(PROBE_TIMEOUT);
        match cmd.output().await {
            Ok(out) => out.success(),
            Err(e) => {
                tracing::debug!("Probe {} failed: {e}", path.display());
                false
            }
        }
    }
}

#[async_trait]
impl CapabilityProbe for HostProbe {
    async fn is_available(&self, backend: Backend) -> bool {
        match backend {
            Backend::Intel => {
                if let Ok(dir) = std::env::var("INTEL_OPENVINO_DIR") {
                    if Path::new(&dir).is_dir() {
                        return true;
                    }
                }
                Self::exits_ok(self.python.as_ref(), &["-c", "import openvino"]).await
            }
            Backend::Nvidia => Self::exits_ok(self.nvidia_smi.as_ref(), &[]).await,
            Backend::Amd => Self::exits_ok(self.vulkaninfo.as_ref(), &["--summary"]).await,
            Backend::Cpu => true,
        }
    }

    async fn utilization(&self, backend: Backend) -> Option<f64> {
        if backend != Backend::Nvidia {
            return None;
        }
        let path = self.nvidia_smi.as_ref()?;
        let out = ToolCommand::new(path.clone())
            .args([
                "--query-gpu=utilization.gpu",
                "--format=csv,noheader,nounits",
            ])
            .timeout(PROBE_TIMEOUT)
            .execute()
            .await
            .ok()?;
        parse_utilization(&out.stdout)
    }
}

/// Parse `nvidia-smi` utilization output (percent of the first GPU).
pub fn parse_utilization(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .parse::<f64>()
        .ok()
        .map(|pct| (pct / 100.0).clamp(0.0, 1.0))
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub enabled: bool,
    pub intel: bool,
    pub nvidia: bool,
    pub amd: bool,
    pub pool_size: usize,
    pub drain_timeout: Duration,
    /// Format tag and extension for accelerated output.
    pub target_format: String,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.backends.enabled,
            intel: config.backends.intel,
            nvidia: config.backends.nvidia,
            amd: config.backends.amd,
            pool_size: config.backends.pool_size.max(1),
            drain_timeout: Duration::from_secs(config.backends.drain_timeout_secs),
            target_format: config.encode.target_format.clone(),
        }
    }

    fn backend_enabled(&self, backend: Backend) -> bool {
        match backend {
            Backend::Intel => self.intel,
            Backend::Nvidia => self.nvidia,
            Backend::Amd => self.amd,
            Backend::Cpu => true,
        }
    }
}

/// A frame written to the blob store by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub path: String,
    pub size: u64,
    /// Target format for accelerated output, `fallback-cpu` otherwise.
    pub format: String,
    /// File extension the frame was stored with.
    pub extension: String,
}

/// Bounded worker resource for accelerated encodes.
#[derive(Clone)]
struct AccelPool {
    backend: Backend,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

/// Detects the acceleration backend and encodes frames through it.
pub struct BackendDispatcher {
    settings: DispatcherSettings,
    probe: Arc<dyn CapabilityProbe>,
    media: Arc<dyn MediaTool>,
    blobs: Arc<dyn BlobStore>,
    detected: OnceCell<Backend>,
    pool: RwLock<Option<AccelPool>>,
}

impl BackendDispatcher {
    pub fn new(
        settings: DispatcherSettings,
        probe: Arc<dyn CapabilityProbe>,
        media: Arc<dyn MediaTool>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            settings,
            probe,
            media,
            blobs,
            detected: OnceCell::new(),
            pool: RwLock::new(None),
        }
    }

    /// Probe enabled backends in priority order; the first available wins.
    pub async fn detect_optimal_backend(&self) -> Backend {
        if !self.settings.enabled {
            tracing::info!("Hardware acceleration disabled; using CPU");
            return Backend::Cpu;
        }
        for backend in Backend::ACCELERATED {
            if !self.settings.backend_enabled(backend) {
                tracing::debug!(backend = %backend, "Backend disabled in config");
                continue;
            }
            if self.probe.is_available(backend).await {
                tracing::info!(backend = %backend, "Detected acceleration backend");
                return backend;
            }
            tracing::debug!(backend = %backend, "Backend not available");
        }
        tracing::info!("No acceleration backend available; using CPU");
        Backend::Cpu
    }

    /// Detect once and, for an accelerated backend, allocate the worker pool.
    ///
    /// Calling again is a no-op; after [`cleanup`](Self::cleanup) it
    /// re-allocates the pool without probing again.
    pub async fn initialize(&self) -> Backend {
        let backend = *self
            .detected
            .get_or_init(|| self.detect_optimal_backend())
            .await;

        if backend.is_accelerated() {
            let mut pool = self.pool.write();
            if pool.is_none() {
                tracing::info!(
                    backend = %backend,
                    workers = self.settings.pool_size,
                    "Allocated accelerated encode pool"
                );
                *pool = Some(AccelPool {
                    backend,
                    permits: Arc::new(Semaphore::new(self.settings.pool_size)),
                    tasks: TaskTracker::new(),
                    cancel: CancellationToken::new(),
                });
            }
        }
        backend
    }

    /// Whether frames will be routed through an accelerated backend.
    pub fn is_accelerated(&self) -> bool {
        self.pool.read().is_some()
    }

    /// The backend encodes currently go through.
    pub fn active_backend(&self) -> Backend {
        self.pool
            .read()
            .as_ref()
            .map(|p| p.backend)
            .unwrap_or(Backend::Cpu)
    }

    /// Encode `input` for frame `frame_number` of `job` and store it.
    ///
    /// An accelerated failure is logged and the frame is re-encoded on the
    /// CPU; only a CPU failure is returned.
    pub async fn encode(
        &self,
        input: &Path,
        job: JobId,
        frame_number: u64,
        quality: u8,
    ) -> Result<EncodedFrame> {
        let pool = self.pool.read().clone();
        if let Some(pool) = pool {
            match self
                .encode_accelerated(&pool, input, job, frame_number, quality)
                .await
            {
                Ok(frame) => return Ok(frame),
                Err(e) => tracing::warn!(
                    job_id = %job,
                    frame = frame_number,
                    backend = %pool.backend,
                    "Accelerated encode failed, falling back to CPU: {e}"
                ),
            }
        }
        self.encode_cpu(input, job, frame_number, quality).await
    }

    /// Encode with the software encoder and store the result as
    /// `fallback-cpu`.
    pub async fn encode_cpu(
        &self,
        input: &Path,
        job: JobId,
        frame_number: u64,
        quality: u8,
    ) -> Result<EncodedFrame> {
        let output = self.scratch_output(input, Backend::Cpu);
        if !self.media.convert_frame(input, &output, quality).await {
            return Err(Error::tool(
                "ffmpeg",
                format!("CPU encode failed for frame {frame_number}"),
            ));
        }
        self.store_output(&output, job, frame_number, FALLBACK_CPU_FORMAT)
            .await
    }

    async fn encode_accelerated(
        &self,
        pool: &AccelPool,
        input: &Path,
        job: JobId,
        frame_number: u64,
        quality: u8,
    ) -> Result<EncodedFrame> {
        let shutting_down = || Error::BackendUnavailable("dispatcher is shutting down".into());

        let _permit = tokio::select! {
            _ = pool.cancel.cancelled() => return Err(shutting_down()),
            permit = Arc::clone(&pool.permits).acquire_owned() => {
                permit.map_err(|_| shutting_down())?
            }
        };

        let profile = pool.backend.profile();
        let output = self.scratch_output(input, pool.backend);
        let encode = pool
            .tasks
            .track_future(self.media.encode_frame(input, &output, &profile, quality));

        // Dropping the encode on cancellation kills the ffmpeg child.
        let ok = tokio::select! {
            _ = pool.cancel.cancelled() => return Err(shutting_down()),
            ok = encode => ok,
        };
        if !ok {
            return Err(Error::BackendUnavailable(format!(
                "{} encode failed",
                profile.encoder
            )));
        }

        self.store_output(&output, job, frame_number, &self.settings.target_format)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("storing accelerated output: {e}")))
    }

    /// Intermediate output next to the raw frame, e.g. `frame_000003.nvidia.heic`.
    fn scratch_output(&self, input: &Path, backend: Backend) -> PathBuf {
        input.with_extension(format!(
            "{}.{}",
            backend.as_str(),
            self.settings.target_format
        ))
    }

    async fn store_output(
        &self,
        output: &Path,
        job: JobId,
        frame_number: u64,
        format: &str,
    ) -> Result<EncodedFrame> {
        let bytes = tokio::fs::read(output).await?;
        let extension = self.settings.target_format.clone();
        let path = self.blobs.store(job, frame_number, &bytes, &extension)?;
        if let Err(e) = tokio::fs::remove_file(output).await {
            tracing::debug!("Could not remove {}: {e}", output.display());
        }
        Ok(EncodedFrame {
            path,
            size: bytes.len() as u64,
            format: format.to_string(),
            extension,
        })
    }

    /// Utilization of the active backend; 0.0 when unsupported or unknown.
    pub async fn backend_usage(&self) -> f64 {
        let backend = self.active_backend();
        if !backend.is_accelerated() {
            return 0.0;
        }
        self.probe
            .utilization(backend)
            .await
            .map(|u| u.clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    /// Release the accelerated pool, waiting up to the drain timeout for
    /// in-flight encodes before cancelling them.
    ///
    /// Returns `false` if the drain timed out.
    pub async fn cleanup(&self) -> bool {
        let Some(pool) = self.pool.write().take() else {
            return true;
        };

        pool.tasks.close();
        let drained = tokio::time::timeout(self.settings.drain_timeout, pool.tasks.wait())
            .await
            .is_ok();
        if drained {
            tracing::info!(backend = %pool.backend, "Accelerated encode pool drained");
        } else {
            tracing::warn!(
                backend = %pool.backend,
                in_flight = pool.tasks.len(),
                "Drain timed out after {:?}; cancelling in-flight encodes",
                self.settings.drain_timeout
            );
        }
        pool.cancel.cancel();
        pool.permits.close();
        drained
    }
}
