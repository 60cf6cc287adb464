//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for tools, extraction, encoding, thumbnails, backends and
//! storage. Every section defaults sensibly so a completely empty `{}` file
//! is valid. `FC_*` environment variables override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub extraction: ExtractionConfig,
    pub encode: EncodeConfig,
    pub thumbnail: ThumbnailConfig,
    pub backends: BackendsConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Apply `FC_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `FC_*` overrides from an arbitrary lookup.
    ///
    /// Unparsable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring {key}={raw:?}: not a valid value");
                    None
                }
            }
        }

        if let Some(p) = lookup("FC_FFMPEG_PATH") {
            self.tools.ffmpeg_path = Some(PathBuf::from(p));
        }
        if let Some(p) = lookup("FC_FFPROBE_PATH") {
            self.tools.ffprobe_path = Some(PathBuf::from(p));
        }
        if let Some(v) = parsed("FC_FRAMES_PER_SECOND", lookup("FC_FRAMES_PER_SECOND")) {
            self.extraction.frames_per_second = v;
        }
        if let Some(v) = parsed("FC_MAX_PARALLEL_FRAMES", lookup("FC_MAX_PARALLEL_FRAMES")) {
            self.extraction.max_parallel_frames = v;
        }
        if let Some(v) = parsed("FC_ENCODE_QUALITY", lookup("FC_ENCODE_QUALITY")) {
            self.encode.quality = v;
        }
        if let Some(v) = parsed("FC_THUMBNAIL_WIDTH", lookup("FC_THUMBNAIL_WIDTH")) {
            self.thumbnail.width = v;
        }
        if let Some(v) = parsed("FC_THUMBNAIL_HEIGHT", lookup("FC_THUMBNAIL_HEIGHT")) {
            self.thumbnail.height = v;
        }
        if let Some(v) = parsed("FC_THUMBNAIL_QUALITY", lookup("FC_THUMBNAIL_QUALITY")) {
            self.thumbnail.quality = v;
        }
        if let Some(v) = parsed("FC_BACKENDS_ENABLED", lookup("FC_BACKENDS_ENABLED")) {
            self.backends.enabled = v;
        }
        if let Some(v) = parsed("FC_INTEL_ENABLED", lookup("FC_INTEL_ENABLED")) {
            self.backends.intel = v;
        }
        if let Some(v) = parsed("FC_NVIDIA_ENABLED", lookup("FC_NVIDIA_ENABLED")) {
            self.backends.nvidia = v;
        }
        if let Some(v) = parsed("FC_AMD_ENABLED", lookup("FC_AMD_ENABLED")) {
            self.backends.amd = v;
        }
        if let Some(p) = lookup("FC_STORAGE_DIR") {
            self.storage.base_path = PathBuf::from(p);
        }
        if let Some(p) = lookup("FC_DB_PATH") {
            self.storage.db_path = PathBuf::from(p);
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let fps = self.extraction.frames_per_second;
        if !fps.is_finite() || fps <= 0.0 {
            warnings.push(format!(
                "extraction.frames_per_second must be positive (got {fps})"
            ));
        }
        if self.extraction.max_parallel_frames == 0 {
            warnings.push("extraction.max_parallel_frames is 0; 1 will be used".into());
        }
        if self.encode.quality > 100 {
            warnings.push(format!(
                "encode.quality {} is above 100 and will be clamped",
                self.encode.quality
            ));
        }
        if self.encode.target_format.trim().is_empty() {
            warnings.push("encode.target_format is empty".into());
        }
        if self.thumbnail.width == 0 || self.thumbnail.height == 0 {
            warnings.push("thumbnail dimensions must be non-zero".into());
        }
        if self.thumbnail.quality > 100 {
            warnings.push(format!(
                "thumbnail.quality {} is above 100 and will be clamped",
                self.thumbnail.quality
            ));
        }
        if self.backends.enabled && self.backends.pool_size == 0 {
            warnings.push("backends.pool_size is 0; 1 will be used".into());
        }
        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; every tool call will time out".into());
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; PATH lookup will be used",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub nvidia_smi_path: Option<PathBuf>,
    pub vulkaninfo_path: Option<PathBuf>,
    pub python_path: Option<PathBuf>,
    /// Upper bound on any single tool invocation.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            nvidia_smi_path: None,
            vulkaninfo_path: None,
            python_path: None,
            timeout_secs: 300,
        }
    }
}

/// Frame sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub frames_per_second: f64,
    pub max_parallel_frames: usize,
    /// Parent directory for per-job scratch space (system temp when unset).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 1.0,
            max_parallel_frames: 4,
            scratch_dir: None,
        }
    }
}

/// Target codec settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Format tag and file extension for accelerated output.
    pub target_format: String,
    /// 0-100, higher is better.
    pub quality: u8,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            target_format: "heic".into(),
            quality: 80,
        }
    }
}

/// Thumbnail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            quality: 75,
        }
    }
}

/// Hardware-acceleration backend switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub enabled: bool,
    pub intel: bool,
    pub nvidia: bool,
    pub amd: bool,
    /// Concurrent accelerated encodes across all jobs.
    pub pool_size: usize,
    pub drain_timeout_secs: u64,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            intel: true,
            nvidia: true,
            amd: true,
            pool_size: 4,
            drain_timeout_secs: 5,
        }
    }
}

/// Record and blob storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_path: PathBuf,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./storage"),
            db_path: PathBuf::from("./framecatcher.db"),
        }
    }
}
