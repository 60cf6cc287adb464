//! Media operations delegated to ffmpeg and ffprobe.
//!
//! [`MediaTool`] is the seam the pipeline talks to. [`Ffmpeg`] is the
//! production implementation; every method builds a [`ToolCommand`] and
//! inspects its output. Frame-level operations (`encode_frame`,
//! `convert_frame`, `generate_thumbnail`) report failure as `false` and log
//! it, leaving the fallback policy to the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fc_core::{Error, Result};

use crate::command::ToolCommand;
use crate::metadata::{self, VideoMetadata};
use crate::scratch;
use crate::tools::ToolRegistry;

/// Name prefix of the images written by [`MediaTool::extract_frames`].
pub const FRAME_PREFIX: &str = "frame_";

/// Extension of the images written by [`MediaTool::extract_frames`].
pub const FRAME_EXT: &str = "jpg";

/// Fixed mjpeg qscale for sampled frames (2 is the best quality).
const SAMPLE_QSCALE: u8 = 2;

// ---------------------------------------------------------------------------
// Encoder profiles
// ---------------------------------------------------------------------------

/// How an encoder is told the target quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    /// `-crf <n>` (libx265).
    Crf,
    /// `-cq <n>` (NVENC).
    ConstantQuality,
    /// `-global_quality <n>` (Quick Sync).
    GlobalQuality,
    /// `-qp <n>` (Vulkan video).
    Qp,
}

impl RateControl {
    fn flag(&self) -> &'static str {
        match self {
            RateControl::Crf => "-crf",
            RateControl::ConstantQuality => "-cq",
            RateControl::GlobalQuality => "-global_quality",
            RateControl::Qp => "-qp",
        }
    }
}

/// Backend-specific ffmpeg flags for a single-frame HEVC encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    /// Short label used in logs, e.g. "nvidia".
    pub label: &'static str,
    /// Arguments placed before `-i`.
    pub hwaccel_args: Vec<&'static str>,
    pub encoder: &'static str,
    pub rate_control: RateControl,
}

impl EncoderProfile {
    /// The software HEVC encoder every host can run.
    pub fn cpu() -> Self {
        Self {
            label: "cpu",
            hwaccel_args: Vec::new(),
            encoder: "libx265",
            rate_control: RateControl::Crf,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        !self.hwaccel_args.is_empty()
    }

    /// Full ffmpeg argument list for encoding `input` into `output`.
    pub fn encode_args(&self, input: &Path, output: &Path, quality: u8) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
        args.extend(self.hwaccel_args.iter().map(|s| s.to_string()));
        args.extend([
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-frames:v".into(),
            "1".into(),
            "-c:v".into(),
            self.encoder.to_string(),
            self.rate_control.flag().to_string(),
            crf_for_quality(quality).to_string(),
        ]);
        if self.encoder == "libx265" {
            args.extend(["-preset".to_string(), "medium".to_string()]);
        }
        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".into(),
            "-tag:v".into(),
            "hvc1".into(),
            "-f".into(),
            "mp4".into(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }
}

/// Map a 0-100 quality (higher is better) to a 0-51 CRF (lower is better).
pub fn crf_for_quality(quality: u8) -> u8 {
    let q = f64::from(quality.min(100));
    ((100.0 - q) * 0.51).round() as u8
}

/// Map a 0-100 quality to the mjpeg qscale range 31 (worst) ..= 2 (best).
pub fn qscale_for_quality(quality: u8) -> u8 {
    let q = f64::from(quality.min(100));
    31 - (q * 29.0 / 100.0).round() as u8
}

// ---------------------------------------------------------------------------
// MediaTool
// ---------------------------------------------------------------------------

/// Operations the pipeline needs from an external media toolchain.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Probe container and stream properties.
    async fn extract_metadata(&self, input: &Path) -> Result<VideoMetadata>;

    /// Sample `rate` frames per second into `output_dir` as
    /// `frame_%06d.jpg`, numbered from zero. Returns the written files in
    /// order; an empty list means the video yielded no frames.
    async fn extract_frames(&self, input: &Path, output_dir: &Path, rate: f64) -> Result<Vec<PathBuf>>;

    /// Encode one image to HEVC using the given profile.
    async fn encode_frame(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncoderProfile,
        quality: u8,
    ) -> bool;

    /// Encode one image with the software encoder.
    async fn convert_frame(&self, input: &Path, output: &Path, quality: u8) -> bool {
        self.encode_frame(input, output, &EncoderProfile::cpu(), quality)
            .await
    }

    /// Scale one image to fit within `width`x`height`, keeping aspect ratio.
    async fn generate_thumbnail(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
        quality: u8,
    ) -> bool;

    /// Whether `input` is a decodable video with a positive duration.
    async fn validate(&self, input: &Path) -> bool;
}

// ---------------------------------------------------------------------------
// Ffmpeg
// ---------------------------------------------------------------------------

/// [`MediaTool`] backed by the ffmpeg and ffprobe executables.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            timeout,
        }
    }

    /// Build from discovered tools; fails if ffmpeg or ffprobe is missing.
    pub fn from_registry(registry: &ToolRegistry) -> Result<Self> {
        let ffmpeg = registry.require("ffmpeg")?;
        let ffprobe = registry.require("ffprobe")?;
        Ok(Self::new(
            ffmpeg.path.clone(),
            ffprobe.path.clone(),
            ffmpeg.timeout,
        ))
    }

    fn ffmpeg_cmd(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(self.timeout);
        cmd
    }

    fn ffprobe_cmd(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffprobe.clone());
        cmd.timeout(self.timeout);
        cmd
    }

    /// Run a single-output ffmpeg invocation, reporting success as a bool.
    async fn run_single(&self, what: &str, args: Vec<String>, output: &Path) -> bool {
        let mut cmd = self.ffmpeg_cmd();
        cmd.args(args);
        match cmd.execute().await {
            Ok(_) if output.exists() => true,
            Ok(_) => {
                tracing::warn!("{what} reported success but {} is missing", output.display());
                false
            }
            Err(e) => {
                tracing::warn!("{what} failed for {}: {e}", output.display());
                false
            }
        }
    }
}

#[async_trait]
impl MediaTool for Ffmpeg {
    async fn extract_metadata(&self, input: &Path) -> Result<VideoMetadata> {
        let out = self
            .ffprobe_cmd()
            .arg("-hide_banner")
            .arg(input.to_string_lossy())
            .output()
            .await?;

        if !out.success() {
            return Err(Error::tool(
                "ffprobe",
                format!("exited with code {}: {}", out.exit_code(), out.stderr.trim()),
            ));
        }

        let mut meta = metadata::parse_banner(&out.combined());
        meta.file_size = tokio::fs::metadata(input).await?.len();

        tracing::debug!(
            path = %input.display(),
            duration = ?meta.duration,
            fps = ?meta.frame_rate,
            width = ?meta.width,
            height = ?meta.height,
            codec = ?meta.codec,
            "Extracted video metadata"
        );
        Ok(meta)
    }

    async fn extract_frames(&self, input: &Path, output_dir: &Path, rate: f64) -> Result<Vec<PathBuf>> {
        let pattern = output_dir.join(format!("{FRAME_PREFIX}%06d.{FRAME_EXT}"));

        tracing::info!(
            path = %input.display(),
            rate,
            "Sampling frames"
        );

        self.ffmpeg_cmd()
            .args(["-hide_banner", "-i"])
            .arg(input.to_string_lossy())
            .arg("-vf")
            .arg(format!("fps={rate}"))
            .arg("-q:v")
            .arg(SAMPLE_QSCALE.to_string())
            .args(["-start_number", "0", "-y"])
            .arg(pattern.to_string_lossy())
            .execute()
            .await?;

        // ffmpeg prints nothing useful about written files; list them instead.
        let frames = scratch::list_files(output_dir, FRAME_PREFIX, FRAME_EXT)?;

        tracing::info!(count = frames.len(), "Sampled frames");
        Ok(frames)
    }

    async fn encode_frame(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncoderProfile,
        quality: u8,
    ) -> bool {
        let args = profile.encode_args(input, output, quality);
        self.run_single(&format!("{} encode", profile.label), args, output)
            .await
    }

    async fn generate_thumbnail(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
        quality: u8,
    ) -> bool {
        let args = vec![
            "-hide_banner".to_string(),
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-vf".into(),
            format!("scale={width}:{height}:force_original_aspect_ratio=decrease"),
            "-q:v".into(),
            qscale_for_quality(quality).to_string(),
            "-frames:v".into(),
            "1".into(),
            output.to_string_lossy().to_string(),
        ];
        self.run_single("thumbnail", args, output).await
    }

    async fn validate(&self, input: &Path) -> bool {
        let result = self
            .ffprobe_cmd()
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input.to_string_lossy())
            .execute()
            .await;

        match result {
            Ok(out) => match metadata::parse_duration_value(&out.stdout) {
                Some(d) if d > 0.0 => true,
                other => {
                    tracing::warn!(path = %input.display(), duration = ?other, "Video has no positive duration");
                    false
                }
            },
            Err(e) => {
                tracing::warn!(path = %input.display(), "Video validation failed: {e}");
                false
            }
        }
    }
}
