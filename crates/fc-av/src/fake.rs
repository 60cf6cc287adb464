//! Scripted [`MediaTool`] for tests.
//!
//! `FakeMediaTool` writes real JPEG files with the `image` crate so the
//! pipeline's dimension probing and blob storage run unchanged. Every
//! operation can be told to fail, and an optional gate lets a test hold
//! frame encodes open to exercise cancellation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fc_core::{Error, FixedSeconds, Result};
use tokio::sync::Semaphore;

use crate::media::{EncoderProfile, MediaTool, FRAME_EXT, FRAME_PREFIX};
use crate::metadata::VideoMetadata;

/// A [`MediaTool`] whose results are fixed up front.
#[derive(Debug, Default)]
pub struct FakeMediaTool {
    samples: usize,
    width: u32,
    height: u32,
    duration: Option<FixedSeconds>,
    invalid: bool,
    fail_metadata: bool,
    fail_extract: bool,
    fail_accelerated: bool,
    fail_convert: bool,
    fail_thumbnail: bool,
    gate: Option<Arc<Semaphore>>,

    accelerated_calls: AtomicUsize,
    convert_calls: AtomicUsize,
    thumbnail_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeMediaTool {
    /// A tool for a video lasting `samples` seconds of 320x180 frames.
    ///
    /// Sampling at 1 Hz yields `samples` frames; other rates scale that
    /// count, rounding up.
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            width: 320,
            height: 180,
            duration: Some(FixedSeconds::from_millis(samples as i64 * 1000)),
            ..Self::default()
        }
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn duration(mut self, duration: Option<FixedSeconds>) -> Self {
        self.duration = duration;
        self
    }

    /// `validate` reports the source as undecodable.
    pub fn invalid(mut self) -> Self {
        self.invalid = true;
        self
    }

    pub fn failing_metadata(mut self) -> Self {
        self.fail_metadata = true;
        self
    }

    pub fn failing_extract(mut self) -> Self {
        self.fail_extract = true;
        self
    }

    /// Encodes with an accelerated profile fail.
    pub fn failing_accelerated(mut self) -> Self {
        self.fail_accelerated = true;
        self
    }

    /// Encodes with the CPU profile fail.
    pub fn failing_convert(mut self) -> Self {
        self.fail_convert = true;
        self
    }

    pub fn failing_thumbnail(mut self) -> Self {
        self.fail_thumbnail = true;
        self
    }

    /// Every encode waits for a permit from `gate` before finishing.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn accelerated_calls(&self) -> usize {
        self.accelerated_calls.load(Ordering::SeqCst)
    }

    pub fn convert_calls(&self) -> usize {
        self.convert_calls.load(Ordering::SeqCst)
    }

    pub fn thumbnail_calls(&self) -> usize {
        self.thumbnail_calls.load(Ordering::SeqCst)
    }

    /// Encodes that have started, accelerated or not.
    pub fn encodes_started(&self) -> usize {
        self.accelerated_calls() + self.convert_calls()
    }

    /// Highest number of encodes observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn write_jpeg(&self, path: &Path, width: u32, height: u32) -> Result<()> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        img.save(path)
            .map_err(|e| Error::storage(path.display(), e.to_string()))
    }
}

#[async_trait]
impl MediaTool for FakeMediaTool {
    async fn extract_metadata(&self, input: &Path) -> Result<VideoMetadata> {
        if self.fail_metadata {
            return Err(Error::tool("ffprobe", "scripted metadata failure"));
        }
        let file_size = tokio::fs::metadata(input).await.map(|m| m.len()).unwrap_or(0);
        Ok(VideoMetadata {
            duration: self.duration,
            frame_rate: Some(30),
            width: Some(self.width),
            height: Some(self.height),
            codec: Some("h264".into()),
            file_size,
        })
    }

    async fn extract_frames(&self, _input: &Path, output_dir: &Path, rate: f64) -> Result<Vec<PathBuf>> {
        if self.fail_extract {
            return Err(Error::tool("ffmpeg", "scripted extraction failure"));
        }
        let count = (self.samples as f64 * rate).ceil() as usize;
        let mut frames = Vec::with_capacity(count);
        for i in 0..count {
            let path = output_dir.join(format!("{FRAME_PREFIX}{i:06}.{FRAME_EXT}"));
            self.write_jpeg(&path, self.width, self.height)?;
            frames.push(path);
        }
        Ok(frames)
    }

    async fn encode_frame(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncoderProfile,
        _quality: u8,
    ) -> bool {
        let (counter, fail) = if profile.is_accelerated() {
            (&self.accelerated_calls, self.fail_accelerated)
        } else {
            (&self.convert_calls, self.fail_convert)
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            // A closed gate lets everything through.
            let _permit = gate.acquire().await;
        } else {
            tokio::task::yield_now().await;
        }

        let ok = !fail && tokio::fs::copy(input, output).await.is_ok();
        self.active.fetch_sub(1, Ordering::SeqCst);
        ok
    }

    async fn generate_thumbnail(
        &self,
        _input: &Path,
        output: &Path,
        width: u32,
        height: u32,
        _quality: u8,
    ) -> bool {
        self.thumbnail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_thumbnail {
            return false;
        }
        let w = width.min(self.width).max(1);
        let h = height.min(self.height).max(1);
        self.write_jpeg(output, w, h).is_ok()
    }

    async fn validate(&self, _input: &Path) -> bool {
        !self.invalid
    }
}
