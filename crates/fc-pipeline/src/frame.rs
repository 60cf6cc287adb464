//! Per-frame post-processing: encode, thumbnail, measure, score.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fc_av::MediaTool;
use fc_core::{Error, FixedSeconds, JobId, NewFrame, Result, RAW_FORMAT};
use fc_store::BlobStore;

use crate::backend::{BackendDispatcher, EncodedFrame};
use crate::quality;

/// Thumbnail and encode parameters applied to every frame.
#[derive(Debug, Clone)]
pub struct FrameSettings {
    pub frames_per_second: f64,
    pub quality: u8,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub thumbnail_quality: u8,
}

/// Turns one raw sampled image into a stored frame record.
#[derive(Clone)]
pub struct FrameProcessor {
    media: Arc<dyn MediaTool>,
    blobs: Arc<dyn BlobStore>,
    dispatcher: Arc<BackendDispatcher>,
    settings: FrameSettings,
}

impl FrameProcessor {
    pub fn new(
        media: Arc<dyn MediaTool>,
        blobs: Arc<dyn BlobStore>,
        dispatcher: Arc<BackendDispatcher>,
        settings: FrameSettings,
    ) -> Self {
        Self {
            media,
            blobs,
            dispatcher,
            settings,
        }
    }

    /// Process `raw` for `job`; `job_name` is the already sanitized prefix for
    /// the generated filename.
    ///
    /// Encode and thumbnail failures are recovered here. Any error returned
    /// drops only this frame.
    pub async fn process(&self, job: JobId, job_name: &str, raw: &Path) -> Result<NewFrame> {
        let frame_number = frame_index(raw);
        let timestamp = FixedSeconds::from_frame(frame_number, self.settings.frames_per_second);

        let stored = self.encode(job, frame_number, raw).await?;
        let thumbnail_path = self.thumbnail(job, frame_number, raw).await;

        let (width, height) = read_dimensions(raw).await?;
        let filename = frame_filename(job_name, timestamp, frame_number, &stored.extension);

        tracing::debug!(
            job_id = %job,
            frame = frame_number,
            format = %stored.format,
            "Frame processed"
        );

        Ok(NewFrame {
            job_id: job,
            filename,
            file_path: stored.path,
            timestamp,
            frame_number,
            width,
            height,
            file_size: stored.size,
            format: stored.format,
            quality_score: quality::score(width, height),
            thumbnail_path,
        })
    }

    /// Exactly one of accelerated, CPU or raw yields the stored file.
    async fn encode(&self, job: JobId, frame_number: u64, raw: &Path) -> Result<EncodedFrame> {
        let quality = self.settings.quality;
        let encoded = if self.dispatcher.is_accelerated() {
            self.dispatcher.encode(raw, job, frame_number, quality).await
        } else {
            self.dispatcher.encode_cpu(raw, job, frame_number, quality).await
        };

        match encoded {
            Ok(frame) => Ok(frame),
            Err(e) => {
                tracing::warn!(
                    job_id = %job,
                    frame = frame_number,
                    "Encode failed, storing raw image: {e}"
                );
                let bytes = tokio::fs::read(raw).await?;
                let path = self.blobs.store(job, frame_number, &bytes, RAW_FORMAT)?;
                Ok(EncodedFrame {
                    path,
                    size: bytes.len() as u64,
                    format: RAW_FORMAT.to_string(),
                    extension: RAW_FORMAT.to_string(),
                })
            }
        }
    }

    async fn thumbnail(&self, job: JobId, frame_number: u64, raw: &Path) -> Option<String> {
        let output = thumbnail_scratch_path(raw, frame_number);
        let ok = self
            .media
            .generate_thumbnail(
                raw,
                &output,
                self.settings.thumbnail_width,
                self.settings.thumbnail_height,
                self.settings.thumbnail_quality,
            )
            .await;
        if !ok {
            tracing::warn!(job_id = %job, frame = frame_number, "Thumbnail generation failed");
            return None;
        }

        let stored = match tokio::fs::read(&output).await {
            Ok(bytes) => self.blobs.store_thumbnail(job, frame_number, &bytes),
            Err(e) => Err(Error::from(e)),
        };
        let _ = tokio::fs::remove_file(&output).await;

        match stored {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(job_id = %job, frame = frame_number, "Thumbnail not stored: {e}");
                None
            }
        }
    }
}

fn thumbnail_scratch_path(raw: &Path, frame_number: u64) -> PathBuf {
    raw.with_file_name(format!("thumb_{frame_number:06}.jpg"))
}

async fn read_dimensions(raw: &Path) -> Result<(u32, u32)> {
    let path = raw.to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::image_dimensions(&path)
            .map_err(|e| Error::storage(path.display(), format!("unreadable image: {e}")))
    })
    .await
    .map_err(|e| Error::Internal(format!("dimension probe panicked: {e}")))?
}

/// Sequential index from a sampled file name: `frame_000042.jpg` is 42.
///
/// Names without digits map to 0.
pub fn frame_index(path: &Path) -> u64 {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let digits: String = stem.chars().filter(char::is_ascii_digit).collect();
    match digits.parse() {
        Ok(n) => n,
        Err(_) => {
            tracing::warn!("Could not parse frame index from {}; using 0", path.display());
            0
        }
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<name>_<HH_MM_SS>_frame_<%06d>.<ext>`
pub fn frame_filename(name: &str, timestamp: FixedSeconds, frame_number: u64, ext: &str) -> String {
    format!(
        "{name}_{}_frame_{frame_number:06}.{ext}",
        timestamp.file_stamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, CapabilityProbe, DispatcherSettings};
    use async_trait::async_trait;
    use fc_av::fake::FakeMediaTool;
    use fc_core::config::Config;
    use fc_core::FALLBACK_CPU_FORMAT;
    use fc_store::LocalBlobStore;

    struct OnlyNvidia;

    #[async_trait]
    impl CapabilityProbe for OnlyNvidia {
        async fn is_available(&self, backend: Backend) -> bool {
            backend == Backend::Nvidia
        }
        async fn utilization(&self, _backend: Backend) -> Option<f64> {
            None
        }
    }

    struct NoAccel;

    #[async_trait]
    impl CapabilityProbe for NoAccel {
        async fn is_available(&self, _backend: Backend) -> bool {
            false
        }
        async fn utilization(&self, _backend: Backend) -> Option<f64> {
            None
        }
    }

    fn settings() -> FrameSettings {
        FrameSettings {
            frames_per_second: 2.0,
            quality: 80,
            thumbnail_width: 200,
            thumbnail_height: 200,
            thumbnail_quality: 75,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        raw: Vec<PathBuf>,
        media: Arc<FakeMediaTool>,
        processor: FrameProcessor,
    }

    async fn fixture(media: FakeMediaTool, probe: Arc<dyn CapabilityProbe>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let media = Arc::new(media);
        let raw = media
            .extract_frames(Path::new("in.mp4"), &scratch, 2.0)
            .await
            .unwrap();

        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path().join("store")));
        blobs.create_job_layout(JobId::new(7)).unwrap();
        let dispatcher = Arc::new(BackendDispatcher::new(
            DispatcherSettings::from_config(&Config::default()),
            probe,
            media.clone(),
            blobs.clone(),
        ));
        dispatcher.initialize().await;

        let processor = FrameProcessor::new(media.clone(), blobs, dispatcher, settings());
        Fixture {
            _dir: dir,
            raw,
            media,
            processor,
        }
    }

    #[test]
    fn index_from_filename() {
        assert_eq!(frame_index(Path::new("/tmp/x/frame_000042.jpg")), 42);
        assert_eq!(frame_index(Path::new("frame_000000.jpg")), 0);
        assert_eq!(frame_index(Path::new("no_digits.jpg")), 0);
    }

    #[test]
    fn name_sanitizing() {
        assert_eq!(sanitize_name("My Clip (2).mp4"), "My_Clip__2__mp4");
        assert_eq!(sanitize_name("ok-name_1"), "ok-name_1");
        assert_eq!(sanitize_name("日本"), "__");
    }

    #[test]
    fn filename_layout() {
        let ts = FixedSeconds::from_millis(3_725_000);
        assert_eq!(
            frame_filename("clip", ts, 7, "heic"),
            "clip_01_02_05_frame_000007.heic"
        );
    }

    #[tokio::test]
    async fn cpu_path_record() {
        let f = fixture(FakeMediaTool::new(3).dimensions(1920, 1080), Arc::new(NoAccel)).await;
        let frame = f.processor.process(JobId::new(7), "clip", &f.raw[1]).await.unwrap();

        assert_eq!(frame.frame_number, 1);
        assert_eq!(frame.timestamp, FixedSeconds::from_millis(500));
        assert_eq!(frame.format, FALLBACK_CPU_FORMAT);
        assert_eq!(frame.filename, "clip_00_00_00_frame_000001.heic");
        assert_eq!((frame.width, frame.height), (1920, 1080));
        assert_eq!(frame.quality_score, 1.0);
        assert!(frame.file_size > 0);
        assert!(frame.thumbnail_path.is_some());
        assert_eq!(f.media.accelerated_calls(), 0);
        assert_eq!(f.media.convert_calls(), 1);
    }

    #[tokio::test]
    async fn accelerated_path_record() {
        let f = fixture(FakeMediaTool::new(1), Arc::new(OnlyNvidia)).await;
        let frame = f.processor.process(JobId::new(7), "clip", &f.raw[0]).await.unwrap();
        assert_eq!(frame.format, "heic");
        assert_eq!(f.media.accelerated_calls(), 1);
        assert_eq!(f.media.convert_calls(), 0);
        assert!((frame.quality_score - 320.0 * 180.0 / (1920.0 * 1080.0)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn raw_fallback_when_every_encode_fails() {
        let f = fixture(
            FakeMediaTool::new(1).failing_accelerated().failing_convert(),
            Arc::new(OnlyNvidia),
        )
        .await;
        let frame = f.processor.process(JobId::new(7), "clip", &f.raw[0]).await.unwrap();
        assert_eq!(frame.format, RAW_FORMAT);
        assert!(frame.file_path.ends_with("frame_000000.jpg"));
        assert_eq!(frame.file_size, std::fs::metadata(&f.raw[0]).unwrap().len());
    }

    #[tokio::test]
    async fn thumbnail_failure_is_not_fatal() {
        let f = fixture(FakeMediaTool::new(1).failing_thumbnail(), Arc::new(NoAccel)).await;
        let frame = f.processor.process(JobId::new(7), "clip", &f.raw[0]).await.unwrap();
        assert!(frame.thumbnail_path.is_none());
        assert_eq!(f.media.thumbnail_calls(), 1);
    }

    #[tokio::test]
    async fn unreadable_raw_drops_the_frame() {
        let f = fixture(FakeMediaTool::new(1).failing_convert(), Arc::new(NoAccel)).await;
        let bogus = f.raw[0].with_file_name("frame_000009.jpg");
        std::fs::write(&bogus, b"not a jpeg").unwrap();
        assert!(f.processor.process(JobId::new(7), "clip", &bogus).await.is_err());
    }
}
