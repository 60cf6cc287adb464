//! Filesystem blob storage.
//!
//! Files are organized per job:
//!
//! ```text
//! {base}/albums/{job}/video/
//! {base}/albums/{job}/frames/original/frame_000000.heic
//! {base}/albums/{job}/frames/thumbnails/frame_000000_thumb.jpg
//! {base}/albums/{job}/metadata/
//! ```

use std::path::{Path, PathBuf};

use fc_core::{Error, JobId, Result};

use crate::BlobStore;

const LAYOUT_DIRS: &[&str] = &["video", "frames/original", "frames/thumbnails", "metadata"];

/// [`BlobStore`] rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn job_dir(&self, job: JobId) -> PathBuf {
        self.base_dir.join("albums").join(job.to_string())
    }

    /// Resolve a stored path, refusing anything outside the base directory.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let p = PathBuf::from(path);
        let escapes = p
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes || !p.starts_with(&self.base_dir) {
            return Err(Error::storage(path, "path is outside the blob store"));
        }
        Ok(p)
    }

    fn write(&self, path: PathBuf, data: &[u8]) -> Result<String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::storage(parent.display(), e.to_string()))?;
        }
        std::fs::write(&path, data).map_err(|e| Error::storage(path.display(), e.to_string()))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "Stored blob");
        Ok(path.to_string_lossy().to_string())
    }
}

impl BlobStore for LocalBlobStore {
    fn create_job_layout(&self, job: JobId) -> Result<String> {
        let dir = self.job_dir(job);
        for sub in LAYOUT_DIRS {
            let d = dir.join(sub);
            std::fs::create_dir_all(&d).map_err(|e| Error::storage(d.display(), e.to_string()))?;
        }
        Ok(dir.to_string_lossy().to_string())
    }

    fn store(&self, job: JobId, frame_number: u64, data: &[u8], extension: &str) -> Result<String> {
        let ext = extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(Error::Validation(format!("invalid file extension '{extension}'")));
        }
        let path = self
            .job_dir(job)
            .join("frames/original")
            .join(format!("frame_{frame_number:06}.{ext}"));
        self.write(path, data)
    }

    fn store_thumbnail(&self, job: JobId, frame_number: u64, data: &[u8]) -> Result<String> {
        let path = self
            .job_dir(job)
            .join("frames/thumbnails")
            .join(format!("frame_{frame_number:06}_thumb.jpg"));
        self.write(path, data)
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let p = self.resolve(path)?;
        std::fs::read(&p).map_err(|e| Error::storage(path, e.to_string()))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let p = self.resolve(path)?;
        match std::fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(path, e.to_string())),
        }
    }

    fn delete_job(&self, job: JobId) -> Result<()> {
        let dir = self.job_dir(job);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(job_id = %job, "Removed job storage");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(dir.display(), e.to_string())),
        }
    }
}
