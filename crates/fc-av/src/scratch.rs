//! Per-job scratch space for sampled frames and intermediate encodes.
//!
//! A [`ScratchDir`] wraps a [`tempfile::TempDir`]; the directory and
//! everything in it is removed when the value is dropped, whether the job
//! succeeded or not.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Temporary directory owned by one job run.
#[derive(Debug)]
pub struct ScratchDir {
    temp_dir: TempDir,
}

impl ScratchDir {
    /// Create `vfc_<job>_XXXX` under `parent`, or under the system temp
    /// directory when `parent` is `None`.
    pub fn new(job: impl std::fmt::Display, parent: Option<&Path>) -> fc_core::Result<Self> {
        let prefix = format!("vfc_{job}_");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let temp_dir = match parent {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| fc_core::Error::storage(&prefix, format!("failed to create scratch dir: {e}")))?;

        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Remove the directory now, reporting any error instead of ignoring it.
    pub fn close(self) -> fc_core::Result<()> {
        self.temp_dir.close()?;
        Ok(())
    }
}

/// Files in `dir` whose names start with `prefix` and end with `.ext`,
/// sorted by name. Subdirectories are skipped.
pub fn list_files(dir: &Path, prefix: &str, ext: &str) -> fc_core::Result<Vec<PathBuf>> {
    let suffix = format!(".{ext}");
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(&suffix) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scratch_is_prefixed_and_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::new(12, Some(parent.path())).unwrap();
            let name = scratch.path().file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("vfc_12_"), "unexpected name {name}");
            fs::write(scratch.path().join("frame_000000.jpg"), b"x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn creates_missing_parent() {
        let parent = tempfile::tempdir().unwrap();
        let nested = parent.path().join("a/b");
        let scratch = ScratchDir::new(1, Some(&nested)).unwrap();
        assert!(scratch.path().starts_with(&nested));
    }

    #[test]
    fn list_filters_and_sorts() {
        let scratch = ScratchDir::new(3, None).unwrap();
        for name in [
            "frame_000002.jpg",
            "frame_000000.jpg",
            "frame_000001.jpg",
            "other.jpg",
            "frame_000003.png",
        ] {
            fs::write(scratch.path().join(name), b"x").unwrap();
        }
        fs::create_dir(scratch.path().join("frame_dir.jpg")).unwrap();

        let files = list_files(scratch.path(), "frame_", "jpg").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["frame_000000.jpg", "frame_000001.jpg", "frame_000002.jpg"]
        );
    }

    #[test]
    fn close_removes_directory() {
        let scratch = ScratchDir::new(4, None).unwrap();
        let path = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!path.exists());
    }
}
