//! Drop guards for job intermediates
//!
//! Whatever path a job takes out of the runner (success, failure, cancel or
//! panic) the guards remove what it left behind.

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Per-job working directory, removed with its contents on drop
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Create a fresh directory `<parent>/<key>-<random>`
    pub fn create(parent: &Path, key: &str) -> io::Result<Self> {
        let path = parent.join(format!("{key}-{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory"),
        }
    }
}

/// A file that is deleted on drop unless [`ScopedFile::keep`] was called
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
    keep: bool,
}

impl ScopedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard, handing ownership of the file back to the caller
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }

    /// Delete the file now, reporting the error instead of logging it
    pub fn remove(mut self) -> io::Result<()> {
        self.keep = true;
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove intermediate file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_dir_removed_with_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = {
            let staging = StagingDir::create(temp_dir.path(), "job").unwrap();
            std::fs::write(staging.path().join("partial.part"), b"x").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_dirs_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let a = StagingDir::create(temp_dir.path(), "job").unwrap();
        let b = StagingDir::create(temp_dir.path(), "job").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_scoped_file() {
        let temp_dir = TempDir::new().unwrap();
        let dropped = temp_dir.path().join("dropped.webm");
        let kept = temp_dir.path().join("kept.mp3");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(ScopedFile::new(&dropped));
        let path = ScopedFile::new(&kept).keep();

        assert!(!dropped.exists());
        assert!(kept.exists());
        assert_eq!(path, kept);

        ScopedFile::new(&kept).remove().unwrap();
        assert!(!kept.exists());
        ScopedFile::new(&kept).remove().unwrap();
    }
}
