//! Output directory access
//!
//! Published files live directly under `server.output_dir`. Reads go
//! through `object_store`'s local filesystem backend; jobs stage their work
//! in a private directory below the same root (see [`guard`]) and publish
//! by linking into the root under a name no other file holds.

pub mod guard;

pub use guard::{ScopedFile, StagingDir};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use object_store::{ObjectStore, local::LocalFileSystem, path::Path as StoragePath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Directory under the output root that holds per-job staging directories
pub const STAGING_DIR: &str = ".staging";

/// Numbered alternatives tried before publishing gives up
const MAX_NAME_ATTEMPTS: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No free file name for {0}")]
    NameExhausted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// A published file opened for streaming
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub body: BoxStream<'static, object_store::Result<Bytes>>,
}

/// Access to the output directory
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
}

impl StorageClient {
    /// Open (creating if needed) the output directory at `root`
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        let root = root.canonicalize()?;
        let store = LocalFileSystem::new_with_prefix(&root)?;
        info!(root = %root.display(), "Output directory ready");

        Ok(Self {
            store: Arc::new(store),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a private working directory for one job
    pub fn staging_dir(&self, key: &str) -> Result<StagingDir> {
        Ok(StagingDir::create(&self.root.join(STAGING_DIR), key)?)
    }

    /// Move a finished file from staging into the output directory
    ///
    /// Existing files are never replaced: when the name is taken the file is
    /// published as `name (1).ext`, `name (2).ext` and so on. Returns the
    /// name it was published under.
    pub async fn publish(&self, staged: &Path) -> Result<String> {
        let filename = staged
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::InvalidName(staged.display().to_string()))?
            .to_string();
        validate_filename(&filename)?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = numbered_name(&filename, attempt);
            let target = self.root.join(&candidate);
            // Linking fails if the target exists, so a name is claimed atomically
            match tokio::fs::hard_link(staged, &target).await {
                Ok(()) => {
                    if let Err(e) = tokio::fs::remove_file(staged).await {
                        warn!(path = %staged.display(), error = %e, "Failed to remove staged file");
                    }
                    info!(filename = %candidate, "Published file");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(filename = %candidate, "File name taken");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::NameExhausted(filename))
    }

    /// Open a published file for streaming
    pub async fn open(&self, filename: &str) -> Result<StoredFile> {
        let path = validate_filename(filename)?;

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        debug!(filename, size = result.meta.size, "Serving file");
        Ok(StoredFile {
            filename: filename.to_string(),
            size: result.meta.size,
            last_modified: result.meta.last_modified,
            body: result.into_stream(),
        })
    }

    /// Check if a published file exists
    pub async fn exists(&self, filename: &str) -> Result<bool> {
        let path = validate_filename(filename)?;

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// `clip.mp4` for attempt 0, then `clip (1).mp4`, `clip (2).mp4`, ...
fn numbered_name(filename: &str, attempt: usize) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{stem} ({attempt}).{ext}"),
        None => format!("{stem} ({attempt})"),
    }
}

/// Accept a bare file name only: no separators, no parent references and
/// nothing hidden (which also keeps the staging area unreachable)
pub fn validate_filename(filename: &str) -> Result<StoragePath> {
    let invalid = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename.chars().any(char::is_control);
    if invalid {
        return Err(StorageError::InvalidName(filename.to_string()));
    }

    StoragePath::parse(filename).map_err(|_| StorageError::InvalidName(filename.to_string()))
}
