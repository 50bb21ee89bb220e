//! Object store for uploaded PDF bytes.
//!
//! Blobs live in a flat directory as `<id>.pdf`, where `id` is a UUID v4
//! generated on `put`. The registry only ever holds the id.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ServiceResult, StorageError};

const BLOB_EXTENSION: &str = "pdf";

/// Durable blob storage addressed by generated id
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Open the store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> ServiceResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StorageError::Io)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a fresh id and return the id.
    ///
    /// The data is written to a temp file in the same directory, synced, and
    /// then linked into place without replacing an existing blob.
    pub fn put(&self, bytes: &[u8]) -> ServiceResult<String> {
        let id = Uuid::new_v4().to_string();
        let path = self.blob_path(&id);

        let mut file = NamedTempFile::new_in(&self.root).map_err(StorageError::Io)?;
        file.write_all(bytes).map_err(StorageError::Io)?;
        file.as_file().sync_all().map_err(StorageError::Io)?;
        file.persist_noclobber(&path)
            .map_err(|e| StorageError::Io(e.error))?;

        debug!(blob_id = %id, size = bytes.len(), "Blob stored");
        Ok(id)
    }

    /// Read a blob
    pub fn get(&self, id: &str) -> ServiceResult<Vec<u8>> {
        let path = self.path_for(id)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::BlobNotFound { id: id.to_string() }.into()
            } else {
                StorageError::Io(e).into()
            }
        })
    }

    #[cfg(test)]
    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Best-effort removal; a missing blob is not an error
    pub fn delete(&self, id: &str) {
        let path = match self.path_for(id) {
            Ok(path) => path,
            Err(e) => {
                warn!(blob_id = %id, error = %e, "Refusing to delete blob");
                return;
            }
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!(blob_id = %id, "Blob deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(blob_id = %id, error = %e, "Failed to delete blob"),
        }
    }

    /// Number of blobs currently stored
    pub fn count(&self) -> ServiceResult<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.root).map_err(StorageError::Io)? {
            let path = entry.map_err(StorageError::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Path of a blob; the id must be a UUID so it can never escape the root
    pub fn path_for(&self, id: &str) -> ServiceResult<PathBuf> {
        Uuid::parse_str(id).map_err(|_| StorageError::InvalidId { id: id.to_string() })?;
        Ok(self.blob_path(id))
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, BLOB_EXTENSION))
    }
}
