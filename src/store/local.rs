//! Local directory store.

use std::collections::HashSet;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{DestinationStore, UploadStatus};
use crate::error::StoreError;

/// Stores images under `{root}/{folder}` on the local filesystem.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory backing a destination folder such as `/akiba-images`.
    pub fn folder_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder.trim_matches('/'))
    }
}

#[async_trait]
impl DestinationStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn verify(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(classify_io)
    }

    async fn list_existing_names(&self, folder: &str) -> Result<HashSet<String>, StoreError> {
        let dir = self.folder_dir(folder);
        let mut names = HashSet::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(classify_io(e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(classify_io)? {
            if entry.file_type().await.map_err(classify_io)?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
        }

        debug!("{} existing files in {}", names.len(), dir.display());
        Ok(names)
    }

    async fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<UploadStatus, StoreError> {
        let dir = self.folder_dir(folder);
        tokio::fs::create_dir_all(&dir).await.map_err(classify_io)?;
        let path = dir.join(name);
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || write_new(&path, &data))
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e)))?
    }
}

/// Create `path` exclusively; an existing file is reported, not replaced.
fn write_new(path: &Path, data: &[u8]) -> Result<UploadStatus, StoreError> {
    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(UploadStatus::AlreadyExists),
        Err(e) => return Err(classify_io(e)),
    };

    if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
        let _ = std::fs::remove_file(path);
        return Err(classify_io(e));
    }
    Ok(UploadStatus::Created)
}

/// A full disk or quota ends the run like a full Dropbox would; so does a
/// directory the process may not write to.
fn classify_io(e: io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => {
            StoreError::InsufficientSpace(e.to_string())
        }
        ErrorKind::PermissionDenied => StoreError::Unauthorized(e.to_string()),
        _ => StoreError::Io(e),
    }
}
