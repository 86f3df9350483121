//! Destination stores receiving accepted images.
//!
//! A store lists the names already present in a folder and uploads new
//! objects with create-if-absent semantics; it never overwrites or deletes.

mod dropbox;
mod local;

pub use dropbox::DropboxStore;
pub use local::LocalStore;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;

/// Result of a successful upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// A new object was written.
    Created,
    /// An object with that name already existed and was left untouched.
    AlreadyExists,
}

/// Trait for pluggable destination stores.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Short identifier used in logs (e.g., "dropbox", "local").
    fn name(&self) -> &str;

    /// Check that credentials are valid and the store is reachable.
    async fn verify(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Names of all objects directly inside `folder`. A missing folder is empty.
    async fn list_existing_names(&self, folder: &str) -> Result<HashSet<String>, StoreError>;

    /// Write `bytes` as `folder/name` unless that object already exists.
    async fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<UploadStatus, StoreError>;
}

/// Snapshot of names present in the destination folder.
///
/// Taken once per run; names uploaded during the run are added so later
/// candidates with the same name are skipped.
#[derive(Debug, Clone, Default)]
pub struct ExistingNames {
    names: HashSet<String>,
}

impl ExistingNames {
    pub fn new(names: HashSet<String>) -> Self {
        Self { names }
    }

    /// Fetch the snapshot for `folder` from `store`.
    pub async fn load(store: &dyn DestinationStore, folder: &str) -> Result<Self, StoreError> {
        store.list_existing_names(folder).await.map(Self::new)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Join a destination folder and object name into a store path.
pub(crate) fn object_path(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name)
}
