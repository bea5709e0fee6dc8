//! Storage adapters.
//!
//! Every backend implements [`StorageAdapter`]. Backends that keep bytes on
//! local disk additionally implement [`LocalStorage`]; object stores implement
//! [`RemoteStorage`] and must be materialized before bytes can be served.
//!
//! ```text
//! ┌──────────────────────── Storage ────────────────────────┐
//! │ Local(FsAdapter)          │ Remote(RemoteAdapter)       │
//! │   <root>/<id>             │   <id>        (content)     │
//! │   <root>/<id>.json        │   <id>.json   (metadata)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub(crate) mod content;
mod fs;
pub(crate) mod fsutil;
mod remote;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use depot_shared::FileId;
use depot_shared::config::{StorageProvider, StorageSettings};

use crate::error::FileResult;
use crate::types::{FileMetadata, UploadedFile};

pub use fs::FsAdapter;
pub use remote::RemoteAdapter;

/// Operations every storage backend supports.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Whether an object with this id is stored.
    async fn exists(&self, id: FileId) -> FileResult<bool>;

    /// Reads the persisted metadata of an object.
    async fn get_metadata(&self, id: FileId) -> FileResult<FileMetadata>;

    /// Stores a staged upload under `id`.
    ///
    /// `md5`, `size`, `mime` and `iat` are computed by the adapter; the
    /// declarations carried by `file` are hints.
    async fn upload(&self, id: FileId, file: &UploadedFile) -> FileResult<FileMetadata>;

    /// Duplicates an object under `new_id` with a fresh ingestion time.
    async fn copy(&self, id: FileId, new_id: FileId) -> FileResult<FileMetadata>;

    /// Removes an object and its metadata. Fails with `NotFound` when absent.
    async fn delete(&self, id: FileId) -> FileResult<()>;
}

/// A backend whose content is already a local file.
pub trait LocalStorage: StorageAdapter {
    /// Path of the content file for `id`.
    fn local_path(&self, id: FileId) -> PathBuf;
}

/// A backend whose content has to be downloaded before it can be read locally.
#[async_trait]
pub trait RemoteStorage: StorageAdapter {
    /// Downloads the content of `id` to `dest`, replacing anything already
    /// there, and sets the file's modification time to the object's `iat`.
    async fn download_to(&self, id: FileId, dest: &Path) -> FileResult<()>;
}

/// The configured backend, chosen once at startup.
#[derive(Clone)]
pub enum Storage {
    /// Content lives on local disk.
    Local(Arc<dyn LocalStorage>),
    /// Content lives in an object store.
    Remote(Arc<dyn RemoteStorage>),
}

impl Storage {
    /// Builds the backend described by `settings`, running its startup checks.
    ///
    /// Remote clients are constructed lazily on first use.
    pub async fn from_settings(settings: &StorageSettings) -> FileResult<Self> {
        match &settings.provider {
            StorageProvider::LocalFs { root } => {
                let adapter = FsAdapter::open(root.clone()).await?;
                Ok(Self::Local(Arc::new(adapter)))
            }
            provider => {
                let adapter = RemoteAdapter::new(provider.clone(), settings.request_timeout_secs);
                Ok(Self::Remote(Arc::new(adapter)))
            }
        }
    }

    /// The backend as its common contract.
    #[must_use]
    pub fn adapter(&self) -> &dyn StorageAdapter {
        match self {
            Self::Local(local) => local.as_ref(),
            Self::Remote(remote) => remote.as_ref(),
        }
    }

    /// Backend kind for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Storage").field(&self.kind()).finish()
    }
}
