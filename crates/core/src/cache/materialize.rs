//! Local mirror of remote content.

use std::path::{Path, PathBuf};

use depot_shared::FileId;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{FileError, FileResult};
use crate::storage::Storage;
use crate::storage::fsutil::{ensure_writable_dir, remove_if_exists, staging_path};

/// Guarantees a readable local path for any stored id.
///
/// Mirrored files are never re-validated and never expire. Two concurrent
/// misses for one id may both download; each lands in its own staging file
/// and the last rename wins with identical bytes.
#[derive(Debug, Clone)]
pub struct MaterializationCache {
    dir: PathBuf,
}

impl MaterializationCache {
    /// Opens the mirror directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Configuration` if the directory is not writable.
    pub async fn open(dir: PathBuf) -> FileResult<Self> {
        ensure_writable_dir(&dir)
            .await
            .map_err(FileError::configuration)?;
        info!(path = %dir.display(), "file cache ready");
        Ok(Self { dir })
    }

    /// Mirror directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn mirror_path(&self, id: FileId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Returns a path holding the bytes of `id` right now.
    ///
    /// Local backends hand out their own path. Remote content is downloaded
    /// once and served from the mirror afterwards.
    pub async fn materialize(&self, storage: &Storage, id: FileId) -> FileResult<PathBuf> {
        let remote = match storage {
            Storage::Local(local) => return Ok(local.local_path(id)),
            Storage::Remote(remote) => remote,
        };

        // A delete racing this download can leave a stale mirror behind.
        let target = self.mirror_path(id);
        if fs::try_exists(&target).await? {
            debug!(file_id = %id, path = %target.display(), "file cache hit");
            return Ok(target);
        }

        debug!(file_id = %id, path = %target.display(), "file cache miss, downloading");
        let staging = staging_path(&target);
        let result = async {
            remote.download_to(id, &staging).await?;
            fs::rename(&staging, &target).await?;
            Ok::<_, FileError>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = remove_if_exists(&staging).await {
                warn!(file_id = %id, path = %staging.display(), error = %cleanup, "cannot remove staging file");
            }
            return Err(e);
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsAdapter, RemoteAdapter, StorageAdapter};
    use crate::types::UploadedFile;
    use opendal::{Operator, services};
    use std::sync::Arc;

    fn memory_storage() -> Storage {
        let op = Operator::new(services::Memory::default())
            .unwrap()
            .finish();
        Storage::Remote(Arc::new(RemoteAdapter::with_operator(op)))
    }

    async fn upload(storage: &Storage, dir: &Path, bytes: &[u8]) -> FileId {
        let path = dir.join(format!("staged-{}", FileId::new()));
        fs::write(&path, bytes).await.unwrap();
        let id = FileId::new();
        storage
            .adapter()
            .upload(
                id,
                &UploadedFile {
                    path,
                    original_name: "a.bin".to_string(),
                    declared_mime: String::new(),
                    declared_size: bytes.len() as u64,
                },
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_remote_content_is_downloaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let storage = memory_storage();
        let cache = MaterializationCache::open(dir.path().join("files"))
            .await
            .unwrap();
        let id = upload(&storage, dir.path(), b"remote bytes").await;

        let first = cache.materialize(&storage, id).await.unwrap();
        let second = cache.materialize(&storage, id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&first).await.unwrap(), b"remote bytes");
        let leftovers = std::fs::read_dir(cache.dir()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_mirror_is_not_revalidated() {
        let dir = tempfile::tempdir().unwrap();
        let storage = memory_storage();
        let cache = MaterializationCache::open(dir.path().join("files"))
            .await
            .unwrap();
        let id = upload(&storage, dir.path(), b"remote bytes").await;

        let path = cache.materialize(&storage, id).await.unwrap();
        storage.adapter().delete(id).await.unwrap();

        assert_eq!(cache.materialize(&storage, id).await.unwrap(), path);
    }

    #[tokio::test]
    async fn test_missing_remote_id_is_not_found_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = memory_storage();
        let cache = MaterializationCache::open(dir.path().join("files"))
            .await
            .unwrap();

        let err = cache
            .materialize(&storage, FileId::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_local_storage_uses_its_own_path() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(FsAdapter::open(dir.path().join("store")).await.unwrap());
        let storage = Storage::Local(adapter.clone());
        let cache = MaterializationCache::open(dir.path().join("files"))
            .await
            .unwrap();
        let id = upload(&storage, dir.path(), b"local").await;

        let path = cache.materialize(&storage, id).await.unwrap();

        assert_eq!(path, adapter.root().join(id.to_string()));
        assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 0);
    }
}
