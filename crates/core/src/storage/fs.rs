//! Local filesystem adapter.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use depot_shared::FileId;
use tokio::fs;
use tracing::{debug, info, warn};

use super::content::{md5_file, read_head, resolve_mime};
use super::fsutil::{copy_safe, ensure_writable_dir, move_safe, remove_if_exists, set_mtime};
use super::{LocalStorage, StorageAdapter};
use crate::error::{FileError, FileResult};
use crate::types::{FileMetadata, UploadedFile, now_millis};

/// Stores content as `<root>/<id>` with a `<root>/<id>.json` sidecar.
#[derive(Debug, Clone)]
pub struct FsAdapter {
    root: PathBuf,
}

impl FsAdapter {
    /// Opens a storage root, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Configuration` if the root is relative, is not a
    /// directory, or is not writable.
    pub async fn open(root: PathBuf) -> FileResult<Self> {
        if !root.is_absolute() {
            return Err(FileError::configuration(format!(
                "storage root must be an absolute path, got {}",
                root.display()
            )));
        }
        ensure_writable_dir(&root)
            .await
            .map_err(FileError::configuration)?;

        info!(root = %root.display(), "filesystem storage ready");
        Ok(Self { root })
    }

    /// Storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, id: FileId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn sidecar_path(&self, id: FileId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn write_sidecar(&self, meta: &FileMetadata) -> FileResult<()> {
        let json = serde_json::to_vec(meta)
            .map_err(|e| FileError::backend(None, format!("cannot encode metadata: {e}")))?;
        fs::write(self.sidecar_path(meta.id), json).await?;
        Ok(())
    }

    /// Removes whatever a failed write left behind for `id`.
    async fn rollback(&self, id: FileId) {
        for path in [self.sidecar_path(id), self.content_path(id)] {
            if let Err(e) = remove_if_exists(&path).await {
                warn!(file_id = %id, path = %path.display(), error = %e, "rollback could not remove file");
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for FsAdapter {
    async fn exists(&self, id: FileId) -> FileResult<bool> {
        Ok(fs::try_exists(self.content_path(id)).await?)
    }

    async fn get_metadata(&self, id: FileId) -> FileResult<FileMetadata> {
        // A sidecar without content is a half-written upload.
        if !self.exists(id).await? {
            return Err(FileError::not_found(id));
        }

        let raw = match fs::read(self.sidecar_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::not_found(id));
            }
            Err(e) => return Err(FileError::corrupt_metadata(id, e.to_string())),
        };

        let meta: FileMetadata = serde_json::from_slice(&raw)
            .map_err(|e| FileError::corrupt_metadata(id, e.to_string()))?;
        if meta.id.is_nil() {
            return Err(FileError::corrupt_metadata(id, "empty id"));
        }
        Ok(meta)
    }

    async fn upload(&self, id: FileId, file: &UploadedFile) -> FileResult<FileMetadata> {
        let size = fs::metadata(&file.path).await?.len();
        let head = read_head(&file.path).await?;
        let meta = FileMetadata {
            id,
            original_name: file.original_name.clone(),
            mime: resolve_mime(&head, &file.declared_mime, &file.original_name),
            size,
            iat: now_millis(),
            md5: md5_file(&file.path).await?,
        };

        let target = self.content_path(id);
        let result = async {
            self.write_sidecar(&meta).await?;
            move_safe(&file.path, &target).await?;
            set_mtime(&target, meta.iat).await?;
            Ok::<_, FileError>(())
        }
        .await;

        if let Err(e) = result {
            warn!(file_id = %id, error = %e, "upload failed, rolling back");
            self.rollback(id).await;
            return Err(e);
        }

        debug!(file_id = %id, path = %target.display(), size, "stored upload");
        Ok(meta)
    }

    async fn copy(&self, id: FileId, new_id: FileId) -> FileResult<FileMetadata> {
        let source = self.get_metadata(id).await?;
        let meta = source.copied_as(new_id);

        let target = self.content_path(new_id);
        let result = async {
            self.write_sidecar(&meta).await?;
            copy_safe(&self.content_path(id), &target).await?;
            set_mtime(&target, meta.iat).await?;
            Ok::<_, FileError>(())
        }
        .await;

        if let Err(e) = result {
            warn!(file_id = %id, new_id = %new_id, error = %e, "copy failed, rolling back");
            self.rollback(new_id).await;
            return Err(e);
        }

        debug!(file_id = %id, new_id = %new_id, "copied file");
        Ok(meta)
    }

    async fn delete(&self, id: FileId) -> FileResult<()> {
        if !self.exists(id).await? {
            return Err(FileError::not_found(id));
        }
        remove_if_exists(&self.sidecar_path(id)).await?;
        remove_if_exists(&self.content_path(id)).await?;
        debug!(file_id = %id, "deleted file");
        Ok(())
    }
}

impl LocalStorage for FsAdapter {
    fn local_path(&self, id: FileId) -> PathBuf {
        self.content_path(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fsutil::mtime_millis;

    async fn adapter() -> (tempfile::TempDir, FsAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FsAdapter::open(dir.path().join("store")).await.unwrap();
        (dir, adapter)
    }

    async fn staged(dir: &Path, name: &str, bytes: &[u8]) -> UploadedFile {
        let path = dir.join(format!("staged-{name}"));
        fs::write(&path, bytes).await.unwrap();
        UploadedFile {
            path,
            original_name: name.to_string(),
            declared_mime: "text/plain".to_string(),
            declared_size: 999,
        }
    }

    #[tokio::test]
    async fn test_open_rejects_relative_root() {
        let err = FsAdapter::open(PathBuf::from("relative/store"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_open_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").await.unwrap();
        let err = FsAdapter::open(file).await.unwrap_err();
        assert!(matches!(err, FileError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_upload_writes_content_and_sidecar() {
        let (dir, adapter) = adapter().await;
        let upload = staged(dir.path(), "notes.txt", b"hello world").await;
        let id = FileId::new();

        let meta = adapter.upload(id, &upload).await.unwrap();

        assert_eq!(meta.size, 11);
        assert_eq!(meta.mime, "text/plain");
        assert_eq!(meta.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert!(!upload.path.exists());
        assert!(adapter.exists(id).await.unwrap());
        assert_eq!(adapter.get_metadata(id).await.unwrap(), meta);
        assert_eq!(
            fs::read(adapter.local_path(id)).await.unwrap(),
            b"hello world"
        );
        assert_eq!(
            mtime_millis(&adapter.local_path(id)).await.unwrap(),
            meta.iat
        );
    }

    #[tokio::test]
    async fn test_upload_missing_source_rolls_back() {
        let (dir, adapter) = adapter().await;
        let upload = UploadedFile {
            path: dir.path().join("never-staged"),
            original_name: "x.txt".to_string(),
            declared_mime: String::new(),
            declared_size: 0,
        };
        let id = FileId::new();

        assert!(adapter.upload(id, &upload).await.is_err());
        assert!(!adapter.sidecar_path(id).exists());
        assert!(!adapter.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_metadata_absent_is_not_found() {
        let (_dir, adapter) = adapter().await;
        assert!(
            adapter
                .get_metadata(FileId::new())
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_get_metadata_corrupt_sidecar() {
        let (_dir, adapter) = adapter().await;
        let id = FileId::new();
        fs::write(adapter.local_path(id), b"content").await.unwrap();
        fs::write(adapter.sidecar_path(id), b"{\"id\":\"\"}")
            .await
            .unwrap();
        assert!(matches!(
            adapter.get_metadata(id).await.unwrap_err(),
            FileError::CorruptMetadata { .. }
        ));
    }

    #[tokio::test]
    async fn test_get_metadata_without_content_is_not_found() {
        let (dir, adapter) = adapter().await;
        let id = FileId::new();
        adapter
            .upload(id, &staged(dir.path(), "a.txt", b"half").await)
            .await
            .unwrap();
        fs::remove_file(adapter.local_path(id)).await.unwrap();

        assert!(adapter.sidecar_path(id).exists());
        assert!(adapter.get_metadata(id).await.unwrap_err().is_not_found());
        assert!(adapter.copy(id, FileId::new()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_copy_duplicates_bytes_with_new_id() {
        let (dir, adapter) = adapter().await;
        let id = FileId::new();
        let original = adapter
            .upload(id, &staged(dir.path(), "a.txt", b"copy me").await)
            .await
            .unwrap();
        let new_id = FileId::new();

        let copy = adapter.copy(id, new_id).await.unwrap();

        assert_eq!(copy.id, new_id);
        assert_eq!(copy.md5, original.md5);
        assert!(copy.iat >= original.iat);
        assert_eq!(fs::read(adapter.local_path(new_id)).await.unwrap(), b"copy me");
        assert!(adapter.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_of_missing_is_not_found() {
        let (_dir, adapter) = adapter().await;
        let new_id = FileId::new();
        assert!(
            adapter
                .copy(FileId::new(), new_id)
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(!adapter.sidecar_path(new_id).exists());
    }

    #[tokio::test]
    async fn test_delete_removes_both_files() {
        let (dir, adapter) = adapter().await;
        let id = FileId::new();
        adapter
            .upload(id, &staged(dir.path(), "a.txt", b"bye").await)
            .await
            .unwrap();

        adapter.delete(id).await.unwrap();

        assert!(!adapter.exists(id).await.unwrap());
        assert!(!adapter.sidecar_path(id).exists());
        assert!(adapter.delete(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_sidecar() {
        let (_dir, adapter) = adapter().await;
        let id = FileId::new();
        fs::write(adapter.local_path(id), b"orphan").await.unwrap();

        adapter.delete(id).await.unwrap();
        assert!(!adapter.exists(id).await.unwrap());
    }
}
