//! File service: upload, fetch, copy and delete over the configured backend.

use std::sync::Arc;

use depot_shared::{AppConfig, FileId};
use tracing::{debug, info, instrument, warn};

use crate::cache::{MaterializationCache, MetadataCache};
use crate::derivation::{
    DerivationEngine, DerivedImage, IconSet, ImageTransformer, Placeholders, RasterTransformer,
    TransformOptions,
};
use crate::error::FileResult;
use crate::ids::allocate_id;
use crate::storage::Storage;
use crate::storage::fsutil::remove_if_exists;
use crate::types::{FileMetadata, ProvidedFile, UploadedFile};
use crate::upload::UploadValidator;

/// Entry point for transport collaborators.
///
/// Holds the backend, both caches, the upload validator and the derivation
/// engine. Cheap to share behind an `Arc`.
pub struct FileService {
    storage: Storage,
    metadata: Arc<MetadataCache>,
    files: MaterializationCache,
    images: DerivationEngine,
    validator: UploadValidator,
}

impl FileService {
    /// Builds the service from configuration, running all startup checks.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Configuration` if the storage root or a cache
    /// directory is unusable.
    pub async fn from_config(config: &AppConfig) -> FileResult<Self> {
        Self::with_transformer(config, Arc::new(RasterTransformer)).await
    }

    /// Like [`FileService::from_config`] with a custom image transformer.
    pub async fn with_transformer(
        config: &AppConfig,
        transformer: Arc<dyn ImageTransformer>,
    ) -> FileResult<Self> {
        let storage = Storage::from_settings(&config.storage).await?;
        Self::with_storage(storage, config, transformer).await
    }

    /// Builds the service around an already constructed backend.
    pub async fn with_storage(
        storage: Storage,
        config: &AppConfig,
        transformer: Arc<dyn ImageTransformer>,
    ) -> FileResult<Self> {
        let metadata = Arc::new(MetadataCache::from_settings(&config.cache));
        let files = MaterializationCache::open(config.cache.files_dir()).await?;
        let images_dir = config.cache.images_dir();
        let placeholders = Placeholders::prepare(&config.image, &images_dir).await?;
        let images = DerivationEngine::new(
            images_dir,
            config.image.max_size,
            storage.clone(),
            metadata.clone(),
            files.clone(),
            IconSet::new(config.image.icons_dir.clone()),
            placeholders,
            transformer,
        )
        .await?;

        info!(storage = storage.kind(), "file service ready");
        Ok(Self {
            storage,
            metadata,
            files,
            images,
            validator: UploadValidator::from_settings(&config.upload),
        })
    }

    /// The configured backend.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether `id` is stored. Callers check this before referencing an id.
    pub async fn exists(&self, id: FileId) -> FileResult<bool> {
        self.storage.adapter().exists(id).await
    }

    /// Metadata of `id`, served from the metadata cache when possible.
    pub async fn get_file_meta(&self, id: FileId) -> FileResult<FileMetadata> {
        self.metadata.get_or_fetch(id, self.storage.adapter()).await
    }

    /// Metadata plus a local path holding the bytes of `id`.
    #[instrument(skip_all, fields(file_id = %id))]
    pub async fn provide_local_file(&self, id: FileId) -> FileResult<ProvidedFile> {
        let metadata = self.get_file_meta(id).await?;
        let local_path = self.files.materialize(&self.storage, id).await?;
        Ok(ProvidedFile {
            metadata,
            local_path,
        })
    }

    /// An image representing `id` under `options`. Never fails for a
    /// missing id or an unprocessable image.
    #[instrument(skip_all, fields(file_id = %id))]
    pub async fn provide_local_image(
        &self,
        id: FileId,
        options: &TransformOptions,
    ) -> FileResult<DerivedImage> {
        self.images.derive(id, options).await
    }

    /// Validates and stores a staged upload under a fresh id.
    ///
    /// The staged file is removed afterwards if it is still present.
    #[instrument(skip_all, fields(name = %file.original_name))]
    pub async fn create_file_from_upload(&self, file: &UploadedFile) -> FileResult<FileMetadata> {
        let result = self.store_upload(file).await;

        match remove_if_exists(&file.path).await {
            Ok(true) => debug!(path = %file.path.display(), "removed staged upload"),
            Ok(false) => {}
            Err(e) => warn!(path = %file.path.display(), error = %e, "cannot remove staged upload"),
        }
        result
    }

    async fn store_upload(&self, file: &UploadedFile) -> FileResult<FileMetadata> {
        self.validator.validate(file).await?;
        let adapter = self.storage.adapter();
        let id = allocate_id(adapter).await?;
        let meta = adapter.upload(id, file).await?;
        self.metadata.insert(meta.clone()).await;
        info!(file_id = %id, size = meta.size, mime = %meta.mime, "file uploaded");
        Ok(meta)
    }

    /// Duplicates `id` under a fresh id.
    #[instrument(skip_all, fields(file_id = %id))]
    pub async fn copy_file(&self, id: FileId) -> FileResult<FileMetadata> {
        let adapter = self.storage.adapter();
        let new_id = allocate_id(adapter).await?;
        let meta = adapter.copy(id, new_id).await?;
        self.metadata.insert(meta.clone()).await;
        info!(file_id = %id, new_id = %new_id, "file copied");
        Ok(meta)
    }

    /// Removes `id` and forgets its cached metadata.
    #[instrument(skip_all, fields(file_id = %id))]
    pub async fn delete_file(&self, id: FileId) -> FileResult<()> {
        self.storage.adapter().delete(id).await?;
        self.metadata.invalidate(id).await;
        info!(file_id = %id, "file deleted");
        Ok(())
    }
}
