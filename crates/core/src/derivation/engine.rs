//! Derived image production with placeholder fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use depot_shared::FileId;
use image::ImageFormat;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::icons::{IconSet, type_token};
use super::options::{NormalizedOptions, TransformOptions};
use super::placeholder::Placeholders;
use super::transform::ImageTransformer;
use crate::cache::{MaterializationCache, MetadataCache};
use crate::error::{FileError, FileResult};
use crate::storage::Storage;
use crate::storage::fsutil::{ensure_writable_dir, remove_if_exists, set_mtime, staging_path};
use crate::types::ProvidedFile;

/// Why a substitute was served instead of a derivative of the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionReason {
    /// The id does not exist.
    NotFound,
    /// The content is not an image; the icon for this type token was used.
    Icon(String),
    /// The content is not an image and has no icon.
    Blank,
    /// Decoding or encoding failed.
    ProcessingFailed,
}

/// Result of an image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedImage {
    /// A derivative of the stored image.
    Found(ProvidedFile),
    /// A derivative of a substitute.
    Substituted {
        /// What was substituted and why.
        reason: SubstitutionReason,
        /// The served file.
        file: ProvidedFile,
    },
}

impl DerivedImage {
    /// The served file.
    #[must_use]
    pub fn file(&self) -> &ProvidedFile {
        match self {
            Self::Found(file) | Self::Substituted { file, .. } => file,
        }
    }

    /// Consumes the result, returning the served file.
    #[must_use]
    pub fn into_file(self) -> ProvidedFile {
        match self {
            Self::Found(file) | Self::Substituted { file, .. } => file,
        }
    }
}

/// Source chosen for a request before any pixels are touched.
struct Source {
    /// Stem of the derivative file name.
    stem: String,
    file: ProvidedFile,
    format: ImageFormat,
    reason: Option<SubstitutionReason>,
}

/// Produces and disk-caches image variants.
///
/// Derivatives are named `<stem>-<options key>.<ext>` and are valid for as
/// long as they exist.
pub struct DerivationEngine {
    dir: PathBuf,
    max_size: u32,
    storage: Storage,
    metadata: Arc<MetadataCache>,
    files: MaterializationCache,
    icons: IconSet,
    placeholders: Placeholders,
    transformer: Arc<dyn ImageTransformer>,
}

impl DerivationEngine {
    /// Creates an engine writing derivatives into `dir`.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Configuration` if `dir` is not writable.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        dir: PathBuf,
        max_size: u32,
        storage: Storage,
        metadata: Arc<MetadataCache>,
        files: MaterializationCache,
        icons: IconSet,
        placeholders: Placeholders,
        transformer: Arc<dyn ImageTransformer>,
    ) -> FileResult<Self> {
        ensure_writable_dir(&dir)
            .await
            .map_err(FileError::configuration)?;
        info!(path = %dir.display(), max_size, "image cache ready");
        Ok(Self {
            dir,
            max_size,
            storage,
            metadata,
            files,
            icons,
            placeholders,
            transformer,
        })
    }

    /// Derivative directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Produces the image for `id` under `options`.
    ///
    /// Missing ids and processing failures yield substitutes; only backend
    /// failures are returned as errors.
    pub async fn derive(&self, id: FileId, options: &TransformOptions) -> FileResult<DerivedImage> {
        let opts = options.normalize(self.max_size);
        let source = self.source(id).await?;

        match self.render_cached(&source, &opts).await {
            Ok(path) => Ok(finish(source, path)),
            Err(e) => {
                error!(file_id = %id, source = %source.file.local_path.display(), error = %e, "cannot process image");
                Ok(self.fallback(&source, &opts).await)
            }
        }
    }

    async fn source(&self, id: FileId) -> FileResult<Source> {
        let meta = match self.metadata.get_or_fetch(id, self.storage.adapter()).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => return Ok(self.no_image_source()),
            Err(e) => return Err(e),
        };

        if meta.is_image() {
            let local_path = match self.files.materialize(&self.storage, id).await {
                Ok(path) => path,
                Err(e) if e.is_not_found() => return Ok(self.no_image_source()),
                Err(e) => return Err(e),
            };
            let format = output_format(&meta.mime);
            return Ok(Source {
                stem: id.to_string(),
                file: ProvidedFile {
                    metadata: meta,
                    local_path,
                },
                format,
                reason: None,
            });
        }

        let icon = match type_token(&meta) {
            Some(token) => self.icons.lookup(&token).await.map(|icon| (token, icon)),
            None => None,
        };
        let (stem, mut file, reason) = match icon {
            Some((token, icon)) => (
                format!("_icon-{}", sanitize(&token)),
                icon,
                SubstitutionReason::Icon(token),
            ),
            None => (
                "_blank".to_string(),
                self.placeholders.blank.clone(),
                SubstitutionReason::Blank,
            ),
        };
        file.metadata.id = id;
        debug!(file_id = %id, ?reason, "serving substitute for non-image");
        Ok(Source {
            stem,
            file,
            format: ImageFormat::Png,
            reason: Some(reason),
        })
    }

    fn no_image_source(&self) -> Source {
        Source {
            stem: "_no-image".to_string(),
            file: self.placeholders.no_image.clone(),
            format: ImageFormat::Png,
            reason: Some(SubstitutionReason::NotFound),
        }
    }

    /// Returns the derivative path, rendering it when absent.
    async fn render_cached(&self, source: &Source, opts: &NormalizedOptions) -> FileResult<PathBuf> {
        let ext = source.format.extensions_str().first().copied().unwrap_or("png");
        let target = self
            .dir
            .join(format!("{}-{}.{ext}", source.stem, opts.cache_key()));

        if fs::try_exists(&target).await? {
            debug!(path = %target.display(), "image cache hit");
            return Ok(target);
        }

        debug!(path = %target.display(), "image cache miss, rendering");
        let staging = staging_path(&target);
        let result = async {
            self.transformer
                .transform(&source.file.local_path, &staging, opts, source.format)
                .await?;
            set_mtime(&staging, source.file.metadata.iat).await?;
            fs::rename(&staging, &target).await?;
            Ok::<_, FileError>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = remove_if_exists(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "cannot remove staging file");
            }
            return Err(e);
        }
        Ok(target)
    }

    /// Substitute for a source that could not be processed.
    async fn fallback(&self, failed: &Source, opts: &NormalizedOptions) -> DerivedImage {
        if self.placeholders.is_placeholder(&failed.file) {
            warn!(path = %failed.file.local_path.display(), "serving placeholder untransformed");
            return DerivedImage::Substituted {
                reason: failed.reason.clone().unwrap_or(SubstitutionReason::ProcessingFailed),
                file: failed.file.clone(),
            };
        }

        let no_image = self.no_image_source();
        let file = match self.render_cached(&no_image, opts).await {
            Ok(path) => ProvidedFile {
                metadata: no_image.file.metadata,
                local_path: path,
            },
            Err(e) => {
                warn!(error = %e, "cannot render placeholder, serving it untransformed");
                no_image.file
            }
        };
        DerivedImage::Substituted {
            reason: SubstitutionReason::ProcessingFailed,
            file,
        }
    }
}

fn finish(source: Source, path: PathBuf) -> DerivedImage {
    let file = ProvidedFile {
        metadata: source.file.metadata,
        local_path: path,
    };
    match source.reason {
        None => DerivedImage::Found(file),
        Some(reason) => DerivedImage::Substituted { reason, file },
    }
}

/// Output format for a source MIME type: kept when it is a common web or
/// raster format, PNG otherwise.
fn output_format(mime: &str) -> ImageFormat {
    match ImageFormat::from_mime_type(mime) {
        Some(
            format @ (ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::WebP
            | ImageFormat::Bmp
            | ImageFormat::Tiff),
        ) => format,
        _ => ImageFormat::Png,
    }
}

fn sanitize(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
