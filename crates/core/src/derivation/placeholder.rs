//! Fixed substitute images.

use std::path::{Path, PathBuf};

use depot_shared::config::ImageSettings;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{FileError, FileResult};
use crate::types::{FileMetadata, ProvidedFile};

const BUILTIN_SIZE: u32 = 64;
const NO_IMAGE_FILL: [u8; 4] = [224, 224, 224, 255];
const BLANK_FILL: [u8; 4] = [255, 255, 255, 0];

/// The "no image" and "blank" substitutes, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Placeholders {
    /// Served when content is missing or cannot be processed.
    pub no_image: ProvidedFile,
    /// Served for non-image content without a matching icon.
    pub blank: ProvidedFile,
}

impl Placeholders {
    /// Resolves the configured placeholder files.
    ///
    /// A configured file that does not exist is replaced by a flat PNG
    /// rendered into `fallback_dir`.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Configuration` if a fallback cannot be written.
    pub async fn prepare(settings: &ImageSettings, fallback_dir: &Path) -> FileResult<Self> {
        Ok(Self {
            no_image: resolve(
                settings.no_image_path(),
                &fallback_dir.join("_no-image.png"),
                NO_IMAGE_FILL,
            )
            .await?,
            blank: resolve(
                settings.blank_path(),
                &fallback_dir.join("_blank.png"),
                BLANK_FILL,
            )
            .await?,
        })
    }

    /// Whether `file` is one of the placeholders.
    #[must_use]
    pub fn is_placeholder(&self, file: &ProvidedFile) -> bool {
        file.local_path == self.no_image.local_path || file.local_path == self.blank.local_path
    }
}

async fn resolve(configured: PathBuf, fallback: &Path, fill: [u8; 4]) -> FileResult<ProvidedFile> {
    let path = if fs::try_exists(&configured).await.unwrap_or(false) {
        configured
    } else {
        warn!(
            configured = %configured.display(),
            fallback = %fallback.display(),
            "placeholder image missing, rendering built-in"
        );
        render_flat(fallback, fill).await?;
        fallback.to_path_buf()
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(path = %path.display(), "placeholder ready");
    Ok(ProvidedFile {
        metadata: FileMetadata::placeholder(name),
        local_path: path,
    })
}

async fn render_flat(target: &Path, fill: [u8; 4]) -> FileResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            FileError::configuration(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        RgbaImage::from_pixel(BUILTIN_SIZE, BUILTIN_SIZE, Rgba(fill))
            .save_with_format(&target, ImageFormat::Png)
            .map_err(|e| {
                FileError::configuration(format!("cannot write {}: {e}", target.display()))
            })
    })
    .await
    .map_err(|e| FileError::configuration(e.to_string()))?
}
