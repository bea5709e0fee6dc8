//! File type icons for content that is not an image.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use depot_shared::FileId;
use tokio::fs;
use tracing::{debug, warn};

use crate::storage::content::md5_file;
use crate::storage::fsutil::mtime_millis;
use crate::types::{FileMetadata, ProvidedFile};

/// Canonical extensions for MIME types whose registered extension list does
/// not start with the usual one.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
    ("text/xml", "xml"),
    ("application/xml", "xml"),
    ("image/jpeg", "jpeg"),
    ("application/msword", "doc"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.ms-powerpoint", "ppt"),
];

/// Type token of a file: its extension when longer than one character,
/// otherwise the preferred extension of its MIME type.
#[must_use]
pub fn type_token(meta: &FileMetadata) -> Option<String> {
    let ext = Path::new(&meta.original_name)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    if ext.chars().count() > 1 {
        return Some(ext);
    }

    let mime = meta.mime.split(';').next().unwrap_or_default().trim();
    if let Some((_, ext)) = PREFERRED_EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(mime))
    {
        return Some((*ext).to_string());
    }

    mime_guess::get_mime_extensions_str(mime)
        .and_then(|exts| exts.first())
        .filter(|ext| !ext.is_empty())
        .map(|ext| (*ext).to_string())
}

/// Resolves `<token>.png` icons from a directory and memoizes them by token.
#[derive(Debug, Clone)]
pub struct IconSet {
    dir: PathBuf,
    memo: Arc<DashMap<String, Option<ProvidedFile>>>,
}

impl IconSet {
    /// Creates an icon set backed by `dir`.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            memo: Arc::new(DashMap::new()),
        }
    }

    /// Icon for a type token, `None` when the set has no such icon.
    pub async fn lookup(&self, token: &str) -> Option<ProvidedFile> {
        let name = format!("{token}.png").to_lowercase();
        if let Some(hit) = self.memo.get(&name) {
            return hit.clone();
        }

        let icon = self.load(&name).await;
        self.memo.insert(name, icon.clone());
        icon
    }

    async fn load(&self, name: &str) -> Option<ProvidedFile> {
        // Tokens come from user file names.
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }

        let path = self.dir.join(name);
        let stat = match fs::metadata(&path).await {
            Ok(stat) if stat.is_file() => stat,
            _ => {
                debug!(icon = name, "no icon for type");
                return None;
            }
        };

        let md5 = match md5_file(&path).await {
            Ok(md5) => md5,
            Err(e) => {
                warn!(icon = name, error = %e, "cannot read icon");
                return None;
            }
        };

        Some(ProvidedFile {
            metadata: FileMetadata {
                id: FileId::nil(),
                original_name: name.to_string(),
                mime: "image/png".to_string(),
                size: stat.len(),
                iat: mtime_millis(&path).await.unwrap_or(0),
                md5,
            },
            local_path: path,
        })
    }
}
