//! File domain types.

use std::path::PathBuf;

use chrono::Utc;
use depot_shared::FileId;
use serde::{Deserialize, Serialize};

/// Persisted metadata of one stored object.
///
/// Serialized as `{id, originalName, mime, size, iat, md5}` next to the
/// content (sidecar file or `<id>.json` object).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Object id.
    pub id: FileId,
    /// File name as uploaded.
    pub original_name: String,
    /// MIME type.
    pub mime: String,
    /// Content length in bytes.
    pub size: u64,
    /// Ingestion time, epoch milliseconds.
    pub iat: i64,
    /// Lowercase hex MD5 of the content.
    pub md5: String,
}

impl FileMetadata {
    /// Metadata of a built-in placeholder image.
    #[must_use]
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            id: FileId::nil(),
            original_name: name.into(),
            mime: "image/png".to_string(),
            size: 0,
            iat: 0,
            md5: String::new(),
        }
    }

    /// Derives the metadata of a copy: new id and ingestion time, same content fields.
    ///
    /// Reusing `md5` is only valid because copying does not change bytes.
    #[must_use]
    pub fn copied_as(&self, new_id: FileId) -> Self {
        Self {
            id: new_id,
            iat: now_millis(),
            ..self.clone()
        }
    }

    /// Whether the content is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Current time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Metadata plus a local path that holds the bytes right now.
///
/// The path is only guaranteed readable when returned; cache housekeeping
/// may remove it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedFile {
    /// Metadata of the served content.
    pub metadata: FileMetadata,
    /// Readable local path.
    pub local_path: PathBuf,
}

/// A staged upload plus the client's declarations about it.
///
/// Declared mime and size are hints; adapters compute the stored values.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Temporary file holding the uploaded bytes.
    pub path: PathBuf,
    /// Client supplied file name.
    pub original_name: String,
    /// Client supplied MIME type.
    pub declared_mime: String,
    /// Client supplied size.
    pub declared_size: u64,
}

/// Metadata view handed to transport collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetaResponse {
    /// Object id.
    pub id: FileId,
    /// Lowercased `[type, subtype]`.
    pub mime_type: [String; 2],
    /// MIME type as stored.
    pub mime_type_raw: String,
    /// Original file name.
    pub name: String,
    /// Whether the content is an image.
    pub is_image: bool,
    /// Hex MD5 digest.
    pub md5: String,
}

impl From<&FileMetadata> for FileMetaResponse {
    fn from(meta: &FileMetadata) -> Self {
        let mime_type = match meta.mime.split('/').collect::<Vec<_>>().as_slice() {
            [kind, sub] => [kind.to_lowercase(), sub.to_lowercase()],
            _ => ["binary".to_string(), "octet-stream".to_string()],
        };
        Self {
            id: meta.id,
            is_image: mime_type[0] == "image",
            mime_type,
            mime_type_raw: meta.mime.clone(),
            name: meta.original_name.clone(),
            md5: meta.md5.clone(),
        }
    }
}

/// Makes a file name safe for a `Content-Disposition` header.
///
/// German umlauts are transliterated, everything outside
/// `[A-Za-z0-9_\- .]` is dropped and whitespace runs collapse to one space.
#[must_use]
pub fn sanitize_disposition_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' ' | '.') => out.push(c),
            _ => {}
        }
    }
    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == ' ' && collapsed.ends_with(' ') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}
