//! Upload type and size validation.

use std::collections::HashSet;
use std::path::Path;

use depot_shared::config::UploadSettings;
use tokio::fs;
use tracing::debug;

use crate::error::{FileError, FileResult};
use crate::storage::content::read_head;
use crate::types::UploadedFile;

/// Office formats that signature sniffing cannot tell apart from other
/// compound documents. Accepted by extension alone when allow-listed.
const LEGACY_OFFICE: [&str; 3] = ["doc", "xls", "ppt"];

/// Admits or rejects staged uploads against an allow-list of type tokens.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    allowed: HashSet<String>,
    max_file_size: u64,
}

impl UploadValidator {
    /// Creates a validator. Tokens are compared case-insensitively.
    #[must_use]
    pub fn new<I, S>(allowed: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
            max_file_size,
        }
    }

    /// Creates a validator from configuration.
    #[must_use]
    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self::new(&settings.allowed_types, settings.max_file_size)
    }

    /// Whether a type token is allow-listed.
    #[must_use]
    pub fn is_allowed(&self, token: &str) -> bool {
        self.allowed.contains(&token.to_lowercase())
    }

    /// Validates a staged upload: size first, then type.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Validation` when the file is too large, cannot be
    /// read, or its type is not allowed.
    pub async fn validate(&self, file: &UploadedFile) -> FileResult<()> {
        let size = fs::metadata(&file.path)
            .await
            .map_err(|e| FileError::validation(format!("cannot read upload: {e}")))?
            .len();
        if size > self.max_file_size {
            return Err(FileError::validation(format!(
                "file is {size} bytes, limit is {}",
                self.max_file_size
            )));
        }

        let head = read_head(&file.path)
            .await
            .map_err(|e| FileError::validation(format!("cannot read upload: {e}")))?;
        self.check(&file.original_name, &head)
    }

    /// Validates a file name plus the first bytes of its content.
    ///
    /// # Errors
    ///
    /// Returns `FileError::Validation` when the type is not allowed.
    pub fn check(&self, original_name: &str, head: &[u8]) -> FileResult<()> {
        let ext = extension(original_name);

        if LEGACY_OFFICE.contains(&ext.as_str()) && self.is_allowed(&ext) {
            debug!(name = original_name, ext = %ext, "accepting legacy office format by extension");
            return Ok(());
        }

        if let Some(kind) = infer::get(head) {
            debug!(name = original_name, detected = kind.extension(), "detected binary signature");
            return if self.is_allowed(kind.extension()) {
                Ok(())
            } else {
                Err(FileError::validation(format!(
                    "file type {} is not allowed",
                    kind.extension()
                )))
            };
        }

        if looks_textual(head) {
            return if !ext.is_empty() && self.is_allowed(&ext) {
                Ok(())
            } else {
                Err(FileError::validation(format!(
                    "text file extension '{ext}' is not allowed"
                )))
            };
        }

        Err(FileError::validation("file type unknown"))
    }
}

/// Lowercased extension of a file name, empty when there is none.
fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// No NUL bytes and valid UTF-8, allowing a sequence cut off at the end.
pub(crate) fn looks_textual(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
