//! Typed identifier for stored files.
//!
//! A `FileId` names one content object and its metadata record. Ids are
//! random (UUID v4), immutable once assigned, and never reused for different
//! content, which is what lets every cache layer treat presence as validity.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Length of the canonical hyphenated textual form.
const CANONICAL_LEN: usize = 36;

/// Unique identifier for a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

/// Error returned when a string is not a canonical file id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid file id: {0:?}")]
pub struct InvalidFileId(pub String);

impl FileId {
    /// Draws a new random ID (128 random bits, UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero ID reserved for built-in placeholder images.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the placeholder ID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for FileId {
    type Err = InvalidFileId;

    /// Parses the canonical hyphenated form only.
    ///
    /// Ids end up as file names and object keys, so braced, URN and simple
    /// forms are rejected rather than normalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CANONICAL_LEN {
            return Err(InvalidFileId(s.to_string()));
        }
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|_| InvalidFileId(s.to_string()))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
