//! In-process metadata cache and on-disk content mirror.

mod materialize;
mod metadata;

pub use materialize::MaterializationCache;
pub use metadata::MetadataCache;
