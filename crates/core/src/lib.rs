//! Storage core for Depot.
//!
//! Stores opaque content behind one contract whether the bytes live on local
//! disk or in an object store, and serves resized image variants from a local
//! cache. No web or database dependencies.
//!
//! # Modules
//!
//! - `storage` - adapter contract, filesystem and object store backends
//! - `cache` - metadata TTL cache and local content mirror
//! - `derivation` - image derivation engine, icons and placeholders
//! - `upload` - upload type validation
//! - `service` - `FileService`, the orchestration entry point

pub mod cache;
pub mod derivation;
pub mod error;
pub mod ids;
pub mod service;
pub mod storage;
pub mod types;
pub mod upload;

pub use derivation::{DerivedImage, FitMode, SubstitutionReason, TransformOptions};
pub use error::{FileError, FileResult};
pub use service::FileService;
pub use storage::{LocalStorage, RemoteStorage, Storage, StorageAdapter};
pub use types::{FileMetaResponse, FileMetadata, ProvidedFile, UploadedFile};
