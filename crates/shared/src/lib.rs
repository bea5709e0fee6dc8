//! Shared identifiers, errors, and configuration for Depot.
//!
//! This crate provides common types used across all other crates:
//! - `FileId`, the opaque identifier of a stored object
//! - Application-wide boundary error type
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::AppError;
pub use types::FileId;
