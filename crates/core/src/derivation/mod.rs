//! Image derivation.
//!
//! - `options` - request options, normalization and cache keys
//! - `transform` - decoding, resizing and encoding
//! - `icons` - file type icons for non-image content
//! - `placeholder` - "no image" and "blank" substitutes
//! - `engine` - source resolution, derivative caching and fallback

pub mod engine;
pub mod icons;
pub mod options;
pub mod placeholder;
pub mod transform;

#[cfg(test)]
mod options_props;

pub use engine::{DerivationEngine, DerivedImage, SubstitutionReason};
pub use icons::IconSet;
pub use options::{FitMode, NormalizedOptions, Rgb, TransformOptions};
pub use placeholder::Placeholders;
pub use transform::{ImageTransformer, RasterTransformer};
