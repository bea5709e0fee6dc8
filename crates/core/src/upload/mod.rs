//! Inbound upload checks.

mod validator;

#[cfg(test)]
mod validator_props;

pub use validator::UploadValidator;
