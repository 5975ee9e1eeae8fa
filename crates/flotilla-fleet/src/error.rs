//! Error types for the fleet crate.

use thiserror::Error;

/// Request/deployment construction failures.
///
/// These are rejected synchronously, before anything enters reconciliation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("image reference must not be empty")]
    EmptyImage,

    #[error("duplicate image reference in deployment: {0}")]
    DuplicateImage(String),
}
