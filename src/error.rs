//! Error types for skinmgr
//!
//! This module defines all error types used by the skin engine. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Most of these are soft failures: the engine logs them and degrades
//! (fail-open defaults, last-known-good configuration, kept visual state)
//! instead of propagating them out of initialization.

use thiserror::Error;

/// The primary error type for skinmgr operations.
#[derive(Error, Debug)]
pub enum SkinError {
    /// Version or configuration document could not be fetched.
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),

    /// An administrator-authored document failed to parse.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A skin or URL object has no entry for the current major version.
    #[error("No resources for major version {version:?} in '{skin}'")]
    VersionMismatch { skin: String, version: Option<u32> },

    /// The document does not contain the links the selection expects.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Writing configuration or user preferences failed.
    #[error("Persist error: {0}")]
    Persist(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Skin, theme or color scheme not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for skinmgr operations.
pub type Result<T> = std::result::Result<T, SkinError>;
