//! Error types for settings, storage and configuration persistence.

use std::result::Result as StdResult;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Errors produced while reading, writing or mutating configuration.
pub enum Error {
    #[error("storage error for {key}: {message}")]
    /// The storage adapter failed to read or write a key.
    Storage {
        /// Storage key involved in the failure.
        key: String,
        /// Human-readable error message.
        message: String,
    },
    #[error("setting {module}.{setting} expects {expected}, got {found}")]
    /// A value of the wrong kind was offered for a setting.
    TypeMismatch {
        /// Module id.
        module: String,
        /// Setting id.
        setting: String,
        /// Declared kind of the setting.
        expected: String,
        /// Description of the rejected value.
        found: String,
    },
    #[error("invalid key binding: {0:?}")]
    /// A key binding that is neither `none` nor a single key name.
    InvalidBinding(String),
}

/// Convenient result type for the config crate.
pub type Result<T> = StdResult<T, Error>;
