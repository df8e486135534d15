//! Error handling for the toolbox binary.

use std::{io, result};

use thiserror::Error;

/// Convenient result type for toolbox operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while running the toolbox host.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Configuration storage errors.
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
    /// Errors surfaced by the engine.
    #[error("Engine error: {0}")]
    Engine(#[from] toolbox_engine::Error),
    /// Errors surfaced by module collaborators.
    #[error("{0}")]
    Modules(#[from] toolbox_modules::Error),
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    /// A setting value was not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A line on stdin was not a valid command.
    #[error("{0}")]
    Command(String),
    /// No platform data directory and no `--state-dir`.
    #[error("No data directory available; pass --state-dir")]
    NoStateDir,
}

impl Error {
    /// Helper to build a command error from an arbitrary message.
    pub fn command<M: Into<String>>(msg: M) -> Self {
        Self::Command(msg.into())
    }
}
