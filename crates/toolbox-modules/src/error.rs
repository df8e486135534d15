use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for module actions.
pub type Result<T> = StdResult<T, Error>;

/// Failures raised inside module actions.
#[derive(Debug, Error)]
pub enum Error {
    /// A remote request failed or returned an error status.
    #[error("Fetch failed for {url}: {message}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport or status description.
        message: String,
    },

    /// The page did not contain what the action expected.
    #[error("Page error: {0}")]
    Page(String),

    /// A JSON payload did not have the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the configuration layer.
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),

    /// A stored workspace blob exists but does not parse. It is left
    /// untouched rather than overwritten.
    #[error("Workspace {key} is malformed: {source}")]
    Workspace {
        /// Storage key of the workspace.
        key: &'static str,
        /// Parse failure.
        source: serde_json::Error,
    },
}

impl From<Error> for toolbox_engine::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Config(e) => Self::Config(e),
            other => Self::Action(other.to_string()),
        }
    }
}
