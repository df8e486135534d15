use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the toolbox engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors from the configuration layer.
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),

    /// No module with this id is registered.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Two registry entries share an id.
    #[error("Duplicate module id: {0}")]
    DuplicateModule(String),

    /// The module's scope rules do not cover the current path.
    #[error("Module {module} is not available on {path}")]
    OutOfScope {
        /// Module id.
        module: String,
        /// Current page path.
        path: String,
    },

    /// The current page origin is not one the toolbox operates on.
    #[error("Origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// Keep-alive toggles only apply to continuous modules.
    #[error("Module {0} is not a continuous module")]
    NotContinuous(String),

    /// The notification channel has been closed by the receiver.
    #[error("Notification channel closed")]
    ChannelClosed,

    /// A module action failed.
    #[error("{0}")]
    Action(String),
}
