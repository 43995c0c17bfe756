//! Error types for the board service

use board_engine::{BoardError, Version};
use thiserror::Error;

/// Result type alias using ServiceError
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced to hosts of the board service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Board '{board_id}' not found in app '{app_id}'")]
    BoardNotFound { app_id: String, board_id: String },

    #[error("Version {version:?} of board '{board_id}' not found")]
    VersionNotFound { board_id: String, version: Version },

    #[error("Event '{0}' not found")]
    EventNotFound(String),

    /// An active event binding does not match its board
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] BoardError),
}

impl ServiceError {
    pub fn board_not_found(app_id: &str, board_id: &str) -> Self {
        Self::BoardNotFound {
            app_id: app_id.to_string(),
            board_id: board_id.to_string(),
        }
    }
}
