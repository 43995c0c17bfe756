//! Error types for the board engine

use std::fmt;

use thiserror::Error;

/// Result type alias using BoardError
pub type Result<T> = std::result::Result<T, BoardError>;

/// The kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Pin,
    Comment,
    Variable,
    Layer,
    Board,
    Version,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "Node",
            Self::Pin => "Pin",
            Self::Comment => "Comment",
            Self::Variable => "Variable",
            Self::Layer => "Layer",
            Self::Board => "Board",
            Self::Version => "Version",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while mutating or reading a board
#[derive(Debug, Error)]
pub enum BoardError {
    /// A referenced entity does not exist
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// An entity with this id already exists
    #[error("{kind} '{id}' already exists")]
    Conflict { kind: EntityKind, id: String },

    /// Two pins cannot be connected
    #[error("Cannot connect '{from_pin}' to '{to_pin}': {reason}")]
    TypeMismatch {
        from_pin: String,
        to_pin: String,
        reason: String,
    },

    /// A structural invariant would break
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl BoardError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            id: id.into(),
        }
    }

    pub fn mismatch(
        from_pin: impl Into<String>,
        to_pin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            from_pin: from_pin.into(),
            to_pin: to_pin.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
