//! Board Engine - graph model and reversible command engine for visual boards
//!
//! This crate holds the core of the board editor: the typed graph model,
//! the only code path that mutates it, and the pure derivation of what a
//! canvas renders. It supports:
//!
//! - Nodes, pins, comments, variables and nested layers in one `Board`
//! - Symmetric connection maintenance with type checking and Generic narrowing
//! - Layer boundary pins synthesized from the current node placement
//! - Commands that record their own inverse, applied in all-or-nothing batches
//! - Canvas materialization with collapsed and expanded layers
//!
//! # Architecture
//!
//! - `Board`: aggregate root with read-side queries (pin lookup, relays, effective types)
//! - `Command`: tagged mutation carrying both intent and recorded pre-images
//! - `execute_batch` / `undo_batch` / `redo_batch`: transactional application
//! - `CommandHistory`: bounded undo/redo stack of applied batches
//! - `parse_board`: pure render model for the canvas
//! - `EventSink`: generic event streaming for whoever drives the engine
//!
//! # Example
//!
//! ```ignore
//! use board_engine::{execute_batch, undo_batch, BoardBuilder, Command, Node, Pin, VariableType};
//!
//! let mut board = BoardBuilder::new("b1")
//!     .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
//!     .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Integer)))
//!     .build();
//!
//! let applied = execute_batch(&mut board, vec![Command::connect("n1", "p1", "n2", "p2")])?;
//! undo_batch(&mut board, &applied)?;
//! ```

pub mod board;
pub mod builder;
pub mod comment;
pub mod commands;
mod connections;
pub mod error;
pub mod events;
pub mod extensions;
mod journal;
pub mod layer;
pub mod materialize;
pub mod node;
pub mod pin;
pub mod types;
pub mod undo;
pub mod validation;
pub mod variable;

// Re-export key types
pub use board::{Board, PinOwner};
pub use builder::BoardBuilder;
pub use comment::{Comment, CommentType};
pub use commands::{execute_batch, redo_batch, undo_batch, Command, CommandKind};
pub use error::{BoardError, EntityKind, Result};
pub use events::{EngineEvent, EventError, EventSink, NullEventSink, VecEventSink};
pub use extensions::Extension;
pub use layer::{Layer, LayerType};
pub use materialize::{parse_board, CanvasCallbacks, Materialized, RenderEdge, RenderNode};
pub use node::{Node, NodeScores};
pub use pin::{Pin, PinOptions};
pub use types::{
    Coordinates, ExecutionStage, LogLevel, PinType, ValueType, VariableType, Version, VersionType,
};
pub use undo::CommandHistory;
pub use validation::{validate_board, ValidationError};
pub use variable::Variable;
