//! Board Service - host-facing application services for boards
//!
//! Wraps the synchronous board engine in an async facade that hosts (desktop
//! shell, HTTP adapter, tests) call by `(app_id, board_id)`:
//!
//! - One working copy per board, mutated by a single writer at a time
//! - Command batches, undo and redo against the working copy
//! - Frozen, zstd-compressed board versions
//! - Event bindings validated against the board they trigger
//!
//! # Example
//!
//! ```ignore
//! use board_engine::{Board, Command, VersionType};
//! use board_service::{BoardService, ServiceConfig};
//!
//! let service = BoardService::new(ServiceConfig::default());
//! service.create_board("app", Board::new("b1", "Greeting")).await?;
//! let applied = service.execute_commands("app", "b1", commands).await?;
//! let version = service.create_board_version("app", "b1", VersionType::Minor).await?;
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod service;
pub mod store;
pub mod versions;

// Re-export key types
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use event::Event;
pub use service::BoardService;
pub use store::{BoardStore, MemoryBoardStore};
pub use versions::FrozenBoard;
