//! Event types for reporting board changes
//!
//! Events are sent by whoever drives the engine (the board service) to
//! report applied, rolled back, undone and redone batches and new versions.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::types::Version;

/// Destination for [`EngineEvent`]s
///
/// Hosts implement this over whatever transport they forward events on.
pub trait EventSink: Send + Sync {
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// An event could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Events emitted while boards change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A command batch was applied to the working copy
    #[serde(rename_all = "camelCase")]
    BatchApplied {
        board_id: String,
        commands: Vec<String>,
    },

    /// A command batch failed and was rolled back
    #[serde(rename_all = "camelCase")]
    BatchRolledBack { board_id: String, error: String },

    /// A batch was undone
    #[serde(rename_all = "camelCase")]
    BatchUndone { board_id: String, count: usize },

    /// A batch was redone
    #[serde(rename_all = "camelCase")]
    BatchRedone { board_id: String, count: usize },

    /// A version of the board was frozen
    #[serde(rename_all = "camelCase")]
    VersionCreated { board_id: String, version: Version },
}

impl EngineEvent {
    /// Create a batch applied event from command names
    pub fn batch_applied(board_id: &str, commands: &[crate::Command]) -> Self {
        Self::BatchApplied {
            board_id: board_id.to_string(),
            commands: commands.iter().map(|c| c.name().to_string()).collect(),
        }
    }

    /// The board an event refers to
    pub fn board_id(&self) -> &str {
        match self {
            Self::BatchApplied { board_id, .. }
            | Self::BatchRolledBack { board_id, .. }
            | Self::BatchUndone { board_id, .. }
            | Self::BatchRedone { board_id, .. }
            | Self::VersionCreated { board_id, .. } => board_id,
        }
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Buffers events in memory, in emission order
#[derive(Debug, Default)]
pub struct VecEventSink {
    buffer: Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the buffered events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the buffered events, leaving the buffer empty
    pub fn drain(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear(&self) {
        self.drain();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.buffer
            .lock()
            .map_err(|_| EventError::Delivery("event buffer poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_events_keep_order() {
        let sink = VecEventSink::new();
        sink.send(EngineEvent::BatchUndone {
            board_id: "b1".to_string(),
            count: 2,
        })
        .unwrap();
        sink.send(EngineEvent::VersionCreated {
            board_id: "b2".to_string(),
            version: (0, 1, 0),
        })
        .unwrap();

        let boards: Vec<_> = sink.events().iter().map(|e| e.board_id().to_string()).collect();
        assert_eq!(boards, vec!["b1", "b2"]);

        let drained = sink.drain();
        assert!(matches!(
            drained[1],
            EngineEvent::VersionCreated { version: (0, 1, 0), .. }
        ));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        assert_eq!(
            NullEventSink.send(EngineEvent::BatchRolledBack {
                board_id: "b1".to_string(),
                error: "boom".to_string(),
            }),
            Ok(())
        );
    }

    #[test]
    fn test_event_wire_format() {
        let event = EngineEvent::batch_applied("b1", &[crate::Command::remove_node("n1")]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "batchApplied");
        assert_eq!(json["boardId"], "b1");
        assert_eq!(json["commands"][0], "RemoveNode");
    }
}
