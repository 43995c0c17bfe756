//! Undo/redo history of applied command batches
//!
//! Each entry is a batch as returned by [`execute_batch`](crate::execute_batch),
//! with its pre-images recorded. Undo replays the recorded inverses, redo
//! re-applies the records, so no board snapshots are kept.

use std::collections::VecDeque;

use crate::board::Board;
use crate::commands::{redo_batch, undo_batch, Command};
use crate::error::Result;

/// Bounded undo/redo stack of command batches
pub struct CommandHistory {
    /// Applied batches, oldest first
    batches: VecDeque<Vec<Command>>,
    /// Number of batches currently applied; everything after it is redo history
    cursor: usize,
    /// Maximum number of batches to keep
    limit: usize,
}

impl CommandHistory {
    /// Create a history keeping at most `limit` batches
    pub fn new(limit: usize) -> Self {
        Self {
            batches: VecDeque::new(),
            cursor: 0,
            limit: limit.max(1), // At least 1 batch
        }
    }

    /// Record a freshly applied batch
    ///
    /// This truncates any redo history.
    pub fn push(&mut self, batch: Vec<Command>) {
        if batch.is_empty() {
            return;
        }
        self.batches.truncate(self.cursor);
        self.batches.push_back(batch);
        self.cursor = self.batches.len();

        while self.batches.len() > self.limit {
            self.batches.pop_front();
            self.cursor -= 1;
        }
    }

    /// Undo the most recent applied batch
    ///
    /// Returns `false` if there is nothing to undo. On error the board and
    /// the history are unchanged.
    pub fn undo(&mut self, board: &mut Board) -> Result<bool> {
        if self.cursor == 0 {
            return Ok(false);
        }
        undo_batch(board, &self.batches[self.cursor - 1])?;
        self.cursor -= 1;
        Ok(true)
    }

    /// Re-apply the most recently undone batch
    pub fn redo(&mut self, board: &mut Board) -> Result<bool> {
        let Some(batch) = self.batches.get(self.cursor) else {
            return Ok(false);
        };
        let redone = redo_batch(board, batch.clone())?;
        self.batches[self.cursor] = redone;
        self.cursor += 1;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.batches.len()
    }

    /// Get the number of batches, including undone ones
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.cursor = 0;
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(100) // Default to 100 batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BoardBuilder;
    use crate::execute_batch;
    use crate::node::Node;

    fn board() -> Board {
        BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_coordinates((0.0, 0.0, 0.0)))
            .build()
    }

    fn apply(board: &mut Board, history: &mut CommandHistory, x: f32) {
        let batch = execute_batch(board, vec![Command::move_node("n1", (x, 0.0, 0.0))]).unwrap();
        history.push(batch);
    }

    fn x(board: &Board) -> f32 {
        board.nodes["n1"].coordinates.unwrap().0
    }

    #[test]
    fn test_push_and_undo() {
        let mut board = board();
        let mut history = CommandHistory::new(10);
        apply(&mut board, &mut history, 1.0);
        apply(&mut board, &mut history, 2.0);

        assert!(history.undo(&mut board).unwrap());
        assert_eq!(x(&board), 1.0);
        assert!(history.undo(&mut board).unwrap());
        assert_eq!(x(&board), 0.0);

        // Can't undo further
        assert!(!history.undo(&mut board).unwrap());
    }

    #[test]
    fn test_redo() {
        let mut board = board();
        let mut history = CommandHistory::new(10);
        apply(&mut board, &mut history, 1.0);
        history.undo(&mut board).unwrap();

        assert!(history.redo(&mut board).unwrap());
        assert_eq!(x(&board), 1.0);
        assert!(!history.redo(&mut board).unwrap());
    }

    #[test]
    fn test_push_truncates_redo() {
        let mut board = board();
        let mut history = CommandHistory::new(10);
        apply(&mut board, &mut history, 1.0);
        apply(&mut board, &mut history, 2.0);
        history.undo(&mut board).unwrap();

        apply(&mut board, &mut history, 3.0);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);

        history.undo(&mut board).unwrap();
        assert_eq!(x(&board), 1.0);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut board = board();
        let mut history = CommandHistory::new(3);
        for i in 1..=5 {
            apply(&mut board, &mut history, i as f32);
        }
        assert_eq!(history.len(), 3);

        // Only the last three moves can be undone
        while history.undo(&mut board).unwrap() {}
        assert_eq!(x(&board), 2.0);
        assert!(!history.can_undo());
        assert!(history.can_redo());
    }

    #[test]
    fn test_empty_batch_is_ignored() {
        let mut history = CommandHistory::default();
        history.push(Vec::new());
        assert!(history.is_empty());
        assert!(!history.can_undo());
    }
}
