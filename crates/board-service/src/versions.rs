//! Frozen board versions
//!
//! A version is stored as zstd-compressed JSON. Every read decodes a fresh
//! `Board`, so nothing done to the working copy can reach a frozen version.

use board_engine::{Board, BoardError, Version};
use serde::{Deserialize, Serialize};

/// An immutable, compressed board snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenBoard {
    pub version: Version,
    bytes: Vec<u8>,
}

impl FrozenBoard {
    /// Compress a board snapshot at the given zstd level
    pub fn freeze(board: &Board, level: i32) -> Result<Self, BoardError> {
        let json = serde_json::to_vec(board)?;
        let bytes = zstd::encode_all(&json[..], level)
            .map_err(|e| BoardError::Compression(e.to_string()))?;
        log::debug!(
            "Froze board '{}' {:?}: {} bytes -> {} bytes",
            board.id,
            board.version,
            json.len(),
            bytes.len()
        );
        Ok(Self {
            version: board.version,
            bytes,
        })
    }

    /// Decode a fresh copy of the frozen board
    pub fn thaw(&self) -> Result<Board, BoardError> {
        let json = zstd::decode_all(&self.bytes[..])
            .map_err(|e| BoardError::Compression(e.to_string()))?;
        let board: Board = serde_json::from_slice(&json)?;
        Ok(board)
    }

    /// Compressed size in bytes
    pub fn compressed_size(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_engine::{BoardBuilder, Node, Pin, VariableType};

    #[test]
    fn test_freeze_and_thaw() {
        let mut board = BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
            .build();
        board.version = (1, 2, 0);

        let frozen = FrozenBoard::freeze(&board, 3).unwrap();
        assert_eq!(frozen.version, (1, 2, 0));
        assert!(frozen.compressed_size() > 0);
        assert_eq!(frozen.thaw().unwrap(), board);
    }

    #[test]
    fn test_corrupt_payload_is_a_compression_error() {
        let frozen = FrozenBoard {
            version: (0, 0, 1),
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(frozen.thaw(), Err(BoardError::Compression(_))));
    }
}
