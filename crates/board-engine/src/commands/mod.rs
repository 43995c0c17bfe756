//! Reversible board commands
//!
//! A [`Command`] holds what the caller asked for (the intent fields) together
//! with what the board looked like before (the recorded fields). The recorded
//! fields are filled in by [`Command::apply`], never by the caller, so
//! [`Command::undo`] is an exact replace and a redo is simply another apply.
//!
//! # Example
//!
//! ```ignore
//! use board_engine::{execute_batch, undo_batch, Command};
//!
//! let applied = execute_batch(&mut board, vec![
//!     Command::connect("n1", "p1", "n2", "p2"),
//!     Command::move_node("n2", (200.0, 0.0, 0.0)),
//! ])?;
//!
//! undo_batch(&mut board, &applied)?;
//! ```

mod comments;
mod layers;
mod nodes;
mod paste;
mod pins;
mod transaction;
mod variables;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::comment::Comment;
use crate::error::{BoardError, Result};
use crate::extensions::Extension;
use crate::journal::{Journal, Preimages};
use crate::layer::{reconcile_layers, Layer};
use crate::node::Node;
use crate::pin::Pin;
use crate::types::Coordinates;
use crate::variable::Variable;

pub use transaction::{execute_batch, redo_batch, undo_batch};

/// The command kinds, tagged by `command_type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command_type")]
pub enum CommandKind {
    AddNode {
        node: Node,
    },
    RemoveNode {
        node_id: String,
        #[serde(default)]
        old_node: Option<Node>,
        #[serde(default)]
        connected_nodes: Vec<Node>,
        #[serde(default)]
        connected_layers: Vec<Layer>,
    },
    UpdateNode {
        node: Node,
        #[serde(default)]
        old_node: Option<Node>,
        #[serde(default)]
        connected_nodes: Vec<Node>,
        #[serde(default)]
        connected_layers: Vec<Layer>,
    },
    MoveNode {
        node_id: String,
        #[serde(default)]
        to_coordinates: Option<Coordinates>,
        #[serde(default)]
        offset: Option<Coordinates>,
        #[serde(default)]
        from_coordinates: Option<Coordinates>,
    },
    ConnectPin {
        from_node: String,
        from_pin: String,
        to_node: String,
        to_pin: String,
        #[serde(default)]
        old_nodes: Vec<Node>,
        #[serde(default)]
        old_layers: Vec<Layer>,
    },
    DisconnectPin {
        from_node: String,
        from_pin: String,
        to_node: String,
        to_pin: String,
        #[serde(default)]
        old_nodes: Vec<Node>,
        #[serde(default)]
        old_layers: Vec<Layer>,
    },
    UpsertPin {
        node_id: String,
        pin: Pin,
        #[serde(default)]
        old_pin: Option<Pin>,
        #[serde(default)]
        old_node: Option<Node>,
        #[serde(default)]
        connected_nodes: Vec<Node>,
        #[serde(default)]
        old_layers: Vec<Layer>,
    },
    CopyPaste {
        #[serde(default)]
        original_nodes: Vec<Node>,
        #[serde(default)]
        original_comments: Vec<Comment>,
        #[serde(default)]
        original_layers: Vec<Layer>,
        #[serde(default)]
        current_layer: Option<String>,
        offset: Coordinates,
        #[serde(default)]
        old_mouse: Option<Coordinates>,
        #[serde(default)]
        new_nodes: Vec<Node>,
        #[serde(default)]
        new_comments: Vec<Comment>,
        #[serde(default)]
        new_layers: Vec<Layer>,
    },
    RemoveComment {
        comment_id: String,
        #[serde(default)]
        old_comment: Option<Comment>,
    },
    UpsertComment {
        comment: Comment,
        #[serde(default)]
        current_layer: Option<String>,
        #[serde(default)]
        old_comment: Option<Comment>,
    },
    UpsertVariable {
        variable: Variable,
        #[serde(default)]
        old_variable: Option<Variable>,
    },
    RemoveVariable {
        variable_id: String,
        #[serde(default)]
        old_variable: Option<Variable>,
    },
    UpsertLayer {
        layer: Layer,
        #[serde(default)]
        node_ids: Vec<String>,
        #[serde(default)]
        current_layer: Option<String>,
        #[serde(default)]
        old_layer: Option<Layer>,
        #[serde(default)]
        old_nodes: Vec<Node>,
        #[serde(default)]
        old_layers: Vec<Layer>,
    },
    RemoveLayer {
        layer_id: String,
        #[serde(default)]
        preserve_nodes: bool,
        #[serde(default)]
        layer: Option<Layer>,
        #[serde(default)]
        layers: Vec<Layer>,
        #[serde(default)]
        nodes: Vec<Node>,
        #[serde(default)]
        comments: Vec<Comment>,
    },
}

impl CommandKind {
    /// Wire name of the command kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "AddNode",
            Self::RemoveNode { .. } => "RemoveNode",
            Self::UpdateNode { .. } => "UpdateNode",
            Self::MoveNode { .. } => "MoveNode",
            Self::ConnectPin { .. } => "ConnectPin",
            Self::DisconnectPin { .. } => "DisconnectPin",
            Self::UpsertPin { .. } => "UpsertPin",
            Self::CopyPaste { .. } => "CopyPaste",
            Self::RemoveComment { .. } => "RemoveComment",
            Self::UpsertComment { .. } => "UpsertComment",
            Self::UpsertVariable { .. } => "UpsertVariable",
            Self::RemoveVariable { .. } => "RemoveVariable",
            Self::UpsertLayer { .. } => "UpsertLayer",
            Self::RemoveLayer { .. } => "RemoveLayer",
        }
    }

    /// Whether the command can change pins, nodes or layers
    fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::MoveNode { .. }
                | Self::RemoveComment { .. }
                | Self::UpsertComment { .. }
                | Self::UpsertVariable { .. }
                | Self::RemoveVariable { .. }
        )
    }

    /// Perform the mutation through the journal
    fn run(&mut self, journal: &mut Journal<'_>) -> Result<()> {
        match self {
            Self::AddNode { node } => nodes::add(journal, node),
            Self::RemoveNode { node_id, .. } => nodes::remove(journal, node_id),
            Self::UpdateNode { node, .. } => nodes::update(journal, node),
            Self::MoveNode {
                node_id,
                to_coordinates,
                offset,
                from_coordinates,
            } => nodes::relocate(journal, node_id, to_coordinates, *offset, from_coordinates),
            Self::ConnectPin {
                from_node,
                from_pin,
                to_node,
                to_pin,
                ..
            } => crate::connections::connect(journal, from_node, from_pin, to_node, to_pin),
            Self::DisconnectPin {
                from_node,
                from_pin,
                to_node,
                to_pin,
                ..
            } => crate::connections::disconnect(journal, from_node, from_pin, to_node, to_pin),
            Self::UpsertPin { node_id, pin, .. } => pins::upsert(journal, node_id, pin),
            Self::CopyPaste { .. } => paste::paste(journal, self),
            Self::RemoveComment { comment_id, .. } => comments::remove(journal, comment_id),
            Self::UpsertComment {
                comment,
                current_layer,
                ..
            } => comments::upsert(journal, comment, current_layer.as_deref()),
            Self::UpsertVariable { variable, .. } => variables::upsert(journal, variable),
            Self::RemoveVariable { variable_id, .. } => variables::remove(journal, variable_id),
            Self::UpsertLayer {
                layer,
                node_ids,
                current_layer,
                ..
            } => layers::upsert(journal, layer, node_ids, current_layer.as_deref()),
            Self::RemoveLayer {
                layer_id,
                preserve_nodes,
                ..
            } => layers::remove(journal, layer_id, *preserve_nodes),
        }
    }

    /// Store the pre-images captured while running
    fn record(&mut self, mut pre: Preimages, board: &Board) {
        match self {
            Self::AddNode { .. } | Self::MoveNode { .. } => {}
            Self::RemoveNode {
                node_id,
                old_node,
                connected_nodes,
                connected_layers,
            } => {
                *old_node = pre.take_node(node_id);
                *connected_nodes = pre.nodes;
                *connected_layers = pre.layers;
            }
            Self::UpdateNode {
                node,
                old_node,
                connected_nodes,
                connected_layers,
            } => {
                *old_node = pre.take_node(&node.id);
                *connected_nodes = pre.nodes;
                *connected_layers = pre.layers;
            }
            Self::ConnectPin {
                old_nodes,
                old_layers,
                ..
            }
            | Self::DisconnectPin {
                old_nodes,
                old_layers,
                ..
            } => {
                *old_nodes = pre.nodes;
                *old_layers = pre.layers;
            }
            Self::UpsertPin {
                node_id,
                pin,
                old_pin,
                old_node,
                connected_nodes,
                old_layers,
            } => {
                *old_node = pre.take_node(node_id);
                *old_pin = old_node.as_ref().and_then(|n| n.pins.get(&pin.id).cloned());
                *connected_nodes = pre.nodes;
                *old_layers = pre.layers;
            }
            Self::CopyPaste {
                new_nodes,
                new_comments,
                new_layers,
                ..
            } => {
                paste::record_outputs(board, new_nodes, new_comments, new_layers);
            }
            Self::RemoveComment { old_comment, .. } | Self::UpsertComment { old_comment, .. } => {
                *old_comment = pre.comments.pop();
            }
            Self::UpsertVariable { old_variable, .. } | Self::RemoveVariable { old_variable, .. } => {
                *old_variable = pre.variables.pop();
            }
            Self::UpsertLayer {
                layer,
                old_layer,
                old_nodes,
                old_layers,
                ..
            } => {
                *old_layer = pre.take_layer(&layer.id);
                *old_nodes = pre.nodes;
                *old_layers = pre.layers;
            }
            Self::RemoveLayer {
                layer_id,
                layer,
                layers,
                nodes,
                comments,
                ..
            } => {
                *layer = pre.take_layer(layer_id);
                *layers = pre.layers;
                *nodes = pre.nodes;
                *comments = pre.comments;
            }
        }
    }

    fn undo(&self, board: &mut Board) -> Result<()> {
        match self {
            Self::AddNode { node } => {
                board.nodes.remove(&node.id);
                Ok(())
            }
            Self::RemoveNode {
                old_node,
                connected_nodes,
                connected_layers,
                ..
            } => {
                let node = old_node.as_ref().ok_or_else(never_applied)?;
                nodes::restore(board, Some(node), &node.id, connected_nodes, connected_layers);
                Ok(())
            }
            Self::UpdateNode {
                node,
                old_node,
                connected_nodes,
                connected_layers,
            } => {
                nodes::restore(board, old_node.as_ref(), &node.id, connected_nodes, connected_layers);
                Ok(())
            }
            Self::MoveNode {
                node_id,
                from_coordinates,
                ..
            } => nodes::place(board, node_id, *from_coordinates),
            Self::ConnectPin {
                old_nodes,
                old_layers,
                ..
            }
            | Self::DisconnectPin {
                old_nodes,
                old_layers,
                ..
            } => {
                crate::journal::restore_nodes(board, old_nodes);
                crate::journal::restore_layers(board, old_layers);
                Ok(())
            }
            Self::UpsertPin {
                old_node,
                connected_nodes,
                old_layers,
                ..
            } => {
                let node = old_node.as_ref().ok_or_else(never_applied)?;
                nodes::restore(board, Some(node), &node.id, connected_nodes, old_layers);
                Ok(())
            }
            Self::CopyPaste {
                new_nodes,
                new_comments,
                new_layers,
                ..
            } => {
                paste::unpaste(board, new_nodes, new_comments, new_layers);
                Ok(())
            }
            Self::RemoveComment { old_comment, .. } => {
                let comment = old_comment.as_ref().ok_or_else(never_applied)?;
                board.comments.insert(comment.id.clone(), comment.clone());
                Ok(())
            }
            Self::UpsertComment {
                comment,
                old_comment,
                ..
            } => {
                comments::restore(board, &comment.id, old_comment.as_ref());
                Ok(())
            }
            Self::UpsertVariable {
                variable,
                old_variable,
            } => {
                variables::restore(board, &variable.id, old_variable.as_ref());
                Ok(())
            }
            Self::RemoveVariable { old_variable, .. } => {
                let variable = old_variable.as_ref().ok_or_else(never_applied)?;
                board.variables.insert(variable.id.clone(), variable.clone());
                Ok(())
            }
            Self::UpsertLayer {
                layer,
                old_layer,
                old_nodes,
                old_layers,
                ..
            } => {
                layers::restore(board, &layer.id, old_layer.as_ref(), old_nodes, old_layers);
                Ok(())
            }
            Self::RemoveLayer {
                layer_id,
                layer,
                layers,
                nodes,
                comments,
                ..
            } => {
                let layer = layer.as_ref().ok_or_else(never_applied)?;
                layers::restore(board, layer_id, Some(layer), nodes, layers);
                for comment in comments {
                    board.comments.insert(comment.id.clone(), comment.clone());
                }
                Ok(())
            }
        }
    }
}

/// Fail unless `layer` is the root scope or an existing layer
fn require_scope(board: &Board, layer: Option<&str>) -> Result<()> {
    match layer {
        Some(id) if !board.layers.contains_key(id) => {
            Err(BoardError::not_found(crate::error::EntityKind::Layer, id))
        }
        _ => Ok(()),
    }
}

fn never_applied() -> BoardError {
    BoardError::invariant("command has no recorded pre-image; it was never applied")
}

/// A reversible board mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(flatten)]
    pub kind: CommandKind,
    /// Producer-specific data carried alongside the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl From<CommandKind> for Command {
    fn from(kind: CommandKind) -> Self {
        Self {
            kind,
            extension: None,
        }
    }
}

impl Command {
    /// Apply the command and record its pre-images.
    ///
    /// On error the board is left exactly as it was and the command's recorded
    /// fields are untouched.
    pub fn apply(&mut self, board: &mut Board) -> Result<()> {
        let intent = self.kind.clone();
        let mut journal = Journal::new(board);

        let mut outcome = self.kind.run(&mut journal);
        if outcome.is_ok() && self.kind.is_structural() {
            outcome = reconcile_layers(&mut journal);
        }

        match outcome {
            Ok(()) => {
                let pre = journal.finish();
                self.kind.record(pre, board);
                log::debug!("Applied {} to board '{}'", self.kind.name(), board.id);
                Ok(())
            }
            Err(err) => {
                journal.rollback();
                self.kind = intent;
                log::debug!("Rejected {}: {}", self.kind.name(), err);
                Err(err)
            }
        }
    }

    /// Revert an applied command from its recorded pre-images
    pub fn undo(&self, board: &mut Board) -> Result<()> {
        self.kind.undo(board)?;
        log::debug!("Undid {} on board '{}'", self.kind.name(), board.id);
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn add_node(node: Node) -> Self {
        CommandKind::AddNode { node }.into()
    }

    pub fn remove_node(node_id: impl Into<String>) -> Self {
        CommandKind::RemoveNode {
            node_id: node_id.into(),
            old_node: None,
            connected_nodes: Vec::new(),
            connected_layers: Vec::new(),
        }
        .into()
    }

    pub fn update_node(node: Node) -> Self {
        CommandKind::UpdateNode {
            node,
            old_node: None,
            connected_nodes: Vec::new(),
            connected_layers: Vec::new(),
        }
        .into()
    }

    /// Move a node to absolute coordinates
    pub fn move_node(node_id: impl Into<String>, to: Coordinates) -> Self {
        CommandKind::MoveNode {
            node_id: node_id.into(),
            to_coordinates: Some(to),
            offset: None,
            from_coordinates: None,
        }
        .into()
    }

    /// Move a node by an offset from wherever it currently is
    pub fn offset_node(node_id: impl Into<String>, offset: Coordinates) -> Self {
        CommandKind::MoveNode {
            node_id: node_id.into(),
            to_coordinates: None,
            offset: Some(offset),
            from_coordinates: None,
        }
        .into()
    }

    pub fn connect(
        from_node: impl Into<String>,
        from_pin: impl Into<String>,
        to_node: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Self {
        CommandKind::ConnectPin {
            from_node: from_node.into(),
            from_pin: from_pin.into(),
            to_node: to_node.into(),
            to_pin: to_pin.into(),
            old_nodes: Vec::new(),
            old_layers: Vec::new(),
        }
        .into()
    }

    pub fn disconnect(
        from_node: impl Into<String>,
        from_pin: impl Into<String>,
        to_node: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Self {
        CommandKind::DisconnectPin {
            from_node: from_node.into(),
            from_pin: from_pin.into(),
            to_node: to_node.into(),
            to_pin: to_pin.into(),
            old_nodes: Vec::new(),
            old_layers: Vec::new(),
        }
        .into()
    }

    pub fn upsert_pin(node_id: impl Into<String>, pin: Pin) -> Self {
        CommandKind::UpsertPin {
            node_id: node_id.into(),
            pin,
            old_pin: None,
            old_node: None,
            connected_nodes: Vec::new(),
            old_layers: Vec::new(),
        }
        .into()
    }

    pub fn copy_paste(
        nodes: Vec<Node>,
        comments: Vec<Comment>,
        layers: Vec<Layer>,
        offset: Coordinates,
    ) -> Self {
        CommandKind::CopyPaste {
            original_nodes: nodes,
            original_comments: comments,
            original_layers: layers,
            current_layer: None,
            offset,
            old_mouse: None,
            new_nodes: Vec::new(),
            new_comments: Vec::new(),
            new_layers: Vec::new(),
        }
        .into()
    }

    pub fn remove_comment(comment_id: impl Into<String>) -> Self {
        CommandKind::RemoveComment {
            comment_id: comment_id.into(),
            old_comment: None,
        }
        .into()
    }

    pub fn upsert_comment(comment: Comment) -> Self {
        CommandKind::UpsertComment {
            comment,
            current_layer: None,
            old_comment: None,
        }
        .into()
    }

    pub fn upsert_variable(variable: Variable) -> Self {
        CommandKind::UpsertVariable {
            variable,
            old_variable: None,
        }
        .into()
    }

    pub fn remove_variable(variable_id: impl Into<String>) -> Self {
        CommandKind::RemoveVariable {
            variable_id: variable_id.into(),
            old_variable: None,
        }
        .into()
    }

    /// Create or update a layer, folding the given nodes into it
    pub fn upsert_layer(layer: Layer, node_ids: Vec<String>, current_layer: Option<String>) -> Self {
        CommandKind::UpsertLayer {
            layer,
            node_ids,
            current_layer,
            old_layer: None,
            old_nodes: Vec::new(),
            old_layers: Vec::new(),
        }
        .into()
    }

    pub fn remove_layer(layer_id: impl Into<String>, preserve_nodes: bool) -> Self {
        CommandKind::RemoveLayer {
            layer_id: layer_id.into(),
            preserve_nodes,
            layer: None,
            layers: Vec::new(),
            nodes: Vec::new(),
            comments: Vec::new(),
        }
        .into()
    }
}

