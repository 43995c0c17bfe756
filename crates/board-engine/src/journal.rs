//! Pre-image journal for a single command application
//!
//! Every mutation a command makes goes through a [`Journal`], which remembers
//! the first state it saw of each touched entity. A failed apply rolls the
//! board back from these pre-images; a successful one hands them to the
//! command so its undo is an exact replace.

use std::collections::BTreeMap;

use crate::board::{Board, PinOwner};
use crate::comment::Comment;
use crate::error::{BoardError, EntityKind, Result};
use crate::layer::Layer;
use crate::node::Node;
use crate::pin::Pin;
use crate::variable::Variable;

/// Pre-images of the entities that existed before a command touched them
#[derive(Debug, Default)]
pub(crate) struct Preimages {
    pub nodes: Vec<Node>,
    pub layers: Vec<Layer>,
    pub comments: Vec<Comment>,
    pub variables: Vec<Variable>,
}

impl Preimages {
    /// Remove and return the pre-image of one node
    pub fn take_node(&mut self, id: &str) -> Option<Node> {
        let position = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(position))
    }

    pub fn take_layer(&mut self, id: &str) -> Option<Layer> {
        let position = self.layers.iter().position(|l| l.id == id)?;
        Some(self.layers.remove(position))
    }
}

pub(crate) struct Journal<'a> {
    board: &'a mut Board,
    nodes: BTreeMap<String, Option<Node>>,
    layers: BTreeMap<String, Option<Layer>>,
    comments: BTreeMap<String, Option<Comment>>,
    variables: BTreeMap<String, Option<Variable>>,
}

fn remember<T: Clone>(log: &mut BTreeMap<String, Option<T>>, live: &BTreeMap<String, T>, id: &str) {
    if !log.contains_key(id) {
        log.insert(id.to_string(), live.get(id).cloned());
    }
}

fn put_back<T>(live: &mut BTreeMap<String, T>, log: BTreeMap<String, Option<T>>) {
    for (id, before) in log {
        match before {
            Some(entity) => {
                live.insert(id, entity);
            }
            None => {
                live.remove(&id);
            }
        }
    }
}

impl<'a> Journal<'a> {
    pub fn new(board: &'a mut Board) -> Self {
        Self {
            board,
            nodes: BTreeMap::new(),
            layers: BTreeMap::new(),
            comments: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn board(&self) -> &Board {
        self.board
    }

    pub fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        remember(&mut self.nodes, &self.board.nodes, id);
        self.board
            .nodes
            .get_mut(id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Node, id))
    }

    pub fn layer_mut(&mut self, id: &str) -> Result<&mut Layer> {
        remember(&mut self.layers, &self.board.layers, id);
        self.board
            .layers
            .get_mut(id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Layer, id))
    }

    /// Mutable access to any pin, recording its owner first
    pub fn pin_mut(&mut self, pin_id: &str) -> Result<&mut Pin> {
        let owner = self
            .board
            .pin_owner(pin_id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Pin, pin_id))?;
        let pins = match owner {
            PinOwner::Node(id) => &mut self.node_mut(&id)?.pins,
            PinOwner::Layer(id) => &mut self.layer_mut(&id)?.pins,
        };
        pins.get_mut(pin_id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Pin, pin_id))
    }

    pub fn insert_node(&mut self, node: Node) {
        remember(&mut self.nodes, &self.board.nodes, &node.id);
        self.board.nodes.insert(node.id.clone(), node);
    }

    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        remember(&mut self.nodes, &self.board.nodes, id);
        self.board.nodes.remove(id)
    }

    pub fn insert_layer(&mut self, layer: Layer) {
        remember(&mut self.layers, &self.board.layers, &layer.id);
        self.board.layers.insert(layer.id.clone(), layer);
    }

    pub fn remove_layer(&mut self, id: &str) -> Option<Layer> {
        remember(&mut self.layers, &self.board.layers, id);
        self.board.layers.remove(id)
    }

    pub fn comment_mut(&mut self, id: &str) -> Result<&mut Comment> {
        remember(&mut self.comments, &self.board.comments, id);
        self.board
            .comments
            .get_mut(id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Comment, id))
    }

    pub fn insert_comment(&mut self, comment: Comment) {
        remember(&mut self.comments, &self.board.comments, &comment.id);
        self.board.comments.insert(comment.id.clone(), comment);
    }

    pub fn remove_comment(&mut self, id: &str) -> Option<Comment> {
        remember(&mut self.comments, &self.board.comments, id);
        self.board.comments.remove(id)
    }

    pub fn insert_variable(&mut self, variable: Variable) {
        remember(&mut self.variables, &self.board.variables, &variable.id);
        self.board.variables.insert(variable.id.clone(), variable);
    }

    pub fn remove_variable(&mut self, id: &str) -> Option<Variable> {
        remember(&mut self.variables, &self.board.variables, id);
        self.board.variables.remove(id)
    }

    /// Put every touched entity back the way it was
    pub fn rollback(self) {
        put_back(&mut self.board.nodes, self.nodes);
        put_back(&mut self.board.layers, self.layers);
        put_back(&mut self.board.comments, self.comments);
        put_back(&mut self.board.variables, self.variables);
    }

    /// Keep the changes and hand back the pre-images of entities that existed
    pub fn finish(self) -> Preimages {
        Preimages {
            nodes: self.nodes.into_values().flatten().collect(),
            layers: self.layers.into_values().flatten().collect(),
            comments: self.comments.into_values().flatten().collect(),
            variables: self.variables.into_values().flatten().collect(),
        }
    }
}

/// Reinsert recorded node pre-images
pub(crate) fn restore_nodes(board: &mut Board, nodes: &[Node]) {
    for node in nodes {
        board.nodes.insert(node.id.clone(), node.clone());
    }
}

/// Reinsert recorded layer pre-images
pub(crate) fn restore_layers(board: &mut Board, layers: &[Layer]) {
    for layer in layers {
        board.layers.insert(layer.id.clone(), layer.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariableType;

    fn board() -> Board {
        let mut board = Board::new("b1", "journal");
        let node = Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer));
        board.nodes.insert(node.id.clone(), node);
        board
    }

    #[test]
    fn test_rollback_restores_touched_and_removes_created() {
        let mut board = board();
        let before = board.clone();

        let mut journal = Journal::new(&mut board);
        journal.pin_mut("p1").unwrap().connected_to.insert("x".to_string());
        journal.insert_node(Node::new("n2", "log"));
        journal.remove_node("n1");
        journal.rollback();

        assert_eq!(board, before);
    }

    #[test]
    fn test_finish_reports_only_existing_preimages() {
        let mut board = board();
        let mut journal = Journal::new(&mut board);
        journal.node_mut("n1").unwrap().comment = Some("edited".to_string());
        journal.insert_node(Node::new("n2", "log"));
        let preimages = journal.finish();

        assert_eq!(preimages.nodes.len(), 1);
        assert_eq!(preimages.nodes[0].comment, None);
        assert!(board.nodes.contains_key("n2"));
    }

    #[test]
    fn test_missing_pin_is_not_found() {
        let mut board = board();
        let mut journal = Journal::new(&mut board);
        assert!(matches!(
            journal.pin_mut("nope"),
            Err(BoardError::NotFound { kind: EntityKind::Pin, .. })
        ));
    }
}
