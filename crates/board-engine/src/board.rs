//! The board aggregate and its read-side queries
//!
//! A [`Board`] owns every node, comment, layer and variable of one graph.
//! Pins live inside their owner (a node, or a layer for boundary pins); the
//! queries here locate a pin by id regardless of owner and resolve layer
//! relays back to the node pins they stand for.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comment::Comment;
use crate::error::{BoardError, EntityKind, Result};
use crate::layer::Layer;
use crate::node::Node;
use crate::pin::Pin;
use crate::types::{Coordinates, ExecutionStage, LogLevel, PinType, Version, VariableType};
use crate::variable::Variable;

/// Who owns a pin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PinOwner {
    Node(String),
    Layer(String),
}

impl PinOwner {
    pub fn id(&self) -> &str {
        match self {
            Self::Node(id) | Self::Layer(id) => id,
        }
    }
}

/// A versioned visual-programming graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub comments: BTreeMap<String, Comment>,
    #[serde(default)]
    pub layers: BTreeMap<String, Layer>,
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
    /// Cross-board references: referenced board id to pinned version key
    #[serde(default)]
    pub refs: BTreeMap<String, String>,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub stage: ExecutionStage,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub viewport: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Create an empty board at version (0, 0, 0)
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            nodes: BTreeMap::new(),
            comments: BTreeMap::new(),
            layers: BTreeMap::new(),
            variables: BTreeMap::new(),
            refs: BTreeMap::new(),
            version: (0, 0, 0),
            stage: ExecutionStage::default(),
            log_level: LogLevel::default(),
            viewport: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Node, id))
    }

    pub fn layer(&self, id: &str) -> Result<&Layer> {
        self.layers
            .get(id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Layer, id))
    }

    /// Find the owner of a pin
    pub fn pin_owner(&self, pin_id: &str) -> Option<PinOwner> {
        if let Some(node) = self.nodes.values().find(|n| n.pins.contains_key(pin_id)) {
            return Some(PinOwner::Node(node.id.clone()));
        }
        self.layers
            .values()
            .find(|l| l.pins.contains_key(pin_id))
            .map(|l| PinOwner::Layer(l.id.clone()))
    }

    /// Look up any pin, node or boundary, by id
    pub fn pin(&self, pin_id: &str) -> Option<&Pin> {
        self.nodes
            .values()
            .find_map(|n| n.pins.get(pin_id))
            .or_else(|| self.layers.values().find_map(|l| l.pins.get(pin_id)))
    }

    /// Look up a pin through its stated owner, which may be a node or a layer
    pub fn owned_pin(&self, owner_id: &str, pin_id: &str) -> Result<&Pin> {
        let pins = match (self.nodes.get(owner_id), self.layers.get(owner_id)) {
            (Some(node), _) => &node.pins,
            (None, Some(layer)) => &layer.pins,
            (None, None) => return Err(BoardError::not_found(EntityKind::Node, owner_id)),
        };
        pins.get(pin_id)
            .ok_or_else(|| BoardError::not_found(EntityKind::Pin, pin_id))
    }

    /// Build an owner index over every pin.
    ///
    /// A duplicated id resolves like [`Board::pin`]: nodes before layers,
    /// each in id order.
    pub fn pin_index(&self) -> PinIndex {
        let mut owners = HashMap::new();
        for node in self.nodes.values() {
            for pin_id in node.pins.keys() {
                owners
                    .entry(pin_id.clone())
                    .or_insert_with(|| PinOwner::Node(node.id.clone()));
            }
        }
        for layer in self.layers.values() {
            for pin_id in layer.pins.keys() {
                owners
                    .entry(pin_id.clone())
                    .or_insert_with(|| PinOwner::Layer(layer.id.clone()));
            }
        }
        PinIndex { owners }
    }

    /// Layer ids from `scope` up to the root, innermost first
    pub fn layer_chain(&self, scope: Option<&str>) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = scope.map(str::to_string);
        while let Some(id) = current {
            if !seen.insert(id.clone()) {
                break;
            }
            current = self.layers.get(&id).and_then(|l| l.parent_id.clone());
            chain.push(id);
        }
        chain
    }

    /// The scope a pin is visible in
    ///
    /// Node pins live in their node's layer. Boundary pins live in the parent
    /// of the layer they belong to.
    pub fn pin_scope(&self, pin_id: &str) -> Option<Option<String>> {
        self.pin_index().pin_scope(self, pin_id)
    }

    /// Whether a pin sits somewhere inside `layer_id`
    pub fn is_inside(&self, pin_id: &str, layer_id: &str) -> bool {
        self.pin_index().is_inside(self, pin_id, layer_id)
    }

    /// Whether a layer is `ancestor` or nested anywhere below it
    pub fn layer_within(&self, layer_id: &str, ancestor: &str) -> bool {
        self.layer_chain(Some(layer_id)).iter().any(|id| id == ancestor)
    }

    /// Whether a pin is a layer boundary relay
    pub fn is_relay(&self, pin_id: &str) -> bool {
        self.layers.values().any(|l| l.pins.contains_key(pin_id))
    }

    /// The pin a relay stands for, one level down
    pub fn relay_target(&self, pin_id: &str) -> Option<&str> {
        self.layers
            .values()
            .find(|l| l.pins.contains_key(pin_id))
            .and_then(|l| l.pin_lookup.get(pin_id))
            .map(String::as_str)
    }

    /// Follow relay lookups down to the node pin they stand for
    pub fn resolve_relay(&self, pin_id: &str) -> String {
        self.pin_index().resolve_relay(self, pin_id)
    }

    /// Direction data flows through a pin; boundary pins mirror their target
    pub fn flow_type(&self, pin_id: &str) -> Option<PinType> {
        self.pin_index().flow_type(self, pin_id)
    }

    /// Node pins logically connected to `pin_id`, looking through relays
    pub fn logical_peers(&self, pin_id: &str) -> BTreeSet<String> {
        self.pin_index().logical_peers(self, pin_id)
    }

    /// The chain of pins linking `from` to `to`, passing only through relays
    pub fn relay_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        self.pin_index().relay_path(self, from, to)
    }

    /// Data type a pin currently carries.
    ///
    /// Concrete pins report their declared type. A Generic pin reports the
    /// first concrete type reached by walking its peers in id order through
    /// relays and other Generic pins, or Generic when there is none.
    pub fn effective_type(&self, pin_id: &str) -> Option<VariableType> {
        self.pin_index().effective_type(self, pin_id)
    }
}

/// Pin id to owner lookup built once for read-heavy passes
///
/// Owners are captured at build time while pin contents are read from the
/// board passed to each query, so links may change under an index but pins
/// created afterwards must be added with `insert`.
#[derive(Debug, Clone, Default)]
pub struct PinIndex {
    owners: HashMap<String, PinOwner>,
}

impl PinIndex {
    pub fn owner(&self, pin_id: &str) -> Option<&PinOwner> {
        self.owners.get(pin_id)
    }

    pub fn contains(&self, pin_id: &str) -> bool {
        self.owners.contains_key(pin_id)
    }

    pub fn is_relay(&self, pin_id: &str) -> bool {
        matches!(self.owners.get(pin_id), Some(PinOwner::Layer(_)))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Record a pin created after the index was built
    pub(crate) fn insert(&mut self, pin_id: impl Into<String>, owner: PinOwner) {
        self.owners.insert(pin_id.into(), owner);
    }

    /// Resolve a pin through the index
    pub fn pin<'b>(&self, board: &'b Board, pin_id: &str) -> Option<&'b Pin> {
        match self.owners.get(pin_id)? {
            PinOwner::Node(id) => board.nodes.get(id)?.pins.get(pin_id),
            PinOwner::Layer(id) => board.layers.get(id)?.pins.get(pin_id),
        }
    }

    pub fn relay_target<'b>(&self, board: &'b Board, pin_id: &str) -> Option<&'b str> {
        match self.owners.get(pin_id)? {
            PinOwner::Layer(id) => board
                .layers
                .get(id)?
                .pin_lookup
                .get(pin_id)
                .map(String::as_str),
            PinOwner::Node(_) => None,
        }
    }

    pub fn resolve_relay(&self, board: &Board, pin_id: &str) -> String {
        let mut current = pin_id.to_string();
        let mut seen = HashSet::new();
        while let Some(target) = self.relay_target(board, &current) {
            if !seen.insert(current.clone()) {
                break;
            }
            current = target.to_string();
        }
        current
    }

    pub fn flow_type(&self, board: &Board, pin_id: &str) -> Option<PinType> {
        self.pin(board, &self.resolve_relay(board, pin_id))
            .map(|p| p.pin_type)
    }

    pub fn pin_scope(&self, board: &Board, pin_id: &str) -> Option<Option<String>> {
        match self.owners.get(pin_id)? {
            PinOwner::Node(id) => board.nodes.get(id).map(|n| n.layer.clone()),
            PinOwner::Layer(id) => board.layers.get(id).map(|l| l.parent_id.clone()),
        }
    }

    pub fn is_inside(&self, board: &Board, pin_id: &str, layer_id: &str) -> bool {
        match self.pin_scope(board, pin_id) {
            Some(scope) => board
                .layer_chain(scope.as_deref())
                .iter()
                .any(|id| id == layer_id),
            None => false,
        }
    }

    pub fn logical_peers(&self, board: &Board, pin_id: &str) -> BTreeSet<String> {
        let mut peers = BTreeSet::new();
        let mut seen: HashSet<String> = HashSet::from([pin_id.to_string()]);
        let mut queue: VecDeque<String> = VecDeque::from([pin_id.to_string()]);

        while let Some(current) = queue.pop_front() {
            let Some(pin) = self.pin(board, &current) else {
                continue;
            };
            for peer in &pin.connected_to {
                if !seen.insert(peer.clone()) {
                    continue;
                }
                if self.is_relay(peer) {
                    queue.push_back(peer.clone());
                } else {
                    peers.insert(peer.clone());
                }
            }
        }
        peers
    }

    pub fn relay_path(&self, board: &Board, from: &str, to: &str) -> Option<Vec<String>> {
        let mut previous: HashMap<String, String> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::from([from.to_string()]);
        let mut seen: HashSet<String> = HashSet::from([from.to_string()]);

        while let Some(current) = queue.pop_front() {
            let Some(pin) = self.pin(board, &current) else {
                continue;
            };
            for peer in &pin.connected_to {
                if !seen.insert(peer.clone()) {
                    continue;
                }
                previous.insert(peer.clone(), current.clone());
                if peer == to {
                    let mut path = vec![to.to_string()];
                    let mut cursor = to.to_string();
                    while let Some(prev) = previous.get(&cursor) {
                        path.push(prev.clone());
                        cursor = prev.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                if self.is_relay(peer) {
                    queue.push_back(peer.clone());
                }
            }
        }
        None
    }

    pub fn effective_type(&self, board: &Board, pin_id: &str) -> Option<VariableType> {
        let pin = self.pin(board, pin_id)?;
        if !self.is_relay(pin_id) && pin.data_type != VariableType::Generic {
            return Some(pin.data_type);
        }

        let mut seen: HashSet<String> = HashSet::from([pin_id.to_string()]);
        let mut queue: VecDeque<String> = VecDeque::from([pin_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            let Some(current_pin) = self.pin(board, &current) else {
                continue;
            };
            for peer in &current_pin.connected_to {
                if !seen.insert(peer.clone()) {
                    continue;
                }
                let Some(peer_pin) = self.pin(board, peer) else {
                    continue;
                };
                if self.is_relay(peer) || peer_pin.data_type == VariableType::Generic {
                    queue.push_back(peer.clone());
                } else {
                    return Some(peer_pin.data_type);
                }
            }
        }

        // A relay with no concrete neighbour reports what it mirrors
        Some(self.pin(board, &self.resolve_relay(board, pin_id))?.data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BoardBuilder;

    #[test]
    fn test_pin_lookup_across_owners() {
        let board = BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
            .build();

        assert_eq!(board.pin_owner("p1"), Some(PinOwner::Node("n1".to_string())));
        assert!(board.pin("p1").is_some());
        assert!(board.pin("missing").is_none());
        assert!(board.owned_pin("n1", "p1").is_ok());
        assert!(matches!(
            board.owned_pin("n1", "nope"),
            Err(BoardError::NotFound { kind: EntityKind::Pin, .. })
        ));
        assert_eq!(board.pin_index().len(), 1);
    }

    #[test]
    fn test_generic_narrows_through_peers() {
        let mut board = BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Float)))
            .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Generic)))
            .build();

        assert_eq!(board.effective_type("p2"), Some(VariableType::Generic));

        crate::commands::execute_batch(&mut board, vec![crate::Command::connect("n1", "p1", "n2", "p2")])
            .unwrap();
        assert_eq!(board.effective_type("p2"), Some(VariableType::Float));
    }

    #[test]
    fn test_one_index_answers_relay_queries() {
        let mut board = BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
            .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Generic)))
            .connect("n1", "p1", "n2", "p2")
            .build();
        crate::commands::execute_batch(
            &mut board,
            vec![crate::Command::upsert_layer(Layer::new("L", "Folded"), vec!["n2".to_string()], None)],
        )
        .unwrap();

        let index = board.pin_index();
        assert_eq!(index.owner("L/p2"), Some(&PinOwner::Layer("L".to_string())));
        assert!(index.is_relay("L/p2"));
        assert_eq!(index.relay_target(&board, "L/p2"), Some("p2"));
        assert_eq!(index.resolve_relay(&board, "L/p2"), "p2");
        assert!(index.is_inside(&board, "p2", "L"));
        assert!(!index.is_inside(&board, "p1", "L"));
        for pin in ["p1", "p2", "L/p2"] {
            assert_eq!(index.logical_peers(&board, pin), board.logical_peers(pin));
            assert_eq!(index.flow_type(&board, pin), board.flow_type(pin));
            assert_eq!(index.effective_type(&board, pin), board.effective_type(pin));
        }
        assert!(index.logical_peers(&board, "p2").contains("p1"));
        assert_eq!(index.effective_type(&board, "p2"), Some(VariableType::Integer));
    }

    #[test]
    fn test_layer_chain_stops_on_cycle() {
        let mut board = Board::new("b1", "cyclic");
        board
            .layers
            .insert("a".to_string(), Layer::new("a", "A").with_parent("b"));
        board
            .layers
            .insert("b".to_string(), Layer::new("b", "B").with_parent("a"));

        let chain = board.layer_chain(Some("a"));
        assert_eq!(chain, vec!["a".to_string(), "b".to_string()]);
    }
}
