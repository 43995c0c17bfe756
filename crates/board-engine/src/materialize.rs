//! Board materialization for the canvas
//!
//! [`parse_board`] derives the node and edge records a canvas renders from a
//! board snapshot. It is a pure function of its inputs, so it can be called
//! on every state change and from any thread.
//!
//! What is visible depends on the selected layer and the set of expanded
//! layers:
//!
//! - the selected layer (or the root) is open, and so is every expanded layer
//!   nested in an open one
//! - nodes and comments of open layers render as themselves
//! - child layers of open layers that are not expanded render as one layer
//!   record carrying their boundary pins
//! - boundary pins of open layers are transparent, and edges are traced
//!   through them to the pins they relay
//! - node pins reached outside the open layers render on ghost node records
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashSet;
//! use board_engine::materialize::{parse_board, CanvasCallbacks};
//!
//! let callbacks = CanvasCallbacks::default()
//!     .on_execute(|node_id| println!("run {}", node_id));
//! let view = parse_board(&board, None, &callbacks, &HashSet::new());
//! for edge in &view.edges {
//!     println!("{} -> {}", edge.source_handle, edge.target_handle);
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::board::{Board, PinIndex, PinOwner};
use crate::comment::Comment;
use crate::layer::Layer;
use crate::node::Node;
use crate::types::{PinType, VariableType};

/// A canvas callback, invoked with the id of the entity it is bound to
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&str) + Send + Sync>);

impl Callback {
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn bind(&self, target: &str) -> BoundCallback {
        BoundCallback {
            callback: self.clone(),
            target: target.to_string(),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

/// A callback bound to one render record
#[derive(Debug, Clone)]
pub struct BoundCallback {
    callback: Callback,
    target: String,
}

impl BoundCallback {
    pub fn call(&self) {
        (self.callback.0)(&self.target);
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Canvas actions bound into render records
#[derive(Debug, Clone, Default)]
pub struct CanvasCallbacks {
    pub on_execute: Option<Callback>,
    pub on_copy: Option<Callback>,
    pub on_comment_upsert: Option<Callback>,
    pub on_layer_push: Option<Callback>,
}

impl CanvasCallbacks {
    pub fn on_execute(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Callback::new(f));
        self
    }

    pub fn on_copy(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_copy = Some(Callback::new(f));
        self
    }

    pub fn on_comment_upsert(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_comment_upsert = Some(Callback::new(f));
        self
    }

    pub fn on_layer_push(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_layer_push = Some(Callback::new(f));
        self
    }
}

fn bind(callback: &Option<Callback>, target: &str) -> Option<BoundCallback> {
    callback.as_ref().map(|c| c.bind(target))
}

/// One record on the canvas
#[derive(Debug, Clone)]
pub enum RenderNode {
    Node {
        node: Node,
        /// The node lives outside the open layers and is shown for context
        ghost: bool,
        on_execute: Option<BoundCallback>,
        on_copy: Option<BoundCallback>,
    },
    Layer {
        layer: Layer,
        /// Boundary pin id to the `(node_id, pin_id)` it ultimately relays
        pin_lookup: BTreeMap<String, (String, String)>,
        on_layer_push: Option<BoundCallback>,
        on_copy: Option<BoundCallback>,
    },
    Comment {
        comment: Comment,
        on_comment_upsert: Option<BoundCallback>,
    },
}

impl RenderNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Node { node, .. } => &node.id,
            Self::Layer { layer, .. } => &layer.id,
            Self::Comment { comment, .. } => &comment.id,
        }
    }
}

/// One connection on the canvas, oriented from output to input
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEdge {
    pub id: String,
    /// Node or layer owning the source pin
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
    pub data_type: VariableType,
    pub color: &'static str,
    /// Execution flow edges are animated
    pub animated: bool,
}

/// Everything the canvas renders for one board view
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
}

/// How a pin shows up in the current view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    /// Drawn on a visible node or layer record
    Endpoint,
    /// A boundary pin of an open layer, traced through
    Transparent,
    /// A node pin outside the open layers
    Ghost,
}

struct View<'a> {
    board: &'a Board,
    index: PinIndex,
    open: HashSet<Option<String>>,
    collapsed: BTreeSet<String>,
}

impl<'a> View<'a> {
    fn new(board: &'a Board, selected: Option<&str>, expanded: &HashSet<String>) -> Self {
        let mut open: HashSet<Option<String>> = HashSet::from([selected.map(str::to_string)]);
        loop {
            let newly_open: Vec<Option<String>> = board
                .layers
                .values()
                .filter(|l| expanded.contains(&l.id) && open.contains(&l.parent_id))
                .map(|l| Some(l.id.clone()))
                .filter(|id| !open.contains(id))
                .collect();
            if newly_open.is_empty() {
                break;
            }
            open.extend(newly_open);
        }

        let collapsed = board
            .layers
            .values()
            .filter(|l| open.contains(&l.parent_id) && !open.contains(&Some(l.id.clone())))
            .map(|l| l.id.clone())
            .collect();

        Self {
            board,
            index: board.pin_index(),
            open,
            collapsed,
        }
    }

    fn node_visible(&self, node: &Node) -> bool {
        self.open.contains(&node.layer)
    }

    fn classify(&self, pin_id: &str) -> Option<Visibility> {
        match self.index.owner(pin_id)? {
            PinOwner::Node(id) => {
                let node = self.board.nodes.get(id)?;
                Some(if self.node_visible(node) {
                    Visibility::Endpoint
                } else {
                    Visibility::Ghost
                })
            }
            PinOwner::Layer(id) if self.collapsed.contains(id) => Some(Visibility::Endpoint),
            PinOwner::Layer(_) => Some(Visibility::Transparent),
        }
    }

    /// Pins drawn at the far end of every edge leaving `start`
    fn far_ends(&self, start: &str) -> Vec<String> {
        // A collapsed layer's pin is drawn on the layer; its inside is hidden
        let hidden_target = self.index.relay_target(self.board, start);

        let mut ends = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<&str> = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let Some(pin) = self.index.pin(self.board, current) else {
                continue;
            };
            for peer in &pin.connected_to {
                let peer = peer.as_str();
                if current == start && Some(peer) == hidden_target {
                    continue;
                }
                if !seen.insert(peer) {
                    continue;
                }
                match self.classify(peer) {
                    Some(Visibility::Endpoint) | Some(Visibility::Ghost) => {
                        ends.push(peer.to_string())
                    }
                    Some(Visibility::Transparent) => queue.push_back(peer),
                    None => {}
                }
            }
        }
        ends
    }

    fn layer_lookup(&self, layer: &Layer) -> BTreeMap<String, (String, String)> {
        layer
            .pins
            .keys()
            .filter_map(|relay| {
                let target = self.index.resolve_relay(self.board, relay);
                match self.index.owner(&target)? {
                    PinOwner::Node(node_id) => Some((relay.clone(), (node_id.clone(), target))),
                    PinOwner::Layer(_) => None,
                }
            })
            .collect()
    }

    fn edge(&self, a: &str, b: &str) -> Option<RenderEdge> {
        let a_pin = self.index.pin(self.board, a)?;
        let b_pin = self.index.pin(self.board, b)?;
        let (source, target) = if a_pin.pin_type == PinType::Output || b_pin.pin_type == PinType::Input
        {
            (a, b)
        } else {
            (b, a)
        };

        let root = self.index.resolve_relay(self.board, source);
        let data_type = self
            .index
            .effective_type(self.board, &root)
            .unwrap_or(VariableType::Generic);
        Some(RenderEdge {
            id: format!("{}-{}", source, target),
            source: self.index.owner(source)?.id().to_string(),
            source_handle: source.to_string(),
            target: self.index.owner(target)?.id().to_string(),
            target_handle: target.to_string(),
            data_type,
            color: data_type.color(),
            animated: data_type == VariableType::Execution,
        })
    }
}

/// Derive the renderable node and edge lists for one board view.
///
/// `selected_layer` is the layer the user navigated into (`None` for the
/// root); `expanded_layers` are layers shown inline instead of as one record.
pub fn parse_board(
    board: &Board,
    selected_layer: Option<&str>,
    callbacks: &CanvasCallbacks,
    expanded_layers: &HashSet<String>,
) -> Materialized {
    let view = View::new(board, selected_layer, expanded_layers);

    let visible_nodes: Vec<&Node> = board.nodes.values().filter(|n| view.node_visible(n)).collect();
    let mut endpoints: Vec<&str> = visible_nodes
        .iter()
        .flat_map(|n| n.pins.keys().map(String::as_str))
        .collect();
    for layer_id in &view.collapsed {
        if let Some(layer) = board.layers.get(layer_id) {
            endpoints.extend(layer.pins.keys().map(String::as_str));
        }
    }

    let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
    let mut ghosts: BTreeSet<String> = BTreeSet::new();
    for start in endpoints {
        for end in view.far_ends(start) {
            if view.classify(&end) == Some(Visibility::Ghost) {
                if let Some(owner) = view.index.owner(&end) {
                    ghosts.insert(owner.id().to_string());
                }
            }
            let pair = if start < end.as_str() {
                (start.to_string(), end)
            } else {
                (end, start.to_string())
            };
            pairs.insert(pair);
        }
    }

    let mut edges: Vec<RenderEdge> = pairs.iter().filter_map(|(a, b)| view.edge(a, b)).collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));

    let mut node_records: Vec<(&str, RenderNode)> = visible_nodes
        .iter()
        .map(|node| {
            let record = RenderNode::Node {
                node: (*node).clone(),
                ghost: false,
                on_execute: bind(&callbacks.on_execute, &node.id),
                on_copy: bind(&callbacks.on_copy, &node.id),
            };
            (node.id.as_str(), record)
        })
        .collect();
    for ghost in &ghosts {
        if let Some(node) = board.nodes.get(ghost) {
            let record = RenderNode::Node {
                node: node.clone(),
                ghost: true,
                on_execute: None,
                on_copy: None,
            };
            node_records.push((node.id.as_str(), record));
        }
    }
    node_records.sort_by(|a, b| a.0.cmp(b.0));

    let mut nodes: Vec<RenderNode> = node_records.into_iter().map(|(_, record)| record).collect();
    for layer_id in &view.collapsed {
        if let Some(layer) = board.layers.get(layer_id) {
            nodes.push(RenderNode::Layer {
                layer: layer.clone(),
                pin_lookup: view.layer_lookup(layer),
                on_layer_push: bind(&callbacks.on_layer_push, &layer.id),
                on_copy: bind(&callbacks.on_copy, &layer.id),
            });
        }
    }
    for comment in board.comments.values().filter(|c| view.open.contains(&c.layer)) {
        nodes.push(RenderNode::Comment {
            comment: comment.clone(),
            on_comment_upsert: bind(&callbacks.on_comment_upsert, &comment.id),
        });
    }

    log::trace!(
        "Materialized board '{}': {} records, {} edges",
        board.id,
        nodes.len(),
        edges.len()
    );
    Materialized { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::builder::BoardBuilder;
    use crate::pin::Pin;

    /// n1.a -> n2.b, n2.c -> n3.d with n2 inside layer L
    fn layered() -> Board {
        BoardBuilder::new("b1")
            .node(
                Node::new("n1", "start")
                    .with_pin(Pin::output("a", "out", VariableType::Integer))
                    .with_pin(Pin::output("x1", "exec", VariableType::Execution)),
            )
            .node(
                Node::new("n2", "double")
                    .with_layer("L")
                    .with_pin(Pin::input("b", "in", VariableType::Integer))
                    .with_pin(Pin::output("c", "out", VariableType::Integer)),
            )
            .node(
                Node::new("n3", "log")
                    .with_pin(Pin::input("d", "in", VariableType::Integer))
                    .with_pin(Pin::input("x3", "exec", VariableType::Execution)),
            )
            .layer(Layer::new("L", "Double"))
            .comment(Comment::text("c1", "root note", (0.0, 0.0, 0.0)))
            .comment(Comment::text("c2", "inner note", (0.0, 0.0, 0.0)).with_layer("L"))
            .connect("n1", "a", "n2", "b")
            .connect("n2", "c", "n3", "d")
            .connect("n1", "x1", "n3", "x3")
            .build()
    }

    fn ids(view: &Materialized) -> Vec<&str> {
        view.nodes.iter().map(RenderNode::id).collect()
    }

    fn edge_ids(view: &Materialized) -> Vec<&str> {
        view.edges.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_collapsed_layer_renders_as_one_record() {
        let board = layered();
        let view = parse_board(&board, None, &CanvasCallbacks::default(), &HashSet::new());

        assert_eq!(ids(&view), vec!["n1", "n3", "L", "c1"]);
        assert_eq!(edge_ids(&view), vec!["L/c-d", "a-L/b", "x1-x3"]);

        let RenderNode::Layer { pin_lookup, .. } = &view.nodes[2] else {
            panic!("expected a layer record");
        };
        assert_eq!(pin_lookup["L/b"], ("n2".to_string(), "b".to_string()));
        assert_eq!(pin_lookup["L/c"], ("n2".to_string(), "c".to_string()));
    }

    #[test]
    fn test_expanded_layer_traces_through_boundary() {
        let board = layered();
        let expanded = HashSet::from(["L".to_string()]);
        let view = parse_board(&board, None, &CanvasCallbacks::default(), &expanded);

        assert_eq!(ids(&view), vec!["n1", "n2", "n3", "c1", "c2"]);
        assert_eq!(edge_ids(&view), vec!["a-b", "c-d", "x1-x3"]);

        let edge = &view.edges[0];
        assert_eq!(edge.source, "n1");
        assert_eq!(edge.target, "n2");
        assert_eq!(edge.data_type, VariableType::Integer);
        assert!(!edge.animated);
        assert!(view.edges[2].animated);
    }

    #[test]
    fn test_selected_layer_shows_outside_peers_as_ghosts() {
        let board = layered();
        let view = parse_board(&board, Some("L"), &CanvasCallbacks::default(), &HashSet::new());

        assert_eq!(ids(&view), vec!["n1", "n2", "n3", "c2"]);
        assert_eq!(edge_ids(&view), vec!["a-b", "c-d"]);
        let ghosts: Vec<bool> = view
            .nodes
            .iter()
            .filter_map(|r| match r {
                RenderNode::Node { ghost, .. } => Some(*ghost),
                _ => None,
            })
            .collect();
        assert_eq!(ghosts, vec![true, false, true]);
    }

    #[test]
    fn test_callbacks_are_bound_to_records() {
        let board = layered();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let callbacks =
            CanvasCallbacks::default().on_execute(move |id| sink.lock().unwrap().push(id.to_string()));

        let view = parse_board(&board, None, &callbacks, &HashSet::new());
        for record in &view.nodes {
            if let RenderNode::Node {
                on_execute: Some(cb),
                ..
            } = record
            {
                cb.call();
            }
        }

        assert_eq!(*calls.lock().unwrap(), vec!["n1".to_string(), "n3".to_string()]);
    }

    #[test]
    fn test_materialization_is_deterministic() {
        let board = layered();
        let first = parse_board(&board, None, &CanvasCallbacks::default(), &HashSet::new());
        let second = parse_board(&board, None, &CanvasCallbacks::default(), &HashSet::new());

        assert_eq!(first.edges, second.edges);
        assert_eq!(ids(&first), ids(&second));
    }
}
