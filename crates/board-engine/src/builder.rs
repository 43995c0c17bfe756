//! Fluent builder for boards
//!
//! Provides a fluent API for constructing boards programmatically, mostly
//! for fixtures and for hosts that assemble boards from templates.

use crate::board::Board;
use crate::comment::Comment;
use crate::connections::link;
use crate::journal::Journal;
use crate::layer::{reconcile_layers, Layer};
use crate::node::Node;
use crate::variable::Variable;

struct PendingLink {
    from_node: String,
    from_pin: String,
    to_node: String,
    to_pin: String,
}

/// Fluent builder for constructing boards
///
/// # Example
///
/// ```ignore
/// let board = BoardBuilder::new("b1")
///     .name("Greeting")
///     .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::String)))
///     .node(Node::new("n2", "log").with_pin(Pin::input("p2", "msg", VariableType::String)))
///     .connect("n1", "p1", "n2", "p2")
///     .build();
/// ```
pub struct BoardBuilder {
    id: String,
    name: String,
    description: String,
    nodes: Vec<Node>,
    comments: Vec<Comment>,
    layers: Vec<Layer>,
    variables: Vec<Variable>,
    links: Vec<PendingLink>,
}

impl BoardBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            nodes: Vec::new(),
            comments: Vec::new(),
            layers: Vec::new(),
            variables: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn comment(mut self, comment: Comment) -> Self {
        self.comments.push(comment);
        self
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Link an output pin to an input pin
    ///
    /// Links are written as given, without the compatibility checks a
    /// `ConnectPin` command runs. Unknown pins are skipped with a warning.
    pub fn connect(
        mut self,
        from_node: impl Into<String>,
        from_pin: impl Into<String>,
        to_node: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Self {
        self.links.push(PendingLink {
            from_node: from_node.into(),
            from_pin: from_pin.into(),
            to_node: to_node.into(),
            to_pin: to_pin.into(),
        });
        self
    }

    /// Build the board, folding links that cross layers into boundary pins
    pub fn build(self) -> Board {
        let mut board = Board::new(self.id, self.name);
        board.description = self.description;
        for node in self.nodes {
            board.nodes.insert(node.id.clone(), node);
        }
        for comment in self.comments {
            board.comments.insert(comment.id.clone(), comment);
        }
        for layer in self.layers {
            board.layers.insert(layer.id.clone(), layer);
        }
        for variable in self.variables {
            board.variables.insert(variable.id.clone(), variable);
        }

        let mut journal = Journal::new(&mut board);
        for pending in &self.links {
            let known = journal.board().owned_pin(&pending.from_node, &pending.from_pin).is_ok()
                && journal.board().owned_pin(&pending.to_node, &pending.to_pin).is_ok();
            if !known {
                log::warn!(
                    "Skipping link {}.{} -> {}.{}: unknown pin",
                    pending.from_node,
                    pending.from_pin,
                    pending.to_node,
                    pending.to_pin
                );
                continue;
            }
            if let Err(err) = link(&mut journal, &pending.from_pin, &pending.to_pin) {
                log::warn!("Skipping link {} -> {}: {}", pending.from_pin, pending.to_pin, err);
            }
        }
        if let Err(err) = reconcile_layers(&mut journal) {
            log::warn!("Could not synthesize layer boundaries: {}", err);
        }
        journal.finish();
        board
    }
}
