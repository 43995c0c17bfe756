use std::collections::HashSet;

use crate::board::Board;
use crate::connections::sever;
use crate::error::{BoardError, Result};
use crate::journal::{restore_layers, restore_nodes, Journal};
use crate::layer::{dissolve_relay, Layer};
use crate::node::Node;

use super::require_scope;

/// Create or update a layer and fold `node_ids` into it.
///
/// A new layer without an id gets a fresh one, written back into `layer` so a
/// replay creates the same layer. Updating an existing layer replaces its
/// metadata but keeps its parent unless a new `parent_id` is given. Folded
/// nodes must currently live in the layer's parent scope.
pub(super) fn upsert(
    journal: &mut Journal<'_>,
    layer: &mut Layer,
    node_ids: &[String],
    current_layer: Option<&str>,
) -> Result<()> {
    if layer.id.is_empty() {
        layer.id = uuid::Uuid::new_v4().to_string();
    }

    let board = journal.board();
    match board.layers.get(&layer.id) {
        None => {
            let parent = layer
                .parent_id
                .clone()
                .or_else(|| current_layer.map(str::to_string));
            if parent.as_deref() == Some(layer.id.as_str()) {
                return Err(BoardError::invariant(format!(
                    "layer '{}' cannot contain itself",
                    layer.id
                )));
            }
            require_scope(board, parent.as_deref())?;
            let mut fresh = layer.metadata();
            fresh.parent_id = parent;
            journal.insert_layer(fresh);
        }
        Some(existing) => {
            if let Some(parent) = layer.parent_id.as_deref() {
                require_scope(board, Some(parent))?;
                if board.layer_within(parent, &layer.id) {
                    return Err(BoardError::invariant(format!(
                        "moving layer '{}' under '{}' would create a cycle",
                        layer.id, parent
                    )));
                }
            }
            let mut updated = layer.metadata();
            if updated.parent_id.is_none() {
                updated.parent_id = existing.parent_id.clone();
            }
            updated.pins = existing.pins.clone();
            updated.pin_lookup = existing.pin_lookup.clone();
            *journal.layer_mut(&layer.id)? = updated;
        }
    }

    let scope = journal.board().layer(&layer.id)?.parent_id.clone();
    for node_id in node_ids {
        let node = journal.board().node(node_id)?;
        if node.layer.as_deref() == Some(layer.id.as_str()) {
            continue;
        }
        if node.layer != scope {
            return Err(BoardError::invariant(format!(
                "node '{}' is not in the scope layer '{}' is created in",
                node_id, layer.id
            )));
        }
        journal.node_mut(node_id)?.layer = Some(layer.id.clone());
    }
    Ok(())
}

/// Remove a layer.
///
/// With `preserve_nodes` the layer's contents move up to its parent and every
/// boundary pin is dissolved back into direct links. Otherwise the whole
/// subtree goes, together with every link into it.
pub(super) fn remove(journal: &mut Journal<'_>, layer_id: &str, preserve_nodes: bool) -> Result<()> {
    let layer = journal.board().layer(layer_id)?.clone();
    if preserve_nodes {
        flatten(journal, &layer)
    } else {
        delete_subtree(journal, layer_id)
    }
}

fn flatten(journal: &mut Journal<'_>, layer: &Layer) -> Result<()> {
    for relay in layer.pins.keys() {
        dissolve_relay(journal, &layer.id, relay)?;
    }

    let scoped = Some(layer.id.clone());
    let board = journal.board();
    let nodes: Vec<String> = board
        .nodes
        .values()
        .filter(|n| n.layer == scoped)
        .map(|n| n.id.clone())
        .collect();
    let comments: Vec<String> = board
        .comments
        .values()
        .filter(|c| c.layer == scoped)
        .map(|c| c.id.clone())
        .collect();
    let children: Vec<String> = board
        .layers
        .values()
        .filter(|l| l.parent_id == scoped)
        .map(|l| l.id.clone())
        .collect();

    for id in nodes {
        journal.node_mut(&id)?.layer = layer.parent_id.clone();
    }
    for id in comments {
        journal.comment_mut(&id)?.layer = layer.parent_id.clone();
    }
    for id in children {
        journal.layer_mut(&id)?.parent_id = layer.parent_id.clone();
    }
    journal.remove_layer(&layer.id);
    Ok(())
}

fn delete_subtree(journal: &mut Journal<'_>, layer_id: &str) -> Result<()> {
    let board = journal.board();
    let subtree: HashSet<String> = board
        .layers
        .keys()
        .filter(|id| board.layer_within(id, layer_id))
        .cloned()
        .collect();
    let inside = |scope: &Option<String>| scope.as_ref().is_some_and(|id| subtree.contains(id));

    let nodes: Vec<Node> = board
        .nodes
        .values()
        .filter(|n| inside(&n.layer))
        .cloned()
        .collect();
    let comments: Vec<String> = board
        .comments
        .values()
        .filter(|c| inside(&c.layer))
        .map(|c| c.id.clone())
        .collect();
    let relays: Vec<String> = subtree
        .iter()
        .filter_map(|id| board.layers.get(id))
        .flat_map(|l| l.pins.keys().cloned())
        .collect();

    log::debug!(
        "Deleting layer '{}' with {} nodes and {} nested layers",
        layer_id,
        nodes.len(),
        subtree.len() - 1
    );

    for pin_id in nodes.iter().flat_map(|n| n.pins.keys()).chain(relays.iter()) {
        sever(journal, pin_id)?;
    }
    for node in &nodes {
        journal.remove_node(&node.id);
    }
    for id in comments {
        journal.remove_comment(&id);
    }
    for id in subtree {
        journal.remove_layer(&id);
    }
    Ok(())
}

/// Put the layer back to its pre-image, or drop it when it did not exist before
pub(super) fn restore(
    board: &mut Board,
    layer_id: &str,
    old_layer: Option<&Layer>,
    nodes: &[Node],
    layers: &[Layer],
) {
    restore_nodes(board, nodes);
    restore_layers(board, layers);
    match old_layer {
        Some(layer) => {
            board.layers.insert(layer.id.clone(), layer.clone());
        }
        None => {
            board.layers.remove(layer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::BoardBuilder;
    use crate::comment::Comment;
    use crate::error::BoardError;
    use crate::layer::Layer;
    use crate::node::Node;
    use crate::pin::Pin;
    use crate::types::VariableType;
    use crate::validation::validate_board;
    use crate::{execute_batch, undo_batch, Board, Command};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// src -> (mid_a -> mid_b) -> sink, with a second sink hanging off mid_b
    fn board() -> Board {
        BoardBuilder::new("b1")
            .node(Node::new("src", "const").with_pin(Pin::output("s", "out", VariableType::Integer)))
            .node(
                Node::new("mid_a", "double")
                    .with_pin(Pin::input("a_in", "in", VariableType::Integer))
                    .with_pin(Pin::output("a_out", "out", VariableType::Integer)),
            )
            .node(
                Node::new("mid_b", "inc")
                    .with_pin(Pin::input("b_in", "in", VariableType::Integer))
                    .with_pin(Pin::output("b_out", "out", VariableType::Integer)),
            )
            .node(Node::new("sink", "log").with_pin(Pin::input("k", "in", VariableType::Integer)))
            .node(Node::new("sink2", "log").with_pin(Pin::input("k2", "in", VariableType::Integer)))
            .comment(Comment::text("c1", "note", (0.0, 0.0, 0.0)))
            .connect("src", "s", "mid_a", "a_in")
            .connect("mid_a", "a_out", "mid_b", "b_in")
            .connect("mid_b", "b_out", "sink", "k")
            .connect("mid_b", "b_out", "sink2", "k2")
            .build()
    }

    #[test]
    fn test_fold_then_flatten_restores_board() {
        let mut board = board();
        let original = board.clone();

        execute_batch(
            &mut board,
            vec![Command::upsert_layer(Layer::new("L", "Pipeline"), ids(&["mid_a", "mid_b"]), None)],
        )
        .unwrap();

        let layer = &board.layers["L"];
        assert_eq!(layer.pins.len(), 2, "one relay per crossing pin");
        assert!(validate_board(&board).is_empty());
        assert_eq!(
            board.logical_peers("b_out").into_iter().collect::<Vec<_>>(),
            vec!["k", "k2"]
        );

        execute_batch(&mut board, vec![Command::remove_layer("L", true)]).unwrap();
        assert_eq!(board, original);
    }

    #[test]
    fn test_nested_fold_and_flatten() {
        let mut board = board();
        let original = board.clone();

        execute_batch(
            &mut board,
            vec![
                Command::upsert_layer(Layer::new("outer", "Outer"), ids(&["mid_a", "mid_b"]), None),
                Command::upsert_layer(
                    Layer::new("inner", "Inner"),
                    ids(&["mid_b"]),
                    Some("outer".to_string()),
                ),
            ],
        )
        .unwrap();
        assert!(validate_board(&board).is_empty());
        assert_eq!(board.resolve_relay("outer/b_out"), "b_out");

        execute_batch(&mut board, vec![Command::remove_layer("inner", true)]).unwrap();
        assert!(validate_board(&board).is_empty());
        execute_batch(&mut board, vec![Command::remove_layer("outer", true)]).unwrap();
        assert_eq!(board, original);
    }

    #[test]
    fn test_rename_keeps_nested_layer_in_place() {
        let mut board = board();
        execute_batch(
            &mut board,
            vec![
                Command::upsert_layer(Layer::new("outer", "Outer"), ids(&["mid_a", "mid_b"]), None),
                Command::upsert_layer(
                    Layer::new("inner", "Inner"),
                    ids(&["mid_b"]),
                    Some("outer".to_string()),
                ),
            ],
        )
        .unwrap();
        let nested = board.clone();

        let applied = execute_batch(
            &mut board,
            vec![Command::upsert_layer(Layer::new("inner", "Renamed"), vec![], None)],
        )
        .unwrap();
        assert_eq!(board.layers["inner"].name, "Renamed");
        assert_eq!(board.layers["inner"].parent_id.as_deref(), Some("outer"));
        assert_eq!(board.layers["inner"].pins, nested.layers["inner"].pins);
        assert!(validate_board(&board).is_empty());

        undo_batch(&mut board, &applied).unwrap();
        assert_eq!(board, nested);
    }

    #[test]
    fn test_delete_layer_drops_contents_and_edges() {
        let mut board = board();
        execute_batch(
            &mut board,
            vec![Command::upsert_layer(Layer::new("L", "Pipeline"), ids(&["mid_a", "mid_b"]), None)],
        )
        .unwrap();
        let folded = board.clone();

        let applied = execute_batch(&mut board, vec![Command::remove_layer("L", false)]).unwrap();
        assert!(!board.layers.contains_key("L"));
        assert!(!board.nodes.contains_key("mid_a"));
        assert!(!board.nodes.contains_key("mid_b"));
        assert!(board.pin("s").unwrap().connected_to.is_empty());
        assert!(board.pin("k").unwrap().connected_to.is_empty());
        assert!(validate_board(&board).is_empty());

        undo_batch(&mut board, &applied).unwrap();
        assert_eq!(board, folded);
    }

    #[test]
    fn test_layer_cycle_rejected() {
        let mut board = board();
        execute_batch(
            &mut board,
            vec![
                Command::upsert_layer(Layer::new("a", "A"), vec![], None),
                Command::upsert_layer(Layer::new("b", "B"), vec![], Some("a".to_string())),
            ],
        )
        .unwrap();

        let result = execute_batch(
            &mut board,
            vec![Command::upsert_layer(Layer::new("a", "A").with_parent("b"), vec![], None)],
        );
        assert!(matches!(result, Err(BoardError::InvariantViolation(_))));
    }

    #[test]
    fn test_layer_parent_must_exist() {
        let mut board = board();
        let result = execute_batch(
            &mut board,
            vec![Command::upsert_layer(Layer::new("a", "A"), vec![], Some("missing".to_string()))],
        );
        assert!(matches!(result, Err(BoardError::NotFound { .. })));
    }

    #[test]
    fn test_unnamed_layer_gets_stable_id() {
        let mut board = board();
        let applied = execute_batch(
            &mut board,
            vec![Command::upsert_layer(Layer::new("", "Anonymous"), ids(&["sink"]), None)],
        )
        .unwrap();

        let id = match &applied[0].kind {
            crate::CommandKind::UpsertLayer { layer, .. } => layer.id.clone(),
            other => panic!("unexpected command {:?}", other),
        };
        assert!(!id.is_empty());
        assert_eq!(board.nodes["sink"].layer.as_deref(), Some(id.as_str()));
    }
}
