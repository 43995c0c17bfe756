use crate::board::Board;
use crate::connections::sever;
use crate::error::{BoardError, EntityKind, Result};
use crate::journal::{restore_layers, restore_nodes, Journal};
use crate::layer::Layer;
use crate::node::Node;
use crate::types::Coordinates;

use super::pins::check_peer_compatibility;
use super::require_scope;

/// Pins must be keyed by their own id and must not collide with other owners
fn check_pins(board: &Board, node: &Node) -> Result<()> {
    for (key, pin) in &node.pins {
        if key != &pin.id {
            return Err(BoardError::invariant(format!(
                "pin keyed '{}' carries id '{}'",
                key, pin.id
            )));
        }
        match board.pin_owner(&pin.id) {
            Some(owner) if owner.id() != node.id => {
                return Err(BoardError::conflict(EntityKind::Pin, &pin.id));
            }
            _ => {}
        }
    }
    Ok(())
}

pub(super) fn add(journal: &mut Journal<'_>, node: &Node) -> Result<()> {
    let board = journal.board();
    if board.nodes.contains_key(&node.id) {
        return Err(BoardError::conflict(EntityKind::Node, &node.id));
    }
    check_pins(board, node)?;
    if let Some(pin) = node
        .pins
        .values()
        .find(|p| p.is_connected() || !p.depends_on.is_empty())
    {
        return Err(BoardError::invariant(format!(
            "new node '{}' arrives with connections on pin '{}'",
            node.id, pin.id
        )));
    }
    require_scope(board, node.layer.as_deref())?;

    let mut node = node.clone();
    node.normalize_pin_indices(None);
    journal.insert_node(node);
    Ok(())
}

pub(super) fn remove(journal: &mut Journal<'_>, node_id: &str) -> Result<()> {
    let pin_ids: Vec<String> = journal.board().node(node_id)?.pins.keys().cloned().collect();
    for pin_id in pin_ids {
        sever(journal, &pin_id)?;
    }
    journal.remove_node(node_id);
    Ok(())
}

/// Upsert a node. Connections and layer placement stay engine-owned.
pub(super) fn update(journal: &mut Journal<'_>, node: &Node) -> Result<()> {
    let board = journal.board();
    check_pins(board, node)?;

    let Some(existing) = board.nodes.get(&node.id).cloned() else {
        require_scope(board, node.layer.as_deref())?;
        let mut fresh = node.clone();
        for pin in fresh.pins.values_mut() {
            pin.connected_to.clear();
            pin.depends_on.clear();
        }
        fresh.normalize_pin_indices(None);
        journal.insert_node(fresh);
        return Ok(());
    };

    // Pins that disappear or change direction lose their links
    for (pin_id, old_pin) in &existing.pins {
        let keeps_links = node
            .pins
            .get(pin_id)
            .map(|p| p.pin_type == old_pin.pin_type)
            .unwrap_or(false);
        if !keeps_links {
            sever(journal, pin_id)?;
        }
    }

    let live = journal.board().node(&node.id)?.clone();
    let mut updated = node.clone();
    updated.layer = live.layer.clone();
    for pin in updated.pins.values_mut() {
        match live.pins.get(&pin.id) {
            Some(current) => {
                pin.connected_to = current.connected_to.clone();
                pin.depends_on = current.depends_on.clone();
            }
            None => {
                pin.connected_to.clear();
                pin.depends_on.clear();
            }
        }
    }
    updated.normalize_pin_indices(None);

    let retyped: Vec<String> = updated
        .pins
        .values()
        .filter(|pin| {
            existing.pins.get(&pin.id).is_some_and(|old| {
                old.data_type != pin.data_type
                    || old.value_type != pin.value_type
                    || old.schema != pin.schema
                    || old.options != pin.options
            })
        })
        .map(|pin| pin.id.clone())
        .collect();

    *journal.node_mut(&node.id)? = updated;
    for pin_id in retyped {
        check_peer_compatibility(journal.board(), &pin_id)?;
    }
    Ok(())
}

pub(super) fn relocate(
    journal: &mut Journal<'_>,
    node_id: &str,
    to_coordinates: &mut Option<Coordinates>,
    offset: Option<Coordinates>,
    from_coordinates: &mut Option<Coordinates>,
) -> Result<()> {
    let node = journal.node_mut(node_id)?;
    let current = node.coordinates;
    let target = match (*to_coordinates, offset) {
        (Some(target), _) => target,
        (None, Some(offset)) => {
            let base = current.unwrap_or((0.0, 0.0, 0.0));
            (base.0 + offset.0, base.1 + offset.1, base.2 + offset.2)
        }
        (None, None) => {
            return Err(BoardError::invariant(
                "moving a node needs target coordinates or an offset",
            ))
        }
    };

    node.coordinates = Some(target);
    *from_coordinates = current;
    *to_coordinates = Some(target);
    Ok(())
}

/// Set a node's coordinates directly
pub(super) fn place(board: &mut Board, node_id: &str, coordinates: Option<Coordinates>) -> Result<()> {
    let node = board
        .nodes
        .get_mut(node_id)
        .ok_or_else(|| BoardError::not_found(EntityKind::Node, node_id))?;
    node.coordinates = coordinates;
    Ok(())
}

/// Put a node back to its pre-image, or drop it when it did not exist before
pub(super) fn restore(
    board: &mut Board,
    old_node: Option<&Node>,
    node_id: &str,
    connected_nodes: &[Node],
    connected_layers: &[Layer],
) {
    restore_nodes(board, connected_nodes);
    restore_layers(board, connected_layers);
    match old_node {
        Some(node) => {
            board.nodes.insert(node.id.clone(), node.clone());
        }
        None => {
            board.nodes.remove(node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::BoardBuilder;
    use crate::error::BoardError;
    use crate::node::Node;
    use crate::pin::Pin;
    use crate::types::VariableType;
    use crate::{execute_batch, undo_batch, Board, Command};

    fn board() -> Board {
        BoardBuilder::new("b1")
            .node(
                Node::new("n1", "const")
                    .with_coordinates((10.0, 20.0, 0.0))
                    .with_pin(Pin::output("p1", "out", VariableType::Integer)),
            )
            .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Integer)))
            .connect("n1", "p1", "n2", "p2")
            .build()
    }

    #[test]
    fn test_add_node_conflict() {
        let mut board = board();
        let result = execute_batch(&mut board, vec![Command::add_node(Node::new("n1", "dup"))]);
        assert!(matches!(result, Err(BoardError::Conflict { .. })));
    }

    #[test]
    fn test_add_node_rejects_prewired_pins() {
        let mut board = board();
        let mut pin = Pin::input("p9", "in", VariableType::Integer);
        pin.connected_to.insert("p1".to_string());
        let node = Node::new("n9", "log").with_pin(pin);

        let result = execute_batch(&mut board, vec![Command::add_node(node)]);
        assert!(matches!(result, Err(BoardError::InvariantViolation(_))));
        assert!(!board.nodes.contains_key("n9"));
    }

    #[test]
    fn test_add_node_rejects_duplicate_pin_id() {
        let mut board = board();
        let node = Node::new("n9", "log").with_pin(Pin::input("p2", "in", VariableType::Integer));
        let result = execute_batch(&mut board, vec![Command::add_node(node)]);
        assert!(matches!(result, Err(BoardError::Conflict { .. })));
    }

    #[test]
    fn test_remove_node_records_peers() {
        let mut board = board();
        let applied = execute_batch(&mut board, vec![Command::remove_node("n1")]).unwrap();

        assert!(!board.nodes.contains_key("n1"));
        assert!(board.pin("p2").unwrap().connected_to.is_empty());

        match &applied[0].kind {
            crate::CommandKind::RemoveNode {
                old_node,
                connected_nodes,
                ..
            } => {
                assert_eq!(old_node.as_ref().map(|n| n.id.as_str()), Some("n1"));
                assert_eq!(connected_nodes.len(), 1);
                assert_eq!(connected_nodes[0].id, "n2");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_remove_missing_node() {
        let mut board = board();
        let result = execute_batch(&mut board, vec![Command::remove_node("ghost")]);
        assert!(matches!(result, Err(BoardError::NotFound { .. })));
    }

    #[test]
    fn test_update_node_keeps_connections_and_drops_removed_pins() {
        let mut board = board();
        let mut edited = board.nodes["n2"].clone();
        edited.friendly_name = "Logger".to_string();
        edited.pins.get_mut("p2").unwrap().connected_to.clear();

        execute_batch(&mut board, vec![Command::update_node(edited)]).unwrap();
        assert_eq!(board.nodes["n2"].friendly_name, "Logger");
        assert!(board.pin("p2").unwrap().connected_to.contains("p1"));

        let mut stripped = board.nodes["n2"].clone();
        stripped.pins.clear();
        execute_batch(&mut board, vec![Command::update_node(stripped)]).unwrap();
        assert!(board.pin("p1").unwrap().connected_to.is_empty());
    }

    #[test]
    fn test_update_node_rejects_incompatible_retype() {
        let mut board = board();
        let before = board.clone();
        let mut edited = board.nodes["n2"].clone();
        edited.pins.get_mut("p2").unwrap().data_type = VariableType::String;

        let result = execute_batch(&mut board, vec![Command::update_node(edited)]);
        assert!(matches!(result, Err(BoardError::TypeMismatch { .. })));
        assert_eq!(board, before);
    }

    #[test]
    fn test_move_by_offset_then_undo() {
        let mut board = board();
        let applied = execute_batch(&mut board, vec![Command::offset_node("n1", (5.0, 5.0, 0.0))]).unwrap();
        assert_eq!(board.nodes["n1"].coordinates, Some((15.0, 25.0, 0.0)));

        undo_batch(&mut board, &applied).unwrap();
        assert_eq!(board.nodes["n1"].coordinates, Some((10.0, 20.0, 0.0)));
    }
}
