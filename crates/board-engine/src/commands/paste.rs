use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::board::Board;
use crate::comment::Comment;
use crate::connections::link;
use crate::error::{BoardError, EntityKind, Result};
use crate::journal::Journal;
use crate::layer::Layer;
use crate::node::Node;
use crate::pin::Pin;
use crate::types::{Coordinates, PinType};

use super::{require_scope, CommandKind};

fn shifted(base: Coordinates, by: Coordinates) -> Coordinates {
    (base.0 + by.0, base.1 + by.1, base.2 + by.2)
}

fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Insert clipboard contents, or the recorded clones when replaying
pub(super) fn paste(journal: &mut Journal<'_>, kind: &mut CommandKind) -> Result<()> {
    let CommandKind::CopyPaste {
        original_nodes,
        original_comments,
        original_layers,
        current_layer,
        offset,
        old_mouse,
        new_nodes,
        new_comments,
        new_layers,
    } = kind
    else {
        return Err(BoardError::invariant("paste called for another command kind"));
    };

    if !new_nodes.is_empty() || !new_comments.is_empty() || !new_layers.is_empty() {
        return reinsert(journal, new_nodes, new_comments, new_layers);
    }

    let board = journal.board();
    require_scope(board, current_layer.as_deref())?;
    let shift = match old_mouse {
        Some(mouse) => (offset.0 - mouse.0, offset.1 - mouse.1, offset.2 - mouse.2),
        None => *offset,
    };

    // Layers keep their id; ones already on the board are not pasted again
    let pasted_layer_ids: BTreeSet<String> = original_layers
        .iter()
        .filter(|l| !board.layers.contains_key(&l.id))
        .map(|l| l.id.clone())
        .collect();
    let placement = |scope: &Option<String>| -> Option<String> {
        match scope {
            Some(id) if pasted_layer_ids.contains(id) => Some(id.clone()),
            _ => current_layer.clone(),
        }
    };

    let layers: Vec<Layer> = original_layers
        .iter()
        .filter(|l| pasted_layer_ids.contains(&l.id))
        .map(|l| {
            let mut layer = l.metadata();
            layer.coordinates = shifted(layer.coordinates, shift);
            layer.parent_id = placement(&l.parent_id);
            layer
        })
        .collect();

    let mut translated: HashMap<String, String> = HashMap::new();
    let mut nodes = Vec::with_capacity(original_nodes.len());
    for original in original_nodes.iter() {
        let mut node = original.clone();
        node.id = fresh_id();
        translated.insert(original.id.clone(), node.id.clone());
        node.coordinates = Some(shifted(original.coordinates.unwrap_or((0.0, 0.0, 0.0)), shift));
        node.layer = placement(&original.layer);

        let mut pins = BTreeMap::new();
        for source in original.pins.values() {
            let mut pin = source.clone().detached();
            pin.id = fresh_id();
            translated.insert(source.id.clone(), pin.id.clone());
            if node.start && pin.pin_type == PinType::Input && pin.name != "type" {
                pin.default_value = None;
            }
            pins.insert(pin.id.clone(), pin);
        }
        node.pins = pins;
        nodes.push(node);
    }

    let comments: Vec<Comment> = original_comments
        .iter()
        .map(|original| {
            let mut comment = original.clone();
            comment.id = fresh_id();
            comment.coordinates = shifted(original.coordinates, shift);
            comment.layer = placement(&original.layer);
            comment
        })
        .collect();

    // Links between copied pins survive; links leaving the selection do not
    let mut links = Vec::new();
    for original in original_nodes.iter() {
        for pin in original.pins.values().filter(|p| p.pin_type == PinType::Output) {
            let peers = if board.pin(&pin.id).is_some() {
                board.logical_peers(&pin.id)
            } else {
                pin.connected_to.clone()
            };
            for peer in peers {
                if let (Some(from), Some(to)) = (translated.get(&pin.id), translated.get(&peer)) {
                    links.push((from.clone(), to.clone()));
                }
            }
        }
    }

    for layer in &layers {
        journal.insert_layer(layer.clone());
    }
    for node in &nodes {
        journal.insert_node(node.clone());
    }
    for comment in &comments {
        journal.insert_comment(comment.clone());
    }
    for (from, to) in &links {
        link(journal, from, to)?;
    }

    log::debug!(
        "Pasted {} nodes, {} comments and {} layers",
        nodes.len(),
        comments.len(),
        layers.len()
    );
    *new_nodes = nodes;
    *new_comments = comments;
    *new_layers = layers;
    Ok(())
}

fn reinsert(
    journal: &mut Journal<'_>,
    nodes: &[Node],
    comments: &[Comment],
    layers: &[Layer],
) -> Result<()> {
    let board = journal.board();
    if let Some(node) = nodes.iter().find(|n| board.nodes.contains_key(&n.id)) {
        return Err(BoardError::conflict(EntityKind::Node, &node.id));
    }
    let index = board.pin_index();
    let recorded: HashMap<&str, &Pin> = nodes
        .iter()
        .flat_map(|n| n.pins.iter())
        .chain(layers.iter().flat_map(|l| l.pins.iter()))
        .map(|(id, pin)| (id.as_str(), pin))
        .collect();
    if let Some(pin) = recorded.keys().find(|id| index.contains(id)) {
        return Err(BoardError::conflict(EntityKind::Pin, pin.to_string()));
    }
    check_recorded_links(&recorded, layers)?;
    if let Some(comment) = comments.iter().find(|c| board.comments.contains_key(&c.id)) {
        return Err(BoardError::conflict(EntityKind::Comment, &comment.id));
    }
    if let Some(layer) = layers.iter().find(|l| board.layers.contains_key(&l.id)) {
        return Err(BoardError::conflict(EntityKind::Layer, &layer.id));
    }

    for layer in layers {
        journal.insert_layer(layer.clone());
    }
    for node in nodes {
        journal.insert_node(node.clone());
    }
    for comment in comments {
        journal.insert_comment(comment.clone());
    }
    Ok(())
}

/// Recorded clones may only link among themselves, and every link must be mutual
fn check_recorded_links(recorded: &HashMap<&str, &Pin>, layers: &[Layer]) -> Result<()> {
    for (id, pin) in recorded {
        for peer in &pin.connected_to {
            let mutual = recorded
                .get(peer.as_str())
                .is_some_and(|p| p.connected_to.contains(*id));
            if !mutual {
                return Err(BoardError::invariant(format!(
                    "recorded pin '{}' links to '{}' outside the pasted entities",
                    id, peer
                )));
            }
        }
        if let Some(dependency) = pin.depends_on.iter().find(|d| !pin.connected_to.contains(*d)) {
            return Err(BoardError::invariant(format!(
                "recorded pin '{}' depends on '{}' without a link",
                id, dependency
            )));
        }
    }
    for layer in layers {
        if let Some((relay, target)) = layer
            .pin_lookup
            .iter()
            .find(|(_, target)| !recorded.contains_key(target.as_str()))
        {
            return Err(BoardError::invariant(format!(
                "recorded boundary pin '{}' relays unknown pin '{}'",
                relay, target
            )));
        }
    }
    Ok(())
}

/// Capture the pasted entities as they ended up on the board
pub(super) fn record_outputs(
    board: &Board,
    nodes: &mut [Node],
    comments: &mut [Comment],
    layers: &mut [Layer],
) {
    for node in nodes.iter_mut() {
        if let Some(live) = board.nodes.get(&node.id) {
            *node = live.clone();
        }
    }
    for comment in comments.iter_mut() {
        if let Some(live) = board.comments.get(&comment.id) {
            *comment = live.clone();
        }
    }
    for layer in layers.iter_mut() {
        if let Some(live) = board.layers.get(&layer.id) {
            *layer = live.clone();
        }
    }
}

pub(super) fn unpaste(board: &mut Board, nodes: &[Node], comments: &[Comment], layers: &[Layer]) {
    for node in nodes {
        board.nodes.remove(&node.id);
    }
    for comment in comments {
        board.comments.remove(&comment.id);
    }
    for layer in layers {
        board.layers.remove(&layer.id);
    }
}
