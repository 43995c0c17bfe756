//! Structural validation for boards
//!
//! The command engine keeps these properties by construction. The validator
//! re-derives them from scratch, so hosts can check boards loaded from
//! storage and tests can check boards after arbitrary edit sequences.

use std::collections::{HashMap, HashSet};

use crate::board::Board;
use crate::pin::{check_compatibility, indices_are_dense, Pin};
use crate::types::PinType;

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A pin references a peer that does not exist
    DanglingConnection { pin_id: String, peer_id: String },
    /// A pin lists a peer that does not list it back
    AsymmetricConnection { pin_id: String, peer_id: String },
    /// A dependency that is not also a connection
    DependencyWithoutConnection { pin_id: String, dependency: String },
    /// The same pin id appears under more than one owner
    DuplicatePinId { pin_id: String },
    /// A pin stored under a key other than its own id
    PinIdMismatch { owner_id: String, key: String, pin_id: String },
    /// Pin indices of one direction are not 1..n
    NonDenseIndices { owner_id: String, pin_type: PinType },
    /// An entity is placed in a layer that does not exist
    MissingLayer { entity_id: String, layer_id: String },
    /// A layer is nested inside itself
    LayerCycle { layer_id: String },
    /// A boundary pin without a valid relay target
    BrokenPinLookup { layer_id: String, pin_id: String },
    /// Two logically connected pins do not match
    IncompatibleConnection {
        from_pin: String,
        to_pin: String,
        reason: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingConnection { pin_id, peer_id } => {
                write!(f, "Pin '{}' references missing pin '{}'", pin_id, peer_id)
            }
            Self::AsymmetricConnection { pin_id, peer_id } => {
                write!(
                    f,
                    "Pin '{}' lists '{}' but '{}' does not list it back",
                    pin_id, peer_id, peer_id
                )
            }
            Self::DependencyWithoutConnection { pin_id, dependency } => {
                write!(
                    f,
                    "Pin '{}' depends on '{}' without being connected to it",
                    pin_id, dependency
                )
            }
            Self::DuplicatePinId { pin_id } => {
                write!(f, "Pin id '{}' is used by more than one owner", pin_id)
            }
            Self::PinIdMismatch {
                owner_id,
                key,
                pin_id,
            } => {
                write!(
                    f,
                    "'{}' stores pin '{}' under key '{}'",
                    owner_id, pin_id, key
                )
            }
            Self::NonDenseIndices { owner_id, pin_type } => {
                write!(f, "{:?} pin indices of '{}' are not dense", pin_type, owner_id)
            }
            Self::MissingLayer {
                entity_id,
                layer_id,
            } => {
                write!(f, "'{}' is placed in missing layer '{}'", entity_id, layer_id)
            }
            Self::LayerCycle { layer_id } => {
                write!(f, "Layer '{}' is nested inside itself", layer_id)
            }
            Self::BrokenPinLookup { layer_id, pin_id } => {
                write!(
                    f,
                    "Boundary pin '{}' of layer '{}' has no valid relay target",
                    pin_id, layer_id
                )
            }
            Self::IncompatibleConnection {
                from_pin,
                to_pin,
                reason,
            } => {
                write!(
                    f,
                    "Connection '{}' -> '{}' is invalid: {}",
                    from_pin, to_pin, reason
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a board
///
/// Returns all validation errors found (not just the first).
pub fn validate_board(board: &Board) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_pin_ownership(board, &mut errors);
    validate_connections(board, &mut errors);
    validate_indices(board, &mut errors);
    validate_layer_tree(board, &mut errors);
    validate_pin_lookups(board, &mut errors);
    validate_compatibility(board, &mut errors);

    errors
}

/// Every pin of every owner, paired with the owner id
fn all_pins(board: &Board) -> impl Iterator<Item = (&str, &str, &Pin)> {
    let node_pins = board
        .nodes
        .values()
        .flat_map(|n| n.pins.iter().map(move |(key, pin)| (n.id.as_str(), key.as_str(), pin)));
    let layer_pins = board
        .layers
        .values()
        .flat_map(|l| l.pins.iter().map(move |(key, pin)| (l.id.as_str(), key.as_str(), pin)));
    node_pins.chain(layer_pins)
}

fn validate_pin_ownership(board: &Board, errors: &mut Vec<ValidationError>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (owner_id, key, pin) in all_pins(board) {
        if key != pin.id {
            errors.push(ValidationError::PinIdMismatch {
                owner_id: owner_id.to_string(),
                key: key.to_string(),
                pin_id: pin.id.clone(),
            });
        }
        *seen.entry(key).or_default() += 1;
    }

    let mut duplicates: Vec<&str> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id)
        .collect();
    duplicates.sort_unstable();
    for pin_id in duplicates {
        errors.push(ValidationError::DuplicatePinId {
            pin_id: pin_id.to_string(),
        });
    }
}

fn validate_connections(board: &Board, errors: &mut Vec<ValidationError>) {
    let index = board.pin_index();
    for (_, pin_id, pin) in all_pins(board) {
        for peer_id in &pin.connected_to {
            match index.pin(board, peer_id) {
                None => errors.push(ValidationError::DanglingConnection {
                    pin_id: pin_id.to_string(),
                    peer_id: peer_id.clone(),
                }),
                Some(peer) if !peer.connected_to.contains(pin_id) => {
                    errors.push(ValidationError::AsymmetricConnection {
                        pin_id: pin_id.to_string(),
                        peer_id: peer_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for dependency in &pin.depends_on {
            if !pin.connected_to.contains(dependency) {
                errors.push(ValidationError::DependencyWithoutConnection {
                    pin_id: pin_id.to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
}

fn validate_indices(board: &Board, errors: &mut Vec<ValidationError>) {
    let owners = board
        .nodes
        .values()
        .map(|n| (&n.id, &n.pins))
        .chain(board.layers.values().map(|l| (&l.id, &l.pins)));
    for (owner_id, pins) in owners {
        if indices_are_dense(pins) {
            continue;
        }
        for pin_type in [PinType::Input, PinType::Output] {
            let mut indices: Vec<u16> = pins
                .values()
                .filter(|p| p.pin_type == pin_type)
                .map(|p| p.index)
                .collect();
            indices.sort_unstable();
            let dense = indices.iter().enumerate().all(|(i, index)| usize::from(*index) == i + 1);
            if !dense {
                errors.push(ValidationError::NonDenseIndices {
                    owner_id: owner_id.clone(),
                    pin_type,
                });
            }
        }
    }
}

fn validate_layer_tree(board: &Board, errors: &mut Vec<ValidationError>) {
    let mut missing = |entity_id: &str, layer: &Option<String>| {
        if let Some(layer_id) = layer {
            if !board.layers.contains_key(layer_id) {
                errors.push(ValidationError::MissingLayer {
                    entity_id: entity_id.to_string(),
                    layer_id: layer_id.clone(),
                });
            }
        }
    };
    for node in board.nodes.values() {
        missing(&node.id, &node.layer);
    }
    for comment in board.comments.values() {
        missing(&comment.id, &comment.layer);
    }
    for layer in board.layers.values() {
        missing(&layer.id, &layer.parent_id);
    }

    for layer_id in board.layers.keys() {
        let mut seen = HashSet::new();
        let mut current = board.layers.get(layer_id).and_then(|l| l.parent_id.as_ref());
        while let Some(parent) = current {
            if parent == layer_id {
                errors.push(ValidationError::LayerCycle {
                    layer_id: layer_id.clone(),
                });
                break;
            }
            if !seen.insert(parent) {
                break;
            }
            current = board.layers.get(parent).and_then(|l| l.parent_id.as_ref());
        }
    }
}

fn validate_pin_lookups(board: &Board, errors: &mut Vec<ValidationError>) {
    let index = board.pin_index();
    for layer in board.layers.values() {
        let keys = layer.pins.keys().chain(layer.pin_lookup.keys());
        let mut checked = HashSet::new();
        for pin_id in keys {
            if !checked.insert(pin_id) {
                continue;
            }
            let valid = match (layer.pins.get(pin_id), layer.pin_lookup.get(pin_id)) {
                (Some(relay), Some(target)) => {
                    relay.connected_to.contains(target) && index.is_inside(board, target, &layer.id)
                }
                _ => false,
            };
            if !valid {
                errors.push(ValidationError::BrokenPinLookup {
                    layer_id: layer.id.clone(),
                    pin_id: pin_id.clone(),
                });
            }
        }
    }
}

/// Direct node-to-node links run Output to Input, and every logical
/// connection, relayed or not, must pass the pin matcher.
fn validate_compatibility(board: &Board, errors: &mut Vec<ValidationError>) {
    let index = board.pin_index();
    for node in board.nodes.values() {
        for pin in node.pins.values() {
            for peer_id in &pin.connected_to {
                if index.is_relay(peer_id) {
                    continue;
                }
                let Some(peer) = index.pin(board, peer_id) else {
                    continue;
                };
                if pin.pin_type == peer.pin_type {
                    errors.push(ValidationError::IncompatibleConnection {
                        from_pin: pin.id.clone(),
                        to_pin: peer.id.clone(),
                        reason: format!("both pins are {:?} pins", pin.pin_type),
                    });
                }
            }

            if pin.pin_type != PinType::Output {
                continue;
            }
            let from_type = index.effective_type(board, &pin.id).unwrap_or(pin.data_type);
            for peer_id in index.logical_peers(board, &pin.id) {
                let Some(peer) = index.pin(board, &peer_id) else {
                    continue;
                };
                if peer.pin_type != PinType::Input {
                    continue;
                }
                let to_type = index.effective_type(board, &peer_id).unwrap_or(peer.data_type);
                if let Err(reason) = check_compatibility(pin, from_type, peer, to_type) {
                    errors.push(ValidationError::IncompatibleConnection {
                        from_pin: pin.id.clone(),
                        to_pin: peer_id.clone(),
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BoardBuilder;
    use crate::layer::Layer;
    use crate::node::Node;
    use crate::types::VariableType;

    fn linked() -> Board {
        BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
            .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Integer)))
            .connect("n1", "p1", "n2", "p2")
            .build()
    }

    #[test]
    fn test_valid_board_has_no_findings() {
        assert!(validate_board(&linked()).is_empty());
    }

    #[test]
    fn test_detects_asymmetric_and_dangling_links() {
        let mut board = linked();
        let p2 = board.nodes.get_mut("n2").unwrap().pins.get_mut("p2").unwrap();
        p2.connected_to.clear();
        p2.connected_to.insert("ghost".to_string());

        let errors = validate_board(&board);
        assert!(errors.contains(&ValidationError::AsymmetricConnection {
            pin_id: "p1".to_string(),
            peer_id: "p2".to_string(),
        }));
        assert!(errors.contains(&ValidationError::DanglingConnection {
            pin_id: "p2".to_string(),
            peer_id: "ghost".to_string(),
        }));
        assert!(errors.contains(&ValidationError::DependencyWithoutConnection {
            pin_id: "p2".to_string(),
            dependency: "p1".to_string(),
        }));
    }

    #[test]
    fn test_detects_incompatible_link() {
        let mut board = linked();
        board
            .nodes
            .get_mut("n2")
            .unwrap()
            .pins
            .get_mut("p2")
            .unwrap()
            .data_type = VariableType::String;

        let errors = validate_board(&board);
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::IncompatibleConnection { .. }]
        ));
    }

    #[test]
    fn test_detects_layer_problems() {
        let mut board = linked();
        board.layers.insert("a".to_string(), Layer::new("a", "A").with_parent("b"));
        board.layers.insert("b".to_string(), Layer::new("b", "B").with_parent("a"));
        board.nodes.get_mut("n1").unwrap().layer = Some("missing".to_string());

        let errors = validate_board(&board);
        assert!(errors.contains(&ValidationError::LayerCycle {
            layer_id: "a".to_string()
        }));
        assert!(errors.contains(&ValidationError::MissingLayer {
            entity_id: "n1".to_string(),
            layer_id: "missing".to_string(),
        }));
    }

    #[test]
    fn test_detects_index_gaps() {
        let mut board = linked();
        board.nodes.get_mut("n1").unwrap().pins.get_mut("p1").unwrap().index = 3;

        let errors = validate_board(&board);
        assert_eq!(
            errors,
            vec![ValidationError::NonDenseIndices {
                owner_id: "n1".to_string(),
                pin_type: PinType::Output,
            }]
        );
    }
}
