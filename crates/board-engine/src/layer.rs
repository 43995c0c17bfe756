//! Layers - collapsible groupings of nodes with synthesized boundary pins
//!
//! A layer never stores its member nodes; a node belongs to a layer through
//! its `layer` field, and layers nest through `parent_id`. What a layer does
//! store is its boundary: for every contained pin that talks to something
//! outside the layer there is one boundary pin, a *relay*, linked to the
//! contained pin on one side and to every outside peer on the other.
//! `pin_lookup` maps each relay back to the pin it stands for, which for
//! nested layers may itself be a relay of a child layer.
//!
//! Relays are derived state. [`reconcile_layers`] brings them in line with the
//! current node placement after any structural change:
//!
//! 1. relays whose target left the layer, vanished, or lost every outside
//!    peer are dissolved, restoring the direct links they replaced
//! 2. every contained pin's outside links are folded through a relay
//! 3. relays copy name and type information from their targets
//!
//! Layers are processed innermost first so a nested relay always exists
//! before its parent layer relays it further out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::{Board, PinIndex, PinOwner};
use crate::connections::{link_flow, unlink};
use crate::error::{BoardError, EntityKind, Result};
use crate::journal::Journal;
use crate::pin::{normalize_indices, Pin};
use crate::types::{Coordinates, PinType};

/// How a layer presents itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerType {
    #[default]
    Collapsed,
    Function,
    Macro,
}

/// A named, collapsible sub-graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub layer_type: LayerType,
    /// Enclosing layer, `None` for the board root
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Boundary pins
    #[serde(default)]
    pub pins: BTreeMap<String, Pin>,
    /// Boundary pin id to the contained pin it relays
    #[serde(default)]
    pub pin_lookup: BTreeMap<String, String>,
}

impl Layer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            comment: None,
            layer_type: LayerType::default(),
            parent_id: None,
            coordinates: (0.0, 0.0, 0.0),
            color: None,
            error: None,
            pins: BTreeMap::new(),
            pin_lookup: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_type(mut self, layer_type: LayerType) -> Self {
        self.layer_type = layer_type;
        self
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = coordinates;
        self
    }

    /// The boundary pin relaying `target`, if there is one
    pub fn relay_for(&self, target: &str) -> Option<&str> {
        self.pin_lookup
            .iter()
            .find(|(_, t)| t.as_str() == target)
            .map(|(relay, _)| relay.as_str())
    }

    /// Copy of the user-editable fields, without boundary state
    pub(crate) fn metadata(&self) -> Self {
        Self {
            pins: BTreeMap::new(),
            pin_lookup: BTreeMap::new(),
            ..self.clone()
        }
    }

    fn next_index(&self, pin_type: PinType) -> u16 {
        self.pins
            .values()
            .filter(|p| p.pin_type == pin_type)
            .map(|p| p.index)
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Layer ids ordered innermost first, ties broken by id
pub(crate) fn innermost_first(board: &Board) -> Vec<String> {
    let mut ordered: Vec<(usize, String)> = board
        .layers
        .keys()
        .map(|id| (board.layer_chain(Some(id)).len(), id.clone()))
        .collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    ordered.into_iter().map(|(_, id)| id).collect()
}

/// Bring every layer boundary in line with current node placement
pub(crate) fn reconcile_layers(journal: &mut Journal<'_>) -> Result<()> {
    let order = innermost_first(journal.board());
    for layer_id in &order {
        dissolve_stale_relays(journal, layer_id)?;
    }
    for layer_id in &order {
        fold_outside_links(journal, layer_id)?;
    }
    for layer_id in &order {
        refresh_relays(journal, layer_id)?;
    }
    Ok(())
}

fn dissolve_stale_relays(journal: &mut Journal<'_>, layer_id: &str) -> Result<()> {
    let board = journal.board();
    let Some(layer) = board.layers.get(layer_id) else {
        return Ok(());
    };

    let index = board.pin_index();
    let stale: Vec<String> = layer
        .pins
        .values()
        .filter(|relay| {
            let Some(target) = layer.pin_lookup.get(&relay.id) else {
                return true;
            };
            let target_inside =
                index.contains(target) && index.is_inside(board, target, layer_id);
            let has_outside_peer = relay.connected_to.iter().any(|peer| peer != target);
            !target_inside || !has_outside_peer
        })
        .map(|relay| relay.id.clone())
        .collect();

    for relay in stale {
        log::warn!("Dissolving boundary pin '{}' of layer '{}'", relay, layer_id);
        dissolve_relay(journal, layer_id, &relay)?;
    }
    Ok(())
}

/// Replace a relay by direct links between its target and its outside peers
pub(crate) fn dissolve_relay(journal: &mut Journal<'_>, layer_id: &str, relay: &str) -> Result<()> {
    let board = journal.board();
    let target = board
        .layers
        .get(layer_id)
        .and_then(|l| l.pin_lookup.get(relay))
        .filter(|t| board.pin(t).is_some())
        .cloned();
    let outside: Vec<String> = board
        .pin(relay)
        .map(|p| {
            p.connected_to
                .iter()
                .filter(|peer| Some(*peer) != target.as_ref())
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    let flow = target.as_deref().and_then(|t| board.flow_type(t));

    for peer in &outside {
        unlink(journal, relay, peer)?;
        if let (Some(target), Some(flow)) = (target.as_deref(), flow) {
            if target != peer.as_str() {
                link_flow(journal, target, peer, flow)?;
                retarget_lookup(journal, peer, relay, target)?;
            }
        }
    }
    if let Some(target) = target.as_deref() {
        unlink(journal, relay, target)?;
    }

    let layer = journal.layer_mut(layer_id)?;
    layer.pins.remove(relay);
    layer.pin_lookup.remove(relay);
    Ok(())
}

/// If `relay` is a boundary pin standing for `old_target`, point it at `new_target`
fn retarget_lookup(
    journal: &mut Journal<'_>,
    relay: &str,
    old_target: &str,
    new_target: &str,
) -> Result<()> {
    let owner = journal
        .board()
        .layers
        .values()
        .find(|l| l.pin_lookup.get(relay).map(String::as_str) == Some(old_target))
        .map(|l| l.id.clone());
    if let Some(layer_id) = owner {
        journal
            .layer_mut(&layer_id)?
            .pin_lookup
            .insert(relay.to_string(), new_target.to_string());
    }
    Ok(())
}

/// Pins that live inside a layer: its nodes' pins and its child layers' boundary pins
fn contained_pins(board: &Board, layer_id: &str) -> Vec<String> {
    let mut pins = Vec::new();
    for node in board.nodes.values() {
        let inside = board
            .layer_chain(node.layer.as_deref())
            .iter()
            .any(|id| id == layer_id);
        if inside {
            pins.extend(node.pins.keys().cloned());
        }
    }
    for layer in board.layers.values() {
        if layer.id != layer_id && board.layer_within(&layer.id, layer_id) {
            pins.extend(layer.pins.keys().cloned());
        }
    }
    pins.sort();
    pins
}

fn fold_outside_links(journal: &mut Journal<'_>, layer_id: &str) -> Result<()> {
    if !journal.board().layers.contains_key(layer_id) {
        return Ok(());
    }

    let mut index = journal.board().pin_index();
    for pin_id in contained_pins(journal.board(), layer_id) {
        let board = journal.board();
        let Some(pin) = index.pin(board, &pin_id) else {
            continue;
        };
        let Some(layer) = board.layers.get(layer_id) else {
            return Ok(());
        };
        let outside: Vec<String> = pin
            .connected_to
            .iter()
            .filter(|peer| {
                !layer.pins.contains_key(*peer) && !index.is_inside(board, peer, layer_id)
            })
            .cloned()
            .collect();
        if outside.is_empty() {
            continue;
        }
        let Some(flow) = index.flow_type(board, &pin_id) else {
            continue;
        };

        let relay = match layer.relay_for(&pin_id) {
            Some(existing) => existing.to_string(),
            None => {
                let created = create_relay(journal, &index, layer_id, &pin_id, flow)?;
                index.insert(created.clone(), PinOwner::Layer(layer_id.to_string()));
                created
            }
        };
        link_flow(journal, &pin_id, &relay, flow)?;
        for peer in outside {
            unlink(journal, &pin_id, &peer)?;
            link_flow(journal, &relay, &peer, flow)?;
            retarget_lookup(journal, &peer, &pin_id, &relay)?;
        }
    }
    Ok(())
}

/// Boundary pin ids derive from layer and target so replays are reproducible
fn relay_id(index: &PinIndex, layer_id: &str, target: &str) -> String {
    let base = format!("{}/{}", layer_id, target);
    let mut candidate = base.clone();
    let mut suffix = 1;
    while index.contains(&candidate) {
        suffix += 1;
        candidate = format!("{}#{}", base, suffix);
    }
    candidate
}

fn create_relay(
    journal: &mut Journal<'_>,
    index: &PinIndex,
    layer_id: &str,
    target: &str,
    flow: PinType,
) -> Result<String> {
    let board = journal.board();
    let id = relay_id(index, layer_id, target);
    let mut relay = match index.pin(board, target) {
        Some(pin) => Pin::new(id.clone(), pin.name.clone(), flow, pin.data_type),
        None => return Err(BoardError::not_found(EntityKind::Pin, target)),
    };

    let layer = journal.layer_mut(layer_id)?;
    relay.index = layer.next_index(flow);
    layer.pins.insert(id.clone(), relay);
    layer.pin_lookup.insert(id.clone(), target.to_string());
    log::debug!("Layer '{}' relays pin '{}' as '{}'", layer_id, target, id);
    Ok(id)
}

fn refresh_relays(journal: &mut Journal<'_>, layer_id: &str) -> Result<()> {
    let board = journal.board();
    let Some(layer) = board.layers.get(layer_id) else {
        return Ok(());
    };

    let index = board.pin_index();
    let mut refreshed = layer.pins.clone();
    for (relay_id, relay) in refreshed.iter_mut() {
        let Some(target) = layer
            .pin_lookup
            .get(relay_id)
            .and_then(|t| index.pin(board, t))
        else {
            continue;
        };
        relay.name = target.name.clone();
        relay.friendly_name = target.friendly_name.clone();
        relay.description = target.description.clone();
        relay.data_type = target.data_type;
        relay.value_type = target.value_type;
        relay.schema = target.schema.clone();
        relay.options = target.options.clone();
        if let Some(flow) = index.flow_type(board, relay_id) {
            relay.pin_type = flow;
        }
    }
    normalize_indices(&mut refreshed, None);

    if refreshed != layer.pins {
        journal.layer_mut(layer_id)?.pins = refreshed;
    }
    Ok(())
}
