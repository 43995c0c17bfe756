use crate::board::{Board, PinOwner};
use crate::error::{BoardError, EntityKind, Result};
use crate::journal::Journal;
use crate::pin::{check_compatibility, Pin};
use crate::types::PinType;

/// Check every logical connection of a pin against the compatibility rules
pub(super) fn check_peer_compatibility(board: &Board, pin_id: &str) -> Result<()> {
    let Some(pin) = board.pin(pin_id) else {
        return Ok(());
    };
    for peer_id in board.logical_peers(pin_id) {
        let Some(peer) = board.pin(&peer_id) else {
            continue;
        };
        let (from, to) = match pin.pin_type {
            PinType::Output => (pin, peer),
            PinType::Input => (peer, pin),
        };
        let from_type = board.effective_type(&from.id).unwrap_or(from.data_type);
        let to_type = board.effective_type(&to.id).unwrap_or(to.data_type);
        check_compatibility(from, from_type, to, to_type)
            .map_err(|reason| BoardError::mismatch(&from.id, &to.id, reason))?;
    }
    Ok(())
}

/// Insert or replace one pin on a node.
///
/// The pin claims its requested index; siblings at or after that slot shift
/// down. A pin without an index is appended.
pub(super) fn upsert(journal: &mut Journal<'_>, node_id: &str, pin: &Pin) -> Result<()> {
    let board = journal.board();
    let node = board.node(node_id)?;
    match board.pin_owner(&pin.id) {
        Some(PinOwner::Node(owner)) if owner == node_id => {}
        Some(_) => return Err(BoardError::conflict(EntityKind::Pin, &pin.id)),
        None => {}
    }

    let existing = node.pins.get(&pin.id).cloned();
    let mut pin = pin.clone();
    match &existing {
        Some(old) => {
            if old.pin_type != pin.pin_type && old.is_connected() {
                return Err(BoardError::mismatch(
                    &pin.id,
                    &pin.id,
                    "a connected pin cannot change direction",
                ));
            }
            pin.connected_to = old.connected_to.clone();
            pin.depends_on = old.depends_on.clone();
        }
        None => pin = pin.detached(),
    }
    if pin.index == 0 {
        pin.index = node.next_index(pin.pin_type);
    }

    let pin_id = pin.id.clone();
    let node = journal.node_mut(node_id)?;
    node.pins.insert(pin_id.clone(), pin);
    node.normalize_pin_indices(Some(&pin_id));

    if existing.is_some_and(|old| old.is_connected()) {
        check_peer_compatibility(journal.board(), &pin_id)?;
    }
    Ok(())
}
