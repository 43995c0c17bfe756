//! Symmetric connection maintenance
//!
//! This is the only module that writes `connected_to` and `depends_on`.
//! [`link`] and [`unlink`] always touch both endpoints, so the peer relation
//! stays its own inverse no matter which command drives it.

use crate::error::{BoardError, Result};
use crate::journal::Journal;
use crate::pin::check_compatibility;
use crate::types::{PinType, VariableType};

/// Connect `upstream` to `downstream`, recording the dependency on the downstream side
pub(crate) fn link(journal: &mut Journal<'_>, upstream: &str, downstream: &str) -> Result<()> {
    if upstream == downstream {
        return Err(BoardError::invariant(format!(
            "pin '{}' cannot connect to itself",
            upstream
        )));
    }
    journal
        .pin_mut(upstream)?
        .connected_to
        .insert(downstream.to_string());
    let pin = journal.pin_mut(downstream)?;
    pin.connected_to.insert(upstream.to_string());
    pin.depends_on.insert(upstream.to_string());
    Ok(())
}

/// Remove the link between two pins in both directions. Missing pins are skipped.
pub(crate) fn unlink(journal: &mut Journal<'_>, a: &str, b: &str) -> Result<()> {
    for (this, other) in [(a, b), (b, a)] {
        let linked = journal
            .board()
            .pin(this)
            .map(|p| p.connected_to.contains(other) || p.depends_on.contains(other))
            .unwrap_or(false);
        if linked {
            let pin = journal.pin_mut(this)?;
            pin.connected_to.remove(other);
            pin.depends_on.remove(other);
        }
    }
    Ok(())
}

/// Link an inner pin to an outer one along the inner pin's flow direction
pub(crate) fn link_flow(
    journal: &mut Journal<'_>,
    inner: &str,
    outer: &str,
    flow: PinType,
) -> Result<()> {
    match flow {
        PinType::Output => link(journal, inner, outer),
        PinType::Input => link(journal, outer, inner),
    }
}

/// Drop every link a pin has
pub(crate) fn sever(journal: &mut Journal<'_>, pin_id: &str) -> Result<()> {
    let peers: Vec<String> = journal
        .board()
        .pin(pin_id)
        .map(|p| p.connected_to.iter().cloned().collect())
        .unwrap_or_default();
    for peer in peers {
        unlink(journal, pin_id, &peer)?;
    }
    Ok(())
}

/// Connect an output pin to an input pin, checking every connection rule.
///
/// Either endpoint may be a layer boundary pin; it stands for the node pin it
/// relays. A data input keeps a single source and an execution output keeps a
/// single target, so an existing link on that side is replaced.
pub(crate) fn connect(
    journal: &mut Journal<'_>,
    from_owner: &str,
    from_pin: &str,
    to_owner: &str,
    to_pin: &str,
) -> Result<()> {
    let board = journal.board();
    board.owned_pin(from_owner, from_pin)?;
    board.owned_pin(to_owner, to_pin)?;

    let from = board.resolve_relay(from_pin);
    let to = board.resolve_relay(to_pin);
    let from_node = board.pin_owner(&from);
    let to_node = board.pin_owner(&to);
    if from_node.is_some() && from_node == to_node {
        return Err(BoardError::invariant(format!(
            "pins '{}' and '{}' belong to the same node",
            from, to
        )));
    }

    let (source, target) = match (board.pin(&from), board.pin(&to)) {
        (Some(source), Some(target)) => (source, target),
        _ => return Err(BoardError::invariant("boundary pin relays a missing pin")),
    };
    if source.pin_type != PinType::Output || target.pin_type != PinType::Input {
        return Err(BoardError::mismatch(
            from_pin,
            to_pin,
            "connections run from an output pin to an input pin",
        ));
    }
    if board.logical_peers(&from).contains(&to) {
        return Ok(());
    }

    let replaced_sources: Vec<String> = if target.data_type != VariableType::Execution {
        board.logical_peers(&to).into_iter().collect()
    } else {
        Vec::new()
    };
    let replaced_targets: Vec<String> = if source.data_type == VariableType::Execution {
        board.logical_peers(&from).into_iter().collect()
    } else {
        Vec::new()
    };

    for source in replaced_sources {
        disconnect_logical(journal, &source, &to)?;
    }
    for target in replaced_targets {
        disconnect_logical(journal, &from, &target)?;
    }

    let board = journal.board();
    let (source, target) = match (board.pin(&from), board.pin(&to)) {
        (Some(source), Some(target)) => (source, target),
        _ => return Err(BoardError::invariant("pin vanished while connecting")),
    };
    let from_type = board.effective_type(&from).unwrap_or(source.data_type);
    let to_type = board.effective_type(&to).unwrap_or(target.data_type);
    check_compatibility(source, from_type, target, to_type)
        .map_err(|reason| BoardError::mismatch(from_pin, to_pin, reason))?;

    link(journal, &from, &to)
}

/// Remove the logical connection between two pins. Missing edges are a no-op.
pub(crate) fn disconnect(
    journal: &mut Journal<'_>,
    from_owner: &str,
    from_pin: &str,
    to_owner: &str,
    to_pin: &str,
) -> Result<()> {
    let board = journal.board();
    board.owned_pin(from_owner, from_pin)?;
    board.owned_pin(to_owner, to_pin)?;

    let from = board.resolve_relay(from_pin);
    let to = board.resolve_relay(to_pin);
    disconnect_logical(journal, &from, &to)
}

/// Cut the one link of a relay chain that belongs only to the `a`-`b` connection.
///
/// Links between a boundary pin and the pin it relays are shared by every
/// connection passing through that boundary pin, so they are never cut here;
/// boundary pins left without outside peers are dissolved by layer
/// reconciliation afterwards.
pub(crate) fn disconnect_logical(journal: &mut Journal<'_>, a: &str, b: &str) -> Result<()> {
    let Some(path) = journal.board().relay_path(a, b) else {
        return Ok(());
    };

    let board = journal.board();
    let shared = |u: &str, v: &str| {
        board.relay_target(u) == Some(v) || board.relay_target(v) == Some(u)
    };
    let cut = path
        .windows(2)
        .find(|pair| !shared(pair[0].as_str(), pair[1].as_str()))
        .or_else(|| path.windows(2).next())
        .map(|pair| (pair[0].clone(), pair[1].clone()));

    if let Some((u, v)) = cut {
        unlink(journal, &u, &v)?;
    }
    Ok(())
}
