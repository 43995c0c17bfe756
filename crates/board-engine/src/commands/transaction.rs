//! All-or-nothing execution of command batches

use crate::board::Board;
use crate::error::{BoardError, Result};
use crate::validation::validate_board;

use super::Command;

/// Apply a batch of commands in order.
///
/// Returns the commands with their pre-images recorded. If any command fails,
/// the ones already applied are undone in reverse order and the board is left
/// as it was before the batch.
pub fn execute_batch(board: &mut Board, commands: Vec<Command>) -> Result<Vec<Command>> {
    let mut applied: Vec<Command> = Vec::with_capacity(commands.len());
    for mut command in commands {
        if let Err(err) = command.apply(board) {
            log::warn!(
                "{} failed on board '{}' after {} applied commands, rolling back: {}",
                command.name(),
                board.id,
                applied.len(),
                err
            );
            roll_back(board, &applied);
            return Err(err);
        }
        applied.push(command);
    }
    Ok(applied)
}

fn roll_back(board: &mut Board, applied: &[Command]) {
    for command in applied.iter().rev() {
        if let Err(err) = command.undo(board) {
            log::error!("Rollback of {} failed: {}", command.name(), err);
        }
    }
}

/// Reject a replay that leaves findings the board did not already have.
///
/// Recorded pre-images describe the board at the time the batch was applied.
/// Replayed out of order they can restore stale pins that no longer match
/// their peers.
fn check_replay(before: &Board, after: &Board, action: &str) -> Result<()> {
    let known = validate_board(before);
    let introduced: Vec<String> = validate_board(after)
        .into_iter()
        .filter(|finding| !known.contains(finding))
        .map(|finding| finding.to_string())
        .collect();
    if introduced.is_empty() {
        return Ok(());
    }
    log::warn!(
        "Refusing {} on board '{}': {}",
        action,
        before.id,
        introduced.join("; ")
    );
    Err(BoardError::invariant(format!(
        "{} would leave the board inconsistent: {}",
        action,
        introduced.join("; ")
    )))
}

/// Revert a previously applied batch, last command first.
///
/// Runs against a scratch copy; the board only changes if every undo succeeds
/// and the result is as consistent as the board was before.
pub fn undo_batch(board: &mut Board, commands: &[Command]) -> Result<()> {
    let mut scratch = board.clone();
    for command in commands.iter().rev() {
        command.undo(&mut scratch)?;
    }
    check_replay(board, &scratch, "undo")?;
    *board = scratch;
    Ok(())
}

/// Re-apply a previously undone batch from its records.
///
/// Commands that generated entities the first time replay those exact
/// entities, so the board ends up identical to the original apply.
pub fn redo_batch(board: &mut Board, commands: Vec<Command>) -> Result<Vec<Command>> {
    let mut scratch = board.clone();
    let mut applied = Vec::with_capacity(commands.len());
    for mut command in commands {
        command.apply(&mut scratch)?;
        applied.push(command);
    }
    check_replay(board, &scratch, "redo")?;
    *board = scratch;
    Ok(applied)
}
