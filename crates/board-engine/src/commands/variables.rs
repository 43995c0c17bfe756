use crate::board::Board;
use crate::error::{BoardError, EntityKind, Result};
use crate::journal::Journal;
use crate::variable::Variable;

pub(super) fn upsert(journal: &mut Journal<'_>, variable: &Variable) -> Result<()> {
    journal.insert_variable(variable.clone());
    Ok(())
}

pub(super) fn remove(journal: &mut Journal<'_>, variable_id: &str) -> Result<()> {
    journal
        .remove_variable(variable_id)
        .map(|_| ())
        .ok_or_else(|| BoardError::not_found(EntityKind::Variable, variable_id))
}

pub(super) fn restore(board: &mut Board, variable_id: &str, old_variable: Option<&Variable>) {
    match old_variable {
        Some(variable) => {
            board.variables.insert(variable.id.clone(), variable.clone());
        }
        None => {
            board.variables.remove(variable_id);
        }
    }
}
