use crate::board::Board;
use crate::comment::Comment;
use crate::error::{BoardError, EntityKind, Result};
use crate::journal::Journal;

use super::require_scope;

pub(super) fn remove(journal: &mut Journal<'_>, comment_id: &str) -> Result<()> {
    journal
        .remove_comment(comment_id)
        .map(|_| ())
        .ok_or_else(|| BoardError::not_found(EntityKind::Comment, comment_id))
}

/// Insert or replace a comment; a comment without a layer lands in `current_layer`
pub(super) fn upsert(
    journal: &mut Journal<'_>,
    comment: &Comment,
    current_layer: Option<&str>,
) -> Result<()> {
    let mut comment = comment.clone();
    if comment.layer.as_deref().map_or(true, str::is_empty) {
        comment.layer = current_layer.map(str::to_string);
    }
    require_scope(journal.board(), comment.layer.as_deref())?;
    journal.insert_comment(comment);
    Ok(())
}

pub(super) fn restore(board: &mut Board, comment_id: &str, old_comment: Option<&Comment>) {
    match old_comment {
        Some(comment) => {
            board.comments.insert(comment.id.clone(), comment.clone());
        }
        None => {
            board.comments.remove(comment_id);
        }
    }
}
