//! Board store interface and shared helpers.
//!
//! [`BoardStore`] is the contract every storage backend satisfies: ordered
//! reads of a board and atomic single-transaction writes keyed by
//! `(column_id, position)`. Two backends ship with the crate:
//! [`MemoryStore`] (reference implementation) and
//! [`Database`](crate::db::Database) (SQLite).

mod memory;

pub use memory::MemoryStore;

use crate::error::{BoardError, BoardResult};
use crate::position::{AllocError, Key, PositionAllocator};
use crate::types::{
    ActivityEntry, BoardSummary, BoardTree, Card, CardPatch, Column, NewBoard, NewCard,
};

/// Longest accepted card title / board or column name, in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// Storage contract for boards, columns and cards.
///
/// Every mutating method is atomic: it either applies completely or leaves
/// the store untouched, and it appends an entry to the board's activity log
/// and bumps the board revision as part of the same write.
pub trait BoardStore: Send + Sync {
    /// Create a board, optionally with an initial set of columns.
    fn create_board(&self, input: NewBoard) -> BoardResult<BoardTree>;

    fn list_boards(&self) -> BoardResult<Vec<BoardSummary>>;

    /// Full board with columns and cards ordered by position ascending.
    fn get_board(&self, board_id: &str) -> BoardResult<BoardTree>;

    /// Delete a board and everything it owns.
    fn delete_board(&self, board_id: &str) -> BoardResult<()>;

    fn get_column(&self, column_id: &str) -> BoardResult<Column>;

    /// Columns of a board in display order.
    fn board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>>;

    /// Append a column at the right end of the board.
    fn create_column(&self, board_id: &str, name: &str, color: Option<&str>)
    -> BoardResult<Column>;

    /// Delete a column. Without `cascade` a column that still owns cards is
    /// rejected with `ColumnNotEmpty`. Returns the number of cards deleted.
    fn delete_column(&self, column_id: &str, cascade: bool) -> BoardResult<usize>;

    /// Give a column a new position within its board.
    fn apply_column_move(
        &self,
        column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Column>;

    /// Reassign evenly spaced keys to a board's columns, keeping their order.
    fn renumber_board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>>;

    fn get_card(&self, card_id: &str) -> BoardResult<Card>;

    /// Cards of a column in display order.
    fn column_cards(&self, column_id: &str) -> BoardResult<Vec<Card>>;

    /// Append a card at the end of a column.
    fn create_card(&self, column_id: &str, input: NewCard) -> BoardResult<Card>;

    /// Edit card fields (including the completed flag). Bumps the version.
    fn update_card(&self, card_id: &str, patch: &CardPatch) -> BoardResult<Card>;

    /// Remove a card. Sibling keys are never touched.
    fn delete_card(&self, card_id: &str) -> BoardResult<()>;

    /// Reassign a card's column and position in one write, provided its
    /// version still equals `expected_version`.
    fn apply_move(
        &self,
        card_id: &str,
        target_column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Card>;

    /// Reassign evenly spaced keys to a column's cards, keeping their order.
    /// Card versions are left alone.
    fn renumber_column(&self, column_id: &str) -> BoardResult<Vec<Card>>;

    /// Most recent activity entries for a board, newest first.
    fn board_activity(&self, board_id: &str, limit: usize) -> BoardResult<Vec<ActivityEntry>>;
}

/// Trim and validate a required text field.
pub fn validate_text(field: &str, value: &str) -> BoardResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::invalid(field, format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(BoardError::invalid(
            field,
            format!("{field} must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate a patch before it touches a card.
pub fn validate_patch(patch: &CardPatch) -> BoardResult<()> {
    if patch.is_empty() {
        return Err(BoardError::invalid("patch", "no fields to update"));
    }
    if let Some(ref title) = patch.title {
        validate_text("title", title)?;
    }
    if let Some(counts) = patch.counts {
        let values = [
            counts.subtasks,
            counts.subtasks_done,
            counts.comments,
            counts.attachments,
            counts.labels,
        ];
        if values.iter().any(|v| *v < 0) {
            return Err(BoardError::invalid("counts", "counts must not be negative"));
        }
        if counts.subtasks_done > counts.subtasks {
            return Err(BoardError::invalid(
                "counts",
                "subtasksDone must not exceed subtasks",
            ));
        }
    }
    Ok(())
}

/// Key for appending after `last`. If the tail of the key space is exhausted,
/// `renumber` is invoked (inside the caller's transaction) and must return the
/// new last key.
pub fn append_key<F>(allocator: &PositionAllocator, last: Option<&Key>, renumber: F) -> BoardResult<Key>
where
    F: FnOnce() -> BoardResult<Option<Key>>,
{
    match allocator.append_after(last) {
        Ok(key) => Ok(key),
        Err(AllocError::KeySpaceExhausted { .. }) => {
            let last = renumber()?;
            allocator
                .append_after(last.as_ref())
                .map_err(BoardError::internal)
        }
        Err(e) => Err(BoardError::internal(e)),
    }
}

/// Check the ordering and ownership invariants of a board read.
/// Returns a description of each violation found.
pub fn invariant_violations(board: &BoardTree) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen_cards = std::collections::HashSet::new();

    for pair in board.columns.windows(2) {
        if pair[0].column.position >= pair[1].column.position {
            problems.push(format!(
                "board {}: column {} (key {}) is not below column {} (key {})",
                board.board.id,
                pair[0].column.id,
                pair[0].column.position,
                pair[1].column.id,
                pair[1].column.position
            ));
        }
    }

    for column in &board.columns {
        if column.column.board_id != board.board.id {
            problems.push(format!(
                "column {} lists board {} but was read from board {}",
                column.column.id, column.column.board_id, board.board.id
            ));
        }
        for pair in column.cards.windows(2) {
            if pair[0].position >= pair[1].position {
                problems.push(format!(
                    "column {}: card {} (key {}) is not below card {} (key {})",
                    column.column.id,
                    pair[0].id,
                    pair[0].position,
                    pair[1].id,
                    pair[1].position
                ));
            }
        }
        for card in &column.cards {
            if card.column_id != column.column.id {
                problems.push(format!(
                    "card {} lists column {} but was read from column {}",
                    card.id, card.column_id, column.column.id
                ));
            }
            if !seen_cards.insert(card.id.clone()) {
                problems.push(format!("card {} appears more than once", card.id));
            }
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardCounts;

    #[test]
    fn test_validate_text_trims_and_rejects_blank() {
        assert_eq!(validate_text("title", "  Ship it ").unwrap(), "Ship it");
        assert!(matches!(
            validate_text("title", "   "),
            Err(BoardError::InvalidArgument { .. })
        ));
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(validate_text("title", &long).is_err());
    }

    #[test]
    fn test_validate_patch() {
        assert!(validate_patch(&CardPatch::default()).is_err());
        let patch = CardPatch {
            counts: Some(CardCounts {
                subtasks: 1,
                subtasks_done: 2,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_err());
        let patch = CardPatch {
            completed: Some(true),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_ok());
    }

    #[test]
    fn test_append_key_renumbers_on_exhaustion() {
        let allocator = PositionAllocator::new(crate::position::MIN_KEY_LENGTH);
        let last = Key::parse("zzzzzzzz").unwrap();
        let mut renumbered = false;
        let key = append_key(&allocator, Some(&last), || {
            renumbered = true;
            Ok(Some(Key::parse("V").unwrap()))
        })
        .unwrap();
        assert!(renumbered);
        assert!(key.as_str() > "V");
    }
}
