//! Board snapshots: the ordered, annotated view clients resynchronize from.

use crate::error::{BoardError, BoardResult};
use crate::store::BoardStore;
use crate::types::{Board, Card, Column, Priority};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Optional card filters. Filters hide cards from `cards` but never change
/// the counts, which always describe the whole column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFilter {
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub completed: Option<bool>,
    /// Case-insensitive match against title and description.
    pub q: Option<String>,
}

impl SnapshotFilter {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.assignee.is_none()
            && self.completed.is_none()
            && self.q.as_deref().is_none_or(|q| q.trim().is_empty())
    }

    pub fn matches(&self, card: &Card) -> bool {
        if let Some(priority) = self.priority
            && card.priority != priority
        {
            return false;
        }
        if let Some(ref assignee) = self.assignee
            && card.assignee_id.as_deref() != Some(assignee.as_str())
        {
            return false;
        }
        if let Some(completed) = self.completed
            && card.completed != completed
        {
            return false;
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            let in_title = card.title.to_lowercase().contains(&needle);
            let in_description = card
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }
}

/// One column of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,
    pub card_count: usize,
    pub completed_count: usize,
    pub visible_count: usize,
    pub cards: Vec<Card>,
}

/// A fully ordered board with per-column counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    #[serde(flatten)]
    pub board: Board,
    pub columns: Vec<ColumnView>,
    pub card_count: usize,
    pub completed_count: usize,
}

impl BoardView {
    pub fn column(&self, column_id: &str) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.column.id == column_id)
    }

    /// Card IDs of a column in display order.
    pub fn card_ids(&self, column_id: &str) -> Vec<&str> {
        self.column(column_id)
            .map(|c| c.cards.iter().map(|card| card.id.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Builds [`BoardView`]s from a single consistent store read.
#[derive(Clone)]
pub struct SnapshotService {
    store: Arc<dyn BoardStore>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn BoardStore>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self, board_id: &str, filter: &SnapshotFilter) -> BoardResult<BoardView> {
        if filter.assignee.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(BoardError::invalid("assignee", "assignee must not be blank"));
        }

        let tree = self.store.get_board(board_id)?;
        let mut card_count = 0;
        let mut completed_count = 0;

        let columns = tree
            .columns
            .into_iter()
            .map(|column| {
                let total = column.cards.len();
                let completed = column.cards.iter().filter(|c| c.completed).count();
                card_count += total;
                completed_count += completed;

                let cards: Vec<Card> = column
                    .cards
                    .into_iter()
                    .filter(|c| filter.matches(c))
                    .collect();
                ColumnView {
                    column: column.column,
                    card_count: total,
                    completed_count: completed,
                    visible_count: cards.len(),
                    cards,
                }
            })
            .collect();

        Ok(BoardView {
            board: tree.board,
            columns,
            card_count,
            completed_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{CardPatch, NewBoard, NewCard};

    fn seeded() -> (Arc<dyn BoardStore>, String, String) {
        let store: Arc<dyn BoardStore> = Arc::new(MemoryStore::new());
        let board = store
            .create_board(NewBoard::named("Ops").with_columns(["To Do", "Done"]))
            .unwrap();
        let col = board.columns[0].column.id.clone();

        let mut urgent = NewCard::titled("Fix login outage");
        urgent.priority = Some(Priority::Urgent);
        urgent.assignee_id = Some("u1".into());
        store.create_card(&col, urgent).unwrap();

        let mut docs = NewCard::titled("Write docs");
        docs.description = Some("Cover the LOGIN flow".into());
        store.create_card(&col, docs).unwrap();

        let done = store.create_card(&col, NewCard::titled("Ship v1")).unwrap();
        store
            .update_card(
                &done.id,
                &CardPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        (store, board.board.id, col)
    }

    #[test]
    fn test_snapshot_counts() {
        let (store, board_id, col) = seeded();
        let view = SnapshotService::new(store)
            .snapshot(&board_id, &SnapshotFilter::default())
            .unwrap();

        let column = view.column(&col).unwrap();
        assert_eq!(column.card_count, 3);
        assert_eq!(column.completed_count, 1);
        assert_eq!(column.visible_count, 3);
        assert_eq!(view.card_count, 3);
        assert_eq!(view.columns[1].card_count, 0);
    }

    #[test]
    fn test_filters_hide_cards_but_keep_counts() {
        let (store, board_id, col) = seeded();
        let service = SnapshotService::new(store);

        let filter = SnapshotFilter {
            q: Some("login".into()),
            ..Default::default()
        };
        let view = service.snapshot(&board_id, &filter).unwrap();
        let column = view.column(&col).unwrap();
        assert_eq!(column.visible_count, 2);
        assert_eq!(column.card_count, 3);

        let filter = SnapshotFilter {
            priority: Some(Priority::Urgent),
            assignee: Some("u1".into()),
            ..Default::default()
        };
        let view = service.snapshot(&board_id, &filter).unwrap();
        assert_eq!(view.column(&col).unwrap().visible_count, 1);

        let filter = SnapshotFilter {
            completed: Some(false),
            ..Default::default()
        };
        let view = service.snapshot(&board_id, &filter).unwrap();
        assert_eq!(view.column(&col).unwrap().visible_count, 2);
    }

    #[test]
    fn test_snapshot_missing_board() {
        let service = SnapshotService::new(Arc::new(MemoryStore::new()));
        let result = service.snapshot("nope", &SnapshotFilter::default());
        assert!(matches!(result, Err(BoardError::NotFound { .. })));
    }

    #[test]
    fn test_board_view_serializes_camel_case() {
        let (store, board_id, _) = seeded();
        let view = SnapshotService::new(store)
            .snapshot(&board_id, &SnapshotFilter::default())
            .unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["revision"].is_i64());
        assert_eq!(json["columns"][0]["cardCount"], 3);
        assert!(json["columns"][0]["cards"][0]["columnId"].is_string());
    }
}
