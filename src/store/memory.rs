//! In-memory reference implementation of [`BoardStore`].
//!
//! All state lives behind one `RwLock`, so every read sees a consistent board
//! and every write is atomic. Each mutating method validates fully before it
//! changes anything.

use super::{BoardStore, append_key, validate_patch, validate_text};
use crate::db::now_ms;
use crate::error::{BoardError, BoardResult, Entity};
use crate::position::{Key, PositionAllocator, spaced_keys};
use crate::types::{
    ActivityEntry, ActivityKind, Board, BoardSummary, BoardTree, Card, CardCounts, CardPatch,
    Column, ColumnTree, DEFAULT_BOARD_COLOR, DEFAULT_COLUMN_COLOR, NewBoard, NewCard, new_id,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Activity entries kept per board; older ones are dropped first.
pub const ACTIVITY_RETENTION: usize = 1000;

#[derive(Debug, Default)]
struct State {
    boards: HashMap<String, Board>,
    columns: HashMap<String, Column>,
    cards: HashMap<String, Card>,
    /// Oldest first, capped at `ACTIVITY_RETENTION` per board.
    activity: HashMap<String, VecDeque<ActivityEntry>>,
    next_activity_id: i64,
}

impl State {
    fn board(&self, board_id: &str) -> BoardResult<&Board> {
        self.boards
            .get(board_id)
            .ok_or_else(|| BoardError::board_not_found(board_id))
    }

    fn column(&self, column_id: &str) -> BoardResult<&Column> {
        self.columns
            .get(column_id)
            .ok_or_else(|| BoardError::column_not_found(column_id))
    }

    fn card(&self, card_id: &str) -> BoardResult<&Card> {
        self.cards
            .get(card_id)
            .ok_or_else(|| BoardError::card_not_found(card_id))
    }

    fn ordered_columns(&self, board_id: &str) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .columns
            .values()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect();
        columns.sort_by(|a, b| a.position.cmp(&b.position));
        columns
    }

    fn ordered_cards(&self, column_id: &str) -> Vec<Card> {
        let mut cards: Vec<Card> = self
            .cards
            .values()
            .filter(|c| c.column_id == column_id)
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.position.cmp(&b.position));
        cards
    }

    /// Bump the board revision and append an activity entry.
    fn touch(&mut self, board_id: &str, kind: ActivityKind, entity_id: &str, detail: Option<String>) {
        let now = now_ms();
        if let Some(board) = self.boards.get_mut(board_id) {
            board.revision += 1;
            board.updated_at = now;
        }
        self.next_activity_id += 1;
        let log = self.activity.entry(board_id.to_string()).or_default();
        if log.len() == ACTIVITY_RETENTION {
            log.pop_front();
        }
        log.push_back(ActivityEntry {
            id: self.next_activity_id,
            board_id: board_id.to_string(),
            kind,
            entity_id: entity_id.to_string(),
            detail,
            timestamp: now,
        });
    }

    fn renumber_cards(&mut self, column_id: &str) -> Vec<Card> {
        let ordered = self.ordered_cards(column_id);
        let keys = spaced_keys(ordered.len());
        let mut result = Vec::with_capacity(ordered.len());
        for (card, key) in ordered.into_iter().zip(keys) {
            if let Some(stored) = self.cards.get_mut(&card.id) {
                stored.position = key;
                result.push(stored.clone());
            }
        }
        result
    }

    fn renumber_columns(&mut self, board_id: &str) -> Vec<Column> {
        let ordered = self.ordered_columns(board_id);
        let keys = spaced_keys(ordered.len());
        let mut result = Vec::with_capacity(ordered.len());
        for (column, key) in ordered.into_iter().zip(keys) {
            if let Some(stored) = self.columns.get_mut(&column.id) {
                stored.position = key;
                result.push(stored.clone());
            }
        }
        result
    }

    fn insert_column(
        &mut self,
        allocator: &PositionAllocator,
        board_id: &str,
        name: String,
        color: Option<&str>,
    ) -> BoardResult<Column> {
        let last = self.ordered_columns(board_id).last().map(|c| c.position.clone());
        let position = append_key(allocator, last.as_ref(), || {
            Ok(self.renumber_columns(board_id).last().map(|c| c.position.clone()))
        })?;

        let column = Column {
            id: new_id(),
            board_id: board_id.to_string(),
            name,
            color: color.unwrap_or(DEFAULT_COLUMN_COLOR).to_string(),
            position,
            version: 1,
            created_at: now_ms(),
        };
        self.columns.insert(column.id.clone(), column.clone());
        self.touch(board_id, ActivityKind::ColumnCreated, &column.id, Some(column.name.clone()));
        Ok(column)
    }

    fn tree(&self, board_id: &str) -> BoardResult<BoardTree> {
        let board = self.board(board_id)?.clone();
        let columns = self
            .ordered_columns(board_id)
            .into_iter()
            .map(|column| {
                let cards = self.ordered_cards(&column.id);
                ColumnTree { column, cards }
            })
            .collect();
        Ok(BoardTree { board, columns })
    }
}

/// In-memory board store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    allocator: PositionAllocator,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocator(mut self, allocator: PositionAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    fn read(&self) -> BoardResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| BoardError::internal("memory store lock poisoned"))
    }

    fn write(&self) -> BoardResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| BoardError::internal("memory store lock poisoned"))
    }
}

impl BoardStore for MemoryStore {
    fn create_board(&self, input: NewBoard) -> BoardResult<BoardTree> {
        let name = validate_text("name", &input.name)?;
        let column_names = input
            .columns
            .iter()
            .map(|c| validate_text("columns", c))
            .collect::<BoardResult<Vec<_>>>()?;

        let mut state = self.write()?;
        let now = now_ms();
        let board = Board {
            id: new_id(),
            name,
            color: input.color.unwrap_or_else(|| DEFAULT_BOARD_COLOR.to_string()),
            client_id: input.client_id,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        let board_id = board.id.clone();
        state.boards.insert(board_id.clone(), board);
        state.touch(&board_id, ActivityKind::BoardCreated, &board_id, None);

        for column_name in column_names {
            state.insert_column(&self.allocator, &board_id, column_name, None)?;
        }

        state.tree(&board_id)
    }

    fn list_boards(&self) -> BoardResult<Vec<BoardSummary>> {
        let state = self.read()?;
        let mut boards: Vec<BoardSummary> = state
            .boards
            .values()
            .map(|b| {
                let column_ids: Vec<&String> = state
                    .columns
                    .values()
                    .filter(|c| c.board_id == b.id)
                    .map(|c| &c.id)
                    .collect();
                let card_count = state
                    .cards
                    .values()
                    .filter(|card| column_ids.contains(&&card.column_id))
                    .count();
                BoardSummary {
                    id: b.id.clone(),
                    name: b.name.clone(),
                    color: b.color.clone(),
                    client_id: b.client_id.clone(),
                    revision: b.revision,
                    column_count: column_ids.len() as i64,
                    card_count: card_count as i64,
                }
            })
            .collect();
        boards.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(boards)
    }

    fn get_board(&self, board_id: &str) -> BoardResult<BoardTree> {
        self.read()?.tree(board_id)
    }

    fn delete_board(&self, board_id: &str) -> BoardResult<()> {
        let mut state = self.write()?;
        state.board(board_id)?;

        let column_ids: Vec<String> = state
            .columns
            .values()
            .filter(|c| c.board_id == board_id)
            .map(|c| c.id.clone())
            .collect();
        state.cards.retain(|_, card| !column_ids.contains(&card.column_id));
        state.columns.retain(|_, c| c.board_id != board_id);
        state.activity.remove(board_id);
        state.boards.remove(board_id);
        Ok(())
    }

    fn get_column(&self, column_id: &str) -> BoardResult<Column> {
        self.read()?.column(column_id).cloned()
    }

    fn board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>> {
        let state = self.read()?;
        state.board(board_id)?;
        Ok(state.ordered_columns(board_id))
    }

    fn create_column(
        &self,
        board_id: &str,
        name: &str,
        color: Option<&str>,
    ) -> BoardResult<Column> {
        let name = validate_text("name", name)?;
        let mut state = self.write()?;
        state.board(board_id)?;
        state.insert_column(&self.allocator, board_id, name, color)
    }

    fn delete_column(&self, column_id: &str, cascade: bool) -> BoardResult<usize> {
        let mut state = self.write()?;
        let column = state.column(column_id)?.clone();
        let owned = state.cards.values().filter(|c| c.column_id == column_id).count();

        if owned > 0 && !cascade {
            return Err(BoardError::ColumnNotEmpty {
                id: column_id.to_string(),
                count: owned,
            });
        }

        state.cards.retain(|_, c| c.column_id != column_id);
        state.columns.remove(column_id);
        state.touch(
            &column.board_id,
            ActivityKind::ColumnDeleted,
            column_id,
            Some(format!("{} ({} card(s) deleted)", column.name, owned)),
        );
        Ok(owned)
    }

    fn apply_column_move(
        &self,
        column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Column> {
        let mut state = self.write()?;
        let column = state.column(column_id)?.clone();

        if column.version != expected_version {
            return Err(BoardError::column_version_mismatch(
                column_id,
                expected_version,
                column.version,
            ));
        }
        if state
            .columns
            .values()
            .any(|c| c.board_id == column.board_id && c.id != column_id && &c.position == position)
        {
            return Err(BoardError::concurrent(
                Entity::Column,
                column_id,
                format!("position {position} is already taken"),
            ));
        }

        let updated = {
            let stored = state
                .columns
                .get_mut(column_id)
                .ok_or_else(|| BoardError::column_not_found(column_id))?;
            stored.position = position.clone();
            stored.version += 1;
            stored.clone()
        };
        state.touch(
            &updated.board_id,
            ActivityKind::ColumnMoved,
            column_id,
            Some(position.to_string()),
        );
        Ok(updated)
    }

    fn renumber_board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>> {
        let mut state = self.write()?;
        state.board(board_id)?;
        let columns = state.renumber_columns(board_id);
        state.touch(
            board_id,
            ActivityKind::ColumnsRenumbered,
            board_id,
            Some(format!("{} column(s)", columns.len())),
        );
        Ok(columns)
    }

    fn get_card(&self, card_id: &str) -> BoardResult<Card> {
        self.read()?.card(card_id).cloned()
    }

    fn column_cards(&self, column_id: &str) -> BoardResult<Vec<Card>> {
        let state = self.read()?;
        state.column(column_id)?;
        Ok(state.ordered_cards(column_id))
    }

    fn create_card(&self, column_id: &str, input: NewCard) -> BoardResult<Card> {
        let title = validate_text("title", &input.title)?;
        let mut state = self.write()?;
        let board_id = state.column(column_id)?.board_id.clone();

        let last = state.ordered_cards(column_id).last().map(|c| c.position.clone());
        let position = append_key(&self.allocator, last.as_ref(), || {
            Ok(state.renumber_cards(column_id).last().map(|c| c.position.clone()))
        })?;

        let now = now_ms();
        let card = Card {
            id: new_id(),
            column_id: column_id.to_string(),
            title,
            description: input.description,
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date,
            assignee_id: input.assignee_id,
            client_id: input.client_id,
            completed: false,
            position,
            version: 1,
            counts: CardCounts::default(),
            created_at: now,
            updated_at: now,
        };
        state.cards.insert(card.id.clone(), card.clone());
        state.touch(&board_id, ActivityKind::CardCreated, &card.id, Some(card.title.clone()));
        Ok(card)
    }

    fn update_card(&self, card_id: &str, patch: &CardPatch) -> BoardResult<Card> {
        validate_patch(patch)?;
        let mut state = self.write()?;
        let column_id = state.card(card_id)?.column_id.clone();
        let board_id = state.column(&column_id)?.board_id.clone();

        let updated = {
            let card = state
                .cards
                .get_mut(card_id)
                .ok_or_else(|| BoardError::card_not_found(card_id))?;
            patch.apply_to(card);
            card.version += 1;
            card.updated_at = now_ms();
            card.clone()
        };
        state.touch(&board_id, ActivityKind::CardUpdated, card_id, None);
        Ok(updated)
    }

    fn delete_card(&self, card_id: &str) -> BoardResult<()> {
        let mut state = self.write()?;
        let card = state.card(card_id)?.clone();
        let board_id = state.column(&card.column_id)?.board_id.clone();
        state.cards.remove(card_id);
        state.touch(&board_id, ActivityKind::CardDeleted, card_id, Some(card.title));
        Ok(())
    }

    fn apply_move(
        &self,
        card_id: &str,
        target_column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Card> {
        let mut state = self.write()?;
        let card = state.card(card_id)?.clone();
        let target_board = state.column(target_column_id)?.board_id.clone();
        let source_board = state.column(&card.column_id)?.board_id.clone();

        if source_board != target_board {
            return Err(BoardError::invalid(
                "columnId",
                "cards can only move between columns of the same board",
            ));
        }
        if card.version != expected_version {
            return Err(BoardError::card_version_mismatch(
                card_id,
                expected_version,
                card.version,
            ));
        }
        if state
            .cards
            .values()
            .any(|c| c.column_id == target_column_id && c.id != card_id && &c.position == position)
        {
            return Err(BoardError::concurrent(
                Entity::Card,
                card_id,
                format!("position {position} is already taken in column {target_column_id}"),
            ));
        }

        let updated = {
            let stored = state
                .cards
                .get_mut(card_id)
                .ok_or_else(|| BoardError::card_not_found(card_id))?;
            stored.column_id = target_column_id.to_string();
            stored.position = position.clone();
            stored.version += 1;
            stored.updated_at = now_ms();
            stored.clone()
        };
        state.touch(
            &target_board,
            ActivityKind::CardMoved,
            card_id,
            Some(format!("{} -> {}", card.column_id, target_column_id)),
        );
        Ok(updated)
    }

    fn renumber_column(&self, column_id: &str) -> BoardResult<Vec<Card>> {
        let mut state = self.write()?;
        let board_id = state.column(column_id)?.board_id.clone();
        let cards = state.renumber_cards(column_id);
        state.touch(
            &board_id,
            ActivityKind::CardsRenumbered,
            column_id,
            Some(format!("{} card(s)", cards.len())),
        );
        Ok(cards)
    }

    fn board_activity(&self, board_id: &str, limit: usize) -> BoardResult<Vec<ActivityEntry>> {
        let state = self.read()?;
        state.board(board_id)?;
        Ok(state
            .activity
            .get(board_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
