//! Card operations: create, edit, move, delete, renumber.

use super::columns::load_column;
use super::{Database, is_constraint_violation, now_ms, touch_board};
use crate::error::{BoardError, BoardResult, Entity};
use crate::position::{Key, spaced_keys};
use crate::store::{append_key, validate_patch, validate_text};
use crate::types::{ActivityKind, Card, CardCounts, CardPatch, NewCard, new_id};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) const CARD_FIELDS: &str = "id, column_id, title, description, priority, due_date, \
    assignee_id, client_id, completed, position, version, subtask_count, subtask_done_count, \
    comment_count, attachment_count, label_count, created_at, updated_at";

pub fn parse_card_row(row: &Row) -> rusqlite::Result<Card> {
    let due_date: Option<String> = row.get("due_date")?;
    let due_date = due_date
        .map(|s| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()?;

    Ok(Card {
        id: row.get("id")?,
        column_id: row.get("column_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        due_date,
        assignee_id: row.get("assignee_id")?,
        client_id: row.get("client_id")?,
        completed: row.get::<_, i32>("completed")? != 0,
        position: row.get("position")?,
        version: row.get("version")?,
        counts: CardCounts {
            subtasks: row.get("subtask_count")?,
            subtasks_done: row.get("subtask_done_count")?,
            comments: row.get("comment_count")?,
            attachments: row.get("attachment_count")?,
            labels: row.get("label_count")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

pub(crate) fn load_card(conn: &Connection, card_id: &str) -> BoardResult<Card> {
    conn.query_row(
        &format!("SELECT {CARD_FIELDS} FROM cards WHERE id = ?1"),
        params![card_id],
        parse_card_row,
    )
    .optional()?
    .ok_or_else(|| BoardError::card_not_found(card_id))
}

pub(crate) fn load_column_cards(conn: &Connection, column_id: &str) -> BoardResult<Vec<Card>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CARD_FIELDS} FROM cards WHERE column_id = ?1 ORDER BY position ASC"
    ))?;
    let cards = stmt
        .query_map(params![column_id], parse_card_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cards)
}

/// Reassign evenly spaced keys to every card of a column, keeping order.
/// Versions are not touched.
pub(crate) fn renumber_cards(conn: &Connection, column_id: &str) -> BoardResult<Vec<Card>> {
    let mut cards = load_column_cards(conn, column_id)?;
    let keys = spaced_keys(cards.len());

    conn.execute(
        "UPDATE cards SET position = '~' || id WHERE column_id = ?1",
        params![column_id],
    )?;
    let mut stmt = conn.prepare("UPDATE cards SET position = ?1 WHERE id = ?2")?;
    for (card, key) in cards.iter_mut().zip(keys) {
        stmt.execute(params![key, card.id])?;
        card.position = key;
    }
    Ok(cards)
}

impl Database {
    /// Get a card by ID.
    pub fn get_card(&self, card_id: &str) -> BoardResult<Card> {
        self.with_conn(|conn| load_card(conn, card_id))
    }

    /// Cards of a column, top to bottom.
    pub fn column_cards(&self, column_id: &str) -> BoardResult<Vec<Card>> {
        self.with_read_tx(|conn| {
            load_column(conn, column_id)?;
            load_column_cards(conn, column_id)
        })
    }

    /// Append a new card to the end of a column.
    pub fn create_card(&self, column_id: &str, input: NewCard) -> BoardResult<Card> {
        let title = validate_text("title", &input.title)?;

        self.with_tx(|conn| {
            let column = load_column(conn, column_id)?;
            let last: Option<Key> = conn.query_row(
                "SELECT MAX(position) FROM cards WHERE column_id = ?1",
                params![column_id],
                |row| row.get(0),
            )?;
            let position = append_key(&self.allocator, last.as_ref(), || {
                Ok(renumber_cards(conn, column_id)?
                    .last()
                    .map(|c| c.position.clone()))
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

            conn.execute(
                "INSERT INTO cards (id, column_id, title, description, priority, due_date,
                                    assignee_id, client_id, completed, position, version,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?11)",
                params![
                    card.id,
                    card.column_id,
                    card.title,
                    card.description,
                    card.priority,
                    format_date(card.due_date),
                    card.assignee_id,
                    card.client_id,
                    card.position,
                    card.version,
                    now
                ],
            )?;
            touch_board(
                conn,
                &column.board_id,
                ActivityKind::CardCreated,
                &card.id,
                Some(card.title.as_str()),
            )?;
            Ok(card)
        })
    }

    /// Apply a field patch to a card and bump its version.
    pub fn update_card(&self, card_id: &str, patch: &CardPatch) -> BoardResult<Card> {
        validate_patch(patch)?;

        self.with_tx(|conn| {
            let mut card = load_card(conn, card_id)?;
            let column = load_column(conn, &card.column_id)?;
            patch.apply_to(&mut card);
            card.version += 1;
            card.updated_at = now_ms();

            conn.execute(
                "UPDATE cards SET title = ?1, description = ?2, priority = ?3, due_date = ?4,
                        assignee_id = ?5, client_id = ?6, completed = ?7,
                        subtask_count = ?8, subtask_done_count = ?9, comment_count = ?10,
                        attachment_count = ?11, label_count = ?12,
                        version = ?13, updated_at = ?14
                 WHERE id = ?15",
                params![
                    card.title,
                    card.description,
                    card.priority,
                    format_date(card.due_date),
                    card.assignee_id,
                    card.client_id,
                    card.completed as i32,
                    card.counts.subtasks,
                    card.counts.subtasks_done,
                    card.counts.comments,
                    card.counts.attachments,
                    card.counts.labels,
                    card.version,
                    card.updated_at,
                    card.id
                ],
            )?;
            touch_board(
                conn,
                &column.board_id,
                ActivityKind::CardUpdated,
                card_id,
                None,
            )?;
            Ok(card)
        })
    }

    /// Delete a card. Sibling positions are left as they are.
    pub fn delete_card(&self, card_id: &str) -> BoardResult<()> {
        self.with_tx(|conn| {
            let card = load_card(conn, card_id)?;
            let column = load_column(conn, &card.column_id)?;
            conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
            touch_board(
                conn,
                &column.board_id,
                ActivityKind::CardDeleted,
                card_id,
                Some(card.title.as_str()),
            )?;
            Ok(())
        })
    }

    /// Move a card to `(target_column_id, position)` in one statement,
    /// provided its version still equals `expected_version`.
    pub fn apply_move(
        &self,
        card_id: &str,
        target_column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Card> {
        self.with_tx(|conn| {
            let card = load_card(conn, card_id)?;
            let target = load_column(conn, target_column_id)?;
            let source = load_column(conn, &card.column_id)?;

            if source.board_id != target.board_id {
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

            conn.execute(
                "UPDATE cards SET column_id = ?1, position = ?2, version = version + 1,
                        updated_at = ?3
                 WHERE id = ?4 AND version = ?5",
                params![target_column_id, position, now_ms(), card_id, expected_version],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    BoardError::concurrent(
                        Entity::Card,
                        card_id,
                        format!(
                            "position {position} is already taken in column {target_column_id}"
                        ),
                    )
                } else {
                    e.into()
                }
            })?;

            touch_board(
                conn,
                &target.board_id,
                ActivityKind::CardMoved,
                card_id,
                Some(format!("{} -> {}", card.column_id, target_column_id).as_str()),
            )?;
            load_card(conn, card_id)
        })
    }

    /// Renumber a column's cards.
    pub fn renumber_column(&self, column_id: &str) -> BoardResult<Vec<Card>> {
        self.with_tx(|conn| {
            let column = load_column(conn, column_id)?;
            let cards = renumber_cards(conn, column_id)?;
            touch_board(
                conn,
                &column.board_id,
                ActivityKind::CardsRenumbered,
                column_id,
                Some(format!("{} card(s)", cards.len()).as_str()),
            )?;
            Ok(cards)
        })
    }
}
