//! Board operations and full-board reads.

use super::cards::{CARD_FIELDS, parse_card_row};
use super::columns::{insert_column, load_board_columns};
use super::{Database, now_ms, touch_board};
use crate::error::{BoardError, BoardResult};
use crate::store::validate_text;
use crate::types::{
    ActivityKind, Board, BoardSummary, BoardTree, Card, ColumnTree, DEFAULT_BOARD_COLOR, NewBoard,
    new_id,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;

pub fn parse_board_row(row: &Row) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get("id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        client_id: row.get("client_id")?,
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn load_board(conn: &Connection, board_id: &str) -> BoardResult<Board> {
    conn.query_row(
        "SELECT id, name, color, client_id, revision, created_at, updated_at
         FROM boards WHERE id = ?1",
        params![board_id],
        parse_board_row,
    )
    .optional()?
    .ok_or_else(|| BoardError::board_not_found(board_id))
}

pub(crate) fn ensure_board(conn: &Connection, board_id: &str) -> BoardResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards WHERE id = ?1)",
        params![board_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(BoardError::board_not_found(board_id))
    }
}

/// Read a board with all columns and cards, ordered by position.
pub(crate) fn load_board_tree(conn: &Connection, board_id: &str) -> BoardResult<BoardTree> {
    let board = load_board(conn, board_id)?;
    let columns = load_board_columns(conn, board_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {CARD_FIELDS} FROM cards
         WHERE column_id IN (SELECT id FROM board_columns WHERE board_id = ?1)
         ORDER BY column_id, position ASC"
    ))?;
    let mut by_column: HashMap<String, Vec<Card>> = HashMap::new();
    for card in stmt.query_map(params![board_id], parse_card_row)? {
        let card = card?;
        by_column.entry(card.column_id.clone()).or_default().push(card);
    }

    let columns = columns
        .into_iter()
        .map(|column| {
            let cards = by_column.remove(&column.id).unwrap_or_default();
            ColumnTree { column, cards }
        })
        .collect();

    Ok(BoardTree { board, columns })
}

impl Database {
    /// Create a board with an optional initial set of columns.
    pub fn create_board(&self, input: NewBoard) -> BoardResult<BoardTree> {
        let name = validate_text("name", &input.name)?;
        let column_names = input
            .columns
            .iter()
            .map(|c| validate_text("columns", c))
            .collect::<BoardResult<Vec<_>>>()?;
        let color = input
            .color
            .unwrap_or_else(|| DEFAULT_BOARD_COLOR.to_string());

        self.with_tx(|conn| {
            let now = now_ms();
            let board_id = new_id();
            conn.execute(
                "INSERT INTO boards (id, name, color, client_id, revision, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![board_id, name, color, input.client_id, now],
            )?;
            touch_board(conn, &board_id, ActivityKind::BoardCreated, &board_id, None)?;

            for column_name in &column_names {
                insert_column(conn, &self.allocator, &board_id, column_name, None)?;
            }

            load_board_tree(conn, &board_id)
        })
    }

    /// List all boards with column and card totals.
    pub fn list_boards(&self) -> BoardResult<Vec<BoardSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.id, b.name, b.color, b.client_id, b.revision,
                        (SELECT COUNT(*) FROM board_columns bc WHERE bc.board_id = b.id),
                        (SELECT COUNT(*) FROM cards c
                           JOIN board_columns bc ON bc.id = c.column_id
                          WHERE bc.board_id = b.id)
                 FROM boards b
                 ORDER BY b.name, b.id",
            )?;
            let boards = stmt
                .query_map([], |row| {
                    Ok(BoardSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                        client_id: row.get(3)?,
                        revision: row.get(4)?,
                        column_count: row.get(5)?,
                        card_count: row.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(boards)
        })
    }

    /// Get a board with all of its columns and cards in display order.
    pub fn get_board(&self, board_id: &str) -> BoardResult<BoardTree> {
        self.with_read_tx(|conn| load_board_tree(conn, board_id))
    }

    /// Delete a board; columns, cards and activity cascade.
    pub fn delete_board(&self, board_id: &str) -> BoardResult<()> {
        self.with_tx(|conn| {
            let deleted = conn.execute("DELETE FROM boards WHERE id = ?1", params![board_id])?;
            if deleted == 0 {
                return Err(BoardError::board_not_found(board_id));
            }
            Ok(())
        })
    }
}
