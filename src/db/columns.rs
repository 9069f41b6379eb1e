//! Column operations.

use super::boards::ensure_board;
use super::{Database, is_constraint_violation, now_ms, touch_board};
use crate::error::{BoardError, BoardResult, Entity};
use crate::position::{Key, PositionAllocator, spaced_keys};
use crate::store::{append_key, validate_text};
use crate::types::{ActivityKind, Column, DEFAULT_COLUMN_COLOR, new_id};
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMN_FIELDS: &str = "id, board_id, name, color, position, version, created_at";

pub fn parse_column_row(row: &Row) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get("id")?,
        board_id: row.get("board_id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        position: row.get("position")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn load_column(conn: &Connection, column_id: &str) -> BoardResult<Column> {
    conn.query_row(
        &format!("SELECT {COLUMN_FIELDS} FROM board_columns WHERE id = ?1"),
        params![column_id],
        parse_column_row,
    )
    .optional()?
    .ok_or_else(|| BoardError::column_not_found(column_id))
}

pub(crate) fn load_board_columns(conn: &Connection, board_id: &str) -> BoardResult<Vec<Column>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMN_FIELDS} FROM board_columns WHERE board_id = ?1 ORDER BY position ASC"
    ))?;
    let columns = stmt
        .query_map(params![board_id], parse_column_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Append a column at the right end of a board.
pub(crate) fn insert_column(
    conn: &Connection,
    allocator: &PositionAllocator,
    board_id: &str,
    name: &str,
    color: Option<&str>,
) -> BoardResult<Column> {
    let last: Option<Key> = conn
        .query_row(
            "SELECT MAX(position) FROM board_columns WHERE board_id = ?1",
            params![board_id],
            |row| row.get(0),
        )?;
    let position = append_key(allocator, last.as_ref(), || {
        Ok(renumber_columns(conn, board_id)?
            .last()
            .map(|c| c.position.clone()))
    })?;

    let column = Column {
        id: new_id(),
        board_id: board_id.to_string(),
        name: name.to_string(),
        color: color.unwrap_or(DEFAULT_COLUMN_COLOR).to_string(),
        position,
        version: 1,
        created_at: now_ms(),
    };
    conn.execute(
        "INSERT INTO board_columns (id, board_id, name, color, position, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            column.id,
            column.board_id,
            column.name,
            column.color,
            column.position,
            column.version,
            column.created_at
        ],
    )?;
    touch_board(
        conn,
        board_id,
        ActivityKind::ColumnCreated,
        &column.id,
        Some(column.name.as_str()),
    )?;
    Ok(column)
}

/// Reassign evenly spaced keys to every column of a board, keeping order.
pub(crate) fn renumber_columns(conn: &Connection, board_id: &str) -> BoardResult<Vec<Column>> {
    let mut columns = load_board_columns(conn, board_id)?;
    let keys = spaced_keys(columns.len());

    // Park every row on a unique placeholder first so the UNIQUE(board_id,
    // position) constraint never sees a transient collision.
    conn.execute(
        "UPDATE board_columns SET position = '~' || id WHERE board_id = ?1",
        params![board_id],
    )?;
    let mut stmt = conn.prepare("UPDATE board_columns SET position = ?1 WHERE id = ?2")?;
    for (column, key) in columns.iter_mut().zip(keys) {
        stmt.execute(params![key, column.id])?;
        column.position = key;
    }
    Ok(columns)
}

impl Database {
    /// Get a column by ID.
    pub fn get_column(&self, column_id: &str) -> BoardResult<Column> {
        self.with_conn(|conn| load_column(conn, column_id))
    }

    /// Columns of a board, left to right.
    pub fn board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>> {
        self.with_read_tx(|conn| {
            ensure_board(conn, board_id)?;
            load_board_columns(conn, board_id)
        })
    }

    /// Append a column to a board.
    pub fn create_column(
        &self,
        board_id: &str,
        name: &str,
        color: Option<&str>,
    ) -> BoardResult<Column> {
        let name = validate_text("name", name)?;
        self.with_tx(|conn| {
            ensure_board(conn, board_id)?;
            insert_column(conn, &self.allocator, board_id, &name, color)
        })
    }

    /// Delete a column. Fails with `ColumnNotEmpty` unless `cascade` is set
    /// or the column owns no cards. Returns the number of cards deleted.
    pub fn delete_column(&self, column_id: &str, cascade: bool) -> BoardResult<usize> {
        self.with_tx(|conn| {
            let column = load_column(conn, column_id)?;
            let owned: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cards WHERE column_id = ?1",
                params![column_id],
                |row| row.get(0),
            )?;
            let owned = owned as usize;

            if owned > 0 && !cascade {
                return Err(BoardError::ColumnNotEmpty {
                    id: column_id.to_string(),
                    count: owned,
                });
            }

            conn.execute("DELETE FROM cards WHERE column_id = ?1", params![column_id])?;
            conn.execute("DELETE FROM board_columns WHERE id = ?1", params![column_id])?;
            touch_board(
                conn,
                &column.board_id,
                ActivityKind::ColumnDeleted,
                column_id,
                Some(format!("{} ({} card(s) deleted)", column.name, owned).as_str()),
            )?;
            Ok(owned)
        })
    }

    /// Give a column a new position key, provided its version is unchanged.
    pub fn apply_column_move(
        &self,
        column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Column> {
        self.with_tx(|conn| {
            let column = load_column(conn, column_id)?;
            if column.version != expected_version {
                return Err(BoardError::column_version_mismatch(
                    column_id,
                    expected_version,
                    column.version,
                ));
            }

            conn.execute(
                "UPDATE board_columns SET position = ?1, version = version + 1 WHERE id = ?2",
                params![position, column_id],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    BoardError::concurrent(
                        Entity::Column,
                        column_id,
                        format!("position {position} is already taken"),
                    )
                } else {
                    e.into()
                }
            })?;

            touch_board(
                conn,
                &column.board_id,
                ActivityKind::ColumnMoved,
                column_id,
                Some(position.as_str()),
            )?;
            load_column(conn, column_id)
        })
    }

    /// Renumber a board's columns.
    pub fn renumber_board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>> {
        self.with_tx(|conn| {
            ensure_board(conn, board_id)?;
            let columns = renumber_columns(conn, board_id)?;
            touch_board(
                conn,
                board_id,
                ActivityKind::ColumnsRenumbered,
                board_id,
                Some(format!("{} column(s)", columns.len()).as_str()),
            )?;
            Ok(columns)
        })
    }
}
