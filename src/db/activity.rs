//! Board activity log reads.

use super::Database;
use super::boards::ensure_board;
use crate::error::BoardResult;
use crate::types::{ActivityEntry, ActivityKind};
use rusqlite::{Row, params};

fn parse_activity_row(row: &Row) -> rusqlite::Result<ActivityEntry> {
    let kind: String = row.get("kind")?;
    let kind = ActivityKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown activity kind: {kind}").into(),
        )
    })?;

    Ok(ActivityEntry {
        id: row.get("id")?,
        board_id: row.get("board_id")?,
        kind,
        entity_id: row.get("entity_id")?,
        detail: row.get("detail")?,
        timestamp: row.get("timestamp")?,
    })
}

impl Database {
    /// Most recent activity for a board, newest first.
    pub fn board_activity(&self, board_id: &str, limit: usize) -> BoardResult<Vec<ActivityEntry>> {
        self.with_read_tx(|conn| {
            ensure_board(conn, board_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, board_id, kind, entity_id, detail, timestamp
                 FROM board_activity
                 WHERE board_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let entries = stmt
                .query_map(params![board_id, limit as i64], parse_activity_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }
}
