//! SQLite-backed board store.

pub mod activity;
pub mod boards;
pub mod cards;
pub mod columns;

use crate::error::{BoardError, BoardResult};
use crate::position::{Key, PositionAllocator};
use crate::store::BoardStore;
use crate::types::{
    ActivityEntry, ActivityKind, BoardSummary, BoardTree, Card, CardPatch, Column, NewBoard,
    NewCard, Priority,
};
use anyhow::Result;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, TransactionBehavior, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    allocator: PositionAllocator,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL for concurrent readers; busy_timeout lets a second engine
        // instance wait for our write transactions instead of failing.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            allocator: PositionAllocator::default(),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            allocator: PositionAllocator::default(),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Use a specific allocator for appends.
    pub fn with_allocator(mut self, allocator: PositionAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    fn lock(&self) -> BoardResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BoardError::internal("database connection lock poisoned"))
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> BoardResult<T>
    where
        F: FnOnce(&Connection) -> BoardResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a function inside an immediate write transaction.
    ///
    /// The transaction commits only if `f` succeeds; any error rolls back
    /// every statement `f` issued.
    pub fn with_tx<F, T>(&self, f: F) -> BoardResult<T>
    where
        F: FnOnce(&Connection) -> BoardResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Execute a read inside a deferred transaction so multi-statement reads
    /// see a single snapshot even with other processes writing.
    pub fn with_read_tx<F, T>(&self, f: F) -> BoardResult<T>
    where
        F: FnOnce(&Connection) -> BoardResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Bump a board's revision and append an activity entry.
pub(crate) fn touch_board(
    conn: &Connection,
    board_id: &str,
    kind: ActivityKind,
    entity_id: &str,
    detail: Option<&str>,
) -> BoardResult<()> {
    let now = now_ms();
    conn.execute(
        "UPDATE boards SET revision = revision + 1, updated_at = ?1 WHERE id = ?2",
        params![now, board_id],
    )?;
    conn.execute(
        "INSERT INTO board_activity (board_id, kind, entity_id, detail, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![board_id, kind.as_str(), entity_id, detail, now],
    )?;
    Ok(())
}

/// True if the error is a UNIQUE/constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl ToSql for Key {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Key {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Key::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Priority::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

impl BoardStore for Database {
    fn create_board(&self, input: NewBoard) -> BoardResult<BoardTree> {
        Database::create_board(self, input)
    }

    fn list_boards(&self) -> BoardResult<Vec<BoardSummary>> {
        Database::list_boards(self)
    }

    fn get_board(&self, board_id: &str) -> BoardResult<BoardTree> {
        Database::get_board(self, board_id)
    }

    fn delete_board(&self, board_id: &str) -> BoardResult<()> {
        Database::delete_board(self, board_id)
    }

    fn get_column(&self, column_id: &str) -> BoardResult<Column> {
        Database::get_column(self, column_id)
    }

    fn board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>> {
        Database::board_columns(self, board_id)
    }

    fn create_column(
        &self,
        board_id: &str,
        name: &str,
        color: Option<&str>,
    ) -> BoardResult<Column> {
        Database::create_column(self, board_id, name, color)
    }

    fn delete_column(&self, column_id: &str, cascade: bool) -> BoardResult<usize> {
        Database::delete_column(self, column_id, cascade)
    }

    fn apply_column_move(
        &self,
        column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Column> {
        Database::apply_column_move(self, column_id, position, expected_version)
    }

    fn renumber_board_columns(&self, board_id: &str) -> BoardResult<Vec<Column>> {
        Database::renumber_board_columns(self, board_id)
    }

    fn get_card(&self, card_id: &str) -> BoardResult<Card> {
        Database::get_card(self, card_id)
    }

    fn column_cards(&self, column_id: &str) -> BoardResult<Vec<Card>> {
        Database::column_cards(self, column_id)
    }

    fn create_card(&self, column_id: &str, input: NewCard) -> BoardResult<Card> {
        Database::create_card(self, column_id, input)
    }

    fn update_card(&self, card_id: &str, patch: &CardPatch) -> BoardResult<Card> {
        Database::update_card(self, card_id, patch)
    }

    fn delete_card(&self, card_id: &str) -> BoardResult<()> {
        Database::delete_card(self, card_id)
    }

    fn apply_move(
        &self,
        card_id: &str,
        target_column_id: &str,
        position: &Key,
        expected_version: i64,
    ) -> BoardResult<Card> {
        Database::apply_move(self, card_id, target_column_id, position, expected_version)
    }

    fn renumber_column(&self, column_id: &str) -> BoardResult<Vec<Card>> {
        Database::renumber_column(self, column_id)
    }

    fn board_activity(&self, board_id: &str, limit: usize) -> BoardResult<Vec<ActivityEntry>> {
        Database::board_activity(self, board_id, limit)
    }
}
