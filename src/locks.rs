//! Lock table for serializing board mutations per column.
//!
//! Each [`LockKey`] maps to a FIFO async mutex. Callers that need several
//! keys get them through [`LockTable::acquire`], which always takes them in
//! ascending key order, so two movers crossing the same pair of columns in
//! opposite directions cannot deadlock.

use crate::error::{BoardError, BoardResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Resource a board mutation serializes on.
///
/// `Board` guards column order within a board; `Column` guards the card
/// order within a column. The derived ordering puts every board key before
/// every column key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Board(String),
    Column(String),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Board(id) => write!(f, "board:{id}"),
            LockKey::Column(id) => write!(f, "column:{id}"),
        }
    }
}

/// Held locks; released together on drop.
#[derive(Debug)]
pub struct LockGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockGuard {
    /// Keys held by this guard, in acquisition order.
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

#[derive(Debug, Default)]
pub struct LockTable {
    entries: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &LockKey) -> BoardResult<Arc<AsyncMutex<()>>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BoardError::internal("lock table poisoned"))?;
        Ok(entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Acquire every key in ascending order, waiting at most `timeout` in
    /// total. Duplicate keys are taken once.
    pub async fn acquire<I>(&self, keys: I, timeout: Duration) -> BoardResult<LockGuard>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let started = Instant::now();
        let deadline = started + timeout;
        let mut guards = Vec::with_capacity(keys.len());

        for key in &keys {
            let mutex = self.entry(key)?;
            match tokio::time::timeout_at(deadline, mutex.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    tracing::warn!(%key, waited_ms, "Timed out waiting for board lock");
                    return Err(BoardError::LockTimeout { waited_ms });
                }
            }
        }

        Ok(LockGuard {
            keys,
            _guards: guards,
        })
    }

    /// Drop the table entry for a key nobody holds or waits on.
    /// Used after the guarded column or board is deleted.
    pub fn forget(&self, key: &LockKey) {
        if let Ok(mut entries) = self.entries.lock()
            && entries
                .get(key)
                .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            entries.remove(key);
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: &str) -> LockKey {
        LockKey::Column(id.to_string())
    }

    #[test]
    fn test_board_keys_sort_first() {
        let mut keys = vec![column("a"), LockKey::Board("z".into()), column("0")];
        keys.sort();
        assert_eq!(keys[0], LockKey::Board("z".into()));
        assert_eq!(keys[1], column("0"));
    }

    #[tokio::test]
    async fn test_acquire_dedups_and_sorts() {
        let table = LockTable::new();
        let guard = table
            .acquire([column("b"), column("a"), column("b")], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(guard.keys(), &[column("a"), column("b")]);
    }

    #[tokio::test]
    async fn test_acquire_times_out_while_held() {
        let table = LockTable::new();
        let _held = table
            .acquire([column("a")], Duration::from_secs(1))
            .await
            .unwrap();

        let result = table
            .acquire([column("a")], Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(BoardError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let table = LockTable::new();
        let _a = table
            .acquire([column("a")], Duration::from_secs(1))
            .await
            .unwrap();
        let b = table
            .acquire([column("b")], Duration::from_millis(20))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let table = LockTable::new();
        let guard = table
            .acquire([column("a")], Duration::from_secs(1))
            .await
            .unwrap();
        drop(guard);
        assert!(
            table
                .acquire([column("a")], Duration::from_millis(20))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_forget_only_idle_keys() {
        let table = LockTable::new();
        let guard = table
            .acquire([column("a")], Duration::from_secs(1))
            .await
            .unwrap();
        table.forget(&column("a"));
        assert_eq!(table.len(), 1);

        drop(guard);
        table.forget(&column("a"));
        assert!(table.is_empty());
    }
}
