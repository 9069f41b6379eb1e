//! Move coordinator: serializes mutations per column and turns drop indexes
//! into position keys.
//!
//! Every order-changing operation runs as lock → read → compute → write →
//! unlock. Card operations lock the affected columns; column operations lock
//! the board. Allocation never escapes as an error: if the key space between
//! two neighbors is exhausted the container is renumbered and allocation is
//! retried once inside the same lock.

use crate::error::{BoardError, BoardResult, Entity};
use crate::locks::{LockGuard, LockKey, LockTable};
use crate::position::{AllocError, Key, PositionAllocator};
use crate::store::BoardStore;
use crate::types::{Card, CardPatch, Column, NewCard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a lock wait.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// How often a move re-locks after its card changed column while it waited.
const MAX_RELOCK_ATTEMPTS: usize = 3;

/// A committed drop from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub card_id: String,
    pub target_column_id: String,
    /// Zero-based slot in the target column's current list. Clamped to the
    /// list length; negative values are rejected.
    pub target_index: i64,
    /// Version the client last saw. `None` skips the optimistic check.
    pub expected_version: Option<i64>,
}

/// Result of a successful `move_card`.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// The card was written at its new position.
    Applied(Card),
    /// The card already sat at the requested slot; nothing was written.
    Unchanged(Card),
    /// A newer request for the same card arrived while this one was queued.
    Superseded(Card),
}

impl MoveOutcome {
    pub fn card(&self) -> &Card {
        match self {
            MoveOutcome::Applied(card)
            | MoveOutcome::Unchanged(card)
            | MoveOutcome::Superseded(card) => card,
        }
    }

    pub fn into_card(self) -> Card {
        match self {
            MoveOutcome::Applied(card)
            | MoveOutcome::Unchanged(card)
            | MoveOutcome::Superseded(card) => card,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied(_))
    }
}

/// Where a moved item lands relative to its new neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    Unchanged,
    Between(Option<Key>, Option<Key>),
}

/// Resolve a slot index to neighbor keys.
///
/// `items` is the current ordered `(id, key)` list of the container, possibly
/// including the moving item. The index counts slots in that list; when the
/// moving item sits before the slot, the slot shifts left by one once the
/// item is taken out.
fn place<'a, I>(items: I, moving_id: &str, target_index: i64) -> BoardResult<Placement>
where
    I: IntoIterator<Item = (&'a str, &'a Key)>,
{
    if target_index < 0 {
        return Err(BoardError::invalid(
            "position",
            format!("target index must not be negative (got {target_index})"),
        ));
    }

    let mut current = None;
    let mut rest: Vec<&Key> = Vec::new();
    let mut len = 0usize;
    for (i, (id, key)) in items.into_iter().enumerate() {
        len += 1;
        if id == moving_id {
            current = Some(i);
        } else {
            rest.push(key);
        }
    }

    let index = (target_index as u64).min(len as u64) as usize;
    let slot = match current {
        Some(p) if index > p => index - 1,
        _ => index,
    }
    .min(rest.len());

    if current == Some(slot) {
        return Ok(Placement::Unchanged);
    }

    let before = slot.checked_sub(1).and_then(|i| rest.get(i)).map(|k| (*k).clone());
    let after = rest.get(slot).map(|k| (*k).clone());
    Ok(Placement::Between(before, after))
}

fn cross_board_move() -> BoardError {
    BoardError::invalid(
        "columnId",
        "cards can only move between columns of the same board",
    )
}

/// Serializes board mutations and allocates position keys.
pub struct MoveCoordinator {
    store: Arc<dyn BoardStore>,
    locks: LockTable,
    allocator: PositionAllocator,
    lock_timeout: Duration,
    next_ticket: AtomicU64,
    /// Pending move tickets per card. Only the highest one may write.
    tickets: Mutex<HashMap<String, BTreeSet<u64>>>,
}

impl MoveCoordinator {
    pub fn new(store: Arc<dyn BoardStore>) -> Self {
        Self {
            store,
            locks: LockTable::new(),
            allocator: PositionAllocator::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            next_ticket: AtomicU64::new(1),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_allocator(mut self, allocator: PositionAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    async fn lock<I>(&self, keys: I) -> BoardResult<LockGuard>
    where
        I: IntoIterator<Item = LockKey>,
    {
        self.locks.acquire(keys, self.lock_timeout).await
    }

    /// Register a pending request for `card_id`; the highest pending ticket
    /// supersedes the others.
    fn issue_ticket(&self, card_id: &str) -> BoardResult<u64> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut tickets = self
            .tickets
            .lock()
            .map_err(|_| BoardError::internal("ticket table poisoned"))?;
        tickets.entry(card_id.to_string()).or_default().insert(ticket);
        Ok(ticket)
    }

    fn is_latest(&self, card_id: &str, ticket: u64) -> bool {
        self.tickets
            .lock()
            .map(|t| t.get(card_id).and_then(|pending| pending.last()) == Some(&ticket))
            .unwrap_or(true)
    }

    /// Drop `ticket`; an older pending request becomes the latest again.
    fn retire_ticket(&self, card_id: &str, ticket: u64) {
        if let Ok(mut tickets) = self.tickets.lock()
            && let Some(pending) = tickets.get_mut(card_id)
        {
            pending.remove(&ticket);
            if pending.is_empty() {
                tickets.remove(card_id);
            }
        }
    }

    /// Move a card to a slot of a column on the same board.
    pub async fn move_card(&self, request: MoveRequest) -> BoardResult<MoveOutcome> {
        let result = self.run_move(&request).await;

        match &result {
            Ok(MoveOutcome::Applied(card)) => debug!(
                card_id = %card.id,
                column_id = %card.column_id,
                position = %card.position,
                version = card.version,
                "Card moved"
            ),
            Ok(MoveOutcome::Superseded(_)) => {
                debug!(card_id = %request.card_id, "Move superseded by newer request")
            }
            Ok(MoveOutcome::Unchanged(_)) => {
                debug!(card_id = %request.card_id, "Move left card in place")
            }
            Err(e) => warn!(card_id = %request.card_id, error = %e, "Move rejected"),
        }
        result
    }

    async fn run_move(&self, request: &MoveRequest) -> BoardResult<MoveOutcome> {
        // A request rejected here never takes a ticket, so it cannot
        // supersede a valid move already queued for the same card.
        let (target_column, observed) = self.check_move(request)?;

        let ticket = self.issue_ticket(&request.card_id)?;
        let result = self
            .move_card_locked(request, &target_column, observed, ticket)
            .await;
        self.retire_ticket(&request.card_id, ticket);
        result
    }

    /// Reject requests that cannot apply against the current state.
    fn check_move(&self, request: &MoveRequest) -> BoardResult<(Column, Card)> {
        if request.target_index < 0 {
            return Err(BoardError::invalid(
                "position",
                format!(
                    "target index must not be negative (got {})",
                    request.target_index
                ),
            ));
        }
        let target_column = self.store.get_column(&request.target_column_id)?;
        let card = self.store.get_card(&request.card_id)?;
        if let Some(expected) = request.expected_version
            && expected != card.version
        {
            return Err(BoardError::card_version_mismatch(
                &card.id,
                expected,
                card.version,
            ));
        }
        let source = self.store.get_column(&card.column_id)?;
        if source.board_id != target_column.board_id {
            return Err(cross_board_move());
        }
        Ok((target_column, card))
    }

    async fn move_card_locked(
        &self,
        request: &MoveRequest,
        target_column: &Column,
        mut observed: Card,
        ticket: u64,
    ) -> BoardResult<MoveOutcome> {

        for _ in 0..MAX_RELOCK_ATTEMPTS {
            let _guard = self
                .lock([
                    LockKey::Column(observed.column_id.clone()),
                    LockKey::Column(target_column.id.clone()),
                ])
                .await?;

            let card = self.store.get_card(&request.card_id)?;
            if !self.is_latest(&card.id, ticket) {
                return Ok(MoveOutcome::Superseded(card));
            }
            if let Some(expected) = request.expected_version
                && expected != card.version
            {
                return Err(BoardError::card_version_mismatch(
                    &card.id,
                    expected,
                    card.version,
                ));
            }
            if card.column_id != observed.column_id {
                // Moved by someone else while we waited; the locks we hold
                // no longer cover its source column.
                observed = card;
                continue;
            }

            let source = self.store.get_column(&card.column_id)?;
            if source.board_id != target_column.board_id {
                return Err(cross_board_move());
            }

            let Some((before, after)) =
                self.card_neighbors(&card, &target_column.id, request.target_index)?
            else {
                return Ok(MoveOutcome::Unchanged(card));
            };

            let position = match self.allocator.allocate(before.as_ref(), after.as_ref()) {
                Ok(key) => key,
                Err(AllocError::KeySpaceExhausted { .. }) => {
                    let renumbered = self.store.renumber_column(&target_column.id)?;
                    warn!(
                        column_id = %target_column.id,
                        cards = renumbered.len(),
                        "Position keys exhausted; renumbered column"
                    );
                    let Some((before, after)) =
                        self.card_neighbors(&card, &target_column.id, request.target_index)?
                    else {
                        return Ok(MoveOutcome::Unchanged(card));
                    };
                    self.allocator
                        .allocate(before.as_ref(), after.as_ref())
                        .map_err(BoardError::internal)?
                }
                Err(e) => return Err(BoardError::internal(e)),
            };

            let moved =
                self.store
                    .apply_move(&card.id, &target_column.id, &position, card.version)?;
            return Ok(MoveOutcome::Applied(moved));
        }

        Err(BoardError::concurrent(
            Entity::Card,
            &request.card_id,
            "card kept changing column while the move waited",
        ))
    }

    fn card_neighbors(
        &self,
        card: &Card,
        target_column_id: &str,
        target_index: i64,
    ) -> BoardResult<Option<(Option<Key>, Option<Key>)>> {
        let cards = self.store.column_cards(target_column_id)?;
        let placement = place(
            cards.iter().map(|c| (c.id.as_str(), &c.position)),
            &card.id,
            target_index,
        )?;
        Ok(match placement {
            Placement::Unchanged => None,
            Placement::Between(before, after) => Some((before, after)),
        })
    }

    /// Move a column to a slot among its board's columns.
    pub async fn move_column(
        &self,
        column_id: &str,
        target_index: i64,
        expected_version: Option<i64>,
    ) -> BoardResult<Column> {
        let observed = self.store.get_column(column_id)?;
        let _guard = self.lock([LockKey::Board(observed.board_id.clone())]).await?;

        let column = self.store.get_column(column_id)?;
        if let Some(expected) = expected_version
            && expected != column.version
        {
            return Err(BoardError::column_version_mismatch(
                column_id,
                expected,
                column.version,
            ));
        }

        let Some((before, after)) = self.column_neighbors(&column, target_index)? else {
            return Ok(column);
        };
        let position = match self.allocator.allocate(before.as_ref(), after.as_ref()) {
            Ok(key) => key,
            Err(AllocError::KeySpaceExhausted { .. }) => {
                self.store.renumber_board_columns(&column.board_id)?;
                warn!(board_id = %column.board_id, "Column keys exhausted; renumbered board");
                let Some((before, after)) = self.column_neighbors(&column, target_index)? else {
                    return Ok(column);
                };
                self.allocator
                    .allocate(before.as_ref(), after.as_ref())
                    .map_err(BoardError::internal)?
            }
            Err(e) => return Err(BoardError::internal(e)),
        };

        let moved = self
            .store
            .apply_column_move(column_id, &position, column.version)?;
        debug!(column_id, position = %moved.position, "Column moved");
        Ok(moved)
    }

    fn column_neighbors(
        &self,
        column: &Column,
        target_index: i64,
    ) -> BoardResult<Option<(Option<Key>, Option<Key>)>> {
        let columns = self.store.board_columns(&column.board_id)?;
        let placement = place(
            columns.iter().map(|c| (c.id.as_str(), &c.position)),
            &column.id,
            target_index,
        )?;
        Ok(match placement {
            Placement::Unchanged => None,
            Placement::Between(before, after) => Some((before, after)),
        })
    }

    /// Append a card to a column of `board_id`.
    pub async fn create_card(
        &self,
        board_id: &str,
        column_id: &str,
        input: NewCard,
    ) -> BoardResult<Card> {
        let column = self.store.get_column(column_id)?;
        if column.board_id != board_id {
            return Err(BoardError::invalid(
                "columnId",
                format!("column {column_id} does not belong to board {board_id}"),
            ));
        }

        let _guard = self.lock([LockKey::Column(column_id.to_string())]).await?;
        let card = self.store.create_card(column_id, input)?;
        debug!(card_id = %card.id, column_id, position = %card.position, "Card created");
        Ok(card)
    }

    /// Edit a card's fields under its column lock.
    pub async fn update_card(&self, card_id: &str, patch: &CardPatch) -> BoardResult<Card> {
        let card = self.store.get_card(card_id)?;
        let _guard = self.lock([LockKey::Column(card.column_id)]).await?;
        let updated = self.store.update_card(card_id, patch)?;
        debug!(card_id, version = updated.version, "Card updated");
        Ok(updated)
    }

    pub async fn delete_card(&self, card_id: &str) -> BoardResult<()> {
        let card = self.store.get_card(card_id)?;
        let _guard = self.lock([LockKey::Column(card.column_id.clone())]).await?;
        self.store.delete_card(card_id)?;
        debug!(card_id, column_id = %card.column_id, "Card deleted");
        Ok(())
    }

    pub async fn create_column(
        &self,
        board_id: &str,
        name: &str,
        color: Option<&str>,
    ) -> BoardResult<Column> {
        let _guard = self.lock([LockKey::Board(board_id.to_string())]).await?;
        let column = self.store.create_column(board_id, name, color)?;
        info!(column_id = %column.id, board_id, name = %column.name, "Column created");
        Ok(column)
    }

    /// Delete a column; returns the number of cards removed with it.
    pub async fn delete_column(&self, column_id: &str, cascade: bool) -> BoardResult<usize> {
        let column = self.store.get_column(column_id)?;
        let key = LockKey::Column(column_id.to_string());
        let guard = self
            .lock([LockKey::Board(column.board_id.clone()), key.clone()])
            .await?;

        let removed = self.store.delete_column(column_id, cascade)?;
        drop(guard);
        self.locks.forget(&key);

        info!(column_id, board_id = %column.board_id, removed, "Column deleted");
        Ok(removed)
    }

    /// Delete a board with everything it owns.
    pub async fn delete_board(&self, board_id: &str) -> BoardResult<()> {
        let columns = self.store.board_columns(board_id)?;
        let mut keys: Vec<LockKey> = columns
            .iter()
            .map(|c| LockKey::Column(c.id.clone()))
            .collect();
        keys.push(LockKey::Board(board_id.to_string()));

        let guard = self.lock(keys.clone()).await?;
        self.store.delete_board(board_id)?;
        drop(guard);
        for key in &keys {
            self.locks.forget(key);
        }

        info!(board_id, "Board deleted");
        Ok(())
    }
}
