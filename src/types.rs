//! Core types for the board engine.

use crate::position::Key;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_BOARD_COLOR: &str = "#6366f1";
pub const DEFAULT_COLUMN_COLOR: &str = "#94a3b8";

/// Generate a fresh entity ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Card priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// A board (a project's task board) without its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub name: String,
    pub color: String,
    pub client_id: Option<String>,
    /// Bumped on every mutation of the board, its columns or its cards.
    pub revision: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An ordered lane within a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub color: String,
    pub position: Key,
    /// Optimistic concurrency stamp; bumped by moves and edits.
    pub version: i64,
    pub created_at: i64,
}

/// Counts of weakly-referenced collections owned by other services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCounts {
    pub subtasks: i64,
    pub subtasks_done: i64,
    pub comments: i64,
    pub attachments: i64,
    pub labels: i64,
}

/// A single work item, owned by exactly one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub assignee_id: Option<String>,
    pub client_id: Option<String>,
    pub completed: bool,
    pub position: Key,
    /// Optimistic concurrency stamp; bumped by moves and edits, not by renumbering.
    pub version: i64,
    #[serde(default)]
    pub counts: CardCounts,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A column together with its cards in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTree {
    #[serde(flatten)]
    pub column: Column,
    pub cards: Vec<Card>,
}

/// A board with all of its columns and cards in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardTree {
    #[serde(flatten)]
    pub board: Board,
    pub columns: Vec<ColumnTree>,
}

impl BoardTree {
    /// Find the column currently owning `card_id`.
    pub fn column_of(&self, card_id: &str) -> Option<&ColumnTree> {
        self.columns
            .iter()
            .find(|c| c.cards.iter().any(|card| card.id == card_id))
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }
}

/// Compact board representation for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: String,
    pub name: String,
    pub color: String,
    pub client_id: Option<String>,
    pub revision: i64,
    pub column_count: i64,
    pub card_count: i64,
}

/// Input for creating a board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBoard {
    pub name: String,
    pub color: Option<String>,
    pub client_id: Option<String>,
    /// Column names to create, left to right. Empty means no columns.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl NewBoard {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Input for creating a card.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub assignee_id: Option<String>,
    pub client_id: Option<String>,
}

impl NewCard {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Field changes for an existing card. `None` leaves a field untouched;
/// for nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub client_id: Option<Option<String>>,
    pub completed: Option<bool>,
    pub counts: Option<CardCounts>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.assignee_id.is_none()
            && self.client_id.is_none()
            && self.completed.is_none()
            && self.counts.is_none()
    }

    /// Apply the patch to a card in place.
    pub fn apply_to(&self, card: &mut Card) {
        if let Some(ref title) = self.title {
            card.title = title.trim().to_string();
        }
        if let Some(ref description) = self.description {
            card.description = description.clone();
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            card.due_date = due_date;
        }
        if let Some(ref assignee) = self.assignee_id {
            card.assignee_id = assignee.clone();
        }
        if let Some(ref client) = self.client_id {
            card.client_id = client.clone();
        }
        if let Some(completed) = self.completed {
            card.completed = completed;
        }
        if let Some(counts) = self.counts {
            card.counts = counts;
        }
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Kind of mutation recorded in a board's activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    BoardCreated,
    ColumnCreated,
    ColumnMoved,
    ColumnDeleted,
    ColumnsRenumbered,
    CardCreated,
    CardUpdated,
    CardMoved,
    CardDeleted,
    CardsRenumbered,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::BoardCreated => "board_created",
            ActivityKind::ColumnCreated => "column_created",
            ActivityKind::ColumnMoved => "column_moved",
            ActivityKind::ColumnDeleted => "column_deleted",
            ActivityKind::ColumnsRenumbered => "columns_renumbered",
            ActivityKind::CardCreated => "card_created",
            ActivityKind::CardUpdated => "card_updated",
            ActivityKind::CardMoved => "card_moved",
            ActivityKind::CardDeleted => "card_deleted",
            ActivityKind::CardsRenumbered => "cards_renumbered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "board_created" => Some(ActivityKind::BoardCreated),
            "column_created" => Some(ActivityKind::ColumnCreated),
            "column_moved" => Some(ActivityKind::ColumnMoved),
            "column_deleted" => Some(ActivityKind::ColumnDeleted),
            "columns_renumbered" => Some(ActivityKind::ColumnsRenumbered),
            "card_created" => Some(ActivityKind::CardCreated),
            "card_updated" => Some(ActivityKind::CardUpdated),
            "card_moved" => Some(ActivityKind::CardMoved),
            "card_deleted" => Some(ActivityKind::CardDeleted),
            "cards_renumbered" => Some(ActivityKind::CardsRenumbered),
            _ => None,
        }
    }
}

/// One entry of a board's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i64,
    pub board_id: String,
    pub kind: ActivityKind,
    /// ID of the card or column the entry is about (the board ID for board events).
    pub entity_id: String,
    pub detail: Option<String>,
    pub timestamp: i64,
}
