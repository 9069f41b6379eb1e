//! Behavior every `BoardStore` backend must share.
//!
//! Each test runs against the in-memory store and an in-memory SQLite
//! database.

use board_engine::db::Database;
use board_engine::error::BoardError;
use board_engine::position::{Key, MIN_KEY_LENGTH, PositionAllocator};
use board_engine::store::{BoardStore, MemoryStore, invariant_violations};
use board_engine::types::{ActivityKind, BoardTree, CardPatch, NewBoard, NewCard, Priority};
use chrono::NaiveDate;

fn backends() -> Vec<(&'static str, Box<dyn BoardStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        (
            "sqlite",
            Box::new(Database::open_in_memory().expect("Failed to create in-memory database")),
        ),
    ]
}

fn small_key_backends() -> Vec<(&'static str, Box<dyn BoardStore>)> {
    let allocator = PositionAllocator::new(MIN_KEY_LENGTH);
    vec![
        ("memory", Box::new(MemoryStore::new().with_allocator(allocator))),
        (
            "sqlite",
            Box::new(
                Database::open_in_memory()
                    .expect("Failed to create in-memory database")
                    .with_allocator(allocator),
            ),
        ),
    ]
}

fn board(store: &dyn BoardStore, columns: &[&str]) -> BoardTree {
    store
        .create_board(NewBoard::named("Board").with_columns(columns.iter().copied()))
        .expect("Failed to create board")
}

fn titles(store: &dyn BoardStore, column_id: &str) -> Vec<String> {
    store
        .column_cards(column_id)
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect()
}

mod board_tests {
    use super::*;

    #[test]
    fn create_board_appends_columns_in_order() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["To Do", "Doing", "Done"]);
            let names: Vec<&str> = tree.columns.iter().map(|c| c.column.name.as_str()).collect();
            assert_eq!(names, vec!["To Do", "Doing", "Done"], "{name}");
            assert!(invariant_violations(&tree).is_empty(), "{name}");
        }
    }

    #[test]
    fn create_board_rejects_blank_name() {
        for (name, store) in backends() {
            let result = store.create_board(NewBoard::named("   "));
            assert!(matches!(result, Err(BoardError::InvalidArgument { .. })), "{name}");
            assert!(store.list_boards().unwrap().is_empty(), "{name}");
        }
    }

    #[test]
    fn list_boards_reports_counts() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A", "B"]);
            store
                .create_card(&tree.columns[0].column.id, NewCard::titled("x"))
                .unwrap();

            let boards = store.list_boards().unwrap();
            assert_eq!(boards.len(), 1, "{name}");
            assert_eq!(boards[0].column_count, 2, "{name}");
            assert_eq!(boards[0].card_count, 1, "{name}");
        }
    }

    #[test]
    fn revision_increases_on_every_mutation() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let before = tree.board.revision;
            let card = store
                .create_card(&tree.columns[0].column.id, NewCard::titled("x"))
                .unwrap();
            store.delete_card(&card.id).unwrap();

            let after = store.get_board(&tree.board.id).unwrap().board.revision;
            assert_eq!(after, before + 2, "{name}");
        }
    }

    #[test]
    fn delete_board_cascades() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let card = store
                .create_card(&tree.columns[0].column.id, NewCard::titled("x"))
                .unwrap();

            store.delete_board(&tree.board.id).unwrap();
            assert!(matches!(
                store.get_card(&card.id),
                Err(BoardError::NotFound { .. })
            ), "{name}");
            assert!(matches!(
                store.get_column(&tree.columns[0].column.id),
                Err(BoardError::NotFound { .. })
            ), "{name}");
            assert!(matches!(
                store.delete_board(&tree.board.id),
                Err(BoardError::NotFound { .. })
            ), "{name}");
        }
    }

    #[test]
    fn get_missing_board_is_not_found() {
        for (name, store) in backends() {
            assert!(matches!(
                store.get_board("missing"),
                Err(BoardError::NotFound { .. })
            ), "{name}");
        }
    }
}

mod card_tests {
    use super::*;

    #[test]
    fn create_card_appends_at_end() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let col = &tree.columns[0].column.id;
            for title in ["one", "two", "three"] {
                store.create_card(col, NewCard::titled(title)).unwrap();
            }
            assert_eq!(titles(store.as_ref(), col), vec!["one", "two", "three"], "{name}");
        }
    }

    #[test]
    fn create_card_defaults() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let card = store
                .create_card(&tree.columns[0].column.id, NewCard::titled("  padded  "))
                .unwrap();
            assert_eq!(card.title, "padded", "{name}");
            assert_eq!(card.priority, Priority::Medium, "{name}");
            assert_eq!(card.version, 1, "{name}");
            assert!(!card.completed, "{name}");
        }
    }

    #[test]
    fn create_card_in_missing_column_is_not_found() {
        for (name, store) in backends() {
            let result = store.create_card("missing", NewCard::titled("x"));
            assert!(matches!(result, Err(BoardError::NotFound { .. })), "{name}");
        }
    }

    #[test]
    fn delete_card_twice_is_not_found() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let col = &tree.columns[0].column.id;
            let a = store.create_card(col, NewCard::titled("a")).unwrap();
            let b = store.create_card(col, NewCard::titled("b")).unwrap();
            let c = store.create_card(col, NewCard::titled("c")).unwrap();

            store.delete_card(&b.id).unwrap();
            assert!(matches!(
                store.delete_card(&b.id),
                Err(BoardError::NotFound { .. })
            ), "{name}");

            // Siblings keep their keys.
            let rest = store.column_cards(col).unwrap();
            assert_eq!(rest[0].position, a.position, "{name}");
            assert_eq!(rest[1].position, c.position, "{name}");
        }
    }

    #[test]
    fn update_card_applies_patch_and_bumps_version() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let mut input = NewCard::titled("Draft");
            input.description = Some("old".into());
            let card = store.create_card(&tree.columns[0].column.id, input).unwrap();

            let due = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
            let patch = CardPatch {
                title: Some("Final".into()),
                description: Some(None),
                priority: Some(Priority::High),
                due_date: Some(Some(due)),
                completed: Some(true),
                ..Default::default()
            };
            let updated = store.update_card(&card.id, &patch).unwrap();
            assert_eq!(updated.version, card.version + 1, "{name}");

            let stored = store.get_card(&card.id).unwrap();
            assert_eq!(stored.title, "Final", "{name}");
            assert_eq!(stored.description, None, "{name}");
            assert_eq!(stored.priority, Priority::High, "{name}");
            assert_eq!(stored.due_date, Some(due), "{name}");
            assert!(stored.completed, "{name}");
            assert_eq!(stored.position, card.position, "{name}");
        }
    }

    #[test]
    fn update_card_rejects_empty_patch() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let card = store
                .create_card(&tree.columns[0].column.id, NewCard::titled("x"))
                .unwrap();
            let result = store.update_card(&card.id, &CardPatch::default());
            assert!(matches!(result, Err(BoardError::InvalidArgument { .. })), "{name}");
        }
    }

    #[test]
    fn appends_renumber_when_tail_is_exhausted() {
        for (name, store) in small_key_backends() {
            let tree = board(store.as_ref(), &["A"]);
            let col = &tree.columns[0].column.id;
            for i in 0..150 {
                store.create_card(col, NewCard::titled(format!("c{i:03}"))).unwrap();
            }

            let cards = store.column_cards(col).unwrap();
            let expected: Vec<String> = (0..150).map(|i| format!("c{i:03}")).collect();
            let actual: Vec<String> = cards.iter().map(|c| c.title.clone()).collect();
            assert_eq!(actual, expected, "{name}");
            assert!(cards.iter().all(|c| c.position.len() <= MIN_KEY_LENGTH), "{name}");
            assert!(
                cards.windows(2).all(|w| w[0].position < w[1].position),
                "{name}"
            );
        }
    }
}

mod move_tests {
    use super::*;

    #[test]
    fn apply_move_across_columns() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A", "B"]);
            let a = &tree.columns[0].column.id;
            let b = &tree.columns[1].column.id;
            let card = store.create_card(a, NewCard::titled("x")).unwrap();

            let key = Key::parse("V").unwrap();
            let moved = store.apply_move(&card.id, b, &key, card.version).unwrap();
            assert_eq!(moved.column_id, *b, "{name}");
            assert_eq!(moved.version, card.version + 1, "{name}");

            let tree = store.get_board(&tree.board.id).unwrap();
            assert!(tree.columns[0].cards.is_empty(), "{name}");
            assert_eq!(tree.columns[1].cards.len(), 1, "{name}");
        }
    }

    #[test]
    fn apply_move_with_stale_version_changes_nothing() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A", "B"]);
            let a = &tree.columns[0].column.id;
            let b = &tree.columns[1].column.id;
            let card = store.create_card(a, NewCard::titled("x")).unwrap();
            let before = store.get_board(&tree.board.id).unwrap();

            let key = Key::parse("V").unwrap();
            let result = store.apply_move(&card.id, b, &key, card.version + 7);
            assert!(matches!(
                result,
                Err(BoardError::ConcurrentModification { .. })
            ), "{name}");
            assert_eq!(store.get_board(&tree.board.id).unwrap(), before, "{name}");
        }
    }

    #[test]
    fn apply_move_onto_taken_key_is_concurrent_modification() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A", "B"]);
            let a = &tree.columns[0].column.id;
            let b = &tree.columns[1].column.id;
            let x = store.create_card(a, NewCard::titled("x")).unwrap();
            let y = store.create_card(b, NewCard::titled("y")).unwrap();

            let result = store.apply_move(&x.id, b, &y.position, x.version);
            assert!(matches!(
                result,
                Err(BoardError::ConcurrentModification { .. })
            ), "{name}");
            assert_eq!(store.get_card(&x.id).unwrap().column_id, *a, "{name}");
        }
    }

    #[test]
    fn apply_move_across_boards_is_rejected() {
        for (name, store) in backends() {
            let first = board(store.as_ref(), &["A"]);
            let second = board(store.as_ref(), &["B"]);
            let card = store
                .create_card(&first.columns[0].column.id, NewCard::titled("x"))
                .unwrap();

            let key = Key::parse("V").unwrap();
            let result =
                store.apply_move(&card.id, &second.columns[0].column.id, &key, card.version);
            assert!(matches!(result, Err(BoardError::InvalidArgument { .. })), "{name}");
        }
    }

    #[test]
    fn apply_move_missing_target_is_not_found() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let card = store
                .create_card(&tree.columns[0].column.id, NewCard::titled("x"))
                .unwrap();
            let key = Key::parse("V").unwrap();
            let result = store.apply_move(&card.id, "missing", &key, card.version);
            assert!(matches!(result, Err(BoardError::NotFound { .. })), "{name}");
        }
    }

    #[test]
    fn renumber_keeps_order_and_versions() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let col = &tree.columns[0].column.id;
            for i in 0..10 {
                store.create_card(col, NewCard::titled(format!("c{i}"))).unwrap();
            }
            let before = store.column_cards(col).unwrap();
            let after = store.renumber_column(col).unwrap();

            let ids = |cards: &[board_engine::types::Card]| {
                cards.iter().map(|c| c.id.clone()).collect::<Vec<_>>()
            };
            assert_eq!(ids(&before), ids(&after), "{name}");
            assert_eq!(ids(&store.column_cards(col).unwrap()), ids(&before), "{name}");
            for (a, b) in after.iter().zip(&before) {
                assert_eq!(a.version, b.version, "{name}");
            }
        }
    }
}

mod column_tests {
    use super::*;

    #[test]
    fn delete_non_empty_column_requires_cascade() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["X", "Y"]);
            let y = &tree.columns[1].column.id;
            let c1 = store.create_card(y, NewCard::titled("one")).unwrap();
            store.create_card(y, NewCard::titled("two")).unwrap();

            let result = store.delete_column(y, false);
            assert!(
                matches!(result, Err(BoardError::ColumnNotEmpty { count: 2, .. })),
                "{name}"
            );
            assert_eq!(store.column_cards(y).unwrap().len(), 2, "{name}");

            assert_eq!(store.delete_column(y, true).unwrap(), 2, "{name}");
            let after = store.get_board(&tree.board.id).unwrap();
            assert_eq!(after.columns.len(), 1, "{name}");
            assert!(after.columns.iter().all(|c| c.column.id != *y), "{name}");
            assert!(after.column_of(&c1.id).is_none(), "{name}");
            assert!(store.get_card(&c1.id).is_err(), "{name}");
        }
    }

    #[test]
    fn delete_empty_column_without_cascade() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["X"]);
            let x = &tree.columns[0].column.id;
            assert_eq!(store.delete_column(x, false).unwrap(), 0, "{name}");
            assert!(store.get_column(x).is_err(), "{name}");
        }
    }

    #[test]
    fn apply_column_move_reorders_board() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A", "B"]);
            let b = &tree.columns[1].column;
            let head = PositionAllocator::default()
                .allocate(None, Some(&tree.columns[0].column.position))
                .unwrap();

            let moved = store.apply_column_move(&b.id, &head, b.version).unwrap();
            assert_eq!(moved.version, b.version + 1, "{name}");

            let names: Vec<String> = store
                .board_columns(&tree.board.id)
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            assert_eq!(names, vec!["B", "A"], "{name}");
        }
    }

    #[test]
    fn renumber_board_columns_keeps_order() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A", "B", "C"]);
            let renumbered = store.renumber_board_columns(&tree.board.id).unwrap();
            let names: Vec<&str> = renumbered.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["A", "B", "C"], "{name}");
            assert!(
                renumbered.windows(2).all(|w| w[0].position < w[1].position),
                "{name}"
            );
        }
    }
}

mod activity_tests {
    use super::*;

    #[test]
    fn activity_is_newest_first_and_limited() {
        for (name, store) in backends() {
            let tree = board(store.as_ref(), &["A"]);
            let card = store
                .create_card(&tree.columns[0].column.id, NewCard::titled("x"))
                .unwrap();
            store.delete_card(&card.id).unwrap();

            let entries = store.board_activity(&tree.board.id, 2).unwrap();
            assert_eq!(entries.len(), 2, "{name}");
            assert_eq!(entries[0].kind, ActivityKind::CardDeleted, "{name}");
            assert_eq!(entries[1].kind, ActivityKind::CardCreated, "{name}");
            assert_eq!(entries[0].entity_id, card.id, "{name}");

            let all = store.board_activity(&tree.board.id, 100).unwrap();
            assert_eq!(all.last().unwrap().kind, ActivityKind::BoardCreated, "{name}");
        }
    }

    #[test]
    fn activity_for_missing_board_is_not_found() {
        for (name, store) in backends() {
            assert!(matches!(
                store.board_activity("missing", 10),
                Err(BoardError::NotFound { .. })
            ), "{name}");
        }
    }
}
