//! Contract tests run against whichever store TEST_BACKEND selects.

use ordinal::store::{Direction, Edge, InMemory, KeyRewrite, KeyWrite, NeighborGuard, PositionStore};
use ordinal::position::Allocator;
use ordinal::{ContainerId, ItemId, PositionKey};

use crate::helpers::*;

fn board() -> ContainerId {
    ContainerId::from("board")
}

#[tokio::test]
async fn test_reads_are_ordered() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", -1.0), ("b", 0.0), ("c", 0.5)]).await;

    let keys = store.read_all_ordered(&board()).await.unwrap();
    let items: Vec<_> = keys.iter().map(|k| k.item().as_str()).collect();
    assert_eq!(items, vec!["a", "b", "c"]);

    assert_eq!(
        store.read_edge(&board(), Edge::First).await.unwrap(),
        Some(PositionKey::new(-1.0, "a"))
    );
    assert_eq!(
        store.read_edge(&board(), Edge::Last).await.unwrap(),
        Some(PositionKey::new(0.5, "c"))
    );
    assert_eq!(
        store.read_edge(&ContainerId::from("empty"), Edge::First).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_read_neighbors() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 1.0), ("c", 2.0)]).await;

    let (lower, upper) = store
        .read_neighbors(&board(), &ItemId::from("b"), Direction::Before)
        .await
        .unwrap();
    assert_eq!(lower, Some(PositionKey::new(0.0, "a")));
    assert_eq!(upper, Some(PositionKey::new(1.0, "b")));

    let (lower, upper) = store
        .read_neighbors(&board(), &ItemId::from("c"), Direction::After)
        .await
        .unwrap();
    assert_eq!(lower, Some(PositionKey::new(2.0, "c")));
    assert_eq!(upper, None);

    let (lower, _) = store
        .read_neighbors(&board(), &ItemId::from("a"), Direction::Before)
        .await
        .unwrap();
    assert_eq!(lower, None);

    let err = store
        .read_neighbors(&ContainerId::from("other"), &ItemId::from("a"), Direction::After)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_neighbors_break_ties_by_id() {
    let store = InMemory::new();
    seed(&store, &board(), &[("a", 1.0), ("b", 1.0)]).await;

    let (lower, _) = store
        .read_neighbors(&board(), &ItemId::from("b"), Direction::Before)
        .await
        .unwrap();
    assert_eq!(lower.map(|k| k.item().to_string()), Some("a".to_string()));
}

#[tokio::test]
async fn test_write_key_rejects_stale_prior() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 1.0)]).await;

    let err = store
        .write_key(KeyWrite {
            container: board(),
            item: ItemId::from("a"),
            value: 2.0,
            expected_prior: Some((board(), 0.5)),
            guard: NeighborGuard::new(Some(PositionKey::new(1.0, "b")), None),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Creating an item that already exists is stale too.
    let err = store
        .write_key(KeyWrite {
            container: board(),
            item: ItemId::from("a"),
            value: 2.0,
            expected_prior: None,
            guard: NeighborGuard::new(Some(PositionKey::new(1.0, "b")), None),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        store.read_edge(&board(), Edge::First).await.unwrap(),
        Some(PositionKey::new(0.0, "a"))
    );
}

#[tokio::test]
async fn test_write_key_rejects_taken_gap() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 0.5), ("c", 1.0)]).await;

    // Guard read before "b" landed between "a" and "c".
    let err = store
        .write_key(KeyWrite {
            container: board(),
            item: ItemId::from("x"),
            value: 0.5,
            expected_prior: None,
            guard: NeighborGuard::new(
                Some(PositionKey::new(0.0, "a")),
                Some(PositionKey::new(1.0, "c")),
            ),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(store.get_item(&ItemId::from("x")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_key_rejects_moved_neighbour() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 1.0)]).await;

    let err = store
        .write_key(KeyWrite {
            container: board(),
            item: ItemId::from("x"),
            value: 0.5,
            expected_prior: None,
            guard: NeighborGuard::new(
                Some(PositionKey::new(0.0, "a")),
                Some(PositionKey::new(2.0, "b")),
            ),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_write_key_ignores_mover_inside_gap() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 1.0), ("c", 2.0)]).await;

    // "b" moves within its own gap.
    store
        .write_key(KeyWrite {
            container: board(),
            item: ItemId::from("b"),
            value: 1.5,
            expected_prior: Some((board(), 1.0)),
            guard: NeighborGuard::new(
                Some(PositionKey::new(0.0, "a")),
                Some(PositionKey::new(2.0, "c")),
            ),
        })
        .await
        .unwrap();
    let item = store.get_item(&ItemId::from("b")).await.unwrap().unwrap();
    assert_eq!(item.position.value, 1.5);
}

#[tokio::test]
async fn test_rewrite_container_is_all_or_nothing() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.25), ("b", 0.5)]).await;

    // Missing "b" from the rewrite set.
    let err = store
        .rewrite_container(
            &board(),
            &[KeyRewrite {
                item: ItemId::from("a"),
                expected: 0.25,
                value: 0.0,
            }],
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Stale expectation on "b".
    let err = store
        .rewrite_container(
            &board(),
            &[
                KeyRewrite {
                    item: ItemId::from("a"),
                    expected: 0.25,
                    value: 0.0,
                },
                KeyRewrite {
                    item: ItemId::from("b"),
                    expected: 0.75,
                    value: 1000.0,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let keys = store.read_all_ordered(&board()).await.unwrap();
    let values: Vec<f64> = keys.iter().map(|k| k.value).collect();
    assert_eq!(values, vec![0.25, 0.5]);
}

#[tokio::test]
async fn test_remove_and_list_containers() {
    let store = test_store().await;
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 1.0)]).await;
    seed(store.as_ref(), &ContainerId::from("archive"), &[("z", 0.0)]).await;

    assert!(store.remove_item(&ItemId::from("a")).await.unwrap());
    assert!(!store.remove_item(&ItemId::from("a")).await.unwrap());

    let containers = store.containers().await.unwrap();
    assert_eq!(
        containers,
        vec![(ContainerId::from("archive"), 1), (board(), 1)]
    );
    let b = store.get_item(&ItemId::from("b")).await.unwrap().unwrap();
    assert_eq!(b.position.value, 1.0);
}

#[tokio::test]
async fn test_keys_keep_full_precision() {
    let store = test_store().await;
    let tiny = 1.0 + f64::EPSILON;
    seed(store.as_ref(), &board(), &[("a", 1.0), ("b", tiny)]).await;

    let keys = store.read_all_ordered(&board()).await.unwrap();
    assert_eq!(keys[1].value.to_bits(), tiny.to_bits());
}

#[tokio::test]
async fn test_in_memory_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordinal.json");

    let store = InMemory::new();
    seed(&store, &board(), &[("a", 0.1), ("b", 0.30000000000000004)]).await;
    store.save_to_file(&path).await.unwrap();

    let loaded = InMemory::load_from_file(&path).await.unwrap();
    assert_eq!(
        loaded.read_all_ordered(&board()).await.unwrap(),
        store.read_all_ordered(&board()).await.unwrap()
    );

    let missing = InMemory::load_from_file(dir.path().join("missing.json"))
        .await
        .unwrap();
    assert!(missing.is_empty().await);
}

#[tokio::test]
async fn test_in_memory_file_keeps_exhausted_gap_order() {
    // Insert before "b" until the gap below it has no representable interior.
    let allocator = Allocator::default();
    let upper = PositionKey::new(1.0, "b");
    let mut lower = PositionKey::new(0.0, "first");
    let mut names = vec!["first".to_string()];
    let mut keys = vec![0.0];
    while let Ok(value) = allocator.between(Some(&lower), Some(&upper)) {
        let name = format!("z{:02}", names.len());
        lower = PositionKey::new(value, name.as_str());
        names.push(name);
        keys.push(value);
    }
    names.push("b".to_string());
    keys.push(1.0);
    assert!(keys.len() > 50);

    let store = InMemory::new();
    let seeded: Vec<(&str, f64)> = names
        .iter()
        .map(String::as_str)
        .zip(keys.iter().copied())
        .collect();
    seed(&store, &board(), &seeded).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordinal.json");
    store.save_to_file(&path).await.unwrap();
    let loaded = InMemory::load_from_file(&path).await.unwrap();

    let reloaded = loaded.read_all_ordered(&board()).await.unwrap();
    let reloaded_names: Vec<&str> = reloaded.iter().map(|k| k.item().as_str()).collect();
    let reloaded_bits: Vec<u64> = reloaded.iter().map(|k| k.value.to_bits()).collect();
    let expected_bits: Vec<u64> = keys.iter().map(|v| v.to_bits()).collect();
    assert_eq!(reloaded_names, names);
    assert_eq!(reloaded_bits, expected_bits);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_file_persists() {
    use ordinal::store::sql::Sqlite;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordinal.db");
    {
        let store = Sqlite::open_sqlite(&path).await.unwrap();
        seed(&store, &board(), &[("a", 0.0), ("b", 0.5)]).await;
        store.pool().close().await;
    }
    let store = Sqlite::open_sqlite(&path).await.unwrap();
    let keys = store.read_all_ordered(&board()).await.unwrap();
    assert_eq!(keys, vec![PositionKey::new(0.0, "a"), PositionKey::new(0.5, "b")]);
}
