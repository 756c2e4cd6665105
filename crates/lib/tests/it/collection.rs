//! OrderedCollection behaviour: creation, moves, retries, failures.

use std::sync::Arc;

use ordinal::store::InMemory;
use ordinal::{Config, ContainerId, ItemId, OrderedCollection, Placement, RetryPolicy};

use crate::helpers::*;

fn board() -> ContainerId {
    ContainerId::from("board")
}

fn id(name: &str) -> ItemId {
    ItemId::from(name)
}

#[tokio::test]
async fn test_build_list_with_every_operation() {
    let cards = test_collection().await;
    cards.move_to_top(&board(), &id("c")).await.unwrap();
    cards.move_to_top(&board(), &id("a")).await.unwrap();
    cards.insert_after(&board(), &id("b"), &id("a")).await.unwrap();
    cards.move_to_bottom(&board(), &id("e")).await.unwrap();
    cards.insert_before(&board(), &id("d"), &id("e")).await.unwrap();

    assert_eq!(order(&cards, &board()).await, vec!["a", "b", "c", "d", "e"]);
    assert_strictly_increasing(&values(&cards, &board()).await);
}

#[tokio::test]
async fn test_move_only_touches_the_mover() {
    let store = Arc::new(CountingStore::new(test_store().await));
    let cards = collection_over(store.clone());
    seed(store.as_ref(), &board(), &[("a", 0.0), ("b", 1000.0), ("c", 2000.0)]).await;
    let writes_before = store.writes();

    cards.insert_after(&board(), &id("c"), &id("a")).await.unwrap();
    assert_eq!(store.writes() - writes_before, 1);
    assert_eq!(values(&cards, &board()).await, vec![0.0, 500.0, 1000.0]);
    assert_eq!(order(&cards, &board()).await, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_place_matches_named_operations() {
    let cards = test_collection().await;
    cards.place(&board(), &id("b"), Placement::Bottom).await.unwrap();
    cards.place(&board(), &id("a"), Placement::Top).await.unwrap();
    cards
        .place(&board(), &id("c"), Placement::After(id("b")))
        .await
        .unwrap();
    cards
        .place(&board(), &id("ab"), Placement::Before(id("b")))
        .await
        .unwrap();
    assert_eq!(order(&cards, &board()).await, vec!["a", "ab", "b", "c"]);
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let store = Arc::new(CountingStore::with_conflicts(test_store().await, 3));
    let cards = collection_over(store.clone());

    let outcome = cards.move_to_top(&board(), &id("a")).await.unwrap();
    assert_eq!(outcome.key.value, 0.0);
    assert_eq!(store.writes(), 4);
}

#[tokio::test]
async fn test_conflicts_give_up_after_max_attempts() {
    let store = Arc::new(CountingStore::with_conflicts(test_store().await, 100));
    let cards = OrderedCollection::new(
        store.clone(),
        Config {
            retry: RetryPolicy::immediate(3),
            ..Config::default()
        },
    )
    .unwrap();

    let err = cards.move_to_top(&board(), &id("a")).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.module(), "collection");
    assert_eq!(store.writes(), 3);
    assert!(cards.ordered_items(&board()).await.unwrap().next().is_none());
}

#[tokio::test]
async fn test_backoff_sleeps_stay_bounded() {
    let store = Arc::new(CountingStore::with_conflicts(Arc::new(InMemory::new()), 2));
    let cards = OrderedCollection::new(store.clone(), Config::default()).unwrap();

    let started = std::time::Instant::now();
    cards.move_to_bottom(&board(), &id("a")).await.unwrap();
    // Two backoffs of at most 2ms and 4ms.
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
    assert_eq!(store.writes(), 3);
}

#[tokio::test]
async fn test_failed_rebalance_leaves_keys_untouched() {
    let store = Arc::new(CountingStore::new(test_store().await).with_rewrite_conflicts(u32::MAX));
    let cards = OrderedCollection::new(
        store.clone(),
        Config {
            retry: RetryPolicy::immediate(3),
            ..Config::default()
        },
    )
    .unwrap();
    let next = f64::from_bits(1.0f64.to_bits() + 1);
    seed(store.as_ref(), &board(), &[("a", 1.0), ("b", next)]).await;
    let writes_before = store.writes();

    // No room between "a" and "b", and every rebalance is rejected.
    let err = cards
        .insert_before(&board(), &id("x"), &id("b"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.rewrites(), 3);
    assert_eq!(store.writes(), writes_before);

    assert_eq!(values(&cards, &board()).await, vec![1.0, next]);
    assert_eq!(order(&cards, &board()).await, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unavailable_store_is_surfaced_as_is() {
    let cards = collection_over(Arc::new(DownStore));
    let err = cards.move_to_top(&board(), &id("a")).await.unwrap_err();
    assert!(err.is_store_unavailable());
    assert!(!err.is_retryable());

    let err = cards.ordered_items(&board()).await.unwrap_err();
    assert!(err.is_store_unavailable());
}

#[tokio::test]
async fn test_invalid_reference_is_not_retried() {
    let store = Arc::new(CountingStore::new(test_store().await));
    let cards = collection_over(store.clone());
    cards.move_to_top(&board(), &id("a")).await.unwrap();

    let err = cards
        .insert_before(&board(), &id("b"), &id("missing"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_reference());
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn test_reparent_then_move_in_new_container() {
    let cards = test_collection().await;
    let done = ContainerId::from("done");
    cards.move_to_bottom(&board(), &id("a")).await.unwrap();
    cards.move_to_bottom(&board(), &id("b")).await.unwrap();
    cards.move_to_bottom(&done, &id("x")).await.unwrap();

    cards
        .move_to_container(&id("b"), &done, Placement::After(id("x")))
        .await
        .unwrap();
    cards.move_to_top(&done, &id("b")).await.unwrap();

    assert_eq!(order(&cards, &board()).await, vec!["a"]);
    assert_eq!(order(&cards, &done).await, vec!["b", "x"]);

    // The reference must live in the target container.
    let err = cards
        .move_to_container(&id("a"), &done, Placement::Before(id("a")))
        .await
        .unwrap_err();
    assert!(err.is_invalid_reference());
    assert_eq!(order(&cards, &board()).await, vec!["a"]);
}

#[tokio::test]
async fn test_reparent_does_not_recreate_removed_item() {
    let inner = test_store().await;
    seed(inner.as_ref(), &board(), &[("a", 0.0)]).await;
    // The first write loses to a concurrent remove of "a".
    let store = Arc::new(CountingStore::with_conflicts(inner, 1).removing_on_conflict("a"));
    let cards = collection_over(store.clone());
    let done = ContainerId::from("done");

    let err = cards
        .move_to_container(&id("a"), &done, Placement::Bottom)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.writes(), 1);
    assert!(order(&cards, &done).await.is_empty());
    assert!(order(&cards, &board()).await.is_empty());

    let err = cards
        .move_to_container(&id("ghost"), &done, Placement::Top)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_removed_item_can_be_recreated() {
    let cards = test_collection().await;
    cards.move_to_bottom(&board(), &id("a")).await.unwrap();
    cards.move_to_bottom(&board(), &id("b")).await.unwrap();
    assert!(cards.remove(&id("a")).await.unwrap());

    let outcome = cards.move_to_bottom(&board(), &id("a")).await.unwrap();
    assert_eq!(outcome.key.value, 2.0);
    assert_eq!(order(&cards, &board()).await, vec!["b", "a"]);
}

#[tokio::test]
async fn test_containers_listing() {
    let cards = test_collection().await;
    cards.move_to_bottom(&board(), &id("a")).await.unwrap();
    cards.move_to_bottom(&board(), &id("b")).await.unwrap();
    cards
        .move_to_bottom(&ContainerId::from("archive"), &id("z"))
        .await
        .unwrap();

    let listed = cards.containers().await.unwrap();
    assert_eq!(
        listed,
        vec![(ContainerId::from("archive"), 1), (board(), 2)]
    );
}
