//! Concurrent movers sharing one store.
//!
//! Every failed attempt means some other writer committed, so with `n`
//! writers no request needs more than `n` attempts; the retry budget here is
//! set above that.

use std::sync::Arc;

use ordinal::store::InMemory;
use ordinal::{Config, ContainerId, ItemId, OrderedCollection, RetryPolicy};

use crate::helpers::*;

fn board() -> ContainerId {
    ContainerId::from("board")
}

fn generous_retries() -> Config {
    Config {
        retry: RetryPolicy {
            max_attempts: 32,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_into_same_gap() {
    let cards = Arc::new(OrderedCollection::new(test_store().await, generous_retries()).unwrap());
    seed(cards.store().as_ref(), &board(), &[("head", 0.0), ("tail", 1000.0)]).await;

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let cards = cards.clone();
            tokio::spawn(async move {
                cards
                    .insert_after(&board(), &ItemId::from(format!("w{n}")), &ItemId::from("head"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ids = order(&cards, &board()).await;
    assert_eq!(ids.len(), 10);
    assert_eq!(ids.first().map(String::as_str), Some("head"));
    assert_eq!(ids.last().map(String::as_str), Some("tail"));

    let keys = values(&cards, &board()).await;
    assert_strictly_increasing(&keys);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_gaps_do_not_conflict() {
    // In memory, so that only the guard can cause a conflict.
    let store = Arc::new(CountingStore::new(Arc::new(InMemory::new())));
    let cards = Arc::new(collection_over(store.clone()));
    let anchors: Vec<(String, f64)> = (0..9).map(|n| (format!("a{n}"), n as f64 * 1000.0)).collect();
    let seeded: Vec<(&str, f64)> = anchors.iter().map(|(name, v)| (name.as_str(), *v)).collect();
    seed(store.as_ref(), &board(), &seeded).await;
    let seeded_writes = store.writes();

    // One writer per gap: a{n} .. a{n+1}.
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let cards = cards.clone();
            tokio::spawn(async move {
                cards
                    .insert_after(&board(), &ItemId::from(format!("g{n}")), &ItemId::from(format!("a{n}")))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.key.value % 1000.0, 500.0);
    }

    assert_eq!(store.writes() - seeded_writes, 8);
    assert_strictly_increasing(&values(&cards, &board()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_moves_racing_a_rebalance() {
    let cards = Arc::new(OrderedCollection::new(test_store().await, generous_retries()).unwrap());
    for n in 0..6 {
        cards
            .move_to_bottom(&board(), &ItemId::from(format!("i{n}")))
            .await
            .unwrap();
    }

    let rebalancer = {
        let cards = cards.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                cards.rebalance(&board()).await?;
                tokio::task::yield_now().await;
            }
            Ok::<_, ordinal::Error>(())
        })
    };
    let movers: Vec<_> = (0..6)
        .map(|n| {
            let cards = cards.clone();
            tokio::spawn(async move {
                let item = ItemId::from(format!("i{n}"));
                if n % 2 == 0 {
                    cards.move_to_top(&board(), &item).await
                } else {
                    cards.move_to_bottom(&board(), &item).await
                }
            })
        })
        .collect();

    rebalancer.await.unwrap().unwrap();
    for mover in movers {
        mover.await.unwrap().unwrap();
    }

    let ids = order(&cards, &board()).await;
    assert_eq!(ids.len(), 6);
    assert_strictly_increasing(&values(&cards, &board()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_item_moved_concurrently() {
    let cards = Arc::new(OrderedCollection::new(test_store().await, generous_retries()).unwrap());
    for name in ["a", "b", "c", "d"] {
        cards.move_to_bottom(&board(), &ItemId::from(name)).await.unwrap();
    }

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let cards = cards.clone();
            tokio::spawn(async move {
                let item = ItemId::from("a");
                match n % 3 {
                    0 => cards.move_to_bottom(&board(), &item).await,
                    1 => cards.move_to_top(&board(), &item).await,
                    _ => cards.insert_after(&board(), &item, &ItemId::from("b")).await,
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Exactly one row for "a", wherever the last writer put it.
    let ids = order(&cards, &board()).await;
    assert_eq!(ids.iter().filter(|id| id.as_str() == "a").count(), 1);
    assert_eq!(ids.len(), 4);
    assert_strictly_increasing(&values(&cards, &board()).await);
}
