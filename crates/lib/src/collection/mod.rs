//! Ordered collections of items.
//!
//! [`OrderedCollection`] ties the [`Allocator`], the [`Rebalancer`] and a
//! [`PositionStore`] together. A move reads the neighbours of its target
//! gap, computes a key between them and writes it back conditioned on those
//! neighbours being unchanged. Losing that race is not an error the caller
//! sees: the move re-reads and tries again, with jittered backoff, up to
//! [`RetryPolicy::max_attempts`]. When a gap has no representable interior
//! left, the container is rebalanced once and the move continues against the
//! fresh keys.
//!
//! ```
//! # #[tokio::main]
//! # async fn main() {
//! use std::sync::Arc;
//! use ordinal::{Config, ContainerId, ItemId, OrderedCollection};
//! use ordinal::store::InMemory;
//!
//! let board = ContainerId::from("board");
//! let cards = OrderedCollection::new(Arc::new(InMemory::new()), Config::default()).unwrap();
//!
//! cards.move_to_bottom(&board, &ItemId::from("a")).await.unwrap();
//! cards.move_to_bottom(&board, &ItemId::from("c")).await.unwrap();
//! cards.insert_before(&board, &ItemId::from("b"), &ItemId::from("c")).await.unwrap();
//!
//! let order: Vec<_> = cards
//!     .ordered_items(&board)
//!     .await
//!     .unwrap()
//!     .map(|item| item.id.to_string())
//!     .collect();
//! assert_eq!(order, ["a", "b", "c"]);
//! # }
//! ```

mod errors;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use errors::CollectionError;

use crate::config::{Config, RetryPolicy};
use crate::ids::{ContainerId, ItemId};
use crate::position::{Allocator, Item, PositionKey};
use crate::rebalance::Rebalancer;
use crate::store::{Direction, Edge, KeyWrite, NeighborGuard, PositionStore, StoreError};
use crate::{Error, Result};

/// Where in a container an item should go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Before every other item.
    Top,
    /// After every other item.
    Bottom,
    /// Immediately before the given item.
    Before(ItemId),
    /// Immediately after the given item.
    After(ItemId),
}

/// Steps a move goes through, reported at `debug` level.
///
/// `Requested -> NeighborsRead -> KeyComputed -> Committed`, with a detour
/// through `RebalanceRequired -> Rebalanced` when the gap is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePhase {
    Requested,
    NeighborsRead,
    KeyComputed,
    RebalanceRequired,
    Rebalanced,
    Committed,
    Failed,
}

impl fmt::Display for MovePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovePhase::Requested => "requested",
            MovePhase::NeighborsRead => "neighbors_read",
            MovePhase::KeyComputed => "key_computed",
            MovePhase::RebalanceRequired => "rebalance_required",
            MovePhase::Rebalanced => "rebalanced",
            MovePhase::Committed => "committed",
            MovePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a successful move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// Key the item holds now.
    pub key: PositionKey,
    /// The container was re-keyed to make room.
    pub rebalanced: bool,
    /// The item already sat where it was asked to go; nothing was written.
    pub unchanged: bool,
}

/// Snapshot of a container's items in order.
///
/// Each call to [`OrderedCollection::ordered_items`] takes a new snapshot, so
/// iterating one never observes writes made after it was taken.
#[derive(Debug, Clone)]
pub struct OrderedItems {
    items: std::vec::IntoIter<Item>,
}

impl Iterator for OrderedItems {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl DoubleEndedIterator for OrderedItems {
    fn next_back(&mut self) -> Option<Item> {
        self.items.next_back()
    }
}

impl ExactSizeIterator for OrderedItems {}

/// Neighbours read for one attempt, or the finding that nothing needs to move.
enum Gap {
    Open {
        lower: Option<PositionKey>,
        upper: Option<PositionKey>,
    },
    AlreadyThere(PositionKey),
}

fn trace_phase(phase: MovePhase, container: &ContainerId, item: &ItemId) {
    debug!(phase = %phase, container = %container, item = %item, "Move phase");
}

fn is_store_conflict(err: &Error) -> bool {
    matches!(err, Error::Store(store_err) if store_err.is_conflict())
}

/// Ordering service over a [`PositionStore`].
///
/// Cheap to share: wrap it in an `Arc` or clone the store handle into
/// several collections. It holds no per-container state between calls.
pub struct OrderedCollection {
    store: Arc<dyn PositionStore>,
    allocator: Allocator,
    rebalancer: Rebalancer,
    retry: RetryPolicy,
}

impl OrderedCollection {
    /// Creates a collection over `store`.
    ///
    /// # Errors
    /// [`PositionError::InvalidConfig`](crate::position::PositionError::InvalidConfig)
    /// if `config` does not validate.
    pub fn new(store: Arc<dyn PositionStore>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            allocator: Allocator::new(config.allocator),
            rebalancer: Rebalancer::new(config.rebalance_spacing)?,
            retry: config.retry,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn PositionStore> {
        &self.store
    }

    /// Places `item` immediately before `reference`.
    pub async fn insert_before(
        &self,
        container: &ContainerId,
        item: &ItemId,
        reference: &ItemId,
    ) -> Result<MoveOutcome> {
        self.place(container, item, Placement::Before(reference.clone()))
            .await
    }

    /// Places `item` immediately after `reference`.
    pub async fn insert_after(
        &self,
        container: &ContainerId,
        item: &ItemId,
        reference: &ItemId,
    ) -> Result<MoveOutcome> {
        self.place(container, item, Placement::After(reference.clone()))
            .await
    }

    /// Places `item` before every other item of `container`.
    pub async fn move_to_top(&self, container: &ContainerId, item: &ItemId) -> Result<MoveOutcome> {
        self.place(container, item, Placement::Top).await
    }

    /// Places `item` after every other item of `container`.
    pub async fn move_to_bottom(
        &self,
        container: &ContainerId,
        item: &ItemId,
    ) -> Result<MoveOutcome> {
        self.place(container, item, Placement::Bottom).await
    }

    /// Moves `item` within `container`, creating it if it does not exist yet.
    ///
    /// # Errors
    /// - [`CollectionError::InvalidReference`] if `item` belongs to another
    ///   container, or the placement names an item that is not in `container`.
    /// - [`CollectionError::TransientConflict`] if every attempt lost a race.
    /// - [`PositionError::PrecisionExhausted`](crate::position::PositionError::PrecisionExhausted)
    ///   if the gap is still exhausted right after a rebalance.
    /// - [`StoreError`] failures other than conflicts, as-is.
    pub async fn place(
        &self,
        container: &ContainerId,
        item: &ItemId,
        placement: Placement,
    ) -> Result<MoveOutcome> {
        self.with_retry(container, |attempt| {
            self.try_place(container, item, &placement, false, attempt)
        })
        .await
        .inspect_err(|_| trace_phase(MovePhase::Failed, container, item))
    }

    /// Moves an existing item into another container.
    ///
    /// The item gets a fresh key valid in `container`. Moving into the
    /// container the item is already in behaves like [`place`](Self::place).
    ///
    /// # Errors
    /// [`StoreError::ItemNotFound`] if `item` does not exist, otherwise as
    /// [`place`](Self::place).
    pub async fn move_to_container(
        &self,
        item: &ItemId,
        container: &ContainerId,
        placement: Placement,
    ) -> Result<MoveOutcome> {
        let outcome = self
            .with_retry(container, |attempt| {
                self.try_place(container, item, &placement, true, attempt)
            })
            .await
            .inspect_err(|_| trace_phase(MovePhase::Failed, container, item))?;
        info!(item = %item, container = %container, "Moved item to container");
        Ok(outcome)
    }

    /// Deletes `item`. Returns whether it existed.
    pub async fn remove(&self, item: &ItemId) -> Result<bool> {
        let removed = self.store.remove_item(item).await?;
        debug!(item = %item, removed, "Removed item");
        Ok(removed)
    }

    /// Re-keys `container` with even spacing. Returns the number of items re-keyed.
    pub async fn rebalance(&self, container: &ContainerId) -> Result<usize> {
        self.with_retry(container, |_| {
            self.rebalancer.rebalance(self.store.as_ref(), container)
        })
        .await
    }

    /// Items of `container` ordered by key.
    pub async fn ordered_items(&self, container: &ContainerId) -> Result<OrderedItems> {
        let keys = self.store.read_all_ordered(container).await?;
        let items: Vec<Item> = keys
            .into_iter()
            .map(|key| Item::new(container.clone(), key))
            .collect();
        Ok(OrderedItems {
            items: items.into_iter(),
        })
    }

    /// Every non-empty container with its item count.
    pub async fn containers(&self) -> Result<Vec<(ContainerId, usize)>> {
        self.store.containers().await
    }

    /// Runs `op` until it succeeds, fails with something other than a store
    /// conflict, or runs out of attempts.
    async fn with_retry<T, F, Fut>(&self, container: &ContainerId, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match op(attempt).await {
                Err(err) if is_store_conflict(&err) => {
                    debug!(container = %container, attempt, error = %err, "Conflicting write, retrying");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
                result => return result,
            }
        }
        warn!(container = %container, attempts = max_attempts, "Giving up after repeated conflicts");
        Err(CollectionError::TransientConflict {
            container: container.clone(),
            attempts: max_attempts,
        }
        .into())
    }

    /// One attempt at a move: read, compute, and conditionally write.
    ///
    /// Rebalances at most once; a second exhaustion fails the request.
    async fn try_place(
        &self,
        container: &ContainerId,
        item: &ItemId,
        placement: &Placement,
        reparent: bool,
        attempt: u32,
    ) -> Result<MoveOutcome> {
        trace_phase(MovePhase::Requested, container, item);
        let mut rebalanced = false;
        loop {
            let prior = self.store.get_item(item).await?;
            // Reparenting never creates; the item may have been removed since
            // an earlier attempt.
            if reparent && prior.is_none() {
                return Err(StoreError::ItemNotFound { item: item.clone() }.into());
            }
            if let Some(prior) = &prior
                && prior.container != *container
                && !reparent
            {
                return Err(CollectionError::InvalidReference {
                    container: container.clone(),
                    reference: item.clone(),
                    reason: format!(
                        "item belongs to container {}; move it there explicitly",
                        prior.container
                    ),
                }
                .into());
            }
            let current = prior
                .as_ref()
                .filter(|p| p.container == *container)
                .map(|p| &p.position);

            let (lower, upper) = match self.read_gap(container, item, placement, current).await?
            {
                Gap::AlreadyThere(key) => {
                    debug!(container = %container, item = %item, "Item already in place");
                    return Ok(MoveOutcome {
                        key,
                        rebalanced,
                        unchanged: true,
                    });
                }
                Gap::Open { lower, upper } => (lower, upper),
            };
            trace_phase(MovePhase::NeighborsRead, container, item);

            let value = match self.allocator.between(lower.as_ref(), upper.as_ref()) {
                Ok(value) => value,
                Err(err) if err.is_precision_exhausted() && !rebalanced => {
                    trace_phase(MovePhase::RebalanceRequired, container, item);
                    let count = self
                        .rebalancer
                        .rebalance(self.store.as_ref(), container)
                        .await?;
                    rebalanced = true;
                    trace_phase(MovePhase::Rebalanced, container, item);
                    debug!(container = %container, items = count, attempt, "Retrying move after rebalance");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            trace_phase(MovePhase::KeyComputed, container, item);

            let write = KeyWrite {
                container: container.clone(),
                item: item.clone(),
                value,
                expected_prior: prior.map(|p| (p.container, p.position.value)),
                guard: NeighborGuard::new(lower, upper),
            };
            let key = write.key();
            self.store.write_key(write).await?;
            trace_phase(MovePhase::Committed, container, item);

            return Ok(MoveOutcome {
                key,
                rebalanced,
                unchanged: false,
            });
        }
    }

    /// Reads the neighbours bounding the target gap of `placement`.
    async fn read_gap(
        &self,
        container: &ContainerId,
        item: &ItemId,
        placement: &Placement,
        current: Option<&PositionKey>,
    ) -> Result<Gap> {
        let (lower, upper) = match placement {
            Placement::Top => (None, self.store.read_edge(container, Edge::First).await?),
            Placement::Bottom => (self.store.read_edge(container, Edge::Last).await?, None),
            Placement::Before(reference) | Placement::After(reference) => {
                let direction = match placement {
                    Placement::Before(_) => Direction::Before,
                    _ => Direction::After,
                };
                if reference == item {
                    return match current {
                        Some(key) => Ok(Gap::AlreadyThere(key.clone())),
                        None => Err(invalid_reference(
                            container,
                            reference,
                            "item cannot be placed next to itself",
                        )),
                    };
                }
                self.store
                    .read_neighbors(container, reference, direction)
                    .await
                    .map_err(|err| match err {
                        Error::Store(StoreError::ItemNotFound { .. }) => {
                            invalid_reference(container, reference, "not in this container")
                        }
                        other => other,
                    })?
            }
        };

        // The item already borders the gap on the side it is moving towards.
        let bordering = match placement {
            Placement::Top | Placement::After(_) => upper.as_ref(),
            Placement::Bottom | Placement::Before(_) => lower.as_ref(),
        };
        if current.is_some()
            && let Some(key) = bordering
            && key.item() == item
        {
            return Ok(Gap::AlreadyThere(key.clone()));
        }
        Ok(Gap::Open { lower, upper })
    }
}

fn invalid_reference(container: &ContainerId, reference: &ItemId, reason: &str) -> Error {
    CollectionError::InvalidReference {
        container: container.clone(),
        reference: reference.clone(),
        reason: reason.to_string(),
    }
    .into()
}
