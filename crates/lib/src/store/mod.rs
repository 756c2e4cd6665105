//! Durable storage of `(container, item, key)` triples.
//!
//! The [`PositionStore`] trait is the boundary between the ordering logic and
//! whatever actually persists positions. Every mutating call is a single
//! atomic read-modify-write whose preconditions are checked inside the store:
//! the ordering logic never holds a lock across calls, it relies on the store
//! to reject writes whose inputs went stale (optimistic concurrency).
//!
//! Implementations:
//! - [`InMemory`]: `tokio::sync::RwLock` protected maps with JSON save/load.
//! - [`SqlxStore`](sql::SqlxStore): SQLite and PostgreSQL through sqlx
//!   (features `sqlite` / `postgres`).

use std::any::Any;

use async_trait::async_trait;

use crate::Result;
use crate::ids::{ContainerId, ItemId};
use crate::position::{Item, PositionKey};

mod errors;
mod in_memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use errors::StoreError;
pub use in_memory::InMemory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{DbKind, SqlxStore};

/// Which side of a reference item to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The reference and the item immediately before it.
    Before,
    /// The reference and the item immediately after it.
    After,
}

/// Which end of a container to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    First,
    Last,
}

/// The neighbours a new key was computed from.
///
/// A write carrying this guard only succeeds if, at commit time, both
/// neighbours still hold the values that were read and no other item of the
/// container sorts strictly between them. A missing bound is open-ended, so a
/// guard with no `lower` asserts that nothing precedes `upper`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborGuard {
    pub lower: Option<PositionKey>,
    pub upper: Option<PositionKey>,
}

impl NeighborGuard {
    pub fn new(lower: Option<PositionKey>, upper: Option<PositionKey>) -> Self {
        Self { lower, upper }
    }

    /// Guard over the whole container: it must be empty apart from the mover.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A single guarded key write.
#[derive(Debug, Clone)]
pub struct KeyWrite {
    /// Container the item ends up in.
    pub container: ContainerId,
    pub item: ItemId,
    /// New position value.
    pub value: f64,
    /// Where the item was when the neighbours were read; `None` if it did not exist.
    pub expected_prior: Option<(ContainerId, f64)>,
    pub guard: NeighborGuard,
}

impl KeyWrite {
    /// The key the item holds once this write commits.
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.value, self.item.clone())
    }
}

/// One row of a container-wide rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRewrite {
    pub item: ItemId,
    /// Value the row held when the container was read.
    pub expected: f64,
    /// Value to store.
    pub value: f64,
}

/// Storage for item positions.
///
/// All implementations must be `Send` and `Sync` so one store can serve any
/// number of concurrent callers, and implement `Any` to allow downcasting
/// (the CLI uses this to persist the in-memory store).
///
/// Keys are compared as [`PositionKey`]s: by value, then by item id.
#[async_trait]
pub trait PositionStore: Send + Sync + Any {
    /// Looks up an item in any container.
    async fn get_item(&self, item: &ItemId) -> Result<Option<Item>>;

    /// Reads the reference key and its neighbour on the requested side.
    ///
    /// Returns `(lower, upper)`: for [`Direction::Before`] that is
    /// `(predecessor, reference)`, for [`Direction::After`]
    /// `(reference, successor)`.
    ///
    /// # Errors
    /// [`StoreError::ItemNotFound`] if `reference` is not in `container`.
    async fn read_neighbors(
        &self,
        container: &ContainerId,
        reference: &ItemId,
        direction: Direction,
    ) -> Result<(Option<PositionKey>, Option<PositionKey>)>;

    /// Reads the first or last key of a container, `None` if it is empty.
    async fn read_edge(&self, container: &ContainerId, edge: Edge) -> Result<Option<PositionKey>>;

    /// Reads every key of a container, ordered.
    async fn read_all_ordered(&self, container: &ContainerId) -> Result<Vec<PositionKey>>;

    /// Atomically stores one key.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] (with nothing written) when the item's current
    /// row differs from `expected_prior` or the guard no longer holds.
    async fn write_key(&self, write: KeyWrite) -> Result<()>;

    /// Atomically replaces the value of every item in a container.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] (with nothing written) unless the container
    /// holds exactly the rewritten items at their `expected` values.
    async fn rewrite_container(&self, container: &ContainerId, rewrites: &[KeyRewrite])
    -> Result<()>;

    /// Deletes an item. Siblings keep their keys. Returns whether it existed.
    async fn remove_item(&self, item: &ItemId) -> Result<bool>;

    /// Lists every non-empty container with its item count.
    async fn containers(&self) -> Result<Vec<(ContainerId, usize)>>;

    /// Returns a reference to the store as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn conflict(container: &ContainerId, reason: impl Into<String>) -> crate::Error {
    StoreError::Conflict {
        container: container.clone(),
        reason: reason.into(),
    }
    .into()
}
