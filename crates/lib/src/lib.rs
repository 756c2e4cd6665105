//!
//! Ordinal: ordered collections on fractional position keys.
//! This library keeps items in a user-defined order without renumbering the
//! rest of the collection on every insert.
//!
//! ## Core Concepts
//!
//! * **Position keys (`position::PositionKey`)**: A 64-bit float plus the item id as a tie-break. Items in a container are ordered by key.
//! * **Allocator (`position::Allocator`)**: Computes a key between two neighbours, before the first, or after the last, and detects when a gap has no representable interior left.
//! * **Rebalancer (`rebalance::Rebalancer`)**: Re-keys a whole container with even spacing when a gap is exhausted, preserving order.
//! * **Stores (`store::PositionStore`)**: A pluggable storage layer whose writes are conditioned on the neighbours they were computed from:
//!     * **InMemory (`store::InMemory`)**: Lock-protected maps, saved to and loaded from JSON.
//!     * **SqlxStore (`store::SqlxStore`)**: SQLite and PostgreSQL through sqlx (features `sqlite` and `postgres`).
//! * **OrderedCollection (`collection::OrderedCollection`)**: The service callers use. Moves items, retries lost races, and rebalances when needed.

pub mod collection;
pub mod config;
pub mod ids;
pub mod position;
pub mod rebalance;
pub mod status;
pub mod store;

pub use collection::{MoveOutcome, OrderedCollection, OrderedItems, Placement};
pub use config::{Config, RetryPolicy};
pub use ids::{ContainerId, ItemId};
pub use position::{Item, PositionKey};

/// Result type used throughout the Ordinal library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Ordinal library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured key allocation errors from the position module
    #[error(transparent)]
    Position(position::PositionError),

    /// Structured storage errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured service errors from the collection module
    #[error(transparent)]
    Collection(collection::CollectionError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Position(_) => "position",
            Error::Store(_) => "store",
            Error::Collection(_) => "collection",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if no key could be allocated even after rebalancing.
    pub fn is_precision_exhausted(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_precision_exhausted(),
            _ => false,
        }
    }

    /// Check if this error comes from a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_conflict(),
            Error::Collection(collection_err) => collection_err.is_retryable(),
            _ => false,
        }
    }

    /// Check if the caller may retry the request unchanged.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// Check if the request named an item that is missing or misplaced.
    pub fn is_invalid_reference(&self) -> bool {
        match self {
            Error::Collection(collection_err) => collection_err.is_invalid_reference(),
            _ => false,
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if the store itself failed.
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_unavailable(),
            _ => false,
        }
    }

    /// Check if this error comes from bad configuration.
    pub fn is_config_error(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_config_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) | Error::Serialize(_) => true,
            Error::Store(store_err) => store_err.is_io_error(),
            _ => false,
        }
    }
}
