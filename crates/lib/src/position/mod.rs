//! Position keys and the allocator that produces them.
//!
//! A [`PositionKey`] pairs a 64-bit floating-point value with the owning
//! item's id. Items in a container are ordered by value first and by id only
//! when two values are numerically equal, so the order is always total even
//! if a tie slips through.
//!
//! New keys come from the [`Allocator`], which only ever looks at the one or
//! two neighbouring keys of the insertion point.

pub mod allocator;
pub mod errors;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::ids::{ContainerId, ItemId};

pub use allocator::{Allocator, AllocatorConfig};
pub use errors::PositionError;

/// Position of an item within its container.
///
/// # Examples
///
/// ```
/// use ordinal::position::PositionKey;
///
/// let a = PositionKey::new(1.0, "b");
/// let b = PositionKey::new(2.0, "a");
/// let tie = PositionKey::new(1.0, "c");
///
/// assert!(a < b);
/// assert!(a < tie); // equal values fall back to the item id
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionKey {
    /// Primary ordering value.
    pub value: f64,
    /// Id of the item holding this key, used only to break ties.
    pub tie_break: ItemId,
}

impl PositionKey {
    /// Creates a key for `item` at `value`.
    pub fn new(value: f64, item: impl Into<ItemId>) -> Self {
        Self {
            value,
            tie_break: item.into(),
        }
    }

    /// The item this key belongs to.
    pub fn item(&self) -> &ItemId {
        &self.tie_break
    }

    /// True if `self` holds exactly `value`, bit for bit.
    pub(crate) fn holds(&self, value: f64) -> bool {
        self.value.to_bits() == value.to_bits()
    }
}

impl PartialEq for PositionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PositionKey {}

impl PartialOrd for PositionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PositionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.value.total_cmp(&other.value) {
            Ordering::Equal => self.tie_break.cmp(&other.tie_break),
            ordering => ordering,
        }
    }
}

/// An item together with the container it currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub container: ContainerId,
    pub position: PositionKey,
}

impl Item {
    pub fn new(container: ContainerId, position: PositionKey) -> Self {
        Self {
            id: position.tie_break.clone(),
            container,
            position,
        }
    }
}
