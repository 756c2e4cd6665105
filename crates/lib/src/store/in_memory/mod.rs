//! In-memory position store.
//!
//! Suitable for tests, development, and single-process deployments that
//! persist by saving the whole state to a JSON file.

mod persistence;

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Direction, Edge, KeyRewrite, KeyWrite, NeighborGuard, PositionStore, StoreError, conflict};
use crate::Result;
use crate::ids::{ContainerId, ItemId};
use crate::position::{Item, PositionKey};

/// Item rows plus a per-container ordered index over them.
///
/// Both live behind one lock so a write updates them together.
#[derive(Debug, Default)]
pub(crate) struct Rows {
    /// item -> (container, value)
    pub(crate) items: HashMap<ItemId, (ContainerId, f64)>,
    /// container -> keys in order
    pub(crate) index: HashMap<ContainerId, BTreeSet<PositionKey>>,
}

impl Rows {
    pub(crate) fn insert(&mut self, item: ItemId, container: ContainerId, value: f64) {
        if let Some((old_container, old_value)) = self.items.remove(&item) {
            self.unindex(&old_container, &PositionKey::new(old_value, item.clone()));
        }
        self.index
            .entry(container.clone())
            .or_default()
            .insert(PositionKey::new(value, item.clone()));
        self.items.insert(item, (container, value));
    }

    fn remove(&mut self, item: &ItemId) -> bool {
        match self.items.remove(item) {
            Some((container, value)) => {
                self.unindex(&container, &PositionKey::new(value, item.clone()));
                true
            }
            None => false,
        }
    }

    fn unindex(&mut self, container: &ContainerId, key: &PositionKey) {
        if let Some(keys) = self.index.get_mut(container) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(container);
            }
        }
    }

    fn keys(&self, container: &ContainerId) -> Option<&BTreeSet<PositionKey>> {
        self.index.get(container)
    }
}

/// A position store that keeps everything in memory.
///
/// All operations take a single `tokio::sync::RwLock`, which makes each
/// guarded write and each container rewrite atomic.
#[derive(Debug, Default)]
pub struct InMemory {
    pub(crate) rows: RwLock<Rows>,
}

impl InMemory {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items across all containers.
    pub async fn len(&self) -> usize {
        self.rows.read().await.items.len()
    }

    /// True if the store holds no items.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.items.is_empty()
    }

    /// Saves every row to `path` as JSON.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads a store from a JSON file written by [`InMemory::save_to_file`].
    ///
    /// If the file does not exist, a new, empty store is returned.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }
}

/// Explains why `guard` no longer holds over `keys`, ignoring `mover`.
fn guard_violation(
    keys: Option<&BTreeSet<PositionKey>>,
    guard: &NeighborGuard,
    mover: &ItemId,
) -> Option<String> {
    for bound in [&guard.lower, &guard.upper].into_iter().flatten() {
        if !keys.is_some_and(|keys| keys.contains(bound)) {
            return Some(format!("neighbour {} moved", bound.item()));
        }
    }
    let keys = keys?;
    if let (Some(lower), Some(upper)) = (&guard.lower, &guard.upper)
        && lower >= upper
    {
        return Some(format!("neighbours {} and {} are out of order", lower.item(), upper.item()));
    }
    let lower = guard.lower.as_ref().map_or(Bound::Unbounded, Bound::Excluded);
    let upper = guard.upper.as_ref().map_or(Bound::Unbounded, Bound::Excluded);
    keys.range((lower, upper))
        .find(|key| key.item() != mover)
        .map(|key| format!("item {} now occupies the gap", key.item()))
}

#[async_trait]
impl PositionStore for InMemory {
    async fn get_item(&self, item: &ItemId) -> Result<Option<Item>> {
        let rows = self.rows.read().await;
        Ok(rows.items.get(item).map(|(container, value)| {
            Item::new(container.clone(), PositionKey::new(*value, item.clone()))
        }))
    }

    async fn read_neighbors(
        &self,
        container: &ContainerId,
        reference: &ItemId,
        direction: Direction,
    ) -> Result<(Option<PositionKey>, Option<PositionKey>)> {
        let rows = self.rows.read().await;
        let key = match rows.items.get(reference) {
            Some((found, value)) if found == container => PositionKey::new(*value, reference.clone()),
            _ => {
                return Err(StoreError::ItemNotFound {
                    item: reference.clone(),
                }
                .into());
            }
        };
        let keys = rows.keys(container);
        let neighbour = keys.and_then(|keys| match direction {
            Direction::Before => keys.range(..&key).next_back().cloned(),
            Direction::After => keys
                .range((Bound::Excluded(&key), Bound::Unbounded))
                .next()
                .cloned(),
        });
        Ok(match direction {
            Direction::Before => (neighbour, Some(key)),
            Direction::After => (Some(key), neighbour),
        })
    }

    async fn read_edge(&self, container: &ContainerId, edge: Edge) -> Result<Option<PositionKey>> {
        let rows = self.rows.read().await;
        Ok(rows.keys(container).and_then(|keys| match edge {
            Edge::First => keys.first().cloned(),
            Edge::Last => keys.last().cloned(),
        }))
    }

    async fn read_all_ordered(&self, container: &ContainerId) -> Result<Vec<PositionKey>> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys(container)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn write_key(&self, write: KeyWrite) -> Result<()> {
        let mut rows = self.rows.write().await;

        let current = rows.items.get(&write.item);
        let prior_matches = match (current, &write.expected_prior) {
            (None, None) => true,
            (Some((container, value)), Some((expected_container, expected_value))) => {
                container == expected_container && value.to_bits() == expected_value.to_bits()
            }
            _ => false,
        };
        if !prior_matches {
            return Err(conflict(
                &write.container,
                format!("item {} changed since it was read", write.item),
            ));
        }

        if let Some(reason) = guard_violation(rows.keys(&write.container), &write.guard, &write.item)
        {
            return Err(conflict(&write.container, reason));
        }

        rows.insert(write.item, write.container, write.value);
        Ok(())
    }

    async fn rewrite_container(
        &self,
        container: &ContainerId,
        rewrites: &[KeyRewrite],
    ) -> Result<()> {
        let mut rows = self.rows.write().await;

        let current = rows.keys(container).map_or(0, BTreeSet::len);
        let distinct: HashSet<&ItemId> = rewrites.iter().map(|r| &r.item).collect();
        if current != rewrites.len() || distinct.len() != rewrites.len() {
            return Err(conflict(
                container,
                format!(
                    "container holds {current} items, rewrite covers {}",
                    distinct.len()
                ),
            ));
        }
        for rewrite in rewrites {
            match rows.items.get(&rewrite.item) {
                Some((found, value))
                    if found == container && value.to_bits() == rewrite.expected.to_bits() => {}
                _ => {
                    return Err(conflict(
                        container,
                        format!("item {} changed since it was read", rewrite.item),
                    ));
                }
            }
        }

        for rewrite in rewrites {
            rows.insert(rewrite.item.clone(), container.clone(), rewrite.value);
        }
        Ok(())
    }

    async fn remove_item(&self, item: &ItemId) -> Result<bool> {
        Ok(self.rows.write().await.remove(item))
    }

    async fn containers(&self) -> Result<Vec<(ContainerId, usize)>> {
        let rows = self.rows.read().await;
        let mut containers: Vec<_> = rows
            .index
            .iter()
            .map(|(container, keys)| (container.clone(), keys.len()))
            .collect();
        containers.sort();
        Ok(containers)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
