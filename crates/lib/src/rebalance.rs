//! Container-wide re-keying.
//!
//! When the allocator finds no room left in a gap, every item in the
//! container is given a fresh evenly spaced key (`0, spacing, 2*spacing, ...`)
//! in its current order. The rewrite is a single store transaction
//! conditioned on the keys that were read, so it either replaces every key or
//! none of them.

use tracing::{debug, info};

use crate::Result;
use crate::ids::ContainerId;
use crate::position::{PositionError, PositionKey};
use crate::store::{KeyRewrite, PositionStore};

/// Default distance between consecutive keys after a rebalance.
pub const DEFAULT_SPACING: f64 = 1000.0;

/// Computes the rewrite for `keys`, which must already be in order.
///
/// # Examples
///
/// ```
/// use ordinal::position::PositionKey;
/// use ordinal::rebalance::spaced_keys;
///
/// let keys = [PositionKey::new(0.5, "a"), PositionKey::new(0.5000001, "b")];
/// let rewrites = spaced_keys(&keys, 1000.0);
/// assert_eq!(rewrites[0].value, 0.0);
/// assert_eq!(rewrites[1].value, 1000.0);
/// assert_eq!(rewrites[1].expected, 0.5000001);
/// ```
pub fn spaced_keys(keys: &[PositionKey], spacing: f64) -> Vec<KeyRewrite> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| KeyRewrite {
            item: key.item().clone(),
            expected: key.value,
            value: index as f64 * spacing,
        })
        .collect()
}

/// Re-keys whole containers.
#[derive(Debug, Clone, Copy)]
pub struct Rebalancer {
    spacing: f64,
}

impl Default for Rebalancer {
    fn default() -> Self {
        Self {
            spacing: DEFAULT_SPACING,
        }
    }
}

impl Rebalancer {
    /// Creates a rebalancer with the given spacing.
    ///
    /// # Errors
    /// [`PositionError::InvalidConfig`] unless `spacing` is finite and positive.
    pub fn new(spacing: f64) -> std::result::Result<Self, PositionError> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(PositionError::InvalidConfig {
                reason: format!("rebalance spacing must be finite and positive, got {spacing}"),
            });
        }
        Ok(Self { spacing })
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Rewrites every key in `container` with even spacing.
    ///
    /// Returns the number of items re-keyed. A container whose keys already
    /// match the target spacing is left untouched and reports 0.
    ///
    /// # Errors
    /// [`StoreError::Conflict`](crate::store::StoreError::Conflict) if the
    /// container changed between the read and the rewrite; no key changes in
    /// that case.
    pub async fn rebalance(&self, store: &dyn PositionStore, container: &ContainerId) -> Result<usize> {
        let keys = store.read_all_ordered(container).await?;
        let rewrites = spaced_keys(&keys, self.spacing);

        if rewrites
            .iter()
            .all(|r| r.expected.to_bits() == r.value.to_bits())
        {
            debug!(container = %container, items = keys.len(), "Container already evenly spaced");
            return Ok(0);
        }

        store.rewrite_container(container, &rewrites).await?;
        info!(
            container = %container,
            items = rewrites.len(),
            spacing = self.spacing,
            "Rebalanced container"
        );
        Ok(rewrites.len())
    }
}
