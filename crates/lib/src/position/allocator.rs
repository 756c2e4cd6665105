//! Midpoint key allocation.
//!
//! The allocator is pure: the same neighbours always produce the same key, so
//! a request retried after a conflict computes exactly what it computed
//! before. Halving the gap on every insert keeps inserts O(1) regardless of
//! container size, at the cost of a bounded number of consecutive inserts
//! into one gap (roughly 52 for a 64-bit mantissa) before the gap has no
//! representable interior and the container must be rebalanced.

use serde::{Deserialize, Serialize};

use super::PositionKey;
use super::errors::PositionError;

/// Tunables for [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Distance added after the last key or subtracted before the first.
    pub edge_step: f64,
    /// A new key closer than this to either neighbour counts as exhausted.
    ///
    /// `0.0` means "any representable value strictly inside the gap".
    pub min_gap: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            edge_step: 1.0,
            min_gap: 0.0,
        }
    }
}

impl AllocatorConfig {
    /// Rejects settings the allocator cannot work with.
    pub fn validate(&self) -> Result<(), PositionError> {
        if !self.edge_step.is_finite() || self.edge_step <= 0.0 {
            return Err(PositionError::InvalidConfig {
                reason: format!("edge_step must be finite and positive, got {}", self.edge_step),
            });
        }
        if !self.min_gap.is_finite() || self.min_gap < 0.0 {
            return Err(PositionError::InvalidConfig {
                reason: format!("min_gap must be finite and non-negative, got {}", self.min_gap),
            });
        }
        if self.min_gap >= self.edge_step {
            return Err(PositionError::InvalidConfig {
                reason: format!(
                    "min_gap ({}) must be smaller than edge_step ({})",
                    self.min_gap, self.edge_step
                ),
            });
        }
        Ok(())
    }
}

/// Computes keys between, before or after existing keys.
///
/// # Examples
///
/// ```
/// use ordinal::position::{Allocator, PositionKey};
///
/// let allocator = Allocator::default();
/// let a = PositionKey::new(0.0, "a");
/// let b = PositionKey::new(1000.0, "b");
///
/// assert_eq!(allocator.between(Some(&a), Some(&b)).unwrap(), 500.0);
/// assert_eq!(allocator.between(Some(&b), None).unwrap(), 1001.0);
/// assert_eq!(allocator.between(None, Some(&a)).unwrap(), -1.0);
/// assert_eq!(allocator.between(None, None).unwrap(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Allocator {
    config: AllocatorConfig,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Returns a value strictly between `lower` and `upper`.
    ///
    /// A missing `lower` means "insert at the start", a missing `upper`
    /// means "insert at the end", and both missing means the container is
    /// empty.
    ///
    /// # Errors
    ///
    /// [`PositionError::PrecisionExhausted`] when no value at least
    /// `min_gap` away from both neighbours is representable, and
    /// [`PositionError::NonFiniteKey`] when a neighbour is NaN or infinite.
    pub fn between(
        &self,
        lower: Option<&PositionKey>,
        upper: Option<&PositionKey>,
    ) -> Result<f64, PositionError> {
        match (lower, upper) {
            (None, None) => Ok(0.0),
            (Some(lower), None) => self.after_last(lower.value),
            (None, Some(upper)) => self.before_first(upper.value),
            (Some(lower), Some(upper)) => self.midpoint(lower.value, upper.value),
        }
    }

    /// Value for a new last item following `last`.
    pub fn after_last(&self, last: f64) -> Result<f64, PositionError> {
        finite(last)?;
        let value = last + self.config.edge_step;
        self.check(last, value, f64::INFINITY)
    }

    /// Value for a new first item preceding `first`.
    pub fn before_first(&self, first: f64) -> Result<f64, PositionError> {
        finite(first)?;
        let value = first - self.config.edge_step;
        self.check(f64::NEG_INFINITY, value, first)
    }

    /// Value halfway between `lower` and `upper`.
    pub fn midpoint(&self, lower: f64, upper: f64) -> Result<f64, PositionError> {
        finite(lower)?;
        finite(upper)?;
        let value = (lower + upper) / 2.0;
        self.check(lower, value, upper)
    }

    fn check(&self, lower: f64, value: f64, upper: f64) -> Result<f64, PositionError> {
        let exhausted = PositionError::PrecisionExhausted { lower, upper };
        if !value.is_finite() || value <= lower || value >= upper {
            return Err(exhausted);
        }
        if value - lower <= self.config.min_gap || upper - value <= self.config.min_gap {
            return Err(exhausted);
        }
        // Collapse -0.0 so equal keys compare equal under total ordering.
        Ok(if value == 0.0 { 0.0 } else { value })
    }
}

fn finite(value: f64) -> Result<(), PositionError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PositionError::NonFiniteKey { value })
    }
}
