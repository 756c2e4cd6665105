//! Error types for key allocation.

use thiserror::Error;

/// Errors produced while computing position keys.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    /// No usable value exists strictly between the two neighbours.
    #[error("Precision exhausted between {lower} and {upper}")]
    PrecisionExhausted {
        /// Lower bound of the gap (`-inf` when inserting at the start)
        lower: f64,
        /// Upper bound of the gap (`+inf` when inserting at the end)
        upper: f64,
    },

    /// A neighbour key is NaN or infinite.
    #[error("Non-finite position key: {value}")]
    NonFiniteKey {
        /// The offending value
        value: f64,
    },

    /// Allocator or rebalance settings are unusable.
    #[error("Invalid positioning configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem
        reason: String,
    },
}

impl PositionError {
    /// Check if this error means the gap must be widened by a rebalance.
    pub fn is_precision_exhausted(&self) -> bool {
        matches!(self, PositionError::PrecisionExhausted { .. })
    }

    /// Check if this error comes from bad configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, PositionError::InvalidConfig { .. })
    }
}

impl From<PositionError> for crate::Error {
    fn from(err: PositionError) -> Self {
        crate::Error::Position(err)
    }
}
