//! Error types for position storage.
//!
//! Stores report two kinds of failure that callers treat very differently:
//! a [`StoreError::Conflict`] means the optimistic check failed and the
//! request may be retried against fresh reads, while everything else means
//! the store itself could not do its job.

use thiserror::Error;

use crate::ids::{ContainerId, ItemId};

/// Errors that can occur during store operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The rows a write was conditioned on changed since they were read.
    #[error("Conflicting write in container {container}: {reason}")]
    Conflict {
        /// Container the write targeted
        container: ContainerId,
        /// What did not match
        reason: String,
    },

    /// Item not found, or not in the container it was looked up in.
    #[error("Item not found: {item}")]
    ItemNotFound {
        /// The missing item
        item: ItemId,
    },

    /// The persistence layer truncates `f64` position values.
    #[error("Store does not preserve double precision: wrote {written}, read back {read}")]
    PrecisionLoss {
        /// Probe value written
        written: f64,
        /// Value the store returned
        read: f64,
    },

    /// The position column is declared with a type other than a double.
    #[error("Position column stores {found} values, expected double precision")]
    PositionColumnType {
        /// Storage type the database reported for the probe row
        found: String,
    },

    /// The underlying database failed or is unreachable.
    #[error("Store unavailable: {reason}")]
    Unavailable {
        /// Description of the failure
        reason: String,
        /// The driver error, when there is one
        #[cfg(any(feature = "sqlite", feature = "postgres"))]
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Builds an [`StoreError::Unavailable`] that carries no driver error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            source: None,
        }
    }

    /// Check if this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ItemNotFound { .. })
    }

    /// Check if the store itself failed (as opposed to a conflict or a bad id).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. }
                | StoreError::PrecisionLoss { .. }
                | StoreError::PositionColumnType { .. }
                | StoreError::FileIo { .. }
                | StoreError::SerializationFailed { .. }
                | StoreError::DeserializationFailed { .. }
        )
    }

    /// Check if the store would not keep position keys bit-for-bit.
    pub fn is_precision_loss(&self) -> bool {
        matches!(
            self,
            StoreError::PrecisionLoss { .. } | StoreError::PositionColumnType { .. }
        )
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            StoreError::FileIo { .. }
                | StoreError::SerializationFailed { .. }
                | StoreError::DeserializationFailed { .. }
        )
    }

    /// Get the container id if this error is about a specific container.
    pub fn container(&self) -> Option<&ContainerId> {
        match self {
            StoreError::Conflict { container, .. } => Some(container),
            _ => None,
        }
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
