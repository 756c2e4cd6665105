//! Error types for ordered collection operations.

use thiserror::Error;

use crate::ids::{ContainerId, ItemId};

/// Errors reported by [`OrderedCollection`](super::OrderedCollection).
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectionError {
    /// The reference item is missing or lives in another container.
    #[error("Invalid reference {reference} in container {container}: {reason}")]
    InvalidReference {
        /// Container the request targeted
        container: ContainerId,
        /// The offending item
        reference: ItemId,
        /// What is wrong with it
        reason: String,
    },

    /// Every attempt lost an optimistic-concurrency race.
    #[error("Gave up on container {container} after {attempts} conflicting attempts")]
    TransientConflict {
        /// Container the request targeted
        container: ContainerId,
        /// Attempts made before giving up
        attempts: u32,
    },
}

impl CollectionError {
    /// Check if the request named an unusable item.
    pub fn is_invalid_reference(&self) -> bool {
        matches!(self, CollectionError::InvalidReference { .. })
    }

    /// Check if the caller may retry the request as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollectionError::TransientConflict { .. })
    }

    /// Get the container the failed request targeted.
    pub fn container(&self) -> &ContainerId {
        match self {
            CollectionError::InvalidReference { container, .. }
            | CollectionError::TransientConflict { container, .. } => container,
        }
    }
}

impl From<CollectionError> for crate::Error {
    fn from(err: CollectionError) -> Self {
        crate::Error::Collection(err)
    }
}
