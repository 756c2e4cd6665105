//! JSON persistence for the in-memory store.
//!
//! Only the item rows are written; the per-container index is rebuilt on
//! load. `serde_json` writes `f64` values in shortest round-trip form and,
//! with its `float_roundtrip` feature, parses them back exactly, so keys come
//! back bit-for-bit identical.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use super::{InMemory, Rows};
use crate::ids::{ContainerId, ItemId};
use crate::store::StoreError;
use crate::{Error, Result};

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

/// Validates the persistence version during deserialization.
fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

#[derive(Serialize, Deserialize)]
struct StoredRow {
    container: ContainerId,
    position: f64,
}

#[derive(Serialize, Deserialize)]
struct SerializableStore {
    /// File format version for compatibility checking
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    items: HashMap<ItemId, StoredRow>,
}

pub(crate) async fn save_to_file<P: AsRef<Path>>(store: &InMemory, path: P) -> Result<()> {
    let items = {
        let rows = store.rows.read().await;
        rows.items
            .iter()
            .map(|(item, (container, position))| {
                (
                    item.clone(),
                    StoredRow {
                        container: container.clone(),
                        position: *position,
                    },
                )
            })
            .collect()
    };

    let serializable = SerializableStore {
        version: PERSISTENCE_VERSION,
        items,
    };

    let json = serde_json::to_string_pretty(&serializable)
        .map_err(|e| -> Error { StoreError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| -> Error { StoreError::FileIo { source: e }.into() })
}

pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(InMemory::new()),
        Err(e) => return Err(StoreError::FileIo { source: e }.into()),
    };

    let serializable: SerializableStore = serde_json::from_str(&json)
        .map_err(|e| -> Error { StoreError::DeserializationFailed { source: e }.into() })?;

    let mut rows = Rows::default();
    for (item, row) in serializable.items {
        if !row.position.is_finite() {
            return Err(StoreError::unavailable(format!(
                "stored position for {item} is not finite"
            ))
            .into());
        }
        rows.insert(item, row.container, row.position);
    }

    Ok(InMemory {
        rows: tokio::sync::RwLock::new(rows),
    })
}
