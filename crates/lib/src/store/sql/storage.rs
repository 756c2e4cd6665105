//! Position reads and guarded writes for SQL stores.

use std::collections::{HashMap, HashSet};

use sqlx::{Any, Transaction};

use super::{SqlxResultExt, SqlxStore};
use crate::Result;
use crate::ids::{ContainerId, ItemId};
use crate::position::{Item, PositionKey};
use crate::store::{Direction, Edge, KeyRewrite, KeyWrite, NeighborGuard, StoreError, conflict};

fn key((item, value): (String, f64)) -> PositionKey {
    PositionKey::new(value, item)
}

/// Begin a transaction, at `SERIALIZABLE` on PostgreSQL.
async fn begin(store: &SqlxStore, container: &ContainerId) -> Result<Transaction<'static, Any>> {
    let mut tx = store
        .pool()
        .begin()
        .await
        .sql_conflict(container, "Failed to begin transaction")?;
    if store.is_postgres() {
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .sql_context("Failed to set isolation level")?;
    }
    Ok(tx)
}

pub async fn get_item(store: &SqlxStore, item: &ItemId) -> Result<Option<Item>> {
    let row: Option<(String, f64)> =
        sqlx::query_as("SELECT container_id, position FROM positions WHERE item_id = $1")
            .bind(item.as_str())
            .fetch_optional(store.pool())
            .await
            .sql_context("Failed to get item")?;

    Ok(row.map(|(container, value)| {
        Item::new(ContainerId::from(container), PositionKey::new(value, item.clone()))
    }))
}

pub async fn read_neighbors(
    store: &SqlxStore,
    container: &ContainerId,
    reference: &ItemId,
    direction: Direction,
) -> Result<(Option<PositionKey>, Option<PositionKey>)> {
    let pool = store.pool();

    let value: Option<(f64,)> =
        sqlx::query_as("SELECT position FROM positions WHERE item_id = $1 AND container_id = $2")
            .bind(reference.as_str())
            .bind(container.as_str())
            .fetch_optional(pool)
            .await
            .sql_context("Failed to read reference item")?;
    let Some((value,)) = value else {
        return Err(StoreError::ItemNotFound {
            item: reference.clone(),
        }
        .into());
    };
    let reference_key = PositionKey::new(value, reference.clone());

    let sql = match direction {
        Direction::Before => {
            "SELECT item_id, position FROM positions
             WHERE container_id = $1
               AND (position < $2 OR (position = $3 AND item_id < $4))
             ORDER BY position DESC, item_id DESC
             LIMIT 1"
        }
        Direction::After => {
            "SELECT item_id, position FROM positions
             WHERE container_id = $1
               AND (position > $2 OR (position = $3 AND item_id > $4))
             ORDER BY position ASC, item_id ASC
             LIMIT 1"
        }
    };
    let neighbour: Option<(String, f64)> = sqlx::query_as(sql)
        .bind(container.as_str())
        .bind(value)
        .bind(value)
        .bind(reference.as_str())
        .fetch_optional(pool)
        .await
        .sql_context("Failed to read neighbour")?;
    let neighbour = neighbour.map(key);

    Ok(match direction {
        Direction::Before => (neighbour, Some(reference_key)),
        Direction::After => (Some(reference_key), neighbour),
    })
}

pub async fn read_edge(
    store: &SqlxStore,
    container: &ContainerId,
    edge: Edge,
) -> Result<Option<PositionKey>> {
    let sql = match edge {
        Edge::First => {
            "SELECT item_id, position FROM positions WHERE container_id = $1
             ORDER BY position ASC, item_id ASC LIMIT 1"
        }
        Edge::Last => {
            "SELECT item_id, position FROM positions WHERE container_id = $1
             ORDER BY position DESC, item_id DESC LIMIT 1"
        }
    };
    let row: Option<(String, f64)> = sqlx::query_as(sql)
        .bind(container.as_str())
        .fetch_optional(store.pool())
        .await
        .sql_context("Failed to read container edge")?;
    Ok(row.map(key))
}

pub async fn read_all_ordered(
    store: &SqlxStore,
    container: &ContainerId,
) -> Result<Vec<PositionKey>> {
    let rows: Vec<(String, f64)> = sqlx::query_as(
        "SELECT item_id, position FROM positions WHERE container_id = $1
         ORDER BY position ASC, item_id ASC",
    )
    .bind(container.as_str())
    .fetch_all(store.pool())
    .await
    .sql_context("Failed to read container")?;
    Ok(rows.into_iter().map(key).collect())
}

/// Explains why `guard` no longer holds, ignoring `mover`.
async fn guard_violation(
    tx: &mut Transaction<'_, Any>,
    container: &ContainerId,
    guard: &NeighborGuard,
    mover: &ItemId,
) -> Result<Option<String>> {
    for bound in [&guard.lower, &guard.upper].into_iter().flatten() {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT position FROM positions WHERE item_id = $1 AND container_id = $2",
        )
        .bind(bound.item().as_str())
        .bind(container.as_str())
        .fetch_optional(&mut **tx)
        .await
        .sql_conflict(container, "Failed to re-read neighbour")?;
        if !row.is_some_and(|(value,)| bound.holds(value)) {
            return Ok(Some(format!("neighbour {} moved", bound.item())));
        }
    }

    let mut sql = String::from(
        "SELECT COUNT(*) FROM positions WHERE container_id = $1 AND item_id <> $2",
    );
    let mut next = 3;
    if guard.lower.is_some() {
        sql.push_str(&format!(
            " AND (position > ${} OR (position = ${} AND item_id > ${}))",
            next,
            next + 1,
            next + 2
        ));
        next += 3;
    }
    if guard.upper.is_some() {
        sql.push_str(&format!(
            " AND (position < ${} OR (position = ${} AND item_id < ${}))",
            next,
            next + 1,
            next + 2
        ));
    }

    let mut query = sqlx::query_as::<_, (i64,)>(&sql)
        .bind(container.as_str())
        .bind(mover.as_str());
    for bound in [&guard.lower, &guard.upper].into_iter().flatten() {
        query = query
            .bind(bound.value)
            .bind(bound.value)
            .bind(bound.item().as_str());
    }
    let (inside,) = query
        .fetch_one(&mut **tx)
        .await
        .sql_conflict(container, "Failed to check gap")?;

    Ok((inside > 0).then(|| format!("{inside} item(s) now occupy the gap")))
}

pub async fn write_key(store: &SqlxStore, write: KeyWrite) -> Result<()> {
    let container = &write.container;
    let mut tx = begin(store, container).await?;

    let current: Option<(String, f64)> =
        sqlx::query_as("SELECT container_id, position FROM positions WHERE item_id = $1")
            .bind(write.item.as_str())
            .fetch_optional(&mut *tx)
            .await
            .sql_conflict(container, "Failed to read item")?;
    let prior_matches = match (&current, &write.expected_prior) {
        (None, None) => true,
        (Some((found, value)), Some((expected_container, expected_value))) => {
            found == expected_container.as_str() && value.to_bits() == expected_value.to_bits()
        }
        _ => false,
    };
    if !prior_matches {
        return Err(conflict(
            container,
            format!("item {} changed since it was read", write.item),
        ));
    }

    if let Some(reason) = guard_violation(&mut tx, container, &write.guard, &write.item).await? {
        return Err(conflict(container, reason));
    }

    let upsert = if store.is_sqlite() {
        "INSERT OR REPLACE INTO positions (item_id, container_id, position) VALUES ($1, $2, $3)"
    } else {
        "INSERT INTO positions (item_id, container_id, position) VALUES ($1, $2, $3)
         ON CONFLICT (item_id) DO UPDATE SET
            container_id = EXCLUDED.container_id,
            position = EXCLUDED.position"
    };
    sqlx::query(upsert)
        .bind(write.item.as_str())
        .bind(container.as_str())
        .bind(write.value)
        .execute(&mut *tx)
        .await
        .sql_conflict(container, "Failed to write position")?;

    tx.commit()
        .await
        .sql_conflict(container, "Failed to commit transaction")?;
    Ok(())
}

pub async fn rewrite_container(
    store: &SqlxStore,
    container: &ContainerId,
    rewrites: &[KeyRewrite],
) -> Result<()> {
    let mut tx = begin(store, container).await?;

    let rows: Vec<(String, f64)> =
        sqlx::query_as("SELECT item_id, position FROM positions WHERE container_id = $1")
            .bind(container.as_str())
            .fetch_all(&mut *tx)
            .await
            .sql_conflict(container, "Failed to read container")?;
    let current: HashMap<String, f64> = rows.into_iter().collect();

    let distinct: HashSet<&ItemId> = rewrites.iter().map(|r| &r.item).collect();
    if current.len() != rewrites.len() || distinct.len() != rewrites.len() {
        return Err(conflict(
            container,
            format!(
                "container holds {} items, rewrite covers {}",
                current.len(),
                distinct.len()
            ),
        ));
    }
    for rewrite in rewrites {
        let unchanged = current
            .get(rewrite.item.as_str())
            .is_some_and(|value| value.to_bits() == rewrite.expected.to_bits());
        if !unchanged {
            return Err(conflict(
                container,
                format!("item {} changed since it was read", rewrite.item),
            ));
        }
    }

    for rewrite in rewrites {
        sqlx::query("UPDATE positions SET position = $1 WHERE item_id = $2 AND container_id = $3")
            .bind(rewrite.value)
            .bind(rewrite.item.as_str())
            .bind(container.as_str())
            .execute(&mut *tx)
            .await
            .sql_conflict(container, "Failed to rewrite position")?;
    }

    tx.commit()
        .await
        .sql_conflict(container, "Failed to commit rewrite")?;
    Ok(())
}

pub async fn remove_item(store: &SqlxStore, item: &ItemId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM positions WHERE item_id = $1")
        .bind(item.as_str())
        .execute(store.pool())
        .await
        .sql_context("Failed to remove item")?;
    Ok(result.rows_affected() > 0)
}

pub async fn containers(store: &SqlxStore) -> Result<Vec<(ContainerId, usize)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT container_id, COUNT(*) FROM positions GROUP BY container_id ORDER BY container_id",
    )
    .fetch_all(store.pool())
    .await
    .sql_context("Failed to list containers")?;
    Ok(rows
        .into_iter()
        .map(|(container, count)| (ContainerId::from(container), count as usize))
        .collect())
}
