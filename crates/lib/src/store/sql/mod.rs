//! SQL-based position stores.
//!
//! ## Available Backends
//!
//! - **SQLite** (feature: `sqlite`): Embedded database
//! - **PostgreSQL** (feature: `postgres`): PostgreSQL database
//!
//! ## Architecture
//!
//! The store uses sqlx with `AnyPool` for multi-database support. Each
//! mutating call runs in one database transaction; the optimistic checks
//! described on [`PositionStore`] are evaluated inside that transaction.
//! PostgreSQL transactions run at `SERIALIZABLE` so that two writers checking
//! the same gap cannot both commit. SQLite allows a single writer at a time,
//! and a writer that loses the race sees `SQLITE_BUSY`/`SQLITE_LOCKED`.
//! Both outcomes are reported as [`StoreError::Conflict`].
//!
//! Positions are stored as `DOUBLE PRECISION`. The schema module probes the
//! column type on connect and refuses to run against a database that would
//! round keys.

mod storage;

/// Schema definition and migration system.
pub mod schema;

use std::any::Any;
#[cfg(feature = "postgres")]
use std::time::Duration;

use async_trait::async_trait;
use sqlx::AnyPool;
#[cfg(feature = "postgres")]
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;

use super::{Direction, Edge, KeyRewrite, KeyWrite, PositionStore, StoreError};
use crate::ids::{ContainerId, ItemId};
use crate::position::{Item, PositionKey};
use crate::{Error, Result};

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Similar to `anyhow::Context`, this trait adds methods to convert sqlx
/// errors into store errors with a context message.
pub(crate) trait SqlxResultExt<T> {
    /// Convert any sqlx error to [`StoreError::Unavailable`].
    fn sql_context(self, context: &str) -> Result<T>;

    /// Like `sql_context`, but lock and serialization failures become
    /// [`StoreError::Conflict`] on `container`.
    fn sql_conflict(self, container: &ContainerId, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| unavailable(context, e))
    }

    fn sql_conflict(self, container: &ContainerId, context: &str) -> Result<T> {
        self.map_err(|e| {
            if is_contention(&e) {
                StoreError::Conflict {
                    container: container.clone(),
                    reason: format!("{context}: {e}"),
                }
                .into()
            } else {
                unavailable(context, e)
            }
        })
    }
}

fn unavailable(context: &str, e: sqlx::Error) -> Error {
    StoreError::Unavailable {
        reason: format!("{context}: {e}"),
        source: Some(e),
    }
    .into()
}

/// True for errors that mean "another transaction got there first".
///
/// SQLite: `SQLITE_BUSY` (5) and `SQLITE_LOCKED` (6) plus their extended
/// codes. PostgreSQL: `serialization_failure` (40001) and
/// `deadlock_detected` (40P01).
fn is_contention(e: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = e else {
        return false;
    };
    let code_matches = db.code().is_some_and(|code| {
        matches!(
            code.as_ref(),
            "5" | "6" | "261" | "262" | "517" | "40001" | "40P01"
        )
    });
    code_matches || db.message().contains("database is locked")
}

/// Database backend kind for SQL dialect selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// SQLite database
    Sqlite,
    /// PostgreSQL database
    Postgres,
}

/// SQL-based store implementing [`PositionStore`] using sqlx.
///
/// # Thread Safety
///
/// `SqlxStore` is `Send + Sync`. The underlying sqlx pool handles connection
/// pooling and thread safety.
///
/// # Test Isolation
///
/// For PostgreSQL, each store instance can use its own schema for test
/// isolation. Use `connect_postgres_isolated()` for that.
#[derive(Debug)]
pub struct SqlxStore {
    pool: AnyPool,
    kind: DbKind,
}

impl SqlxStore {
    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Get the database kind.
    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Check if this store is using SQLite.
    pub fn is_sqlite(&self) -> bool {
        self.kind == DbKind::Sqlite
    }

    /// Check if this store is using PostgreSQL.
    pub fn is_postgres(&self) -> bool {
        self.kind == DbKind::Postgres
    }
}

// SQLite-specific implementations
#[cfg(feature = "sqlite")]
impl SqlxStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create (create file if it doesn't exist)
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_sqlite(&url).await
    }

    /// Connect to a SQLite database using a connection URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite:./positions.db")
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let is_in_memory = url.contains("mode=memory");

        // An in-memory database disappears when its last connection closes,
        // so keep one connection alive for the lifetime of the pool.
        let pool = if is_in_memory {
            AnyPoolOptions::new()
                .max_connections(5)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        } else {
            AnyPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        };

        if is_in_memory {
            sqlx::query("PRAGMA busy_timeout = 5000;")
                .execute(&pool)
                .await
                .sql_context("Failed to configure SQLite")?;
        } else {
            sqlx::query(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;
        }

        let store = Self {
            pool,
            kind: DbKind::Sqlite,
        };
        schema::initialize(&store).await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database.
    ///
    /// The database exists only for the lifetime of this store. Useful for
    /// testing.
    pub async fn sqlite_in_memory() -> Result<Self> {
        // Shared cache so every pooled connection sees the same database,
        // uniquely named so separate stores never share one.
        let unique_id = uuid::Uuid::new_v4();
        let url = format!("sqlite:file:mem_{unique_id}?mode=memory&cache=shared");
        Self::connect_sqlite(&url).await
    }
}

// PostgreSQL-specific implementations
#[cfg(feature = "postgres")]
impl SqlxStore {
    /// Connect to a PostgreSQL database using a connection URL.
    ///
    /// This connects to the default (public) schema. For test isolation,
    /// use `connect_postgres_isolated()` instead.
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        Self::connect_postgres_with_schema(url, None).await
    }

    /// Connect to a PostgreSQL database with test isolation.
    ///
    /// Creates a unique schema for this store so parallel tests don't
    /// interfere with each other.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        // PostgreSQL schema names must start with a letter and be lowercase
        let unique_id = uuid::Uuid::new_v4().simple().to_string();
        Self::connect_postgres_with_schema(url, Some(format!("test_{unique_id}"))).await
    }

    async fn connect_postgres_with_schema(url: &str, schema_name: Option<String>) -> Result<Self> {
        sqlx::any::install_default_drivers();

        if let Some(ref schema) = schema_name {
            let temp_pool = AnyPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .sql_context("Failed to connect to PostgreSQL")?;

            let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {schema}");
            sqlx::query(&create_schema)
                .execute(&temp_pool)
                .await
                .sql_context(&format!("Failed to create schema {schema}"))?;

            temp_pool.close().await;
        }

        let schema_for_hook = schema_name.clone();
        let mut pool_options = AnyPoolOptions::new();
        if schema_name.is_some() {
            pool_options = pool_options
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(30));
        } else {
            pool_options = pool_options.max_connections(5);
        }

        let pool = pool_options
            .after_connect(move |conn, _meta| {
                let schema = schema_for_hook.clone();
                Box::pin(async move {
                    if let Some(ref s) = schema {
                        let set_path = format!("SET search_path TO {s}");
                        conn.execute(set_path.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;

        let store = Self {
            pool,
            kind: DbKind::Postgres,
        };
        schema::initialize(&store).await?;
        Ok(store)
    }
}

#[async_trait]
impl PositionStore for SqlxStore {
    async fn get_item(&self, item: &ItemId) -> Result<Option<Item>> {
        storage::get_item(self, item).await
    }

    async fn read_neighbors(
        &self,
        container: &ContainerId,
        reference: &ItemId,
        direction: Direction,
    ) -> Result<(Option<PositionKey>, Option<PositionKey>)> {
        storage::read_neighbors(self, container, reference, direction).await
    }

    async fn read_edge(&self, container: &ContainerId, edge: Edge) -> Result<Option<PositionKey>> {
        storage::read_edge(self, container, edge).await
    }

    async fn read_all_ordered(&self, container: &ContainerId) -> Result<Vec<PositionKey>> {
        storage::read_all_ordered(self, container).await
    }

    async fn write_key(&self, write: KeyWrite) -> Result<()> {
        storage::write_key(self, write).await
    }

    async fn rewrite_container(
        &self,
        container: &ContainerId,
        rewrites: &[KeyRewrite],
    ) -> Result<()> {
        storage::rewrite_container(self, container, rewrites).await
    }

    async fn remove_item(&self, item: &ItemId) -> Result<bool> {
        storage::remove_item(self, item).await
    }

    async fn containers(&self) -> Result<Vec<(ContainerId, usize)>> {
        storage::containers(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(feature = "sqlite")]
/// Convenience type alias for the SQLite store.
pub type Sqlite = SqlxStore;

#[cfg(feature = "postgres")]
/// Convenience type alias for the PostgreSQL store.
pub type Postgres = SqlxStore;
