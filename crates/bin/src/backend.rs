//! Store creation and persistence helpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ordinal::store::{InMemory, PositionStore, sql::SqlxStore};
use ordinal::{Config, OrderedCollection};

use crate::cli::{Backend, StoreArgs};

const SQLITE_FILE: &str = "ordinal.db";
const JSON_FILE: &str = "ordinal.json";

/// Redact credentials from a PostgreSQL connection URL for safe logging
pub fn redact_postgres_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

fn data_dir(args: &StoreArgs) -> PathBuf {
    args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// Short description of the configured backend, for logs and output.
pub fn backend_label(args: &StoreArgs) -> String {
    match args.backend {
        Backend::Sqlite => format!("sqlite:{}", data_dir(args).join(SQLITE_FILE).display()),
        Backend::Postgres => args
            .postgres_url
            .as_deref()
            .map(redact_postgres_url)
            .unwrap_or_else(|| "postgres:<unset>".to_string()),
        Backend::Inmemory => format!("inmemory:{}", data_dir(args).join(JSON_FILE).display()),
    }
}

/// Create the appropriate store based on configuration
pub async fn create_store(
    args: &StoreArgs,
) -> Result<Arc<dyn PositionStore>, Box<dyn std::error::Error>> {
    let data_dir = data_dir(args);

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    match args.backend {
        Backend::Sqlite => {
            let db_path = data_dir.join(SQLITE_FILE);
            tracing::info!(path = %db_path.display(), "Using SQLite store");
            Ok(Arc::new(SqlxStore::open_sqlite(&db_path).await?))
        }
        Backend::Postgres => {
            let url = args
                .postgres_url
                .as_ref()
                .ok_or("PostgreSQL backend requires --postgres-url or ORDINAL_POSTGRES_URL")?;

            let display_url = redact_postgres_url(url);
            tracing::info!(url = %display_url, "Connecting to PostgreSQL store");

            match SqlxStore::connect_postgres(url).await {
                Ok(store) => Ok(Arc::new(store)),
                Err(e) => {
                    Err(format!("Failed to connect to PostgreSQL at {display_url}: {e}").into())
                }
            }
        }
        Backend::Inmemory => {
            let json_path = data_dir.join(JSON_FILE);
            tracing::info!(path = %json_path.display(), "Using in-memory store");
            Ok(Arc::new(InMemory::load_from_file(&json_path).await?))
        }
    }
}

/// Loads the config file if given, then applies command-line overrides.
pub async fn load_config(args: &StoreArgs) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path).await?,
        None => Config::default(),
    };
    if let Some(spacing) = args.spacing {
        config.rebalance_spacing = spacing;
    }
    config.validate()?;
    Ok(config)
}

/// Opens the store and wraps it in a collection.
pub async fn open_collection(
    args: &StoreArgs,
) -> Result<OrderedCollection, Box<dyn std::error::Error>> {
    let config = load_config(args).await?;
    let store = create_store(args).await?;
    Ok(OrderedCollection::new(store, config)?)
}

/// Writes the in-memory store back to its JSON file. Other stores persist on their own.
pub async fn persist(
    args: &StoreArgs,
    collection: &OrderedCollection,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(in_memory) = collection.store().as_any().downcast_ref::<InMemory>() {
        let path: &Path = &data_dir(args).join(JSON_FILE);
        in_memory.save_to_file(path).await?;
        tracing::debug!(path = %path.display(), "Saved in-memory store");
    }
    Ok(())
}
