//! Frame metadata index for fork choice frames.
//!
//! This crate provides the searchable side of the frame store:
//! - Frame rows (node, id, fetch time, wall clock slot and epoch) and labels
//! - Listing filters and match-all label resolution
//! - Distinct projections and per-node source summaries
//! - SQLite and PostgreSQL engines behind one [`MetadataStore`] trait

pub mod error;
pub mod filter;
pub mod indexer;
pub mod labels;
pub mod models;
pub mod postgres;
pub mod query;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use indexer::Indexer;
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use forkchoice_core::IndexerConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
///
/// The configuration is validated first; the returned store has its schema
/// migrated.
pub async fn from_config(config: &IndexerConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate()?;

    match config {
        IndexerConfig::Sqlite {
            path,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *busy_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        IndexerConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                // URL takes precedence over individual parameters
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
