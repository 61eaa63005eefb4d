//! Indexer test utilities.

use forkchoice_metadata::{
    Indexer, MetadataError, MetadataResult, PostgresStore, SqliteStore,
};
use sqlx::{Pool, Postgres as SqlxPostgres, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A SQLite-backed test indexer whose database file is removed on drop.
#[allow(dead_code)]
pub struct TestIndexer {
    pub indexer: Indexer,
    pub(crate) sqlite_store: Arc<SqliteStore>,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestIndexer {
    /// Create a new test indexer over a SQLite file in a temp directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("index.db");
        let store = Arc::new(SqliteStore::new(&db_path, 5).await?);

        Ok(Self {
            indexer: Indexer::new(store.clone()),
            sqlite_store: store,
            db_path,
            _temp_dir: temp_dir,
        })
    }

    pub fn indexer(&self) -> Indexer {
        self.indexer.clone()
    }

    /// Path of the database file, for reopening it.
    #[allow(dead_code)]
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }
}

/// PostgreSQL test indexer that manages a testcontainer.
#[allow(dead_code)]
pub struct PostgresTestIndexer {
    pub indexer: Indexer,
    pub(crate) postgres_store: Arc<PostgresStore>,
    url: String,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestIndexer {
    /// Start a PostgreSQL container and open an indexer against it.
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let store = Arc::new(PostgresStore::from_url(&url, 5, None).await?);

        Ok(Self {
            indexer: Indexer::new(store.clone()),
            postgres_store: store,
            url,
            _container: container,
        })
    }

    pub fn indexer(&self) -> Indexer {
        self.indexer.clone()
    }

    /// Connection URL of the container, for reopening the database.
    #[allow(dead_code)]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get a reference to the PostgreSQL connection pool for raw queries.
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<SqlxPostgres> {
        self.postgres_store.pool()
    }
}

/// Try to create a PostgreSQL test indexer, skipping if Docker is unavailable
/// or SKIP_POSTGRES_TESTS is set.
///
/// Only container-start failures cause a skip. Schema, migration or
/// connection errors still panic.
#[allow(dead_code)]
pub async fn postgres_or_skip() -> Option<PostgresTestIndexer> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestIndexer::new().await {
        Ok(indexer) => Some(indexer),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
#[allow(dead_code)]
pub async fn run_indexer_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Indexer) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestIndexer::new()
        .await
        .expect("Failed to create SQLite test indexer");
    test_fn.clone()(sqlite.indexer()).await;

    // PostgreSQL requires Docker
    if let Some(postgres) = postgres_or_skip().await {
        test_fn(postgres.indexer()).await;
    }
}
