//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FrameRepo, SourceRepo};
use async_trait::async_trait;
use forkchoice_core::Engine;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Columns every engine's `frame` table must expose.
pub(crate) const FRAME_COLUMNS: &[&str] = &[
    "id",
    "node",
    "fetched_at",
    "wall_clock_slot",
    "wall_clock_epoch",
];

/// Columns every engine's `frame_label` table must expose.
pub(crate) const FRAME_LABEL_COLUMNS: &[&str] = &["frame_id", "name"];

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FrameRepo + SourceRepo + Send + Sync {
    /// Create missing tables and indexes and verify the resulting shape.
    ///
    /// Any failure is reported as [`MetadataError::SchemaInit`].
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// The engine behind this store.
    fn engine(&self) -> Engine;
}

/// Fail with the columns of `table` that the existing schema lacks.
pub(crate) fn check_columns(
    table: &str,
    present: &HashSet<String>,
    required: &[&str],
) -> MetadataResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|column| !present.contains(**column))
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(MetadataError::SchemaInit(format!(
        "existing {table} table is missing columns: {}",
        missing.join(", ")
    )))
}

fn schema_err(err: sqlx::Error) -> MetadataError {
    MetadataError::SchemaInit(err.to_string())
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite index at `path` and migrate it.
    ///
    /// `:memory:` opens a private in-memory database that lives as long as
    /// the store.
    pub async fn new(path: impl AsRef<Path>, busy_timeout_secs: u64) -> MetadataResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MetadataError::Config(format!(
                        "cannot create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };

        let opts = opts
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(busy_timeout_secs));

        let mut pool_opts = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // serializes writers instead of failing them.
            .max_connections(1);
        if in_memory {
            // The database disappears with its connection.
            pool_opts = pool_opts
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        tracing::info!(
            path = %path.display(),
            in_memory,
            "Opened SQLite frame index"
        );

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn table_columns(&self, table: &str) -> MetadataResult<HashSet<String>> {
        let columns: Vec<(i32, String, String, i32, Option<String>, i32)> =
            sqlx::query_as(&format!("PRAGMA table_info({table})"))
                .fetch_all(&self.pool)
                .await
                .map_err(schema_err)?;
        Ok(columns.into_iter().map(|(_, name, ..)| name).collect())
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(schema_err)?;

        // CREATE TABLE IF NOT EXISTS leaves older tables untouched, so make
        // sure what is there has every column the index reads.
        check_columns("frame", &self.table_columns("frame").await?, FRAME_COLUMNS)?;
        check_columns(
            "frame_label",
            &self.table_columns("frame_label").await?,
            FRAME_LABEL_COLUMNS,
        )?;

        tracing::debug!("SQLite frame index schema ready");
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn engine(&self) -> Engine {
        Engine::Sqlite
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{FrameLabelRow, FrameRow, SourceRow, index_timestamp};
    use crate::query::{Predicate, Projection, SelectQuery, Table, Value, Values};
    use sqlx::QueryBuilder;
    use time::OffsetDateTime;
    use time::macros::format_description;

    /// Fixed-width UTC text, so lexical order is chronological order.
    pub(super) fn sqlite_timestamp(ts: OffsetDateTime) -> MetadataResult<String> {
        index_timestamp(ts)
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
            ))
            .map_err(|e| MetadataError::Internal(format!("cannot format timestamp: {e}")))
    }

    /// Render a select for SQLite. Membership lists are bound as one JSON
    /// array and expanded with `json_each`, which keeps large id sets clear
    /// of the bound-parameter limit.
    pub(super) fn render(query: &SelectQuery) -> MetadataResult<QueryBuilder<'static, Sqlite>> {
        let mut builder = QueryBuilder::new("SELECT ");
        match query.projection() {
            Projection::Rows => {
                let columns: Vec<&str> = query
                    .table()
                    .row_columns()
                    .iter()
                    .map(|column| column.as_str())
                    .collect();
                builder.push(columns.join(", "));
            }
            Projection::Distinct(column) => {
                builder.push("DISTINCT ").push(column.as_str());
            }
        }
        builder.push(" FROM ").push(query.table().as_str());

        for (position, predicate) in query.predicates().iter().enumerate() {
            builder.push(if position == 0 { " WHERE " } else { " AND " });
            match predicate {
                Predicate::Eq(column, value) => {
                    builder.push(column.as_str()).push(" = ");
                    match value {
                        Value::Text(text) => builder.push_bind(text.clone()),
                        Value::Int(int) => builder.push_bind(*int),
                    };
                }
                Predicate::In(_, values) if values.is_empty() => {
                    builder.push("0 = 1");
                }
                Predicate::In(column, values) => {
                    let array = match values {
                        Values::Text(values) => serde_json::to_string(values),
                        Values::Int(values) => serde_json::to_string(values),
                    }
                    .map_err(|e| MetadataError::Internal(format!("cannot encode values: {e}")))?;
                    builder
                        .push(column.as_str())
                        .push(" IN (SELECT value FROM json_each(")
                        .push_bind(array)
                        .push("))");
                }
            }
        }

        for (position, (column, direction)) in query.ordering().iter().enumerate() {
            builder.push(if position == 0 { " ORDER BY " } else { ", " });
            builder
                .push(column.as_str())
                .push(" ")
                .push(direction.as_sql());
        }

        if let Some(limit) = query.row_limit() {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        Ok(builder)
    }

    #[async_trait]
    impl FrameRepo for SqliteStore {
        async fn insert_frame(&self, frame: &FrameRow, labels: &[&str]) -> MetadataResult<()> {
            let fetched_at = sqlite_timestamp(frame.fetched_at)?;

            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO frame (id, node, fetched_at, wall_clock_slot, wall_clock_epoch)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&frame.id)
            .bind(&frame.node)
            .bind(&fetched_at)
            .bind(frame.wall_clock_slot)
            .bind(frame.wall_clock_epoch)
            .execute(&mut *tx)
            .await?;

            if !labels.is_empty() {
                let mut builder: QueryBuilder<'_, Sqlite> =
                    QueryBuilder::new("INSERT INTO frame_label (frame_id, name) ");
                builder.push_values(labels, |mut row, name| {
                    row.push_bind(frame.id.as_str()).push_bind(*name);
                });
                builder.build().execute(&mut *tx).await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn delete_frame(&self, frame_id: &str) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM frame_label WHERE frame_id = ?")
                .bind(frame_id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM frame WHERE id = ?")
                .bind(frame_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(result.rows_affected())
        }

        async fn fetch_frames(&self, query: &SelectQuery) -> MetadataResult<Vec<FrameRow>> {
            query.check(Table::Frame, false)?;
            let mut builder = render(query)?;
            let rows = builder
                .build_query_as::<FrameRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn fetch_labels(&self, query: &SelectQuery) -> MetadataResult<Vec<FrameLabelRow>> {
            query.check(Table::FrameLabel, false)?;
            let mut builder = render(query)?;
            let rows = builder
                .build_query_as::<FrameLabelRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn fetch_distinct_text(&self, query: &SelectQuery) -> MetadataResult<Vec<String>> {
            query.check(query.table(), true)?;
            let mut builder = render(query)?;
            let values = builder
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await?;
            Ok(values)
        }

        async fn fetch_distinct_int(&self, query: &SelectQuery) -> MetadataResult<Vec<i64>> {
            query.check(query.table(), true)?;
            let mut builder = render(query)?;
            let values = builder
                .build_query_scalar::<i64>()
                .fetch_all(&self.pool)
                .await?;
            Ok(values)
        }
    }

    #[async_trait]
    impl SourceRepo for SqliteStore {
        async fn summarize_sources(&self, limit: u32) -> MetadataResult<Vec<SourceRow>> {
            let rows = sqlx::query_as::<_, SourceRow>(
                r#"
                SELECT node,
                       COUNT(*) AS frame_count,
                       MIN(fetched_at) AS first_fetched_at,
                       MAX(fetched_at) AS last_fetched_at,
                       MAX(wall_clock_slot) AS latest_wall_clock_slot
                FROM frame
                GROUP BY node
                ORDER BY node ASC
                LIMIT ?
                "#,
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Frame metadata; payload bytes live in the blob store keyed by id
CREATE TABLE IF NOT EXISTS frame (
    id TEXT PRIMARY KEY,
    node TEXT NOT NULL,
    -- UTC, fixed-width RFC 3339 with microseconds
    fetched_at TEXT NOT NULL,
    wall_clock_slot INTEGER NOT NULL,
    wall_clock_epoch INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_frame_node ON frame(node);
CREATE INDEX IF NOT EXISTS idx_frame_fetched_at ON frame(fetched_at);
CREATE INDEX IF NOT EXISTS idx_frame_wall_clock_slot ON frame(wall_clock_slot);
CREATE INDEX IF NOT EXISTS idx_frame_wall_clock_epoch ON frame(wall_clock_epoch);

-- Frame labels; at most one row per (frame_id, name), enforced on insert
CREATE TABLE IF NOT EXISTS frame_label (
    frame_id TEXT NOT NULL REFERENCES frame(id) ON DELETE CASCADE,
    name TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_frame_label_name ON frame_label(name);
CREATE INDEX IF NOT EXISTS idx_frame_label_frame_id ON frame_label(frame_id);
"#;

#[cfg(test)]
mod tests {
    use super::sqlite_impl::{render, sqlite_timestamp};
    use super::*;
    use crate::query::{Column, Direction, SelectQuery, Table, Values};
    use time::macros::datetime;

    #[test]
    fn test_render_full_rows_with_predicates() {
        let mut query = SelectQuery::from(Table::Frame);
        query
            .filter_eq(Column::Node, "ams3-teku-001")
            .filter_eq(Column::WallClockSlot, 100i64)
            .order_by(Column::FetchedAt, Direction::Asc)
            .order_by(Column::Id, Direction::Asc)
            .limit(1000);

        assert_eq!(
            render(&query).unwrap().sql(),
            "SELECT id, node, fetched_at, wall_clock_slot, wall_clock_epoch FROM frame \
             WHERE node = ? AND wall_clock_slot = ? ORDER BY fetched_at ASC, id ASC LIMIT ?"
        );
    }

    #[test]
    fn test_render_membership_and_distinct() {
        let mut query = SelectQuery::from(Table::FrameLabel);
        query
            .distinct(Column::Name)
            .filter_in(Column::FrameId, Values::Text(vec!["a".into(), "b".into()]))
            .order_by(Column::Name, Direction::Asc);

        assert_eq!(
            render(&query).unwrap().sql(),
            "SELECT DISTINCT name FROM frame_label \
             WHERE frame_id IN (SELECT value FROM json_each(?)) ORDER BY name ASC"
        );
    }

    #[test]
    fn test_render_empty_membership_matches_nothing() {
        let mut query = SelectQuery::from(Table::Frame);
        query.filter_in(Column::Id, Values::Text(Vec::new()));
        assert!(render(&query).unwrap().sql().ends_with("WHERE 0 = 1"));
    }

    #[test]
    fn test_sqlite_timestamp_is_fixed_width_utc() {
        assert_eq!(
            sqlite_timestamp(datetime!(2023-03-23 14:00:00 +10:00)).unwrap(),
            "2023-03-23T04:00:00.000000Z"
        );
        assert_eq!(
            sqlite_timestamp(datetime!(2023-03-23 04:00:00.5 UTC)).unwrap(),
            "2023-03-23T04:00:00.500000Z"
        );
        assert_eq!(
            sqlite_timestamp(datetime!(2023-03-23 04:00:00.0000009 -05:00)).unwrap(),
            "2023-03-23T09:00:00.000000Z"
        );
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = SqliteStore::new(":memory:", 5).await.unwrap();
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.engine(), Engine::Sqlite);
    }

    #[tokio::test]
    async fn test_migrate_rejects_incompatible_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("legacy.db");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&db_path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query("CREATE TABLE frame (id TEXT PRIMARY KEY, node TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        match SqliteStore::new(&db_path, 5).await {
            Err(MetadataError::SchemaInit(msg)) => {
                assert!(msg.contains("fetched_at"), "unexpected message: {msg}");
            }
            Err(other) => panic!("expected SchemaInit, got {other}"),
            Ok(_) => panic!("expected SchemaInit, got a store"),
        }
    }
}
