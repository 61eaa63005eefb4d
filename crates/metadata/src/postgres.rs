//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FrameLabelRow, FrameRow, SourceRow, index_timestamp};
use crate::query::{Column, Predicate, Projection, SelectQuery, Table, Value, Values};
use crate::repos::{FrameRepo, SourceRepo};
use crate::store::{FRAME_COLUMNS, FRAME_LABEL_COLUMNS, MetadataStore, check_columns};
use async_trait::async_trait;
use forkchoice_core::Engine;
use forkchoice_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::collections::HashSet;
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL (DSN).
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, e.g. the password
    /// through an environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn table_columns(&self, table: &str) -> MetadataResult<HashSet<String>> {
        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name::TEXT
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MetadataError::SchemaInit(e.to_string()))?;
        Ok(columns.into_iter().collect())
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::SchemaInit(e.to_string()))?;
        }

        check_columns("frame", &self.table_columns("frame").await?, FRAME_COLUMNS)?;
        check_columns(
            "frame_label",
            &self.table_columns("frame_label").await?,
            FRAME_LABEL_COLUMNS,
        )?;

        tracing::debug!("PostgreSQL frame index schema ready");
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn engine(&self) -> Engine {
        Engine::Postgres
    }
}

/// Column reference for ORDER BY. Text columns compare bytewise so listings
/// sort the same way they do on SQLite.
fn order_column(column: Column, projection: Projection) -> String {
    match projection {
        // The projected column already carries the collation under its own name.
        Projection::Distinct(_) => column.as_str().to_string(),
        Projection::Rows if column.is_text() => format!("{} COLLATE \"C\"", column.as_str()),
        Projection::Rows => column.as_str().to_string(),
    }
}

/// Render a select for PostgreSQL. Membership lists are bound as a single
/// array parameter.
fn render(query: &SelectQuery) -> QueryBuilder<'static, Postgres> {
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
        Projection::Distinct(column) if column.is_text() => {
            builder.push(format!(
                "DISTINCT {name} COLLATE \"C\" AS {name}",
                name = column.as_str()
            ));
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
                builder.push("FALSE");
            }
            Predicate::In(column, values) => {
                builder.push(column.as_str()).push(" = ANY(");
                match values {
                    Values::Text(values) => builder.push_bind(values.clone()),
                    Values::Int(values) => builder.push_bind(values.clone()),
                };
                builder.push(")");
            }
        }
    }

    for (position, (column, direction)) in query.ordering().iter().enumerate() {
        builder.push(if position == 0 { " ORDER BY " } else { ", " });
        builder
            .push(order_column(*column, query.projection()))
            .push(" ")
            .push(direction.as_sql());
    }

    if let Some(limit) = query.row_limit() {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
    }

    builder
}

#[async_trait]
impl FrameRepo for PostgresStore {
    async fn insert_frame(&self, frame: &FrameRow, labels: &[&str]) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO frame (id, node, fetched_at, wall_clock_slot, wall_clock_epoch)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&frame.id)
        .bind(&frame.node)
        .bind(index_timestamp(frame.fetched_at))
        .bind(frame.wall_clock_slot)
        .bind(frame.wall_clock_epoch)
        .execute(&mut *tx)
        .await?;

        if !labels.is_empty() {
            let mut builder: QueryBuilder<'_, Postgres> =
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

        sqlx::query("DELETE FROM frame_label WHERE frame_id = $1")
            .bind(frame_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM frame WHERE id = $1")
            .bind(frame_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn fetch_frames(&self, query: &SelectQuery) -> MetadataResult<Vec<FrameRow>> {
        query.check(Table::Frame, false)?;
        let mut builder = render(query);
        let rows = builder
            .build_query_as::<FrameRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_labels(&self, query: &SelectQuery) -> MetadataResult<Vec<FrameLabelRow>> {
        query.check(Table::FrameLabel, false)?;
        let mut builder = render(query);
        let rows = builder
            .build_query_as::<FrameLabelRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_distinct_text(&self, query: &SelectQuery) -> MetadataResult<Vec<String>> {
        query.check(query.table(), true)?;
        let mut builder = render(query);
        let values = builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }

    async fn fetch_distinct_int(&self, query: &SelectQuery) -> MetadataResult<Vec<i64>> {
        query.check(query.table(), true)?;
        let mut builder = render(query);
        let values = builder
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }
}

#[async_trait]
impl SourceRepo for PostgresStore {
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
            ORDER BY node COLLATE "C" ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
