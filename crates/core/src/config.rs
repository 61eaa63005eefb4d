//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level configuration for processes that open the index.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backing engine of the metadata index.
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// Supported index engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Embedded single-file store.
    Sqlite,
    /// Networked relational store.
    Postgres,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "embedded" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "networked" => Ok(Self::Postgres),
            other => Err(crate::Error::Config(format!(
                "invalid driver name: {other}"
            ))),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata index configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexerConfig {
    /// SQLite database file. `:memory:` opens a private in-memory database.
    #[serde(alias = "embedded")]
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// How long a writer waits on a locked database before failing.
        #[serde(default = "default_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
    /// PostgreSQL database.
    #[serde(alias = "networked", alias = "postgresql")]
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer FORKCHOICE_INDEXER__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds; the server cancels queries
        /// that run longer.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/forkchoice.db"),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl IndexerConfig {
    /// Build a configuration from an engine name and a single connection
    /// string: a file path for SQLite, a URL for PostgreSQL.
    pub fn from_dsn(engine: &str, dsn: &str) -> crate::Result<Self> {
        let config = match engine.parse::<Engine>()? {
            Engine::Sqlite => Self::Sqlite {
                path: PathBuf::from(dsn),
                busy_timeout_secs: default_busy_timeout_secs(),
            },
            Engine::Postgres => Self::Postgres {
                url: Some(dsn.to_string()),
                host: None,
                port: default_pg_port(),
                username: None,
                password: None,
                database: None,
                ssl_mode: None,
                max_connections: default_max_connections(),
                statement_timeout_ms: default_statement_timeout_ms(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// The engine this configuration selects.
    pub fn engine(&self) -> Engine {
        match self {
            Self::Sqlite { .. } => Engine::Sqlite,
            Self::Postgres { .. } => Engine::Postgres,
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Self::Sqlite { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(crate::Error::Config(
                        "sqlite config requires a non-empty 'path'".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err(crate::Error::Config(
                        "postgres 'max_connections' must be at least 1".to_string(),
                    ));
                }
                // Must have either url OR (host + database)
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(crate::Error::Config(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    )),
                    (None, Some(_), None) => Err(crate::Error::Config(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sqlite() {
        let config = AppConfig::default();
        assert_eq!(config.indexer.engine(), Engine::Sqlite);
        config.indexer.validate().unwrap();
    }

    #[test]
    fn test_engine_names() {
        assert_eq!("sqlite".parse::<Engine>().unwrap(), Engine::Sqlite);
        assert_eq!("embedded".parse::<Engine>().unwrap(), Engine::Sqlite);
        assert_eq!("Postgres".parse::<Engine>().unwrap(), Engine::Postgres);
        assert_eq!("networked".parse::<Engine>().unwrap(), Engine::Postgres);

        let err = "mysql".parse::<Engine>().unwrap_err();
        assert!(matches!(err, crate::Error::Config(msg) if msg.contains("mysql")));
    }

    #[test]
    fn test_from_dsn() {
        let sqlite = IndexerConfig::from_dsn("sqlite", "/tmp/frames.db").unwrap();
        assert!(matches!(sqlite, IndexerConfig::Sqlite { busy_timeout_secs: 5, .. }));

        let pg = IndexerConfig::from_dsn("postgres", "postgres://u:p@localhost/frames").unwrap();
        match pg {
            IndexerConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                assert_eq!(url.as_deref(), Some("postgres://u:p@localhost/frames"));
                assert_eq!(max_connections, 10);
            }
            _ => panic!("expected postgres config"),
        }

        assert!(IndexerConfig::from_dsn("oracle", "x").is_err());
        assert!(IndexerConfig::from_dsn("sqlite", "").is_err());
    }

    #[test]
    fn test_deserialize_tagged_sqlite() {
        let json = r#"{"type": "sqlite", "path": "frames.db"}"#;
        let config: IndexerConfig = serde_json::from_str(json).unwrap();
        match config {
            IndexerConfig::Sqlite {
                path,
                busy_timeout_secs,
            } => {
                assert_eq!(path, PathBuf::from("frames.db"));
                assert_eq!(busy_timeout_secs, 5);
            }
            _ => panic!("expected sqlite config"),
        }
    }

    #[test]
    fn test_deserialize_unknown_engine_fails() {
        let json = r#"{"type": "mongodb", "path": "frames.db"}"#;
        assert!(serde_json::from_str::<IndexerConfig>(json).is_err());
    }

    #[test]
    fn test_postgres_defaults_and_validation() {
        let json = r#"{"type": "postgres", "host": "db", "database": "frames"}"#;
        let config: IndexerConfig = serde_json::from_str(json).unwrap();
        match &config {
            IndexerConfig::Postgres {
                port,
                max_connections,
                statement_timeout_ms,
                ssl_mode,
                ..
            } => {
                assert_eq!(*port, Some(5432));
                assert_eq!(*max_connections, 10);
                assert_eq!(*statement_timeout_ms, Some(30_000));
                assert_eq!(*ssl_mode, None);
            }
            _ => panic!("expected postgres config"),
        }
        config.validate().unwrap();

        let missing_db: IndexerConfig =
            serde_json::from_str(r#"{"type": "postgres", "host": "db"}"#).unwrap();
        assert!(missing_db.validate().is_err());

        let nothing: IndexerConfig = serde_json::from_str(r#"{"type": "postgres"}"#).unwrap();
        assert!(nothing.validate().is_err());
    }
}
