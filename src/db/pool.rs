//! SQLite connection pool with WAL mode.
//!
//! Request handlers share one pool; WAL keeps directory reads flowing while a
//! reviewer-list write is in progress.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// Sizing and timeouts for the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// SQLite allows a single writer, so extra connections only add read
    /// parallelism.
    pub max_connections: u32,
    /// How long a connection waits on a locked database before SQLITE_BUSY.
    pub busy_timeout: Duration,
    /// How long a request waits for a free pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Open a pool on `db_path` with WAL mode and foreign keys enabled.
///
/// The database file is created if missing, but its parent directory must
/// already exist.
pub async fn create_pool(db_path: &Path, settings: &PoolSettings) -> Result<DbPool, sqlx::Error> {
    let db_url = format!("sqlite:{}", db_path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(settings.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .min_connections(1)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(connect_options)
        .await?;

    let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await?;

    if !mode.0.eq_ignore_ascii_case("wal") {
        log::warn!("[db] WAL mode not active, journal_mode = {}", mode.0);
    }

    log::debug!(
        "[db] pool on {} with up to {} connection(s)",
        db_path.display(),
        settings.max_connections
    );

    Ok(pool)
}
