//! Runtime configuration from command-line flags and environment variables.

use crate::db::PoolSettings;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Reviewer assignment service.
#[derive(Debug, Clone, Parser)]
#[command(name = "pr-reviewer", version, about)]
pub struct Config {
    /// SQLite database file. Parent directories are created on startup.
    #[arg(long, env = "PR_REVIEWER_DATABASE_PATH", default_value = "pr-reviewer.db")]
    pub database_path: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "PR_REVIEWER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, env = "PR_REVIEWER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum pooled SQLite connections.
    #[arg(
        long,
        env = "PR_REVIEWER_DB_MAX_CONNECTIONS",
        default_value_t = 8,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub db_max_connections: u32,

    /// Seconds a write waits on a locked database before failing.
    #[arg(long, env = "PR_REVIEWER_DB_BUSY_TIMEOUT_SECS", default_value_t = 30)]
    pub db_busy_timeout_secs: u64,
}

impl Config {
    /// Combined bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| format!("Invalid host '{}': {}", self.host, e))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            busy_timeout: Duration::from_secs(self.db_busy_timeout_secs),
            ..PoolSettings::default()
        }
    }
}
