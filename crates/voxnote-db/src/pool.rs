//! PostgreSQL pool setup for the remote store.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use voxnote_core::defaults;
use voxnote_core::{Error, Result};

/// Connections idle longer than this are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Pool sizing for the remote store.
///
/// | Variable | Default |
/// |----------|---------|
/// | `VOXNOTE_DB_MAX_CONNECTIONS` | 10 |
/// | `VOXNOTE_DB_MIN_CONNECTIONS` | 1 |
/// | `VOXNOTE_DB_ACQUIRE_TIMEOUT_SECS` | 30 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::POOL_MAX_CONNECTIONS,
            min_connections: defaults::POOL_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::POOL_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        let max_connections = std::env::var("VOXNOTE_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(base.max_connections);
        let min_connections = std::env::var("VOXNOTE_DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(base.min_connections);
        let acquire_timeout = std::env::var("VOXNOTE_DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(base.acquire_timeout);
        Self {
            max_connections,
            min_connections,
            acquire_timeout,
        }
        .clamped()
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self.clamped()
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// At least one connection, and never a minimum above the maximum.
    fn clamped(mut self) -> Self {
        self.max_connections = self.max_connections.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }
}

/// Open a pool against `database_url`.
pub async fn connect_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, defaults::POOL_MAX_CONNECTIONS);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_min_never_exceeds_max() {
        let config = PoolConfig {
            max_connections: 4,
            min_connections: 3,
            acquire_timeout: Duration::from_secs(5),
        }
        .with_max_connections(0);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.min_connections, 1);
    }
}
