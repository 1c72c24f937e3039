//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use voxnote_core::defaults;
use voxnote_core::{Error, Result};

/// Runtime configuration of the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// PostgreSQL URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Directory for uploaded audio; uploads are disabled when unset.
    pub audio_storage_path: Option<PathBuf>,
    pub audio_retention: chrono::Duration,
    pub sweep_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            audio_storage_path: None,
            audio_retention: chrono::Duration::hours(defaults::AUDIO_RETENTION_HOURS),
            sweep_interval: Duration::from_secs(defaults::AUDIO_SWEEP_INTERVAL_SECS),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DATABASE_URL` | unset | PostgreSQL URL, in-memory store when unset |
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `AUDIO_STORAGE_PATH` | unset | Audio upload directory |
    /// | `AUDIO_RETENTION_HOURS` | `24` | Age after which audio is cleared |
    /// | `AUDIO_SWEEP_INTERVAL_SECS` | `3600` | Retention sweep interval |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            host: std::env::var("HOST").unwrap_or(base.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.port),
            audio_storage_path: std::env::var("AUDIO_STORAGE_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            audio_retention: std::env::var("AUDIO_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(chrono::Duration::hours)
                .unwrap_or(base.audio_retention),
            sweep_interval: std::env::var("AUDIO_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(base.sweep_interval),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))
    }
}
