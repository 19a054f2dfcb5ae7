use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use mosaic_transfer::{DEFAULT_EVENT_BUFFER, DEFAULT_RETENTION, RegistryConfig};

/// Server settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub retention: usize,
    pub idle_timeout: Option<Duration>,
    pub cleanup_interval: Duration,
    pub body_limit_bytes: usize,
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5050,
            retention: DEFAULT_RETENTION,
            idle_timeout: None,
            cleanup_interval: Duration::from_secs(60),
            body_limit_bytes: 50 * 1024 * 1024,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let host = lookup("MOSAIC_HOST").unwrap_or(defaults.host);
        let port = parse_or(&lookup, "MOSAIC_PORT", defaults.port)?;
        let retention = parse_or(&lookup, "MOSAIC_RETENTION", defaults.retention)?;
        if retention == 0 {
            bail!("MOSAIC_RETENTION must be at least 1");
        }
        let idle_timeout = lookup("MOSAIC_IDLE_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>().context("MOSAIC_IDLE_TIMEOUT_SECS"))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let cleanup_secs: u64 = parse_or(
            &lookup,
            "MOSAIC_CLEANUP_INTERVAL_SECS",
            defaults.cleanup_interval.as_secs(),
        )?;
        let body_limit_mb: usize = parse_or(
            &lookup,
            "MOSAIC_BODY_LIMIT_MB",
            defaults.body_limit_bytes / (1024 * 1024),
        )?;
        let event_buffer = parse_or(&lookup, "MOSAIC_EVENT_BUFFER", defaults.event_buffer)?;

        Ok(Self {
            host,
            port,
            retention,
            idle_timeout,
            cleanup_interval: Duration::from_secs(cleanup_secs.max(1)),
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            event_buffer,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            retention: self.retention,
            idle_timeout: self.idle_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(default),
    }
}
