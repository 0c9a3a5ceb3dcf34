use crate::retry::{RetryPolicy, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_ATTEMPTS};
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Unsupported store backend '{other}'. Use postgres or memory.")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub retry: RetryPolicy,
    pub local_lock: bool,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> SocketAddr { SocketAddr::from((self.host, self.port)) }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    config_from_lookup(|key| env::var(key).ok())
}

/// Builds the config from any key lookup; [`load_service_config`] passes the process env.
pub fn config_from_lookup<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

    let backend = var("STORE_BACKEND")
        .map(|value| value.parse::<StoreBackend>())
        .transpose()
        .context("Failed to parse STORE_BACKEND")?
        .unwrap_or(StoreBackend::Postgres);
    let database_url = var("DATABASE_URL");
    if backend == StoreBackend::Postgres && database_url.is_none() {
        bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
    }

    let host = var("HOST")
        .unwrap_or_else(|| "0.0.0.0".to_string())
        .parse::<IpAddr>()
        .context("Failed to parse HOST")?;
    let port = parse_or(&var, "PORT", 8081u16)?;
    let db_max_connections = parse_or(&var, "DB_MAX_CONNECTIONS", 10u32)?;

    let max_attempts = parse_or(&var, "ID_ALLOCATOR_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
    if max_attempts == 0 {
        bail!("ID_ALLOCATOR_MAX_ATTEMPTS must be at least 1");
    }
    let retry = RetryPolicy {
        max_attempts,
        base_delay: millis_or(&var, "ID_ALLOCATOR_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE)?,
        max_delay: millis_or(&var, "ID_ALLOCATOR_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX)?,
        attempt_timeout: millis_or(&var, "ID_ALLOCATOR_ATTEMPT_TIMEOUT_MS", DEFAULT_ATTEMPT_TIMEOUT)?,
    };
    if retry.attempt_timeout.is_zero() {
        bail!("ID_ALLOCATOR_ATTEMPT_TIMEOUT_MS must be positive");
    }
    let local_lock = var("ID_ALLOCATOR_LOCAL_LOCK")
        .map(|value| parse_bool(&value))
        .transpose()
        .context("Failed to parse ID_ALLOCATOR_LOCAL_LOCK")?
        .unwrap_or(true);

    Ok(ServiceConfig { backend, database_url, db_max_connections, host, port, retry, local_lock })
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value.parse::<T>().with_context(|| format!("Failed to parse {key}")),
        None => Ok(default),
    }
}

fn millis_or<V>(var: &V, key: &str, default: Duration) -> Result<Duration>
where
    V: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(var, key, default_ms).map(Duration::from_millis)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Unsupported boolean '{other}'. Use true/false, yes/no, on/off or 1/0.")),
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
