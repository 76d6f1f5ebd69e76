use crate::error::{Error, Result};
use dotenvy::dotenv;
use sqlx::types::ipnetwork::IpNetwork;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub public_rps: u32,
    pub admin_rps: u32,
    pub save_interval_seconds: u64,
    pub save_debounce_ms: u64,
    pub abandon_after_minutes: i64,
    pub grading_max_attempts: i32,
    pub log_format: LogFormat,
    /// Proxies whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    pub trusted_proxies: Vec<IpNetwork>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let storage_backend: StorageBackend = get_env_or("STORAGE_BACKEND", StorageBackend::Postgres)?;
        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "Missing environment variable: DATABASE_URL".to_string(),
            ));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            storage_backend,
            database_url,
            jwt_secret: get_env("JWT_SECRET")?,
            public_rps: get_env_or("PUBLIC_RPS", 200)?,
            admin_rps: get_env_or("ADMIN_RPS", 50)?,
            save_interval_seconds: get_env_or("SAVE_INTERVAL_SECONDS", 10)?,
            save_debounce_ms: get_env_or("SAVE_DEBOUNCE_MS", 800)?,
            abandon_after_minutes: get_env_or("ABANDON_AFTER_MINUTES", 180)?,
            grading_max_attempts: get_env_or("GRADING_MAX_ATTEMPTS", 5)?,
            log_format: get_env_or("LOG_FORMAT", LogFormat::Text)?,
            trusted_proxies: parse_networks("TRUSTED_PROXIES", &env::var("TRUSTED_PROXIES").unwrap_or_default())?,
        })
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_seconds)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Comma-separated CIDR blocks or bare addresses.
fn parse_networks(name: &str, raw: &str) -> Result<Vec<IpNetwork>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<IpNetwork>()
                .map_err(|e| Error::Config(format!("Invalid value for {}: '{}': {}", name, item, e)))
        })
        .collect()
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

/// Initializes the global configuration unless another caller already did.
/// Integration tests in one binary share the process-wide `CONFIG`.
pub fn init_config_once() -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_proxies_parse_as_networks() {
        let nets = parse_networks("TRUSTED_PROXIES", " 10.0.0.0/8, 127.0.0.1 ,,").unwrap();
        assert_eq!(nets.len(), 2);
        assert!(nets[1].contains("127.0.0.1".parse().unwrap()));
        assert!(parse_networks("TRUSTED_PROXIES", "").unwrap().is_empty());
        assert!(matches!(
            parse_networks("TRUSTED_PROXIES", "not-an-ip"),
            Err(Error::Config(_))
        ));
    }
}
