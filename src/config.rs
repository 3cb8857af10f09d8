use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Scylla,
    Memory,
}

impl FromStr for Backend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scylla" => Ok(Backend::Scylla),
            "memory" => Ok(Backend::Memory),
            other => Err(AppError::Config(format!("unknown storage backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub nodes: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub keyspace: String,
    pub schema_dir: PathBuf,
    pub schema_version: i32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub backend: Backend,
    pub scylla: ScyllaConfig,
    pub storage_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:1227".to_string(),
            backend: Backend::Scylla,
            scylla: ScyllaConfig {
                nodes: vec!["127.0.0.1:9042".to_string()],
                user: None,
                password: None,
                keyspace: "schoolhub".to_string(),
                schema_dir: PathBuf::from("cql"),
                schema_version: 1,
            },
            storage_timeout: Duration::from_millis(3000),
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    /// Read settings from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(bind) = lookup("SCHOOLHUB_BIND") {
            config.bind_addr = bind;
        }
        if let Some(backend) = lookup("SCHOOLHUB_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(nodes) = lookup("SCYLLA_NODES") {
            config.scylla.nodes = nodes
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
            if config.scylla.nodes.is_empty() {
                return Err(AppError::Config("SCYLLA_NODES is empty".to_string()));
            }
        }
        config.scylla.user = lookup("SCYLLA_USER");
        config.scylla.password = lookup("SCYLLA_PASSWORD");
        if let Some(keyspace) = lookup("SCYLLA_KEYSPACE") {
            config.scylla.keyspace = keyspace;
        }
        if let Some(dir) = lookup("SCHOOLHUB_SCHEMA_DIR") {
            config.scylla.schema_dir = PathBuf::from(dir);
        }
        if let Some(version) = lookup("SCHOOLHUB_SCHEMA_VERSION") {
            config.scylla.schema_version = parse_number("SCHOOLHUB_SCHEMA_VERSION", &version)?;
        }
        if let Some(ms) = lookup("STORAGE_TIMEOUT_MS") {
            config.storage_timeout = Duration::from_millis(parse_number("STORAGE_TIMEOUT_MS", &ms)?);
        }
        if let Some(secs) = lookup("SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(parse_number("SWEEP_INTERVAL_SECS", &secs)?);
        }

        if config.storage_timeout.is_zero() || config.sweep_interval.is_zero() {
            return Err(AppError::Config(
                "STORAGE_TIMEOUT_MS and SWEEP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:1227");
        assert_eq!(config.backend, Backend::Scylla);
        assert_eq!(config.scylla.keyspace, "schoolhub");
        assert_eq!(config.storage_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("SCHOOLHUB_BACKEND", "Memory"),
            ("SCYLLA_NODES", "10.0.0.1:9042, 10.0.0.2:9042"),
            ("STORAGE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.scylla.nodes.len(), 2);
        assert_eq!(config.storage_timeout, Duration::from_millis(250));
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = AppConfig::from_lookup(lookup_from(&[("SWEEP_INTERVAL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        let err = AppConfig::from_lookup(lookup_from(&[("SCHOOLHUB_BACKEND", "mongo")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        let err = AppConfig::from_lookup(lookup_from(&[("SWEEP_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
