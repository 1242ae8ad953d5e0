use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Connection attempts before giving up (at least one is made)
    pub connect_retries: u32,
    /// Delay before the first retry; doubles per attempt, capped at 30s
    pub retry_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 5000,
            connect_retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

/// Batch audit worker pool
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuditConfig {
    /// Upper bound on accounts audited at the same time
    pub max_concurrency: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.audit.max_concurrency, 32);
    }

    #[test]
    fn test_partial_sections() {
        let yaml = format!(
            "{}postgres_url: postgres://u:p@localhost/ledger\naudit:\n  max_concurrency: 4\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.audit.max_concurrency, 4);
        assert_eq!(config.database.acquire_timeout_ms, 5000);
        assert_eq!(config.database.connect_retries, 3);
        assert_eq!(config.database.retry_delay_ms, 2000);
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgres://u:p@localhost/ledger")
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
