use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use wabiz_graph::{DEFAULT_API_VERSION, DEFAULT_BASE_URL, GraphConfig};
use wabiz_worker::WorkerSettings;

pub const DEFAULT_CONFIG_FILE: &str = "wabiz.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub graph: GraphSection,
    pub billing: BillingConfig,
    pub setup: SetupConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
    /// Echoed back during the webhook subscription handshake.
    pub verify_token: Option<String>,
    /// Signs webhook deliveries (`X-Hub-Signature-256`).
    pub app_secret: Option<String>,
    pub auto_reply_timeout_secs: u64,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_version: DEFAULT_API_VERSION.into(),
            timeout_secs: 15,
            verify_token: None,
            app_secret: None,
            auto_reply_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub message_cost: i64,
    pub payment_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub code_cooldown_secs: i64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self { code_cooldown_secs: 60 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Hex-encoded 32-byte key sealing stored provider credentials.
    pub master_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: bool,
}

impl Config {
    /// Reads `path`, or `wabiz.toml` in the working directory when present,
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("WABIZ_MASTER_KEY") {
            self.security.master_key = Some(key);
        }
        if let Some(secret) = var("WABIZ_APP_SECRET") {
            self.graph.app_secret = Some(secret);
        }
        if let Some(secret) = var("WABIZ_PAYMENT_SECRET") {
            self.billing.payment_secret = Some(secret);
        }
        if let Some(path) = var("WABIZ_DATABASE") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self
            .security
            .master_key
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("security.master_key is required".into()))?;
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::Invalid(
                "security.master_key must be 64 hex characters".into(),
            ));
        }

        self.bind_addr()?;

        if self.graph.timeout_secs == 0 {
            return Err(ConfigError::Invalid("graph.timeout_secs must be positive".into()));
        }
        if self.billing.message_cost < 0 {
            return Err(ConfigError::Invalid("billing.message_cost cannot be negative".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not an address: {}", self.server.bind)))
    }

    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            base_url: self.graph.base_url.clone(),
            api_version: self.graph.api_version.clone(),
            timeout: Duration::from_secs(self.graph.timeout_secs),
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            message_cost: self.billing.message_cost,
            payment_secret: self.billing.payment_secret.clone(),
            code_cooldown_secs: self.setup.code_cooldown_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.graph.timeout_secs, 15);
        assert_eq!(config.setup.code_cooldown_secs, 60);
        assert!(!config.logging.json);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [graph]
            api_version = "v20.0"
            verify_token = "hook-token"

            [billing]
            message_cost = 3

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.graph.api_version, "v20.0");
        assert_eq!(config.graph.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.worker_settings().message_cost, 3);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn environment_wins_for_secrets() {
        let env: HashMap<&str, &str> = [("WABIZ_MASTER_KEY", KEY), ("WABIZ_PAYMENT_SECRET", "pay")]
            .into_iter()
            .collect();
        let mut config = Config::from_toml("[security]\nmaster_key = \"short\"").unwrap();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.security.master_key.as_deref(), Some(KEY));
        assert_eq!(config.billing.payment_secret.as_deref(), Some("pay"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_master_key() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.security.master_key = Some("zz".repeat(32));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
