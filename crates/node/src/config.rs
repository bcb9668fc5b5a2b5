use std::path::Path;

use escrow_bitcoin::RpcConfig;
use escrow_types::{EscrowConfig, EscrowError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub rpc: RpcSettings,
    pub messaging: MessagingConfig,
    pub escrow: EscrowConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub db_path: String,
    /// Label for this node in logs.
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub poll_interval_secs: u64,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            db_path: "data/escrow.db".to_string(),
            identity: "escrowd".to_string(),
        }
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:51735".to_string(),
            user: "test".to_string(),
            password: "test".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            encrypted: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl RpcSettings {
    pub fn to_rpc_config(&self) -> RpcConfig {
        RpcConfig {
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

impl AppConfig {
    /// Load `<path>.toml` if it exists, then apply environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut app_config = AppConfig::default();

        if Path::new(&format!("{}.toml", path)).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(path))
                .build()
                .map_err(|e| EscrowError::Config(format!("Failed to load config file: {}", e)))?;

            app_config = settings
                .try_deserialize::<AppConfig>()
                .map_err(|e| EscrowError::Config(format!("Invalid config file: {}", e)))?;
        }

        Self::override_from_env(&mut app_config, |key| std::env::var(key).ok())?;
        app_config.validate()?;

        Ok(app_config)
    }

    fn override_from_env<F>(config: &mut AppConfig, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = var("ESCROW_DB_PATH") {
            config.node.db_path = db_path;
        }

        if let Some(identity) = var("ESCROW_IDENTITY") {
            config.node.identity = identity;
        }

        if let Some(url) = var("BITCOIN_RPC_URL") {
            config.rpc.url = url;
        }

        if let Some(user) = var("BITCOIN_RPC_USER") {
            config.rpc.user = user;
        }

        if let Some(password) = var("BITCOIN_RPC_PASSWORD") {
            config.rpc.password = password;
        }

        if let Some(interval) = var("POLL_INTERVAL_SECS") {
            config.messaging.poll_interval_secs = interval.parse().map_err(|e| {
                EscrowError::Config(format!("Invalid POLL_INTERVAL_SECS: {}", e))
            })?;
        }

        if let Some(version) = var("MARKETPLACE_VERSION") {
            config.escrow.marketplace_version = version;
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(format) = var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.escrow.validate()?;

        if self.messaging.poll_interval_secs == 0 {
            return Err(EscrowError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(EscrowError::Config(format!(
                "Unknown log format '{}', expected text or json",
                self.logging.format
            )));
        }
        Ok(())
    }
}
