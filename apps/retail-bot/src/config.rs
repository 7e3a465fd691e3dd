//! # Bot Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RETAIL_BILL_PREFIX=RB                                              │
//! │     RETAIL_DB_PATH=/var/lib/retail/retail.db                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/counter-bot/config.toml (Linux)                          │
//! │     ~/Library/Application Support/com.retail.counter-bot/config.toml   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! company_name = "Corner Mart"
//! bill_prefix = "INV"
//! currency_symbol = "$"
//! discount_presets = [0, 5, 10]
//!
//! [database]
//! path = "/var/lib/retail/retail.db"
//! max_connections = 5
//!
//! [session]
//! idle_timeout_secs = 900
//! sweep_interval_secs = 60
//! search_limit = 10
//! history_limit = 10
//!
//! [logging]
//! filter = "info,retail=debug,sqlx=warn"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One week.
const MAX_IDLE_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine a data directory; set RETAIL_DB_PATH")]
    NoDataDir,
}

// =============================================================================
// Sections
// =============================================================================

/// Shop identity and money presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Shown on the welcome message and receipts.
    #[serde(default = "default_company_name")]
    pub company_name: String,

    /// Bill number prefix: `{prefix}-{YYYYMMDD}-{0001}`.
    #[serde(default = "default_bill_prefix")]
    pub bill_prefix: String,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Quick discount options offered at finalization, in whole units.
    #[serde(default = "default_discount_presets")]
    pub discount_presets: Vec<u32>,
}

fn default_company_name() -> String {
    "Retail Counter".to_string()
}

fn default_bill_prefix() -> String {
    "INV".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_discount_presets() -> Vec<u32> {
    vec![0, 5, 10]
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            company_name: default_company_name(),
            bill_prefix: default_bill_prefix(),
            currency_symbol: default_currency_symbol(),
            discount_presets: default_discount_presets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Conversation session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// A session untouched for this long is torn down.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often the sweeper runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum products listed for an inventory search.
    #[serde(default = "default_list_limit")]
    pub search_limit: u32,

    /// Maximum bills listed in a customer's history.
    #[serde(default = "default_list_limit")]
    pub history_limit: u32,
}

fn default_idle_timeout() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_list_limit() -> u32 {
    10
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            search_limit: default_list_limit(),
            history_limit: default_list_limit(),
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Age after which a reservation nobody owns is released.
    pub fn orphan_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(2 * self.idle_timeout_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,retail=debug,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_log_filter(),
        }
    }
}

// =============================================================================
// Bot Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl BotConfig {
    /// Loads configuration: defaults, then the file, then `RETAIL_*` variables.
    ///
    /// A missing default config file is not an error; a missing file named
    /// with `--config` is.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let explicit = config_path.is_some();
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() || explicit {
                info!(?path, "Loading bot config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.store.bill_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid(format!(
                "bill_prefix must be non-empty ASCII letters or digits, got '{}'",
                prefix
            )));
        }

        if self.session.idle_timeout_secs == 0 || self.session.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "idle_timeout_secs must be between 1 and {}",
                MAX_IDLE_TIMEOUT_SECS
            )));
        }

        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".into()));
        }

        if self.session.search_limit == 0 || self.session.history_limit == 0 {
            return Err(ConfigError::Invalid("list limits must be positive".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be positive".into()));
        }

        Ok(())
    }

    /// The SQLite file to open, creating its parent directory when it is the
    /// platform default.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "retail", "counter-bot")
            .ok_or(ConfigError::NoDataDir)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("retail.db"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `RETAIL_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("RETAIL_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("RETAIL_COMPANY_NAME") {
            self.store.company_name = name;
        }

        if let Some(prefix) = lookup("RETAIL_BILL_PREFIX") {
            debug!(prefix = %prefix, "Overriding bill prefix from environment");
            self.store.bill_prefix = prefix;
        }

        if let Some(symbol) = lookup("RETAIL_CURRENCY") {
            self.store.currency_symbol = symbol;
        }

        if let Some(secs) = lookup("RETAIL_IDLE_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.session.idle_timeout_secs = secs,
                Err(_) => warn!(value = %secs, "Ignoring invalid RETAIL_IDLE_TIMEOUT_SECS"),
            }
        }

        if let Some(filter) = lookup("RETAIL_LOG") {
            self.logging.filter = filter;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "retail", "counter-bot")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.store.bill_prefix, "INV");
        assert_eq!(config.session.idle_timeout_secs, 900);
        assert_eq!(config.session.orphan_age(), chrono::Duration::seconds(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BotConfig::from_toml(
            r#"
            [store]
            company_name = "Corner Mart"
            discount_presets = [0, 20]

            [session]
            idle_timeout_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.store.company_name, "Corner Mart");
        assert_eq!(config.store.bill_prefix, "INV");
        assert_eq!(config.store.discount_presets, vec![0, 20]);
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.session.search_limit, 10);
        assert_eq!(config.logging.filter, "info,retail=debug,sqlx=warn");
    }

    #[test]
    fn test_validation() {
        let mut config = BotConfig::default();

        config.store.bill_prefix = "IN-V".to_string();
        assert!(config.validate().is_err());

        config.store.bill_prefix = String::new();
        assert!(config.validate().is_err());

        config.store.bill_prefix = "RB2".to_string();
        assert!(config.validate().is_ok());

        config.session.idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RETAIL_DB_PATH", "/tmp/retail-test.db"),
            ("RETAIL_BILL_PREFIX", "RB"),
            ("RETAIL_IDLE_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = BotConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.bill_prefix, "RB");
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/retail-test.db"));
        assert_eq!(config.session.idle_timeout_secs, 900);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join(format!("retail-missing-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(BotConfig::load(Some(missing)), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&BotConfig::default()).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[session]"));
    }
}
