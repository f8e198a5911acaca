//! Application configuration.
//!
//! Settings come from `config/config.toml` (optional) overlaid with
//! environment variables prefixed `CONTRACTGUARD`, using `__` as the section
//! separator: `CONTRACTGUARD__DATABASE__URL`,
//! `CONTRACTGUARD__CONTRACTS__EXPIRING_SOON_DAYS`, …

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub use crate::pool::config::DatabaseConfig;

const DEFAULT_CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "CONTRACTGUARD";

/// `[contracts]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    /// Window, in days, for `is_expiring_soon`.
    #[serde(default = "default_expiring_soon_days")]
    pub expiring_soon_days: i64,
    /// Root directory for uploaded contract documents.
    #[serde(default = "default_document_root")]
    pub document_root: String,
}

fn default_expiring_soon_days() -> i64 {
    crate::domain::contract::EXPIRING_SOON_DAYS
}

fn default_document_root() -> String {
    "media".to_string()
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            expiring_soon_days: default_expiring_soon_days(),
            document_root: default_document_root(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
}

impl AppConfig {
    /// Load from `config/config.toml`, falling back to env vars.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if neither source yields a valid configuration.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific TOML file (optional) plus env vars.
    ///
    /// A file that exists but cannot be parsed is reported with a warning and
    /// skipped; the environment alone is then used.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the environment-only retry fails too.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if path.exists() {
                    log::warn!(
                        "failed to load config file {}, falling back to env: {err}",
                        path.display()
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        settings.try_deserialize::<AppConfig>().map_err(|e| {
            ConfigError::Message(format!("Configuration could not be deserialized: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_no_file() {
        let cfg = AppConfig::load_from("config/does-not-exist.toml").expect("defaults load");
        assert_eq!(cfg.contracts.expiring_soon_days, 30);
        assert_eq!(cfg.database.pool_timeout_seconds, 30);
        assert!(cfg.database.max_connections >= 1);
    }

    #[test]
    fn test_reads_toml_file() {
        let dir = std::env::temp_dir().join(format!("contractguard-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[database]\nurl = \"postgres://a:b@db:5432/contracts\"\nmax_connections = 3\n\n[contracts]\nexpiring_soon_days = 45\n",
        )
        .expect("write config");

        let cfg = AppConfig::load_from(&path).expect("file config loads");
        assert_eq!(cfg.database.url, "postgres://a:b@db:5432/contracts");
        assert_eq!(cfg.database.max_connections, 3);
        assert_eq!(cfg.contracts.expiring_soon_days, 45);
        assert_eq!(cfg.contracts.document_root, "media");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
