use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::db::ConnectionConfig;
use crate::dialect::Dialect;
use crate::error::ConfigurationError;

/// Default number of bound parameters per batch chunk. SQL Server caps a
/// request at 2100 parameters.
pub const DEFAULT_PARAMETER_BUDGET: usize = 2000;

/// Engine settings, persisted as TOML.
///
/// ```toml
/// dialect = "postgresql"
/// parameter_budget = 2000
/// cache_capacity = 512
///
/// [connection]
/// host = "localhost"
/// port = 5432
/// database = "shop"
/// username = "app"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dialect: Dialect,
    /// Upper bound on parameters bound by one batch chunk.
    pub parameter_budget: usize,
    /// Maximum cached plans; unbounded when absent.
    pub cache_capacity: Option<usize>,
    pub connection: ConnectionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            parameter_budget: DEFAULT_PARAMETER_BUDGET,
            cache_capacity: None,
            connection: ConnectionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polysql")
            .join("engine.toml")
    }

    /// Loads the saved configuration, or the defaults when none is saved.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no saved configuration, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content).context("Invalid engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.parameter_budget < 1 {
            return Err(ConfigurationError::InvalidConfig(
                "parameter_budget must be at least 1".to_string(),
            ));
        }
        if self.cache_capacity == Some(0) {
            return Err(ConfigurationError::InvalidConfig(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.parameter_budget, 2000);
        assert_eq!(config.cache_capacity, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            "dialect = \"postgresql\"\n\n[connection]\nhost = \"db\"\nport = 6432\ndatabase = \"shop\"\nusername = \"app\"\n",
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::PostgreSql);
        assert_eq!(config.parameter_budget, DEFAULT_PARAMETER_BUDGET);
        assert_eq!(config.connection.port, 6432);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(EngineConfig::from_toml_str("parameter_budget = 0").is_err());
        let config = EngineConfig {
            cache_capacity: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("polysql-config-{}", std::process::id()))
            .join("engine.toml");
        let config = EngineConfig {
            dialect: Dialect::Sqlite,
            cache_capacity: Some(64),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("polysql-does-not-exist").join("engine.toml");
        assert_eq!(EngineConfig::load_from(&path).unwrap(), EngineConfig::default());
    }
}
