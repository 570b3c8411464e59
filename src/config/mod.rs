//! Application configuration.
//!
//! Loaded from YAML files and environment variables.

mod storage;

pub use storage::StorageConfig;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TEMPORA_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TEMPORA";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TEMPORA_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `TEMPORA__STORAGE__TABLE_NAME`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_default() {
        let config = Config::for_test();
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
storage:
  table_name: meditations
  max_sequence_members: 50
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.table_name, "meditations");
        assert_eq!(config.storage.max_sequence_members, 50);
        assert_eq!(config.storage.read_batch_size, 100);
    }

    #[test]
    #[serial]
    fn test_load_from_path() {
        let file = write_yaml("storage:\n  table_name: from-file\n");
        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.storage.table_name, "from-file");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_yaml("storage:\n  table_name: from-file\n");
        std::env::set_var("TEMPORA__STORAGE__TABLE_NAME", "from-env");
        let config = Config::load(file.path().to_str());
        std::env::remove_var("TEMPORA__STORAGE__TABLE_NAME");

        assert_eq!(config.unwrap().storage.table_name, "from-env");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some("/nonexistent/tempora.yaml")).is_err());
    }
}
