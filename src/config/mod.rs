use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the settings document inside the config directory
pub const APP_CONFIG_FILE: &str = "autoconfig.yaml";

/// Prefix for environment overrides, e.g. `AUTOCONFIG_AUTO_CONFIG__ENABLED=true`
pub const ENV_PREFIX: &str = "AUTOCONFIG";

/// Configuration manager for loading and saving the YAML settings document.
///
/// Owns the config directory, which also holds the history file and the profile
/// database referenced by [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    app_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "AutoConfig Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            app_config_path: config_dir.join(APP_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the settings document.
    ///
    /// The YAML file is optional; `AUTOCONFIG_*` environment variables override it
    /// (nested keys separated by `__`). Missing fields take their defaults.
    pub fn load_app_config(&self) -> Result<AppConfig> {
        if !self.app_config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults and environment",
                self.app_config_path
            );
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::new(self.app_config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.app_config_path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.app_config_path))?;

        tracing::info!("Loaded config from {}", self.app_config_path);
        Ok(config)
    }

    /// Save the settings document.
    pub fn save_app_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.app_config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.app_config_path))?;

        tracing::info!("Saved config to {}", self.app_config_path);
        Ok(())
    }

    /// Path of the seen-configs history file for `config`
    pub fn history_path(&self, config: &AppConfig) -> Utf8PathBuf {
        self.config_dir.join(&config.history_file)
    }

    /// Path of the profile database for `config`
    pub fn profiles_path(&self, config: &AppConfig) -> Utf8PathBuf {
        self.config_dir.join(&config.profiles_file)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
