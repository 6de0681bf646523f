use crate::models::Settings;
use ::config::{Config, Environment, File, FileFormat};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Settings file name inside the configuration directory.
pub const SETTINGS_FILE: &str = "qosmgr.yaml";

/// Prefix of environment overrides, e.g. `QOSMGR_STORE__COMMAND_TIMEOUT_SECS=30`.
pub const ENV_PREFIX: &str = "QOSMGR";

/// Configuration manager for loading and saving `qosmgr.yaml`.
///
/// Settings are layered: built-in defaults, then the YAML file (optional), then
/// `QOSMGR_*` environment variables. Relative paths in the settings are
/// resolved against the configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `qosmgr.yaml`, the registry and the error log
    ///
    /// # Returns
    /// A new ConfigManager instance; the directory is created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Environment source for `QOSMGR_*` overrides.
    ///
    /// Nested keys use `__`, and `scan.partitions` / `scan.denylist` accept
    /// `;`-separated lists.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(";")
            .with_list_parse_key("scan.partitions")
            .with_list_parse_key("scan.denylist")
    }

    /// Load settings from the file and the process environment.
    ///
    /// # Returns
    /// The layered Settings; defaults when neither source sets a key
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_with(Self::environment())
    }

    /// Load settings from the file and an explicit environment source.
    pub fn load_settings_with(&self, environment: Environment) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: Settings = Config::builder()
            .add_source(
                File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.config_dir);
        Ok(settings)
    }

    /// Save settings as YAML.
    ///
    /// # Arguments
    /// * `settings` - The Settings to save
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Resolve a settings path; relative paths live under the config directory.
    pub fn resolve(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn registry_path(&self, settings: &Settings) -> Utf8PathBuf {
        self.resolve(&settings.paths.registry_file)
    }

    pub fn error_log_path(&self, settings: &Settings) -> Utf8PathBuf {
        self.resolve(&settings.paths.error_log_file)
    }

    pub fn log_dir(&self, settings: &Settings) -> Utf8PathBuf {
        self.resolve(&settings.paths.log_dir)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
