use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use promptfill::{RendererOptions, ValidationRules};

/// Name of the project-level override file looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".promptfill";

/// Status of config file loading
#[derive(Debug, Clone)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Display configuration for the template editor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show inline errors on fields once they have been committed.
    pub show_validation: bool,
    /// Show the "N of M fields filled" line above the template.
    pub show_progress: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_validation: true,
            show_progress: true,
        }
    }
}

/// Validation rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Every field must be filled. When false, only fields whose hint
    /// mentions "required" are.
    pub require_all_fields: bool,
    /// Character count above which a value gets a length warning.
    pub long_value_warning: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let rules = ValidationRules::default();
        Self {
            require_all_fields: rules.require_all,
            long_value_warning: rules.long_value_warning,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Validation rules described by the `[validation]` section.
    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            require_all: self.validation.require_all_fields,
            long_value_warning: self.validation.long_value_warning,
        }
    }

    /// Renderer options described by this config.
    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            show_validation: self.display.show_validation,
            show_progress: self.display.show_progress,
            rules: self.validation_rules(),
        }
    }
}

/// Partial logging configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialLoggingConfig {
    pub level: Option<String>,
}

/// Partial display configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialDisplayConfig {
    pub show_validation: Option<bool>,
    pub show_progress: Option<bool>,
}

/// Partial validation configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialValidationConfig {
    pub require_all_fields: Option<bool>,
    pub long_value_warning: Option<usize>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.promptfill` files. Fields that are `None` inherit from the global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub logging: PartialLoggingConfig,
    pub display: PartialDisplayConfig,
    pub validation: PartialValidationConfig,
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    Config {
        logging: LoggingConfig {
            level: project
                .logging
                .level
                .clone()
                .unwrap_or_else(|| global.logging.level.clone()),
        },
        display: DisplayConfig {
            show_validation: project
                .display
                .show_validation
                .unwrap_or(global.display.show_validation),
            show_progress: project
                .display
                .show_progress
                .unwrap_or(global.display.show_progress),
        },
        validation: ValidationConfig {
            require_all_fields: project
                .validation
                .require_all_fields
                .unwrap_or(global.validation.require_all_fields),
            long_value_warning: project
                .validation
                .long_value_warning
                .unwrap_or(global.validation.long_value_warning),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "promptfill", "promptfill").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.promptfill in current working directory).
pub fn get_project_config_path() -> Option<PathBuf> {
    let path = std::env::current_dir().ok()?.join(PROJECT_CONFIG_FILE);
    if path.exists() { Some(path) } else { None }
}

/// Load a project config (.promptfill) from the given path.
fn load_project_config(path: &Path) -> Result<PartialConfig, String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_read_failed");
        format!("Failed to read {}: {}", PROJECT_CONFIG_FILE, e)
    })?;

    toml::from_str::<PartialConfig>(&contents).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_parse_failed");
        format!("Invalid {}: {}", PROJECT_CONFIG_FILE, e)
    })
}

/// Load configuration from file, environment, and defaults
pub fn load_config() -> LoadedConfig {
    let Some(config_path) = get_config_path() else {
        warn!("Could not determine config directory, using defaults");
        return LoadedConfig {
            config: apply_env_overrides(Config::default()),
            config_path: PathBuf::from("config.toml"),
            project_config_path: None,
            status: ConfigLoadStatus::Error("Could not determine config directory".to_string()),
        };
    };

    load_config_from(config_path, get_project_config_path(), |key| env::var(key).ok())
}

/// Load configuration from explicit paths with the given environment lookup.
pub fn load_config_from(
    config_path: PathBuf,
    project_config_path: Option<PathBuf>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> LoadedConfig {
    debug!("Config path: {:?}", config_path);

    let (mut config, status) = load_or_create_config(&config_path);

    if let Some(ref project_path) = project_config_path {
        match load_project_config(project_path) {
            Ok(partial) => {
                config = merge_config(&config, &partial);
                info!(path = ?project_path, "project_config_loaded");
            }
            Err(e) => {
                warn!(path = ?project_path, error = %e, "project_config_error");
                // Keep using global config only
            }
        }
    }

    let config = apply_env_overrides_from(config, env_lookup);

    LoadedConfig {
        config,
        config_path,
        project_config_path,
        status,
    }
}

/// Re-read configuration after the global file changed on disk.
///
/// Unlike startup, a broken file is an error here so the caller can keep
/// its current settings.
pub fn reload_config(config_path: &Path, project_config_path: Option<&Path>) -> Result<Config, String> {
    let contents = fs::read_to_string(config_path).map_err(|e| {
        warn!(path = ?config_path, error = %e, "config_reload_read_failed");
        format!("Failed to read config: {}", e)
    })?;
    let mut config = toml::from_str::<Config>(&contents).map_err(|e| {
        warn!(path = ?config_path, error = %e, "config_reload_parse_failed");
        format!("Invalid config: {}", e)
    })?;

    if let Some(project_path) = project_config_path {
        config = merge_config(&config, &load_project_config(project_path)?);
    }

    info!(path = ?config_path, "config_reloaded");
    Ok(apply_env_overrides(config))
}

/// Modification time of a file, `None` if it cannot be read.
pub fn get_file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Load config from file, or create default if not exists
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                info!("Loaded config from {:?}", config_path);
                (config, ConfigLoadStatus::Loaded)
            }
            Err(e) => {
                warn!(
                    "Config file malformed at {:?}: {}. Using defaults.",
                    config_path, e
                );
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_default_config(config_path),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(
                "Permission denied reading config at {:?}. Using defaults.",
                config_path
            );
            (
                Config::default(),
                ConfigLoadStatus::Error("Permission denied reading config".to_string()),
            )
        }
        Err(e) => {
            warn!(
                "Error reading config at {:?}: {}. Using defaults.",
                config_path, e
            );
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    }
}

/// Create the default config file
fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(
            "Could not create config directory {:?}: {}. Continuing without file.",
            parent, e
        );
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    let toml_content = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not serialize default config: {}", e);
            return (
                config,
                ConfigLoadStatus::Error(format!("Serialization error: {}", e)),
            );
        }
    };

    match fs::write(config_path, &toml_content) {
        Ok(()) => {
            info!("Created default config at {:?}", config_path);
            (config, ConfigLoadStatus::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(
                "Permission denied creating config at {:?}. Continuing without file.",
                config_path
            );
            (
                config,
                ConfigLoadStatus::Error("Permission denied creating config".to_string()),
            )
        }
        Err(e) => {
            warn!(
                "Could not write default config to {:?}: {}. Continuing without file.",
                config_path, e
            );
            (
                config,
                ConfigLoadStatus::Error(format!("Write error: {}", e)),
            )
        }
    }
}

/// Parse a boolean environment value; `None` for anything unrecognised.
fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply environment variable overrides to config
fn apply_env_overrides(config: Config) -> Config {
    apply_env_overrides_from(config, |key| env::var(key).ok())
}

fn apply_env_overrides_from(
    mut config: Config,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Config {
    if let Some(level) = env_lookup("PROMPTFILL_LOG") {
        debug!("Overriding logging.level from PROMPTFILL_LOG");
        config.logging.level = level;
    }

    for (key, target) in [
        (
            "PROMPTFILL_SHOW_VALIDATION",
            &mut config.display.show_validation,
        ),
        ("PROMPTFILL_SHOW_PROGRESS", &mut config.display.show_progress),
    ] {
        if let Some(raw) = env_lookup(key) {
            match parse_env_bool(&raw) {
                Some(value) => {
                    debug!(key, value, "env_override");
                    *target = value;
                }
                None => warn!(key, value = %raw, "env_override_ignored"),
            }
        }
    }

    config
}
