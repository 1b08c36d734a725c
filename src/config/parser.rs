//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files, `.env` files
//! and environment variables, with proper precedence and error handling.

use crate::error::{ConfigError, HostprepError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ProvisionConfig;

/// Overrides `target.host`.
pub const ENV_TARGET_HOST: &str = "HOSTPREP_TARGET_HOST";
/// Overrides `target.user`.
pub const ENV_TARGET_USER: &str = "HOSTPREP_TARGET_USER";
/// Overrides `target.port`.
pub const ENV_TARGET_PORT: &str = "HOSTPREP_TARGET_PORT";
/// Overrides `target.identity_file`.
pub const ENV_TARGET_IDENTITY_FILE: &str = "HOSTPREP_TARGET_IDENTITY_FILE";

/// Configuration parser for loading provisioning configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Returns the directory relative paths are resolved against.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        self.base_path.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProvisionConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(HostprepError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HostprepError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProvisionConfig> {
        debug!("Parsing YAML configuration");

        let config: ProvisionConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = match (source, e.location()) {
                (Some(path), Some(at)) => Some(format!("{}:{}:{}", path.display(), at.line(), at.column())),
                (Some(path), None) => Some(path.display().to_string()),
                (None, Some(at)) => Some(format!("line {}, column {}", at.line(), at.column())),
                (None, None) => None,
            };
            HostprepError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed configuration '{}' with {} steps", config.name, config.steps.len());
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format
    /// `HOSTPREP_TARGET_<KEY>` (e.g., `HOSTPREP_TARGET_HOST`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override is malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProvisionConfig> {
        let mut config = self.load_file(path)?;
        apply_env_overrides_from(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self.base_path().join(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HostprepError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves a local source path from the configuration.
    ///
    /// `~` expands to the home directory; relative paths are resolved
    /// against the configuration file's directory.
    #[must_use]
    pub fn resolve(&self, source: &str) -> PathBuf {
        let expanded = expand_home(source);
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_path().join(expanded)
        }
    }
}

/// Applies target overrides read through `lookup`.
///
/// # Errors
///
/// Returns an error if `HOSTPREP_TARGET_PORT` is not a valid port.
pub fn apply_env_overrides_from<F>(config: &mut ProvisionConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_TARGET_HOST) {
        debug!("Overriding target.host from environment");
        config.target.host = host;
    }

    if let Some(user) = lookup(ENV_TARGET_USER) {
        debug!("Overriding target.user from environment");
        config.target.user = Some(user);
    }

    if let Some(port) = lookup(ENV_TARGET_PORT) {
        debug!("Overriding target.port from environment");
        config.target.port = port.trim().parse().map_err(|e| {
            HostprepError::Config(ConfigError::InvalidEnvVar {
                name: String::from(ENV_TARGET_PORT),
                message: format!("'{port}' is not a port number: {e}"),
            })
        })?;
    }

    if let Some(identity) = lookup(ENV_TARGET_IDENTITY_FILE) {
        debug!("Overriding target.identity_file from environment");
        config.target.identity_file = Some(identity);
    }

    Ok(())
}

/// Expands a leading `~` to the local home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let home = || dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if path == "~" {
        return home();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home().join(rest),
        None => PathBuf::from(path),
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["hostprep.yaml", "hostprep.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HostprepError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
