//! stackc configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Explicit --config file
//! 3. Project-level (./stackc.toml)
//! 4. User-level (~/.config/stackc/config.toml)
//! 5. Default values
//! ```
//!
//! # Example
//!
//! ```toml
//! [native]
//! platform = "win"
//!
//! [managed]
//! class_name = "Program"
//! debug_info = false
//!
//! [log]
//! level = "debug"
//! ```

use crate::backends::{JvmOptions, TargetPlatform};
use crate::util::logger::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "stackc.toml";

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackcConfig {
    /// Native (x86) backend settings
    #[serde(default)]
    pub native: NativeConfig,
    /// Managed (JVM) backend settings
    #[serde(default)]
    pub managed: ManagedConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Native backend configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeConfig {
    /// Symbol naming convention
    #[serde(default)]
    pub platform: TargetPlatform,
}

/// Managed backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedConfig {
    /// Internal name of the generated class
    #[serde(default = "default_class_name")]
    pub class_name: String,
    /// Emit a `LocalVariableTable`
    #[serde(default = "default_debug_info")]
    pub debug_info: bool,
}

fn default_class_name() -> String {
    "Program".to_string()
}

fn default_debug_info() -> bool {
    true
}

impl Default for ManagedConfig {
    fn default() -> Self {
        Self {
            class_name: default_class_name(),
            debug_info: default_debug_info(),
        }
    }
}

impl ManagedConfig {
    pub fn jvm_options(&self) -> JvmOptions {
        JvmOptions {
            class_name: self.class_name.clone(),
            debug_info: self.debug_info,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("stackc"));
    }

    // Fallback to ~/.config/stackc
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("stackc"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("stackc"));
    }

    None
}

/// Get the user config file path (~/.config/stackc/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Parse a config file
pub fn load_from_path(path: &Path) -> Result<StackcConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    parse_config(&content)
}

/// Parse config text
pub fn parse_config(content: &str) -> Result<StackcConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::ParseError)
}

/// Resolve the effective configuration.
///
/// An explicit path must exist; otherwise the project file and then the user
/// file are tried, falling back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<StackcConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.exists() {
        return load_from_path(&project);
    }

    match get_config_path() {
        Some(path) if path.exists() => load_from_path(&path),
        _ => Ok(StackcConfig::default()),
    }
}

/// Write `config` to `path`, creating parent directories
pub fn save_config(
    config: &StackcConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }

    let content = toml::to_string_pretty(config).map_err(ConfigError::SerializeError)?;
    fs::write(path, content).map_err(ConfigError::IoError)?;

    Ok(())
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::SerializeError(e) => Some(e),
        }
    }
}
