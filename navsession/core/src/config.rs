//! Session Configuration
//!
//! Configuration for a session, loaded from a TOML file at
//! `~/.config/navsession/session.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [session]
//! command_buffer = 64
//!
//! [subscriptions]
//! signal_buffer = 16
//!
//! [overlays]
//! enabled = ["logo", "compass"]
//!
//! [map]
//! style = "night"
//! ```
//!
//! # Environment Variables
//!
//! - `NAVSESSION_COMMAND_BUFFER`
//! - `NAVSESSION_SIGNAL_BUFFER`
//! - `NAVSESSION_OVERLAYS` (comma separated)
//! - `NAVSESSION_MAP_STYLE` (empty for none)

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::MapStyle;
use crate::overlay::OverlayId;

/// Environment variable for the command inbox capacity
pub const ENV_COMMAND_BUFFER: &str = "NAVSESSION_COMMAND_BUFFER";
/// Environment variable for the per-scope signal buffer
pub const ENV_SIGNAL_BUFFER: &str = "NAVSESSION_SIGNAL_BUFFER";
/// Environment variable for the overlay list
pub const ENV_OVERLAYS: &str = "NAVSESSION_OVERLAYS";
/// Environment variable for the map style applied on creation
pub const ENV_MAP_STYLE: &str = "NAVSESSION_MAP_STYLE";

/// Overlays attached while the session is in the foreground, by default
pub const DEFAULT_OVERLAYS: [&str; 2] = ["logo", "compass"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSectionToml {
    /// Capacity of the host command inbox
    pub command_buffer: Option<usize>,
}

/// Subscriptions section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionsToml {
    /// Items buffered per scope before the listener waits
    pub signal_buffer: Option<usize>,
}

/// Overlays section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaysToml {
    /// Overlay ids, in registration order
    pub enabled: Option<Vec<String>>,
}

/// Map section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapToml {
    /// Style applied when the session is created
    pub style: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Session section
    pub session: SessionSectionToml,

    /// Subscriptions section
    pub subscriptions: SubscriptionsToml,

    /// Overlays section
    pub overlays: OverlaysToml,

    /// Map section
    pub map: MapToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved session configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Overlays registered while resumed, in order
    pub overlays: Vec<OverlayId>,

    /// Items buffered per subscription scope
    pub signal_buffer: usize,

    /// Capacity of the host command inbox
    pub command_buffer: usize,

    /// Style applied to the map when the session is created
    pub initial_map_style: Option<MapStyle>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            overlays: DEFAULT_OVERLAYS.iter().copied().map(OverlayId::from).collect(),
            signal_buffer: 16,
            command_buffer: 64,
            initial_map_style: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check value constraints
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] when a buffer is zero, an overlay id
    /// is empty or repeated, or the initial map style is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signal_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "signal_buffer must be at least 1".to_string(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "command_buffer must be at least 1".to_string(),
            ));
        }

        if self
            .initial_map_style
            .as_ref()
            .is_some_and(|style| style.as_str().trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "initial map style must not be blank".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for id in &self.overlays {
            if id.as_str().trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "overlay ids must not be empty".to_string(),
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "overlay '{id}' is listed more than once"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/navsession/session.toml` or
/// `~/.config/navsession/session.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("navsession").join("session.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting configuration is invalid. A missing config file is not an
/// error (defaults are used).
pub fn load_config() -> Result<SessionConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<SessionConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SessionConfig, ConfigError> {
    let mut config = SessionConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SessionToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut SessionConfig, toml: &SessionToml) {
    if let Some(size) = toml.session.command_buffer {
        config.command_buffer = size;
    }
    if let Some(size) = toml.subscriptions.signal_buffer {
        config.signal_buffer = size;
    }
    if let Some(ref overlays) = toml.overlays.enabled {
        config.overlays = overlays.iter().map(|id| OverlayId::new(id.trim())).collect();
    }
    if let Some(ref style) = toml.map.style {
        config.initial_map_style = Some(MapStyle::new(style.trim()));
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut SessionConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(value) = env(ENV_COMMAND_BUFFER) {
        match value.parse::<usize>() {
            Ok(size) => {
                config.command_buffer = size;
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(var = ENV_COMMAND_BUFFER, value = %value, "Ignoring non-numeric value"),
        }
    }
    if let Some(value) = env(ENV_SIGNAL_BUFFER) {
        match value.parse::<usize>() {
            Ok(size) => {
                config.signal_buffer = size;
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(var = ENV_SIGNAL_BUFFER, value = %value, "Ignoring non-numeric value"),
        }
    }
    if let Some(value) = env(ENV_OVERLAYS) {
        config.overlays = parse_overlay_list(&value);
        config.source = ConfigSource::Env;
    }
    if let Some(value) = env(ENV_MAP_STYLE) {
        let value = value.trim();
        config.initial_map_style = (!value.is_empty()).then(|| MapStyle::new(value));
        config.source = ConfigSource::Env;
    }
}

/// Parse a comma separated overlay list; an empty string means no overlays
#[must_use]
pub fn parse_overlay_list(value: &str) -> Vec<OverlayId> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    value.split(',').map(|id| OverlayId::new(id.trim())).collect()
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Overlay list override
    pub overlays: Option<Vec<OverlayId>>,

    /// Signal buffer override
    pub signal_buffer: Option<usize>,

    /// Command buffer override
    pub command_buffer: Option<usize>,

    /// Initial map style override
    pub map_style: Option<MapStyle>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set overlay list override
    #[must_use]
    pub fn with_overlays(mut self, overlays: Vec<OverlayId>) -> Self {
        self.overlays = Some(overlays);
        self
    }

    /// Set signal buffer override
    #[must_use]
    pub fn with_signal_buffer(mut self, size: usize) -> Self {
        self.signal_buffer = Some(size);
        self
    }

    /// Set command buffer override
    #[must_use]
    pub fn with_command_buffer(mut self, size: usize) -> Self {
        self.command_buffer = Some(size);
        self
    }

    /// Set initial map style override
    #[must_use]
    pub fn with_map_style(mut self, style: MapStyle) -> Self {
        self.map_style = Some(style);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overlays.is_none()
            && self.signal_buffer.is_none()
            && self.command_buffer.is_none()
            && self.map_style.is_none()
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] when an override is out of range.
    pub fn apply(&self, config: &mut SessionConfig) -> Result<(), ConfigError> {
        if let Some(ref overlays) = self.overlays {
            config.overlays.clone_from(overlays);
        }
        if let Some(size) = self.signal_buffer {
            config.signal_buffer = size;
        }
        if let Some(size) = self.command_buffer {
            config.command_buffer = size;
        }
        if let Some(ref style) = self.map_style {
            config.initial_map_style = Some(style.clone());
        }
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}
