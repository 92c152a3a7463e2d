//! Configuration for hot content reload.
//!
//! Two layers live here:
//!
//! - [`ServerChannel`] / [`ClientChannel`]: the channel identity (port,
//!   namespace path, event name) resolved from explicit options, environment
//!   overrides and defaults. Resolution never fails.
//! - [`Config`]: the `hot-reload.toml` file used by the `hcr` CLI, with
//!   auto-discovery in parent directories. CLI settings are applied during
//!   load via [`CliSettings`].
//!
//! Values from the config file and the CLI both count as *explicit* options
//! for channel resolution, so they win over environment overrides.

mod channel;
mod location;

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use channel::{
    CLIENT_ENV, ChannelOptions, ClientChannel, DEFAULT_EVENT_NAME, DEFAULT_NAMESPACE_PATH,
    DEFAULT_PORT, EnvVars, SERVER_ENV, ServerChannel, normalize_namespace,
};
pub use location::PageLocation;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override channel port.
    pub port: Option<u16>,
    /// Override namespace path.
    pub namespace_path: Option<String>,
    /// Override event name.
    pub event_name: Option<String>,
    /// Override watched directory.
    pub watch_dir: Option<PathBuf>,
    /// Override watch enabled flag.
    pub watch_enabled: Option<bool>,
    /// Override content version file.
    pub content_version_file: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "hot-reload.toml";

/// Upper bound for `watch.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Channel identity overrides.
    pub channel: ChannelConfig,
    /// Watch configuration (paths are relative strings from TOML).
    watch: WatchConfigRaw,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the notification server binds to.
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
        }
    }
}

/// `[channel]` section. Present values become explicit channel options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Port.
    pub port: Option<u16>,
    /// Namespace path.
    pub namespace_path: Option<String>,
    /// Event name.
    pub event_name: Option<String>,
}

/// Raw watch configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    enabled: Option<bool>,
    dir: Option<String>,
    patterns: Option<Vec<String>>,
    debounce_ms: Option<u64>,
    content_version_file: Option<String>,
}

/// Resolved watch configuration with absolute paths.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Whether the content watcher runs.
    pub enabled: bool,
    /// Directory to watch.
    pub dir: PathBuf,
    /// Glob patterns, relative to `dir`.
    pub patterns: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Counter file bumped on every change batch (`None` disables it).
    pub content_version_file: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("content"),
            patterns: default_patterns(),
            debounce_ms: 100,
            content_version_file: None,
        }
    }
}

fn default_patterns() -> Vec<String> {
    vec!["**/*".to_owned()]
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Page origin could not be parsed.
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin {
        /// The rejected origin.
        origin: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `hot-reload.toml` in current directory and parents.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Explicit channel options carried by this configuration.
    #[must_use]
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            port: self.channel.port,
            namespace_path: self.channel.namespace_path.clone(),
            event_name: self.channel.event_name.clone(),
        }
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.channel.port = Some(port);
        }
        if let Some(namespace_path) = &settings.namespace_path {
            self.channel.namespace_path = Some(namespace_path.clone());
        }
        if let Some(event_name) = &settings.event_name {
            self.channel.event_name = Some(event_name.clone());
        }
        if let Some(dir) = &settings.watch_dir {
            self.watch_resolved.dir.clone_from(dir);
        }
        if let Some(enabled) = settings.watch_enabled {
            self.watch_resolved.enabled = enabled;
        }
        if let Some(file) = &settings.content_version_file {
            self.watch_resolved.content_version_file = Some(file.clone());
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            channel: ChannelConfig::default(),
            watch: WatchConfigRaw::default(),
            watch_resolved: WatchConfig {
                dir: base.join("content"),
                ..WatchConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Validation(
                "server.host cannot be empty".to_owned(),
            ));
        }

        // Port 0 asks the OS for a random port, which clients cannot guess
        if self.channel.port == Some(0) {
            return Err(ConfigError::Validation(
                "channel.port cannot be 0".to_owned(),
            ));
        }

        if let Some(ns) = &self.channel.namespace_path
            && !ns.starts_with('/')
        {
            return Err(ConfigError::Validation(format!(
                "channel.namespace_path must start with '/', got '{ns}'"
            )));
        }

        if self.watch_resolved.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "watch.debounce_ms cannot exceed {MAX_DEBOUNCE_MS}"
            )));
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let raw = &self.watch;
        self.watch_resolved = WatchConfig {
            enabled: raw.enabled.unwrap_or(true),
            dir: config_dir.join(raw.dir.as_deref().unwrap_or("content")),
            patterns: raw.patterns.clone().unwrap_or_else(default_patterns),
            debounce_ms: raw.debounce_ms.unwrap_or(100),
            content_version_file: raw
                .content_version_file
                .as_deref()
                .map(|p| config_dir.join(p)),
        };
    }
}
