//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::websocket::{HubConfig, RoutingMode, UnaddressedPolicy};

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A TOML file, with environment overrides applied
    File(PathBuf),
    /// Defaults plus environment overrides
    Environment,
}

impl ConfigSource {
    /// Report the load outcome through tracing
    pub fn log(&self, failures: &[ConfigError]) {
        for failure in failures {
            tracing::warn!("Failed to load config: {}", failure);
        }
        match self {
            ConfigSource::File(path) => tracing::info!("Loaded config from {:?}", path),
            ConfigSource::Environment => {
                tracing::info!("Using default config with environment overrides")
            }
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub routing: RoutingMode,

    /// What scoped routing does with payloads that carry no address
    #[serde(default)]
    pub unaddressed: UnaddressedPolicy,

    /// Keepalive ping interval in seconds (0 disables)
    #[serde(default)]
    pub ping_interval_secs: u64,

    /// Disconnect clients silent for this many seconds (0 disables)
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            queue_capacity: default_queue_capacity(),
            routing: RoutingMode::default(),
            unaddressed: UnaddressedPolicy::default(),
            ping_interval_secs: 0,
            idle_timeout_secs: 0,
        }
    }
}

impl HubSettings {
    /// Runtime hub configuration
    pub fn to_hub_config(&self) -> HubConfig {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));

        HubConfig {
            max_connections: self.max_connections,
            queue_capacity: self.queue_capacity.max(1),
            ping_interval: secs(self.ping_interval_secs),
            idle_timeout: secs(self.idle_timeout_secs),
        }
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret, same as the token issuer's
    #[serde(default)]
    pub jwt_secret: String,

    /// Tolerated clock skew on `exp`, in seconds
    #[serde(default)]
    pub leeway_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let (config, source, failures) = Self::discover();
        source.log(&failures);
        config
    }

    /// Search the default locations without logging
    ///
    /// Returns the config, where it came from, and every candidate file that
    /// exists but failed to load. Callers that install tracing from the
    /// loaded settings log the outcome afterwards with [`ConfigSource::log`].
    pub fn discover() -> (Self, ConfigSource, Vec<ConfigError>) {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("chathub").join("config.toml")),
            Some(PathBuf::from("/etc/chathub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::discover_in(&config_paths)
    }

    fn discover_in(paths: &[PathBuf]) -> (Self, ConfigSource, Vec<ConfigError>) {
        let mut failures = Vec::new();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => return (config, ConfigSource::File(path.clone()), failures),
                Err(e) => failures.push(e),
            }
        }

        (Self::from_env(), ConfigSource::Environment, failures)
    }

    /// Check settings that have no usable default
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set (or CHATHUB_JWT_SECRET)".to_string(),
            ));
        }
        if self.hub.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "hub.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(host) = lookup("CHATHUB_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("CHATHUB_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Hub overrides
        if let Some(routing) = lookup("CHATHUB_ROUTING") {
            match routing.parse() {
                Ok(mode) => self.hub.routing = mode,
                Err(e) => tracing::warn!("Ignoring CHATHUB_ROUTING: {}", e),
            }
        }
        if let Some(max) = lookup("CHATHUB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.hub.max_connections = n;
            }
        }

        // Auth overrides; JWT_SECRET is what the token issuer reads
        if let Some(secret) = lookup("CHATHUB_JWT_SECRET").or_else(|| lookup("JWT_SECRET")) {
            self.auth.jwt_secret = secret.trim_matches('"').to_string();
        }

        // Logging overrides
        if let Some(level) = lookup("CHATHUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CHATHUB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Chathub Configuration
#
# Environment variables override these settings:
# - CHATHUB_API_HOST
# - CHATHUB_API_PORT
# - CHATHUB_ROUTING
# - CHATHUB_MAX_CONNECTIONS
# - CHATHUB_JWT_SECRET (falls back to JWT_SECRET)
# - CHATHUB_LOG_LEVEL
# - CHATHUB_LOG_FORMAT

[api]
# Server host
host = "0.0.0.0"

# Server port
port = 8080

# Allowed CORS origins (empty allows any origin)
cors_origins = []

[hub]
# Maximum concurrent WebSocket connections
max_connections = 1000

# Per-client outbound queue capacity; a client whose queue fills is disconnected
queue_capacity = 256

# Recipient routing: broadcast, direct, or room
routing = "broadcast"

# Scoped routing only: what to do with payloads without an address (drop, broadcast)
unaddressed = "drop"

# Keepalive ping interval in seconds (0 disables)
ping_interval_secs = 0

# Disconnect clients silent for this many seconds (0 disables)
idle_timeout_secs = 0

[auth]
# Shared HS256 secret used by the token issuer
jwt_secret = ""

# Tolerated clock skew on token expiry (seconds)
leeway_secs = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
