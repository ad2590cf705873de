//! # Configuration Management
//!
//! Centralized configuration for Nemoria servers and clients.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults (`ServerConfig::new`, `ClientConfig::new`)
//! - Environment overrides via `from_env()` (`NEMORIA_*` variables)
//!
//! ## Security Considerations
//! - Passwords are held in a [`Secret`] that never prints and is zeroized on drop
//! - Handshake and idle timeouts keep slow or dead peers from pinning a task forever
//! - The transport is plain TCP; wrap it separately if confidentiality is needed

use crate::error::{NemoriaError, Result};
use crate::persistence::Codec;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use zeroize::Zeroize;

/// Current supported protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes to identify protocol packets ("NMRA")
pub const MAGIC_BYTES: [u8; 4] = [0x4E, 0x4D, 0x52, 0x41];

/// Max allowed payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Deepest nesting a stored value, or a snapshot of the whole store, may reach.
///
/// Counts one level per enclosing list or map plus one for the innermost
/// value. Kept well under the recursion limits of the JSON and YAML parsers.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Default namespace advertised by a server
pub const DEFAULT_NAMESPACE: &str = "Nemoria";

/// Default TCP port
pub const DEFAULT_PORT: u16 = 1234;

/// Shared secret that never shows up in logs and is wiped on drop.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NemoriaConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NemoriaConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| NemoriaError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| NemoriaError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| NemoriaError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("NEMORIA_HOST") {
            config.server.host = host.clone();
            config.client.host = host;
        }

        if let Ok(port) = std::env::var("NEMORIA_PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|e| NemoriaError::ConfigError(format!("Invalid NEMORIA_PORT: {e}")))?;
            config.server.port = port;
            config.client.port = port;
        }

        if let Ok(namespace) = std::env::var("NEMORIA_NAMESPACE") {
            config.server.namespace = namespace.clone();
            config.client.namespace = Some(namespace);
        }

        if let Ok(password) = std::env::var("NEMORIA_PASSWORD") {
            config.server.password = Secret::new(password.clone());
            config.client.password = Secret::new(password);
        }

        if let Ok(file) = std::env::var("NEMORIA_FILE") {
            config.server.file = Some(PathBuf::from(file));
        }

        if let Ok(format) = std::env::var("NEMORIA_FILE_FORMAT") {
            config.server.file_format = Some(format);
        }

        if let Ok(idle) = std::env::var("NEMORIA_IDLE_TIMEOUT_MS") {
            if let Ok(val) = idle.parse::<u64>() {
                config.server.idle_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NemoriaError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| NemoriaError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        strict(self.validate())
    }
}

fn strict(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(NemoriaError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host or IP to bind
    pub host: String,

    /// TCP port to bind (0 picks an ephemeral port)
    pub port: u16,

    /// Namespace advertised to clients
    pub namespace: String,

    /// Shared secret clients must prove knowledge of
    #[serde(default)]
    pub password: Secret,

    /// Backing file loaded at startup and written on shutdown
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Codec name for `file` (defaults to the file extension, then JSON)
    #[serde(default)]
    pub file_format: Option<String>,

    /// Time allowed for a client to complete the handshake
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Time a connection may stay silent between requests
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Time allowed for writing one response
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_PORT,
            namespace: String::from(DEFAULT_NAMESPACE),
            password: Secret::default(),
            file: None,
            file_format: None,
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            idle_timeout: timeout::IDLE_TIMEOUT,
            write_timeout: timeout::DEFAULT_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        namespace: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            namespace: namespace.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Back the store with `file`, encoded with the named format.
    pub fn with_file(mut self, file: impl Into<PathBuf>, file_format: Option<&str>) -> Self {
        self.file = Some(file.into());
        self.file_format = file_format.map(str::to_owned);
        self
    }

    /// `host:port` string for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Codec for the backing file, if one is configured.
    pub fn file_codec(&self) -> Result<Option<Codec>> {
        let Some(file) = &self.file else {
            return Ok(None);
        };
        if let Some(format) = &self.file_format {
            return Codec::from_name(format).map(Some);
        }
        match file.extension().and_then(|e| e.to_str()) {
            Some(ext) => Ok(Some(Codec::from_name(ext).unwrap_or_default())),
            None => Ok(Some(Codec::default())),
        }
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }

        if self.namespace.is_empty() {
            errors.push("Namespace cannot be empty".to_string());
        }

        if self.password.is_empty() {
            errors.push("Server password cannot be empty".to_string());
        }

        if let Some(format) = &self.file_format {
            if Codec::from_name(format).is_err() {
                errors.push(format!("Unsupported file format: '{format}'"));
            }
            if self.file.is_none() {
                errors.push("file_format is set but no file is configured".to_string());
            }
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 300 {
            errors.push("Handshake timeout too long (maximum: 300s)".to_string());
        }

        if self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms)".to_string());
        }

        if self.write_timeout.as_millis() < 100 {
            errors.push("Write timeout too short (minimum: 100ms)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        strict(self.validate())
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Shared secret
    #[serde(default)]
    pub password: Secret,

    /// Namespace to claim; `None` claims whatever the server advertises
    #[serde(default)]
    pub namespace: Option<String>,

    /// Timeout for establishing the TCP connection and the handshake
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Timeout for waiting for one response
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_PORT,
            password: Secret::default(),
            namespace: None,
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            response_timeout: timeout::RESPONSE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<Secret>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Client host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Client port must be greater than 0".to_string());
        }

        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() {
                errors.push("Namespace cannot be empty when set".to_string());
            }
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether to include span enter/exit events
    #[serde(default)]
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("nemoria"),
            log_level: Level::INFO,
            json_format: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
