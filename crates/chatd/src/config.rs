//! Server configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML file, the `CHAT_BIND` environment variable, and finally
//! command-line flags applied by the binary.
//!
//! ```toml
//! bind = "127.0.0.1:9001"
//! max_line_length = 65536
//! outbound_queue = 256
//! write_timeout_ms = 10000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_protocol::MAX_LINE_LENGTH;
use serde::Deserialize;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:9001";

/// Environment variable overriding the listen address.
pub const BIND_ENV: &str = "CHAT_BIND";

/// Default per-recipient outbound queue capacity, in lines.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Default bound on a single socket write.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;

/// Runtime settings for the chat server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind: SocketAddr,

    /// Longest accepted client line, terminator included.
    pub max_line_length: usize,

    /// Lines that may queue for one recipient before it is flagged as stalled.
    pub outbound_queue: usize,

    /// Milliseconds a single write to a client may take.
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9001)),
            max_line_length: MAX_LINE_LENGTH,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Creates a config with defaults and the given bind address.
    pub fn with_bind(bind: SocketAddr) -> Self {
        Self {
            bind,
            ..Self::default()
        }
    }

    /// Parses a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            error: e.to_string(),
        })?;
        config.validate()
    }

    /// Loads a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Parse { error } => ConfigError::ParseFile {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Applies the `CHAT_BIND` environment variable, if set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        match std::env::var(BIND_ENV) {
            Ok(value) => self.with_bind_str(&value),
            Err(_) => Ok(self),
        }
    }

    /// Replaces the bind address with a parsed `host:port` string.
    pub fn with_bind_str(mut self, value: &str) -> Result<Self, ConfigError> {
        self.bind = value
            .parse()
            .map_err(|_| ConfigError::InvalidBind(value.to_string()))?;
        Ok(self)
    }

    /// Write timeout as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid {
                field: "outbound_queue",
                reason: "must be at least 1",
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid {
                field: "max_line_length",
                reason: "must be at least 1",
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "write_timeout_ms",
                reason: "must be at least 1",
            });
        }
        Ok(self)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {error}")]
    Parse { error: String },

    #[error("Failed to parse config at {path}: {error}")]
    ParseFile { path: PathBuf, error: String },

    #[error("Invalid bind address: {0:?}")]
    InvalidBind(String),

    #[error("Invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
