use serde_json::{Map, Value};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default retention for the short tier, in seconds.
pub const DEFAULT_TTL_SHORT: u64 = 3600;
/// Default retention for the medium tier, in seconds.
pub const DEFAULT_TTL_MEDIUM: u64 = 86_400;
/// Default retention for the long tier, in seconds.
pub const DEFAULT_TTL_LONG: u64 = 604_800;
/// Default number of blocks held by the cache layer.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;
/// Default language hint passed to the temporal reasoner.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Option keys understood by [`AdapterConfig`].
pub const RECOGNIZED_OPTIONS: [&str; 7] = [
    "embedding_model",
    "ttl_short",
    "ttl_medium",
    "ttl_long",
    "cache_capacity",
    "prompt_template",
    "default_language",
];

/// Errors encountered while assembling adapter or server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An option or environment variable held a value of the wrong shape.
    #[error("Invalid value for option `{key}`: {reason}")]
    InvalidValue {
        /// Option key or environment variable name.
        key: String,
        /// Human-readable explanation.
        reason: String,
    },
    /// The requested transport is not one of `stdio`, `http`, `websocket`.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),
}

/// Configuration for the component bundle. Immutable once built.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    data_dir: PathBuf,
    options: Map<String, Value>,
}

impl AdapterConfig {
    /// Create a configuration with no options set; every option resolves to its default.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            options: Map::new(),
        }
    }

    /// Create a configuration from an explicit option map.
    pub fn with_options(data_dir: impl Into<PathBuf>, options: Map<String, Value>) -> Self {
        for key in options.keys() {
            if !RECOGNIZED_OPTIONS.contains(&key.as_str()) {
                tracing::debug!(option = %key, "Ignoring unrecognized adapter option");
            }
        }
        Self {
            data_dir: data_dir.into(),
            options,
        }
    }

    /// Build a configuration from `MNEMO_*` environment variables (after loading `.env`).
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut options = Map::new();
        if let Some(model) = load_env_optional("MNEMO_EMBEDDING_MODEL") {
            options.insert("embedding_model".into(), Value::String(model));
        }
        for (var, key) in [
            ("MNEMO_TTL_SHORT", "ttl_short"),
            ("MNEMO_TTL_MEDIUM", "ttl_medium"),
            ("MNEMO_TTL_LONG", "ttl_long"),
            ("MNEMO_CACHE_CAPACITY", "cache_capacity"),
        ] {
            if let Some(raw) = load_env_optional(var) {
                let parsed: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: var.to_string(),
                    reason: format!("expected a non-negative integer, got `{raw}`"),
                })?;
                options.insert(key.into(), Value::from(parsed));
            }
        }
        if let Some(template) = load_env_optional("MNEMO_PROMPT_TEMPLATE") {
            options.insert("prompt_template".into(), Value::String(template));
        }
        if let Some(language) = load_env_optional("MNEMO_DEFAULT_LANGUAGE") {
            options.insert("default_language".into(), Value::String(language));
        }

        let config = Self::with_options(data_dir, options);
        tracing::debug!(
            data_dir = %config.data_dir.display(),
            options = config.options.len(),
            "Loaded adapter configuration"
        );
        Ok(config)
    }

    /// Directory holding persisted memory records.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Raw option map, as supplied.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Embedding model identifier handed to the block store, if configured.
    pub fn embedding_model(&self) -> Result<Option<String>, ConfigError> {
        self.optional_string("embedding_model")
    }

    /// Retention of the short tier in seconds.
    pub fn ttl_short(&self) -> Result<u64, ConfigError> {
        self.integer_or("ttl_short", DEFAULT_TTL_SHORT)
    }

    /// Retention of the medium tier in seconds.
    pub fn ttl_medium(&self) -> Result<u64, ConfigError> {
        self.integer_or("ttl_medium", DEFAULT_TTL_MEDIUM)
    }

    /// Retention of the long tier in seconds.
    pub fn ttl_long(&self) -> Result<u64, ConfigError> {
        self.integer_or("ttl_long", DEFAULT_TTL_LONG)
    }

    /// Maximum number of blocks kept by the cache layer.
    pub fn cache_capacity(&self) -> Result<usize, ConfigError> {
        self.integer_or("cache_capacity", DEFAULT_CACHE_CAPACITY as u64)
            .map(|value| value as usize)
    }

    /// Custom prompt template, if configured.
    pub fn prompt_template(&self) -> Result<Option<String>, ConfigError> {
        self.optional_string("prompt_template")
    }

    /// Language hint for temporal reasoning.
    pub fn default_language(&self) -> Result<String, ConfigError> {
        Ok(self
            .optional_string("default_language")?
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()))
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected a string, got {other}"),
            }),
        }
    }

    fn integer_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected a non-negative integer, got {value}"),
            }),
        }
    }
}

/// Wire binding selected for a server instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Records over the process's standard input and output.
    Stdio,
    /// One HTTP request per tool invocation.
    Http,
    /// Persistent duplex connection carrying many requests.
    WebSocket,
}

impl TransportKind {
    /// Lowercase label used on the command line and in status payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "websocket" => Ok(Self::WebSocket),
            _ => Err(ConfigError::UnsupportedTransport(s.to_string())),
        }
    }
}

/// Server-level settings. The transport is fixed at construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding persisted memory records.
    pub data_dir: PathBuf,
    /// Name reported by `server_status` and `/health`.
    pub server_name: String,
    /// Interface bound by the HTTP and WebSocket transports.
    pub host: String,
    /// Port bound by the HTTP and WebSocket transports.
    pub port: u16,
    /// Selected transport.
    pub transport: TransportKind,
    /// Serve only the flat-file demonstration tools instead of the component bundle.
    pub fallback: bool,
}

impl ServerConfig {
    /// Build a configuration, rejecting unknown transports before anything is bound.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        server_name: impl Into<String>,
        port: u16,
        transport: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: data_dir.into(),
            server_name: server_name.into(),
            host: "127.0.0.1".to_string(),
            port,
            transport: transport.parse()?,
            fallback: false,
        })
    }

    /// Override the bind interface.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Toggle fallback mode.
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
