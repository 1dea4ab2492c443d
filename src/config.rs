//! # Gateway Configuration Module
//!
//! Flat, read-only property map consumed by the dispatcher and chain
//! factories. Keys are dotted strings (`http.requestTimeout`); lookups are
//! case-insensitive and treat `-`, `_` and `.` as the same separator, so the
//! environment variable `GW_HTTP_REQUESTTIMEOUT` overrides `http.requestTimeout`.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. built-in defaults (see the table below)
//! 2. a YAML file, nested maps flattened to dotted keys
//! 3. `GW_`-prefixed environment variables
//!
//! | Key | Default |
//! |-----|---------|
//! | `http.requestTimeout` | `0` (disabled) |
//! | `http.requestTimeoutGraceDelay` | `30` |
//! | `handlers.request.headers.x-forwarded-prefix` | `false` |
//! | `handlers.request.transaction.header` | `X-Gravitee-Transaction-Id` |
//! | `handlers.request.request.header` | `X-Gravitee-Request-Id` |
//! | `handlers.request.client.header` | `X-Gravitee-Client-Identifier` |
//! | `handlers.notfound.analytics.enabled` | `false` |
//! | `api.pending_requests_timeout` | `10000` |
//! | `tenant` / `zone` | unset |
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = GatewayConfiguration::load(Some(Path::new("gateway.yml")))?;
//! let timeout = config.request_timeout_ms();
//! ```

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

pub const KEY_REQUEST_TIMEOUT: &str = "http.requestTimeout";
pub const KEY_REQUEST_TIMEOUT_GRACE_DELAY: &str = "http.requestTimeoutGraceDelay";
pub const KEY_X_FORWARDED_PREFIX: &str = "handlers.request.headers.x-forwarded-prefix";
pub const KEY_TRANSACTION_HEADER: &str = "handlers.request.transaction.header";
pub const KEY_REQUEST_HEADER: &str = "handlers.request.request.header";
pub const KEY_CLIENT_IDENTIFIER_HEADER: &str = "handlers.request.client.header";
pub const KEY_NOT_FOUND_ANALYTICS: &str = "handlers.notfound.analytics.enabled";
pub const KEY_PENDING_REQUESTS_TIMEOUT: &str = "api.pending_requests_timeout";
pub const KEY_TENANT: &str = "tenant";
pub const KEY_ZONE: &str = "zone";

pub const DEFAULT_TRANSACTION_HEADER: &str = "X-Gravitee-Transaction-Id";
pub const DEFAULT_REQUEST_HEADER: &str = "X-Gravitee-Request-Id";
pub const DEFAULT_CLIENT_IDENTIFIER_HEADER: &str = "X-Gravitee-Client-Identifier";

const ENV_PREFIX: &str = "GW_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value '{value}' for configuration key '{key}'")]
    InvalidValue { key: String, value: String },
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '-' | '_' => '.',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Gateway-wide configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfiguration {
    properties: HashMap<String, String>,
}

impl GatewayConfiguration {
    /// Empty configuration: every accessor returns its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then the optional YAML file, then `GW_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::new(),
        };
        config.apply_env(env::vars());
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let mut config = Self::new();
        flatten_into(&mut config.properties, String::new(), &value);
        Ok(config)
    }

    /// Override properties from `GW_`-prefixed variables.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                if !key.is_empty() {
                    self.properties.insert(normalize_key(key), value);
                }
            }
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(normalize_key(key), value.into());
    }

    #[must_use]
    pub fn raw_property(&self, key: &str) -> Option<&str> {
        self.properties.get(&normalize_key(key)).map(String::as_str)
    }

    /// Typed lookup that reports unparsable values.
    pub fn try_property<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.raw_property(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
        }
    }

    /// Typed lookup falling back to `default` when absent or unparsable.
    pub fn property<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.try_property(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!(%err, "Using default for invalid configuration value");
                default
            }
        }
    }

    fn string_property(&self, key: &str, default: &str) -> String {
        self.raw_property(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    }

    #[must_use]
    pub fn request_timeout_ms(&self) -> u64 {
        self.property(KEY_REQUEST_TIMEOUT, 0)
    }

    #[must_use]
    pub fn request_timeout_grace_delay_ms(&self) -> u64 {
        self.property(KEY_REQUEST_TIMEOUT_GRACE_DELAY, 30)
    }

    #[must_use]
    pub fn x_forwarded_prefix_enabled(&self) -> bool {
        self.property(KEY_X_FORWARDED_PREFIX, false)
    }

    #[must_use]
    pub fn transaction_header(&self) -> String {
        self.string_property(KEY_TRANSACTION_HEADER, DEFAULT_TRANSACTION_HEADER)
    }

    #[must_use]
    pub fn request_header(&self) -> String {
        self.string_property(KEY_REQUEST_HEADER, DEFAULT_REQUEST_HEADER)
    }

    #[must_use]
    pub fn client_identifier_header(&self) -> String {
        self.string_property(KEY_CLIENT_IDENTIFIER_HEADER, DEFAULT_CLIENT_IDENTIFIER_HEADER)
    }

    #[must_use]
    pub fn not_found_analytics_enabled(&self) -> bool {
        self.property(KEY_NOT_FOUND_ANALYTICS, false)
    }

    #[must_use]
    pub fn pending_requests_timeout_ms(&self) -> u64 {
        self.property(KEY_PENDING_REQUESTS_TIMEOUT, 10_000)
    }

    #[must_use]
    pub fn tenant(&self) -> Option<String> {
        self.raw_property(KEY_TENANT)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    #[must_use]
    pub fn zone(&self) -> Option<String> {
        self.raw_property(KEY_ZONE)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

fn flatten_into(out: &mut HashMap<String, String>, prefix: String, value: &serde_yaml::Value) {
    use serde_yaml::Value;

    let scalar = match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let segment = match k {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                let key = if prefix.is_empty() {
                    segment
                } else {
                    format!("{prefix}.{segment}")
                };
                flatten_into(out, key, v);
            }
            return;
        }
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Tagged(tagged) => return flatten_into(out, prefix, &tagged.value),
    };
    if !prefix.is_empty() {
        out.insert(normalize_key(&prefix), scalar);
    }
}
