//! # API Definition Module
//!
//! Deployment-time description of an API: its listeners (HTTP paths, CORS,
//! path mappings, entrypoints), flows and analytics settings. Definitions are
//! loaded from YAML (or JSON, which is valid YAML) and read by the chain
//! factories and acceptor builders. Nothing here is consulted per request.
//!
//! ```yaml
//! id: teams
//! name: Teams
//! type: message
//! listeners:
//!   - type: http
//!     paths:
//!       - path: /teams
//!     cors:
//!       enabled: true
//!       allowOrigin: ["https://console.example.com"]
//!     entrypoints:
//!       - type: http-get
//!         configuration:
//!           messagesLimitCount: 20
//! analytics:
//!   logging:
//!     mode: CLIENT
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read API definition {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse API definition: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid API definition: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    Proxy,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub api_type: ApiType,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub analytics: Analytics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Listener {
    Http(HttpListener),
    Subscription(SubscriptionListener),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpListener {
    #[serde(default)]
    pub paths: Vec<ListenerPath>,
    #[serde(default)]
    pub path_mappings: Vec<String>,
    #[serde(default)]
    pub cors: Option<CorsDefinition>,
    #[serde(default)]
    pub entrypoints: Vec<EntrypointDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionListener {
    #[serde(default)]
    pub entrypoints: Vec<EntrypointDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerPath {
    #[serde(default)]
    pub host: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrypointDefinition {
    #[serde(rename = "type")]
    pub entrypoint_type: String,
    #[serde(default)]
    pub configuration: Value,
}

/// CORS settings of an HTTP listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsDefinition {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_origin: Vec<String>,
    #[serde(default)]
    pub allow_headers: Vec<String>,
    #[serde(default)]
    pub allow_methods: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
    /// Preflight cache duration in seconds; negative disables the header.
    #[serde(default = "default_max_age")]
    pub max_age: i64,
}

fn default_max_age() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub selectors: Vec<Selector>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Selector {
    Http(HttpSelector),
    Condition { condition: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSelector {
    pub path: String,
    #[serde(default)]
    pub path_operator: PathOperator,
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathOperator {
    Equals,
    #[default]
    StartsWith,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub logging: Option<LoggingDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingDefinition {
    #[serde(default)]
    pub mode: LoggingMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoggingMode {
    #[default]
    None,
    Client,
    Proxy,
    ClientProxy,
}

impl LoggingMode {
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self != LoggingMode::None
    }
}

impl Api {
    /// Parse and validate a definition from YAML or JSON text.
    pub fn from_yaml_str(raw: &str) -> Result<Self, DefinitionError> {
        let api: Api = serde_yaml::from_str(raw)?;
        api.validate()?;
        Ok(api)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::Invalid("api id must not be empty".into()));
        }
        for listener in &self.listeners {
            if let Listener::Http(http) = listener {
                if let Some(bad) = http.paths.iter().find(|p| !p.path.starts_with('/')) {
                    return Err(DefinitionError::Invalid(format!(
                        "listener path '{}' must start with '/'",
                        bad.path
                    )));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_message_api(&self) -> bool {
        self.api_type == ApiType::Message
    }

    /// The first HTTP listener, if the API declares one.
    #[must_use]
    pub fn http_listener(&self) -> Option<&HttpListener> {
        self.listeners.iter().find_map(|l| match l {
            Listener::Http(http) => Some(http),
            Listener::Subscription(_) => None,
        })
    }

    /// CORS settings, only when enabled.
    #[must_use]
    pub fn cors(&self) -> Option<&CorsDefinition> {
        self.http_listener()
            .and_then(|l| l.cors.as_ref())
            .filter(|c| c.enabled)
    }

    #[must_use]
    pub fn logging_mode(&self) -> LoggingMode {
        self.analytics
            .logging
            .as_ref()
            .map(|l| l.mode)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn path_mappings(&self) -> &[String] {
        self.http_listener()
            .map(|l| l.path_mappings.as_slice())
            .unwrap_or_default()
    }

    /// Path templates of enabled flows, in declaration order.
    pub fn flow_paths(&self) -> impl Iterator<Item = &str> {
        self.flows
            .iter()
            .filter(|f| f.enabled)
            .flat_map(|f| f.selectors.iter())
            .filter_map(|s| match s {
                Selector::Http(http) => Some(http.path.as_str()),
                Selector::Condition { .. } => None,
            })
    }

    /// Whether any enabled flow declares a `:param` path segment.
    #[must_use]
    pub fn has_path_parameters(&self) -> bool {
        self.flow_paths()
            .any(|p| p.split('/').any(|segment| segment.starts_with(':')))
    }

    /// Entrypoints declared across all listeners.
    pub fn entrypoints(&self) -> impl Iterator<Item = &EntrypointDefinition> {
        self.listeners.iter().flat_map(|l| match l {
            Listener::Http(http) => http.entrypoints.iter(),
            Listener::Subscription(sub) => sub.entrypoints.iter(),
        })
    }
}
