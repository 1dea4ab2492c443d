//! # Entrypoint Module
//!
//! An entrypoint connector translates between the client-facing protocol and
//! the gateway's message streams. The reactor picks the first connector that
//! [`matches`](EntrypointConnector::matches) the request, calls
//! [`handle_request`](EntrypointConnector::handle_request) before invoking
//! the backend and [`handle_response`](EntrypointConnector::handle_response)
//! once the backend produced the response message stream.
//!
//! Connectors are created from the API definition by
//! [`create_connector`], keyed by the entrypoint `type`.

mod bounded;
pub mod http_get;

pub use bounded::BoundedMessages;
pub use http_get::{HttpGetConfiguration, HttpGetEntrypointConnector};

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ExecutionContext, ExecutionResult};
use crate::definition::EntrypointDefinition;

#[async_trait]
pub trait EntrypointConnector: Send + Sync {
    fn id(&self) -> &'static str;

    /// Whether this connector can serve the request.
    fn matches(&self, ctx: &ExecutionContext) -> bool;

    /// Prepare the context before the backend is invoked.
    async fn handle_request(&self, ctx: &mut ExecutionContext) -> ExecutionResult;

    /// Turn the response message stream into the client response.
    async fn handle_response(&self, ctx: &mut ExecutionContext) -> ExecutionResult;
}

#[derive(Debug, thiserror::Error)]
pub enum EntrypointError {
    #[error("unknown entrypoint type '{0}'")]
    UnknownType(String),
    #[error("invalid configuration for entrypoint '{entrypoint_type}': {source}")]
    InvalidConfiguration {
        entrypoint_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Build the connector declared by `definition`.
pub fn create_connector(
    definition: &EntrypointDefinition,
) -> Result<Arc<dyn EntrypointConnector>, EntrypointError> {
    match definition.entrypoint_type.as_str() {
        http_get::ENTRYPOINT_ID => {
            let configuration = if definition.configuration.is_null() {
                HttpGetConfiguration::default()
            } else {
                serde_json::from_value(definition.configuration.clone()).map_err(|source| {
                    EntrypointError::InvalidConfiguration {
                        entrypoint_type: definition.entrypoint_type.clone(),
                        source,
                    }
                })?
            };
            Ok(Arc::new(HttpGetEntrypointConnector::new(configuration)))
        }
        other => Err(EntrypointError::UnknownType(other.to_string())),
    }
}
