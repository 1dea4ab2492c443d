//! Request logging processors.
//!
//! `LogInit` opens a [`RequestLog`] in the internal attributes, `LogRequest`
//! captures the client request and `LogResponse` captures the client
//! response, then emits the record under [`REQUEST_LOG_TARGET`].

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::Processor;
use crate::context::attributes::ATTR_INTERNAL_REQUEST_LOG;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::definition::LoggingMode;
use crate::headers::HttpHeaders;
use crate::logging::REQUEST_LOG_TARGET;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggedRequest {
    pub method: String,
    pub uri: String,
    pub headers: HttpHeaders,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggedResponse {
    pub status: u16,
    pub headers: HttpHeaders,
}

/// Log record built across the before/after handle phases.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub request_id: String,
    pub api_id: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_request: Option<LoggedRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_response: Option<LoggedResponse>,
}

fn logs_client(mode: LoggingMode) -> bool {
    matches!(mode, LoggingMode::Client | LoggingMode::ClientProxy)
}

#[derive(Debug, Clone)]
pub struct LogInitProcessor {
    api_id: String,
}

impl LogInitProcessor {
    #[must_use]
    pub fn new(api_id: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
        }
    }
}

#[async_trait]
impl Processor for LogInitProcessor {
    fn id(&self) -> &'static str {
        "log-init"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let log = RequestLog {
            request_id: ctx.request().id().to_string(),
            api_id: self.api_id.clone(),
            timestamp: ctx.request().timestamp(),
            client_request: None,
            client_response: None,
        };
        ctx.put_internal_attribute(ATTR_INTERNAL_REQUEST_LOG, log);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LogRequestProcessor {
    mode: LoggingMode,
}

impl LogRequestProcessor {
    #[must_use]
    pub fn new(mode: LoggingMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Processor for LogRequestProcessor {
    fn id(&self) -> &'static str {
        "log-request"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        if !logs_client(self.mode) {
            return Ok(());
        }
        let Some(mut log) = ctx.get_internal_attribute::<RequestLog>(ATTR_INTERNAL_REQUEST_LOG)
        else {
            return Ok(());
        };
        let request = ctx.request();
        log.client_request = Some(LoggedRequest {
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            headers: request.headers().clone(),
        });
        ctx.put_internal_attribute(ATTR_INTERNAL_REQUEST_LOG, log);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LogResponseProcessor {
    mode: LoggingMode,
}

impl LogResponseProcessor {
    #[must_use]
    pub fn new(mode: LoggingMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Processor for LogResponseProcessor {
    fn id(&self) -> &'static str {
        "log-response"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let Some(mut log) = ctx.get_internal_attribute::<RequestLog>(ATTR_INTERNAL_REQUEST_LOG)
        else {
            return Ok(());
        };
        if logs_client(self.mode) {
            let response = ctx.response();
            log.client_response = Some(LoggedResponse {
                status: response.status(),
                headers: response.headers().clone(),
            });
        }
        match serde_json::to_string(&log) {
            Ok(record) => info!(
                target: REQUEST_LOG_TARGET,
                request_id = %log.request_id,
                api_id = %log.api_id,
                record = %record,
                "Request log"
            ),
            Err(err) => warn!(request_id = %log.request_id, error = %err, "Failed to serialize request log"),
        }
        ctx.put_internal_attribute(ATTR_INTERNAL_REQUEST_LOG, log);
        Ok(())
    }
}
