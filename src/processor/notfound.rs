//! Processors of the not-found chain, run when no acceptor matched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::Processor;
use crate::context::{ExecutionContext, ExecutionResult, Metrics};
use crate::failure::MEDIA_TYPE_TEXT;
use crate::transport::now_millis;

pub const NOT_FOUND_MESSAGE: &str = "No context-path matches the request URI.";

/// Sink for the metrics of requests that matched no API.
pub trait Reporter: Send + Sync {
    fn report(&self, metrics: &Metrics);
}

/// Reports metrics as a structured `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, metrics: &Metrics) {
        match serde_json::to_string(metrics) {
            Ok(json) => info!(
                request_id = %metrics.request_id,
                status = metrics.status,
                metrics = %json,
                "Unmatched request"
            ),
            Err(err) => info!(request_id = %metrics.request_id, error = %err, "Unmatched request"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotFoundProcessor;

#[async_trait]
impl Processor for NotFoundProcessor {
    fn id(&self) -> &'static str {
        "not-found"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let response = ctx.response_mut();
        response.set_status(404);
        response
            .headers_mut()
            .set("content-type", MEDIA_TYPE_TEXT)
            .set("content-length", NOT_FOUND_MESSAGE.len().to_string());
        response.set_body(NOT_FOUND_MESSAGE);
        Ok(())
    }
}

/// Computes the gateway response time and final status.
#[derive(Debug, Clone, Default)]
pub struct ResponseTimeProcessor;

#[async_trait]
impl Processor for ResponseTimeProcessor {
    fn id(&self) -> &'static str {
        "response-time"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let status = ctx.response().status();
        let metrics = ctx.metrics_mut();
        metrics.status = status;
        metrics.gateway_response_time_ms = metrics.elapsed_since_arrival(now_millis());
        Ok(())
    }
}

pub struct NotFoundReporterProcessor {
    reporter: Arc<dyn Reporter>,
}

impl NotFoundReporterProcessor {
    #[must_use]
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl Processor for NotFoundReporterProcessor {
    fn id(&self) -> &'static str {
        "not-found-reporter"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        self.reporter.report(ctx.metrics());
        Ok(())
    }
}
