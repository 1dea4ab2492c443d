//! Failure rendering processors.
//!
//! [`SimpleFailureProcessor`] turns the execution failure of an interrupted
//! request into the response status and body. [`SimpleFailureMessageProcessor`]
//! does the same for message APIs, where the failure travels as a single
//! error [`Message`] on the response stream instead.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::Processor;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::failure::{render_failure, ExecutionFailure, RenderedFailure};
use crate::message::{Message, MessageError, MessageStream};

/// Failure parameter holding a description of the error that caused it.
pub const FAILURE_PARAMETER_EXCEPTION: &str = "exception";

/// Metadata key carrying the status of an error message.
pub const METADATA_STATUS_CODE: &str = "statusCode";

fn accept_values(ctx: &ExecutionContext) -> Vec<String> {
    ctx.request()
        .headers()
        .get_all("accept")
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn render(failure: Option<&ExecutionFailure>, accept: &[String]) -> RenderedFailure {
    let accept: Vec<&str> = accept.iter().map(String::as_str).collect();
    render_failure(failure, &accept)
}

fn log_exception(request_id: &str, failure: Option<&ExecutionFailure>) {
    if let Some(exception) = failure.and_then(|f| f.parameters().get(FAILURE_PARAMETER_EXCEPTION)) {
        error!(request_id = %request_id, exception = %exception, "Execution failure caused by an error");
    }
}

/// Renders the stored execution failure, or a plain 500, into the response.
#[derive(Debug, Clone, Default)]
pub struct SimpleFailureProcessor;

#[async_trait]
impl Processor for SimpleFailureProcessor {
    fn id(&self) -> &'static str {
        "simple-failure"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let failure = ctx.execution_failure();
        log_exception(ctx.request().id(), failure.as_ref());

        if ctx.response().transport().is_committed() {
            debug!(request_id = %ctx.request().id(), "Response already committed, failure not rendered");
            return Ok(());
        }

        let rendered = render(failure.as_ref(), &accept_values(ctx));
        let metrics = ctx.metrics_mut();
        metrics.error_key = failure.as_ref().and_then(|f| f.key().map(str::to_string));
        metrics.error_message = Some(
            failure
                .as_ref()
                .map(ExecutionFailure::message_or_reason)
                .unwrap_or_else(|| rendered.reason.clone()),
        );

        let response = ctx.response_mut();
        response.set_status(rendered.status);
        response.set_reason(rendered.reason);
        let headers = response.headers_mut();
        headers.set("content-type", rendered.content_type);
        headers.set("content-length", rendered.body.len().to_string());
        response.set_body(rendered.body);
        Ok(())
    }
}

/// Build the error message spliced into a response stream.
#[must_use]
pub fn failure_message(failure: Option<&ExecutionFailure>, accept: &[String]) -> Message {
    let rendered = render(failure, accept);
    let mut message = Message::new(rendered.body.clone())
        .with_error(true)
        .with_header("content-type", rendered.content_type)
        .with_header("content-length", rendered.body.len().to_string())
        .with_metadata(METADATA_STATUS_CODE, rendered.status);
    if let Some(key) = failure.and_then(ExecutionFailure::key) {
        message = message.with_metadata("key", key);
    }
    message
}

/// Converts message stream interruptions into one terminal error message
/// on the response stream.
///
/// An interruption observed on the request stream consumes the in-flight
/// message: nothing is forwarded on the request side and the error message is
/// handed over to the response side, which emits it ahead of any further
/// message and then ends. Interruptions raised on the response stream itself
/// are converted in place.
#[derive(Debug, Clone, Default)]
pub struct SimpleFailureMessageProcessor;

enum Step {
    Spliced(Option<Message>),
    Upstream(Option<Result<Message, MessageError>>),
}

#[async_trait]
impl Processor for SimpleFailureMessageProcessor {
    fn id(&self) -> &'static str {
        "simple-failure-message"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let (tx, rx) = oneshot::channel::<Message>();
        let request_accept = accept_values(ctx);
        let response_accept = request_accept.clone();
        let request_id = ctx.request().id().to_string();

        ctx.request_mut().on_messages(move |upstream: MessageStream| {
            Box::pin(stream! {
                let mut upstream = upstream;
                let mut tx = Some(tx);
                while let Some(item) = upstream.next().await {
                    let failure = match item {
                        Ok(message) => {
                            yield Ok(message);
                            continue;
                        }
                        Err(MessageError::Interrupted) => None,
                        Err(MessageError::InterruptedWith(failure)) => Some(failure),
                        Err(err @ MessageError::Failed(_)) => {
                            yield Err(err);
                            break;
                        }
                    };
                    log_exception(&request_id, failure.as_ref());
                    if let Some(tx) = tx.take() {
                        // Receiver gone means the response stream was dropped.
                        if tx.send(failure_message(failure.as_ref(), &request_accept)).is_err() {
                            debug!(request_id = %request_id, "Response stream closed before failure message");
                        }
                    }
                    break;
                }
            }) as MessageStream
        });

        ctx.response_mut().on_messages(move |upstream: MessageStream| {
            Box::pin(stream! {
                let mut upstream = upstream;
                let mut rx = rx;
                let mut rx_open = true;
                loop {
                    let step = tokio::select! {
                        biased;
                        spliced = &mut rx, if rx_open => Step::Spliced(spliced.ok()),
                        item = upstream.next() => Step::Upstream(item),
                    };
                    match step {
                        Step::Spliced(Some(message)) => {
                            yield Ok(message);
                            break;
                        }
                        Step::Spliced(None) => rx_open = false,
                        Step::Upstream(Some(Ok(message))) => yield Ok(message),
                        Step::Upstream(Some(Err(MessageError::Interrupted))) => {
                            yield Ok(failure_message(None, &response_accept));
                            break;
                        }
                        Step::Upstream(Some(Err(MessageError::InterruptedWith(failure)))) => {
                            yield Ok(failure_message(Some(&failure), &response_accept));
                            break;
                        }
                        Step::Upstream(Some(Err(err))) => {
                            yield Err(err);
                            break;
                        }
                        Step::Upstream(None) => {
                            if rx_open {
                                if let Ok(message) = rx.try_recv() {
                                    yield Ok(message);
                                }
                            }
                            break;
                        }
                    }
                }
            }) as MessageStream
        });
        Ok(())
    }
}
