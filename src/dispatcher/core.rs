use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DispatchError, DispatchOutcome};
use crate::config::GatewayConfiguration;
use crate::context::{ExecutionContext, ExecutionError, Metrics, Request, Response};
use crate::failure::{reason_phrase, render_failure, ExecutionFailure};
use crate::headers::HttpHeaders;
use crate::ids::generate_id;
use crate::processor::{NotFoundProcessorChainFactory, ProcessorChain};
use crate::reactor::{AcceptorTable, LegacyCompletion, LegacyReactor, ReactiveReactor, ReactorHandler};
use crate::transport::{
    now_millis, FlowControl, ServerRequest, ServerResponse, TimeoutGate, TransportResponse,
};

pub const REQUEST_TIMEOUT_KEY: &str = "REQUEST_TIMEOUT";
pub const REQUEST_TIMEOUT_MESSAGE: &str = "Request timeout";

type Execution<'a> = BoxFuture<'a, Result<DispatchOutcome, DispatchError>>;

/// First event of a dispatch race.
enum Race {
    Done(Result<DispatchOutcome, DispatchError>),
    TimedOut,
    ClientClosed,
}

/// Entry point of the gateway core for every decoded HTTP request.
///
/// The dispatcher resolves the acceptor, builds the [`ExecutionContext`],
/// drives the reactor under the configured request timeout and guarantees
/// that the transport response is ended exactly once.
pub struct HttpRequestDispatcher {
    acceptors: Arc<AcceptorTable>,
    not_found_chain: ProcessorChain,
    request_timeout: Duration,
    grace_delay: Duration,
    transaction_header: String,
    request_header: String,
    tenant: Option<String>,
    zone: Option<String>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn expire(budget: Option<Duration>) {
    match budget {
        Some(budget) => tokio::time::sleep(budget).await,
        None => std::future::pending().await,
    }
}

impl HttpRequestDispatcher {
    /// Build a dispatcher reading timeouts, header names and node identity
    /// from `config` once.
    #[must_use]
    pub fn new(config: &GatewayConfiguration, acceptors: Arc<AcceptorTable>) -> Self {
        Self {
            acceptors,
            not_found_chain: NotFoundProcessorChainFactory::new(config).processor_chain(),
            request_timeout: Duration::from_millis(config.request_timeout_ms()),
            grace_delay: Duration::from_millis(config.request_timeout_grace_delay_ms()),
            transaction_header: config.transaction_header(),
            request_header: config.request_header(),
            tenant: config.tenant(),
            zone: config.zone(),
        }
    }

    /// Replace the not-found chain, e.g. to plug a custom reporter.
    #[must_use]
    pub fn with_not_found_chain(mut self, chain: ProcessorChain) -> Self {
        self.not_found_chain = chain;
        self
    }

    #[must_use]
    pub fn acceptors(&self) -> &Arc<AcceptorTable> {
        &self.acceptors
    }

    /// Configured request timeout, `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (!self.request_timeout.is_zero()).then_some(self.request_timeout)
    }

    /// Dispatch one request and write its response to `response`.
    ///
    /// Resolution misses and timeouts are successful dispatches; reactor
    /// failures come back as `Err` after the response has been ended.
    pub async fn dispatch(
        &self,
        mut request: ServerRequest,
        response: Box<dyn ServerResponse>,
    ) -> Result<DispatchOutcome, DispatchError> {
        request.pause();

        let transaction_id = request
            .headers()
            .get(&self.transaction_header)
            .filter(|v| !v.is_empty())
            .map_or_else(generate_id, str::to_string);
        let request_id = generate_id();
        request
            .headers_mut()
            .set(&self.transaction_header, transaction_id.clone())
            .set(&self.request_header, request_id.clone());

        let close = request.close_token();
        let flow = request.flow_control();
        let arrival = request.timestamp();
        let accept: Vec<String> = request
            .headers()
            .get_all("accept")
            .into_iter()
            .map(str::to_string)
            .collect();

        let raw = TransportResponse::new(response);
        let (handler_view, gate) = raw.timeout_aware();

        let acceptor = self.acceptors.resolve(request.host(), request.path());
        let mut ctx = ExecutionContext::new(
            Request::from_server_request(&mut request, request_id.clone(), transaction_id),
            Response::new(handler_view),
        );
        self.populate_metrics(&mut ctx);

        let execution: Execution<'_> = match acceptor {
            None => {
                debug!(
                    request_id = %request_id,
                    host = ?request.host(),
                    path = %request.path(),
                    "No acceptor matches the request"
                );
                self.handle_not_found(ctx).boxed()
            }
            Some(acceptor) => {
                ctx.request_mut().set_context_path(acceptor.path());
                debug!(
                    request_id = %request_id,
                    context_path = %acceptor.path(),
                    mode = ?acceptor.execution_mode(),
                    "Acceptor resolved"
                );
                match acceptor.handler() {
                    ReactorHandler::Reactive(reactor) => {
                        handle_reactive(Arc::clone(reactor), ctx, flow).boxed()
                    }
                    ReactorHandler::Legacy(reactor) => {
                        handle_legacy(Arc::clone(reactor), ctx, flow).boxed()
                    }
                }
            }
        };

        self.drive(execution, &raw, &gate, &close, &accept, arrival, &request_id)
            .await
    }

    fn populate_metrics(&self, ctx: &mut ExecutionContext) {
        let request = ctx.request();
        let metrics = Metrics {
            timestamp: request.timestamp(),
            request_id: request.id().to_string(),
            transaction_id: request.transaction_id().to_string(),
            tenant: self.tenant.clone(),
            zone: self.zone.clone(),
            http_method: request.method().to_string(),
            uri: request.uri().to_string(),
            host: request.host().map(str::to_string),
            remote_address: request.remote_address().map(str::to_string),
            user_agent: request.headers().get("user-agent").map(str::to_string),
            ..Metrics::default()
        };
        *ctx.metrics_mut() = metrics;
    }

    /// Time left before the timeout fires, never less than the grace delay.
    fn timeout_budget(&self, arrival: u64) -> Option<Duration> {
        let timeout = self.request_timeout()?;
        let elapsed = Duration::from_millis(now_millis().saturating_sub(arrival));
        Some(timeout.saturating_sub(elapsed).max(self.grace_delay))
    }

    async fn handle_not_found(
        &self,
        mut ctx: ExecutionContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        match self.not_found_chain.execute(&mut ctx).await {
            Ok(()) | Err(ExecutionError::Interrupted | ExecutionError::InterruptedWith(_)) => {}
            Err(ExecutionError::Failed(err)) => return Err(DispatchError::NotFoundChain(err)),
        }
        ctx.response_mut().end().await?;
        Ok(DispatchOutcome::NotFound)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        mut execution: Execution<'_>,
        raw: &TransportResponse,
        gate: &TimeoutGate,
        close: &CancellationToken,
        accept: &[String],
        arrival: u64,
        request_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let race = tokio::select! {
            biased;
            () = close.cancelled() => Race::ClientClosed,
            result = &mut execution => Race::Done(result),
            () = expire(self.timeout_budget(arrival)) => Race::TimedOut,
        };

        match race {
            Race::Done(result) => complete(result, raw, request_id).await,
            Race::ClientClosed => {
                gate.close();
                drop(execution);
                if let Err(err) = raw.end().await {
                    debug!(request_id = %request_id, error = %err, "Ending response of closed connection failed");
                }
                info!(request_id = %request_id, "Client closed connection before response completed");
                Ok(DispatchOutcome::ClientClosed)
            }
            Race::TimedOut if raw.is_committed() => {
                // already streaming: late writes are tolerated for the grace delay
                tokio::select! {
                    biased;
                    result = &mut execution => return complete(result, raw, request_id).await,
                    () = tokio::time::sleep(self.grace_delay) => {}
                }
                gate.close();
                drop(execution);
                warn!(request_id = %request_id, "Request timed out after response was committed, closing");
                if let Err(err) = raw.end().await {
                    warn!(request_id = %request_id, error = %err, "Force-ending timed out response failed");
                }
                Ok(DispatchOutcome::TimedOut)
            }
            Race::TimedOut => {
                gate.close();
                drop(execution);
                warn!(request_id = %request_id, "Request timed out");
                write_timeout_response(raw, accept).await?;
                Ok(DispatchOutcome::TimedOut)
            }
        }
    }
}

impl std::fmt::Debug for HttpRequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequestDispatcher")
            .field("acceptors", &self.acceptors)
            .field("not_found_chain", &self.not_found_chain.id())
            .field("request_timeout", &self.request_timeout)
            .field("grace_delay", &self.grace_delay)
            .finish_non_exhaustive()
    }
}

async fn handle_reactive(
    reactor: Arc<dyn ReactiveReactor>,
    mut ctx: ExecutionContext,
    flow: FlowControl,
) -> Result<DispatchOutcome, DispatchError> {
    flow.resume();
    reactor.handle(&mut ctx).await.map_err(DispatchError::Reactor)?;
    if !ctx.response().is_ended() {
        ctx.response_mut().end().await?;
    }
    Ok(DispatchOutcome::Completed)
}

async fn handle_legacy(
    reactor: Arc<dyn LegacyReactor>,
    ctx: ExecutionContext,
    flow: FlowControl,
) -> Result<DispatchOutcome, DispatchError> {
    let (tx, rx) = oneshot::channel::<ExecutionContext>();
    let on_complete: LegacyCompletion = Box::new(move |ctx| {
        if tx.send(ctx).is_err() {
            debug!("Legacy reactor completed after the dispatch ended");
        }
    });

    flow.resume();
    match catch_unwind(AssertUnwindSafe(|| reactor.handle(ctx, on_complete))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(DispatchError::Reactor(err)),
        Err(payload) => return Err(DispatchError::LegacyPanic(panic_message(payload.as_ref()))),
    }

    let mut ctx = rx.await.map_err(|_| DispatchError::LegacyCompletionDropped)?;
    if !ctx.response().is_ended() {
        debug!(request_id = %ctx.request().id(), "Ending response left open by legacy reactor");
        ctx.response_mut().end().await?;
    }
    Ok(DispatchOutcome::Completed)
}

/// Settle a finished execution: make sure the response is ended and surface failures.
async fn complete(
    result: Result<DispatchOutcome, DispatchError>,
    raw: &TransportResponse,
    request_id: &str,
) -> Result<DispatchOutcome, DispatchError> {
    match result {
        Ok(outcome) => {
            if raw.end().await? {
                debug!(request_id = %request_id, "Response ended by dispatcher");
            }
            debug!(request_id = %request_id, outcome = ?outcome, "Request dispatched");
            Ok(outcome)
        }
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Request dispatch failed");
            end_after_failure(raw, request_id).await;
            Err(err)
        }
    }
}

/// End the response of a failed dispatch, sending a bare 500 head if
/// nothing was written yet.
async fn end_after_failure(raw: &TransportResponse, request_id: &str) {
    if !raw.is_committed() {
        let mut headers = HttpHeaders::new();
        headers.set("content-length", "0");
        if let Err(err) = raw.write_head(500, Some(reason_phrase(500)), &headers).await {
            warn!(request_id = %request_id, error = %err, "Writing failure head failed");
        }
    }
    if let Err(err) = raw.end().await {
        warn!(request_id = %request_id, error = %err, "Ending failed response failed");
    }
}

async fn write_timeout_response(
    raw: &TransportResponse,
    accept: &[String],
) -> Result<(), DispatchError> {
    let failure = ExecutionFailure::new(504)
        .with_key(REQUEST_TIMEOUT_KEY)
        .with_message(REQUEST_TIMEOUT_MESSAGE);
    let accept: Vec<&str> = accept.iter().map(String::as_str).collect();
    let rendered = render_failure(Some(&failure), &accept);

    let mut headers = HttpHeaders::new();
    headers
        .set("content-type", rendered.content_type)
        .set("content-length", rendered.body.len().to_string());
    // a head the handler won the race for already went out; only end
    if raw
        .write_head(rendered.status, Some(&rendered.reason), &headers)
        .await?
    {
        raw.write(rendered.body).await?;
    }
    raw.end().await?;
    Ok(())
}
