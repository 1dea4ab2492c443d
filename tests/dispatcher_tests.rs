#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for the HTTP request dispatcher
//!
//! # Test Coverage
//!
//! Validates the dispatcher's core responsibilities:
//! - Acceptor resolution and the not-found chain on a miss
//! - Transaction and request id assignment
//! - Reactive and legacy execution modes
//! - Failure propagation (reactor errors, legacy panics, dropped callbacks)
//! - Request timeout, grace delay and the 504 rendering
//! - Client disconnection cancelling the execution
//!
//! # Test Strategy
//!
//! Every test dispatches through a [`RecordingResponse`] and asserts on what
//! the transport saw. Timing tests run on a paused tokio clock so timeouts
//! fire deterministically.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use common::{
    get, FailingReactor, LegacyScript, ScriptedLegacyReactor, StaticReactor, StreamingReactor,
};
use gateway_dispatch::config::{GatewayConfiguration, KEY_REQUEST_TIMEOUT, KEY_REQUEST_TIMEOUT_GRACE_DELAY, KEY_TENANT};
use gateway_dispatch::context::{ExecutionContext, Metrics};
use gateway_dispatch::dispatcher::{
    DispatchError, DispatchOutcome, HttpRequestDispatcher, REQUEST_TIMEOUT_KEY,
    REQUEST_TIMEOUT_MESSAGE,
};
use gateway_dispatch::processor::notfound::NOT_FOUND_MESSAGE;
use gateway_dispatch::reactor::{Acceptor, AcceptorTable, ReactiveReactor, ReactorHandler};
use gateway_dispatch::transport::RecordingResponse;
use parking_lot::Mutex;

fn dispatcher(config: &GatewayConfiguration, handler: ReactorHandler) -> HttpRequestDispatcher {
    let table = AcceptorTable::new(vec![Acceptor::new(None, "/teams", handler)]);
    HttpRequestDispatcher::new(config, Arc::new(table))
}

fn timeout_config(timeout_ms: u64, grace_ms: u64) -> GatewayConfiguration {
    GatewayConfiguration::new()
        .with_property(KEY_REQUEST_TIMEOUT, timeout_ms.to_string())
        .with_property(KEY_REQUEST_TIMEOUT_GRACE_DELAY, grace_ms.to_string())
}

/// What a [`CapturingReactor`] observed of its context.
#[derive(Debug, Clone, Default)]
struct Seen {
    transaction_id: String,
    request_id: String,
    context_path: String,
    path_info: String,
    metrics: Metrics,
}

#[derive(Default)]
struct CapturingReactor {
    seen: Mutex<Option<Seen>>,
}

#[async_trait]
impl ReactiveReactor for CapturingReactor {
    async fn handle(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        let request = ctx.request();
        *self.seen.lock() = Some(Seen {
            transaction_id: request.transaction_id().to_string(),
            request_id: request.id().to_string(),
            context_path: request.context_path().to_string(),
            path_info: request.path_info().to_string(),
            metrics: ctx.metrics().clone(),
        });
        ctx.response_mut().set_status(204);
        Ok(())
    }
}

#[tokio::test]
async fn test_unmatched_request_runs_not_found_chain() {
    let dispatcher = HttpRequestDispatcher::new(
        &GatewayConfiguration::new(),
        Arc::new(AcceptorTable::default()),
    );
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/nowhere"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::NotFound);
    let recorded = recorder.snapshot();
    assert_eq!(recorded.status, Some(404));
    assert_eq!(recorded.body_string(), NOT_FOUND_MESSAGE);
    assert_eq!(recorded.headers.get("content-type"), Some("text/plain"));
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test]
async fn test_reactive_reactor_response_is_written_once() {
    let dispatcher = dispatcher(&GatewayConfiguration::new(), StaticReactor::ok("hello").handler());
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed);
    let recorded = recorder.snapshot();
    assert_eq!(recorded.status, Some(200));
    assert_eq!(recorded.body_string(), "hello");
    assert_eq!(recorded.head_count, 1);
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test]
async fn test_ids_and_metrics_are_assigned_before_the_reactor_runs() {
    let reactor = Arc::new(CapturingReactor::default());
    let config = GatewayConfiguration::new().with_property(KEY_TENANT, "europe");
    let dispatcher = dispatcher(&config, ReactorHandler::Reactive(Arc::clone(&reactor) as Arc<dyn ReactiveReactor>));
    let request = get("/teams/42?expand=true")
        .with_header("X-Gravitee-Transaction-Id", "tx-from-client")
        .with_header("User-Agent", "curl/8.5")
        .with_remote_address("10.0.0.7");
    let recorder = RecordingResponse::new();

    dispatcher.dispatch(request, recorder.boxed()).await.unwrap();

    let seen = reactor.seen.lock().clone().unwrap();
    assert_eq!(seen.transaction_id, "tx-from-client");
    assert!(!seen.request_id.is_empty());
    assert_ne!(seen.request_id, seen.transaction_id);
    assert_eq!(seen.context_path, "/teams/");
    assert_eq!(seen.path_info, "/42");
    assert_eq!(seen.metrics.transaction_id, "tx-from-client");
    assert_eq!(seen.metrics.request_id, seen.request_id);
    assert_eq!(seen.metrics.tenant.as_deref(), Some("europe"));
    assert_eq!(seen.metrics.http_method, "GET");
    assert_eq!(seen.metrics.uri, "/teams/42?expand=true");
    assert_eq!(seen.metrics.user_agent.as_deref(), Some("curl/8.5"));
    assert_eq!(seen.metrics.remote_address.as_deref(), Some("10.0.0.7"));
    // the reactor staged a status without ending; the dispatcher ends it
    assert_eq!(recorder.snapshot().status, Some(204));
    assert_eq!(recorder.snapshot().end_count, 1);
}

#[tokio::test]
async fn test_missing_transaction_header_is_generated() {
    let reactor = Arc::new(CapturingReactor::default());
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ReactorHandler::Reactive(Arc::clone(&reactor) as Arc<dyn ReactiveReactor>),
    );

    dispatcher.dispatch(get("/teams"), RecordingResponse::new().boxed()).await.unwrap();

    let seen = reactor.seen.lock().clone().unwrap();
    assert!(!seen.transaction_id.is_empty());
    assert!(!seen.request_id.is_empty());
}

#[tokio::test]
async fn test_reactive_failure_propagates_unchanged() {
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ReactorHandler::Reactive(Arc::new(FailingReactor("backend exploded"))),
    );
    let recorder = RecordingResponse::new();

    let err = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap_err();

    match err {
        DispatchError::Reactor(inner) => assert_eq!(inner.to_string(), "backend exploded"),
        other => panic!("unexpected error: {other:?}"),
    }
    let recorded = recorder.snapshot();
    assert_ne!(recorded.status, Some(404));
    assert_eq!(recorded.status, Some(500));
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test]
async fn test_legacy_reactor_completes_through_callback() {
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ScriptedLegacyReactor(LegacyScript::Complete(202, "accepted")).handler(),
    );
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed);
    let recorded = recorder.snapshot();
    assert_eq!(recorded.status, Some(202));
    assert_eq!(recorded.body_string(), "accepted");
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_legacy_reactor_may_complete_from_another_task() {
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ScriptedLegacyReactor(LegacyScript::CompleteLater(Duration::from_millis(50))).handler(),
    );
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(recorder.snapshot().status, Some(201));
}

#[tokio::test]
async fn test_legacy_synchronous_error_is_a_dispatch_failure() {
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ScriptedLegacyReactor(LegacyScript::Fail("engine refused")).handler(),
    );
    let recorder = RecordingResponse::new();

    let err = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap_err();

    assert!(matches!(&err, DispatchError::Reactor(inner) if inner.to_string() == "engine refused"));
    assert_eq!(recorder.snapshot().status, Some(500));
    assert_eq!(recorder.snapshot().end_count, 1);
}

#[tokio::test]
async fn test_legacy_panic_is_captured() {
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ScriptedLegacyReactor(LegacyScript::Panic("engine crashed")).handler(),
    );
    let recorder = RecordingResponse::new();

    let err = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap_err();

    assert!(matches!(&err, DispatchError::LegacyPanic(message) if message == "engine crashed"));
    assert_eq!(recorder.snapshot().status, Some(500));
    assert_eq!(recorder.snapshot().end_count, 1);
}

#[tokio::test]
async fn test_dropped_legacy_callback_is_reported() {
    let dispatcher = dispatcher(
        &GatewayConfiguration::new(),
        ScriptedLegacyReactor(LegacyScript::Abandon).handler(),
    );
    let recorder = RecordingResponse::new();

    let err = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap_err();

    assert!(matches!(err, DispatchError::LegacyCompletionDropped));
    assert_eq!(recorder.snapshot().end_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_before_commit_renders_504_text() {
    let reactor = StaticReactor::slow("too late", Duration::from_secs(5));
    let dropped = Arc::clone(&reactor.dropped);
    let dispatcher = dispatcher(&timeout_config(1_000, 30), reactor.handler());
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::TimedOut);
    assert!(dropped.load(Ordering::SeqCst), "handler future must be dropped");
    let recorded = recorder.snapshot();
    assert_eq!(recorded.status, Some(504));
    assert_eq!(recorded.headers.get("content-type"), Some("text/plain"));
    assert_eq!(recorded.body_string(), REQUEST_TIMEOUT_MESSAGE);
    assert_eq!(recorded.head_count, 1);
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_renders_json_when_accepted() {
    let dispatcher = dispatcher(
        &timeout_config(1_000, 30),
        StaticReactor::slow("too late", Duration::from_secs(5)).handler(),
    );
    let recorder = RecordingResponse::new();
    let request = get("/teams").with_header("Accept", "application/json");

    dispatcher.dispatch(request, recorder.boxed()).await.unwrap();

    let recorded = recorder.snapshot();
    assert_eq!(recorded.status, Some(504));
    assert_eq!(recorded.headers.get("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&recorded.body).unwrap();
    assert_eq!(body["message"], REQUEST_TIMEOUT_MESSAGE);
    assert_eq!(body["http_status_code"], 504);
    assert_eq!(body["key"], REQUEST_TIMEOUT_KEY);
}

#[tokio::test(start_paused = true)]
async fn test_late_writes_after_timeout_are_dropped() {
    let dispatcher = dispatcher(
        &timeout_config(1_000, 30),
        StaticReactor::slow("too late", Duration::from_secs(5)).handler(),
    );
    let recorder = RecordingResponse::new();

    dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let recorded = recorder.snapshot();
    assert!(!recorded.body_string().contains("too late"));
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_committed_response_is_force_ended_after_grace() {
    let dispatcher = dispatcher(
        &timeout_config(1_000, 200),
        ReactorHandler::Reactive(Arc::new(StreamingReactor {
            stall: Duration::from_secs(10),
        })),
    );
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::TimedOut);
    let recorded = recorder.snapshot();
    assert_eq!(recorded.status, Some(200));
    assert_eq!(recorded.body_string(), "first");
    assert_eq!(recorded.head_count, 1);
    assert_eq!(recorded.end_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_committed_response_finishing_within_grace_completes() {
    let dispatcher = dispatcher(
        &timeout_config(1_000, 500),
        ReactorHandler::Reactive(Arc::new(StreamingReactor {
            stall: Duration::from_millis(1_200),
        })),
    );
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(recorder.snapshot().body_string(), "firstlate");
    assert_eq!(recorder.snapshot().end_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_disables_the_timer() {
    let dispatcher = dispatcher(
        &timeout_config(0, 30),
        StaticReactor::slow("eventually", Duration::from_secs(120)).handler(),
    );
    assert_eq!(dispatcher.request_timeout(), None);
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(get("/teams"), recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(recorder.snapshot().body_string(), "eventually");
}

#[tokio::test(start_paused = true)]
async fn test_client_close_cancels_execution() {
    let reactor = StaticReactor::slow("unseen", Duration::from_secs(5));
    let dropped = Arc::clone(&reactor.dropped);
    let dispatcher = dispatcher(&GatewayConfiguration::new(), reactor.handler());
    let request = get("/teams");
    let close = request.close_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        close.cancel();
    });
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(request, recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::ClientClosed);
    assert!(dropped.load(Ordering::SeqCst));
    let recorded = recorder.snapshot();
    assert!(!recorded.body_string().contains("unseen"));
    assert_eq!(recorded.end_count, 1);
}

/// Echoes the request body back.
struct BodyEchoReactor;

#[async_trait]
impl ReactiveReactor for BodyEchoReactor {
    async fn handle(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        let mut echoed = Vec::new();
        if let Some(mut body) = ctx.request_mut().take_body() {
            while let Some(chunk) = body.next().await {
                echoed.extend_from_slice(&chunk?);
            }
        }
        ctx.response_mut().set_body(echoed);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_request_body_is_resumed_for_the_reactor() {
    let dispatcher = dispatcher(
        &timeout_config(5_000, 30),
        ReactorHandler::Reactive(Arc::new(BodyEchoReactor)),
    );
    let body: gateway_dispatch::transport::BodyStream = futures::stream::iter(vec![
        Ok(bytes::Bytes::from_static(b"team=")),
        Ok(bytes::Bytes::from_static(b"blue")),
    ])
    .boxed();
    let request = gateway_dispatch::transport::ServerRequest::new(http::Method::POST, "/teams")
        .with_host(common::HOST)
        .with_body(body);
    let recorder = RecordingResponse::new();

    let outcome = dispatcher.dispatch(request, recorder.boxed()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(recorder.snapshot().body_string(), "team=blue");
}
