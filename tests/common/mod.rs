//! Shared fixtures for the integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use gateway_dispatch::context::{ExecutionContext, ExecutionResult, Request, Response};
use gateway_dispatch::definition::Api;
use gateway_dispatch::message::{Message, MessageError, MessageStream};
use gateway_dispatch::processor::Processor;
use gateway_dispatch::reactor::{
    LegacyCompletion, LegacyReactor, MessageSource, ReactiveReactor, ReactorHandler,
};
use gateway_dispatch::transport::{RecordingResponse, ServerRequest, TransportResponse};
use http::Method;
use parking_lot::Mutex;

pub const HOST: &str = "api.example.com";

/// Message API on `/teams` served by the HTTP GET entrypoint.
pub fn message_api(entrypoint_configuration: &str) -> Api {
    let raw = format!(
        r#"
id: teams
name: Teams
type: message
listeners:
  - type: http
    paths:
      - path: /teams
    entrypoints:
      - type: http-get
        configuration: {entrypoint_configuration}
"#
    );
    Api::from_yaml_str(&raw).unwrap()
}

pub fn get(uri: &str) -> ServerRequest {
    ServerRequest::new(Method::GET, uri).with_host(HOST)
}

/// A context over `request` whose response is recorded.
pub fn context(mut request: ServerRequest) -> (ExecutionContext, RecordingResponse) {
    let recorder = RecordingResponse::new();
    let ctx = ExecutionContext::new(
        Request::from_server_request(&mut request, "req-1".into(), "tx-1".into()),
        Response::new(TransportResponse::new(recorder.boxed())),
    );
    (ctx, recorder)
}

pub fn messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| Message::with_id(format!("m-{i}"), format!("payload-{i}")))
        .collect()
}

pub fn message_stream(items: Vec<Result<Message, MessageError>>) -> MessageStream {
    stream::iter(items).boxed()
}

/// Message source replaying a fixed script, ignoring the cursor.
pub struct ScriptedSource {
    script: Mutex<Option<Vec<Result<Message, MessageError>>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Message, MessageError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Some(script)),
        })
    }
}

impl MessageSource for ScriptedSource {
    fn subscribe(&self, _resume_after: Option<&str>) -> MessageStream {
        message_stream(self.script.lock().take().unwrap_or_default())
    }
}

/// Sets a flag when dropped; held across awaits to observe cancellation.
pub struct DropSignal(pub Arc<AtomicBool>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Reactive reactor answering with a fixed status and body after `delay`.
pub struct StaticReactor {
    pub status: u16,
    pub body: &'static str,
    pub delay: Duration,
    pub dropped: Arc<AtomicBool>,
}

impl StaticReactor {
    pub fn ok(body: &'static str) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn slow(body: &'static str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok(body)
        }
    }

    pub fn handler(self) -> ReactorHandler {
        ReactorHandler::Reactive(Arc::new(self))
    }
}

#[async_trait]
impl ReactiveReactor for StaticReactor {
    async fn handle(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        let _signal = DropSignal(Arc::clone(&self.dropped));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = ctx.response_mut();
        response.set_status(self.status);
        response.set_body(self.body);
        response.end().await?;
        Ok(())
    }
}

/// Reactive reactor that fails without touching the response.
pub struct FailingReactor(pub &'static str);

#[async_trait]
impl ReactiveReactor for FailingReactor {
    async fn handle(&self, _ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        Err(anyhow::anyhow!(self.0))
    }
}

/// Reactive reactor that sends a head and a first chunk, then stalls.
pub struct StreamingReactor {
    pub stall: Duration,
}

#[async_trait]
impl ReactiveReactor for StreamingReactor {
    async fn handle(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        let transport = ctx.response().transport().clone();
        transport
            .write_head(200, None, &gateway_dispatch::headers::HttpHeaders::new())
            .await?;
        transport.write(Bytes::from_static(b"first")).await?;
        tokio::time::sleep(self.stall).await;
        transport.write(Bytes::from_static(b"late")).await?;
        transport.end().await?;
        Ok(())
    }
}

/// How a [`ScriptedLegacyReactor`] behaves.
pub enum LegacyScript {
    /// Stage a response and complete inline.
    Complete(u16, &'static str),
    /// Complete from another task after a delay.
    CompleteLater(Duration),
    Fail(&'static str),
    Panic(&'static str),
    /// Drop the completion handler without calling it.
    Abandon,
}

pub struct ScriptedLegacyReactor(pub LegacyScript);

impl ScriptedLegacyReactor {
    pub fn handler(self) -> ReactorHandler {
        ReactorHandler::Legacy(Arc::new(self))
    }
}

impl LegacyReactor for ScriptedLegacyReactor {
    fn handle(&self, mut ctx: ExecutionContext, on_complete: LegacyCompletion) -> anyhow::Result<()> {
        match &self.0 {
            LegacyScript::Complete(status, body) => {
                ctx.response_mut().set_status(*status);
                ctx.response_mut().set_body(*body);
                on_complete(ctx);
                Ok(())
            }
            LegacyScript::CompleteLater(delay) => {
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    ctx.response_mut().set_status(201);
                    on_complete(ctx);
                });
                Ok(())
            }
            LegacyScript::Fail(message) => Err(anyhow::anyhow!(*message)),
            LegacyScript::Panic(message) => panic!("{}", message),
            LegacyScript::Abandon => Ok(()),
        }
    }
}

/// Processor appending its name to a shared journal.
pub struct JournalProcessor {
    pub name: &'static str,
    pub journal: Arc<Mutex<Vec<&'static str>>>,
    pub outcome: Outcome,
}

#[derive(Clone, Copy)]
pub enum Outcome {
    Continue,
    Interrupt,
    InterruptWith(u16),
    Fail,
}

impl JournalProcessor {
    pub fn new(name: &'static str, journal: &Arc<Mutex<Vec<&'static str>>>, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: Arc::clone(journal),
            outcome,
        })
    }
}

#[async_trait]
impl Processor for JournalProcessor {
    fn id(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        self.journal.lock().push(self.name);
        match self.outcome {
            Outcome::Continue => Ok(()),
            Outcome::Interrupt => Err(ctx.interrupt()),
            Outcome::InterruptWith(status) => Err(ctx.interrupt_with(
                gateway_dispatch::failure::ExecutionFailure::new(status).with_message("stopped"),
            )),
            Outcome::Fail => Err(anyhow::anyhow!("processor {} failed", self.name).into()),
        }
    }
}
