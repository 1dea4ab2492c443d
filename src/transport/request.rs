use futures::task::AtomicWaker;
use futures::{Stream, StreamExt};
use http::Method;
use smallvec::SmallVec;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

use super::BodyStream;
use crate::headers::HttpHeaders;

/// Maximum inline parameters before heap allocation
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage (query and path parameters).
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Parse query string parameters from a URI.
///
/// Extracts everything after the `?` character and URL-decodes parameter
/// names and values. Repeated names are kept in order.
#[must_use]
pub fn parse_query_params(uri: &str) -> ParamVec {
    match uri.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect(),
        None => ParamVec::new(),
    }
}

/// Shared pause/resume switch for a request body.
#[derive(Clone, Default)]
pub struct FlowControl {
    state: Arc<FlowState>,
}

#[derive(Default)]
struct FlowState {
    paused: AtomicBool,
    waker: AtomicWaker,
}

impl FlowControl {
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
        self.state.waker.wake();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }
}

/// Body stream that yields nothing while its [`FlowControl`] is paused.
pub struct PausableBody {
    inner: BodyStream,
    flow: FlowControl,
}

impl PausableBody {
    #[must_use]
    pub fn new(inner: BodyStream, flow: FlowControl) -> Self {
        Self { inner, flow }
    }
}

impl Stream for PausableBody {
    type Item = Result<bytes::Bytes, anyhow::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.flow.is_paused() {
            self.flow.state.waker.register(cx.waker());
            // resume() may have raced the registration
            if self.flow.is_paused() {
                return Poll::Pending;
            }
        }
        self.inner.poll_next_unpin(cx)
    }
}

/// An already-decoded inbound request.
pub struct ServerRequest {
    method: Method,
    uri: String,
    host: Option<String>,
    headers: HttpHeaders,
    remote_address: Option<String>,
    timestamp: u64,
    body: Option<BodyStream>,
    flow: FlowControl,
    closed: CancellationToken,
}

impl ServerRequest {
    /// A request received now, without body.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            host: None,
            headers: HttpHeaders::new(),
            remote_address: None,
            timestamp: now_millis(),
            body: None,
            flow: FlowControl::default(),
            closed: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    #[must_use]
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    /// Override the arrival timestamp (milliseconds since the epoch).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: BodyStream) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// URI path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(p, _)| p)
    }

    /// Host from the request line or the `Host` header, port removed.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host
            .as_deref()
            .or_else(|| self.headers.get("host"))
            .map(strip_port)
    }

    #[must_use]
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    #[must_use]
    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn pause(&self) {
        self.flow.pause();
    }

    pub fn resume(&self) {
        self.flow.resume();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.flow.is_paused()
    }

    /// Handle on the pause/resume switch of the body.
    #[must_use]
    pub fn flow_control(&self) -> FlowControl {
        self.flow.clone()
    }

    /// Token cancelled by the transport when the client disconnects.
    #[must_use]
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Take the body, wrapped so that it honors pause/resume.
    pub fn take_body(&mut self) -> Option<BodyStream> {
        let flow = self.flow.clone();
        self.body
            .take()
            .map(|body| PausableBody::new(body, flow).boxed())
    }
}

impl std::fmt::Debug for ServerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("host", &self.host)
            .field("headers", &self.headers)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

fn strip_port(host: &str) -> &str {
    // bracketed IPv6 literals keep their colons
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
