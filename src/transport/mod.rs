//! # Transport Module
//!
//! The boundary between the wire-level HTTP server and the gateway core. The
//! core never parses the protocol: it consumes an already-decoded
//! [`ServerRequest`] and produces the response through the [`ServerResponse`]
//! write/end contract.
//!
//! ## Response termination
//!
//! The sink is wrapped in a [`TransportResponse`] handle shared between the
//! dispatcher and the execution path. The handle guarantees:
//!
//! - the head (status, reason, headers) is written at most once
//! - `end()` reaches the sink exactly once, however many callers invoke it
//! - a handle obtained through [`TransportResponse::timeout_aware`] turns
//!   into a no-op sink once its [`TimeoutGate`] is closed, so late writes
//!   from a timed-out handler are dropped
//!
//! ## Flow control
//!
//! The request body is a pull-based stream wrapped in [`PausableBody`]; the
//! dispatcher pauses it while it resolves the route and resumes it when the
//! request is handed to a reactor.

mod memory;
mod request;
mod response;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::headers::HttpHeaders;

pub use memory::{Recorded, RecordingResponse};
pub use request::{parse_query_params, FlowControl, ParamVec, PausableBody, ServerRequest, MAX_INLINE_PARAMS};
pub(crate) use request::now_millis;
pub use response::{TimeoutGate, TransportResponse};

/// Boxed stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, anyhow::Error>>;

/// Errors raised by the response sink.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("response already ended")]
    AlreadyEnded,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("response body failed: {0}")]
    Body(#[source] anyhow::Error),
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write side of a transport exchange, implemented by the HTTP server.
#[async_trait]
pub trait ServerResponse: Send {
    /// Send status line and headers. Called at most once.
    fn write_head(
        &mut self,
        status: u16,
        reason: Option<&str>,
        headers: &HttpHeaders,
    ) -> Result<(), TransportError>;

    /// Write one body chunk; completes when the sink can accept the next one.
    async fn write(&mut self, chunk: Bytes) -> Result<(), TransportError>;

    /// Terminate the response. Called at most once.
    async fn end(&mut self) -> Result<(), TransportError>;
}
