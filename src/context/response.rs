use bytes::Bytes;
use futures::StreamExt;
use tracing::debug;

use crate::failure::reason_phrase;
use crate::headers::HttpHeaders;
use crate::message::{MessageFlow, MessageStream};
use crate::transport::{BodyStream, TransportError, TransportResponse};

/// Body staged on the response until it is ended.
#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Buffer(Bytes),
    /// Pulled one chunk at a time; the next chunk is requested only after
    /// the previous one was written.
    Chunks(BodyStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            ResponseBody::Chunks(_) => f.write_str("Chunks"),
        }
    }
}

/// Response side of an [`ExecutionContext`](super::ExecutionContext).
#[derive(Debug)]
pub struct Response {
    status: u16,
    reason: Option<String>,
    headers: HttpHeaders,
    body: ResponseBody,
    messages: MessageFlow,
    transport: TransportResponse,
}

impl Response {
    #[must_use]
    pub fn new(transport: TransportResponse) -> Self {
        Self {
            status: 200,
            reason: None,
            headers: HttpHeaders::new(),
            body: ResponseBody::Empty,
            messages: MessageFlow::new(),
            transport,
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    #[must_use]
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// Stage a complete body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = ResponseBody::Buffer(body.into());
    }

    /// Stage a chunked body.
    pub fn set_chunks(&mut self, chunks: BodyStream) {
        self.body = ResponseBody::Chunks(chunks);
    }

    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// The staged body when it is a complete buffer.
    #[must_use]
    pub fn buffered_body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffer(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn messages_flow(&self) -> &MessageFlow {
        &self.messages
    }

    pub fn set_messages(&mut self, stream: MessageStream) {
        self.messages.set(stream);
    }

    pub fn on_messages<F>(&mut self, transformer: F)
    where
        F: FnOnce(MessageStream) -> MessageStream + Send + 'static,
    {
        self.messages.on_messages(transformer);
    }

    /// Take the composed response message stream.
    pub fn messages(&mut self) -> MessageStream {
        self.messages.take()
    }

    #[must_use]
    pub fn transport(&self) -> &TransportResponse {
        &self.transport
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.transport.is_ended()
    }

    /// Write head and staged body to the transport, then end it.
    ///
    /// A response already ended elsewhere is left untouched.
    pub async fn end(&mut self) -> Result<(), TransportError> {
        if self.transport.is_ended() {
            debug!(status = self.status, "Response already ended, skipping");
            return Ok(());
        }

        let body = std::mem::take(&mut self.body);
        match &body {
            ResponseBody::Buffer(b) => {
                if !self.headers.contains("content-length") {
                    self.headers.set("content-length", b.len().to_string());
                }
            }
            ResponseBody::Empty => {
                if !self.headers.contains("content-length") && !self.headers.contains("transfer-encoding") {
                    self.headers.set("content-length", "0");
                }
            }
            ResponseBody::Chunks(_) => {}
        }

        let reason = self
            .reason
            .clone()
            .unwrap_or_else(|| reason_phrase(self.status).to_string());
        self.transport
            .write_head(self.status, Some(&reason), &self.headers)
            .await?;

        match body {
            ResponseBody::Buffer(b) if !b.is_empty() => self.transport.write(b).await?,
            ResponseBody::Chunks(mut chunks) => {
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk.map_err(TransportError::Body)?;
                    self.transport.write(chunk).await?;
                }
            }
            _ => {}
        }

        self.transport.end().await?;
        Ok(())
    }
}
