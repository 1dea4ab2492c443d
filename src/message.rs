//! Messages and message streams.
//!
//! A [`Message`] is the unit flowing through message-oriented APIs. Streams
//! of messages are pull-based ([`MessageStream`]) and may end early with a
//! [`MessageError`], which is how processors interrupt a stream.
//!
//! [`MessageFlow`] holds the stream of a request or response side together
//! with the transformers registered on it. Transformers compose lazily: a
//! processor can register one before the backend has produced the stream,
//! and they are applied in registration order when the stream is taken.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::failure::ExecutionFailure;
use crate::headers::HttpHeaders;
use crate::ids::generate_id;

/// Boxed, pull-based stream of messages.
pub type MessageStream = BoxStream<'static, Result<Message, MessageError>>;

/// A stream-to-stream transformation registered through `on_messages`.
pub type MessageTransformer = Box<dyn FnOnce(MessageStream) -> MessageStream + Send>;

/// Signal that terminates a message stream.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The stream was interrupted without a structured failure.
    #[error("message stream interrupted")]
    Interrupted,
    /// The stream was interrupted with a failure to render.
    #[error("message stream interrupted with status {}", .0.status_code())]
    InterruptedWith(ExecutionFailure),
    /// Any other error raised by a producer or a transformer.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// A single message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: String,
    content: Bytes,
    headers: HttpHeaders,
    metadata: BTreeMap<String, Value>,
    error: bool,
}

impl Message {
    /// A message with a generated id.
    #[must_use]
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self::with_id(generate_id(), content)
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            headers: HttpHeaders::new(),
            metadata: BTreeMap::new(),
            error: false,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Content decoded as UTF-8, lossily.
    #[must_use]
    pub fn content_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    #[must_use]
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// Stream slot of one side (request or response) of an exchange.
#[derive(Default)]
pub struct MessageFlow {
    source: Option<MessageStream>,
    transformers: Vec<MessageTransformer>,
}

impl MessageFlow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the source stream; registered transformers still apply.
    pub fn set(&mut self, stream: MessageStream) {
        self.source = Some(stream);
    }

    /// Register a transformation applied when the stream is taken.
    pub fn on_messages<F>(&mut self, transformer: F)
    where
        F: FnOnce(MessageStream) -> MessageStream + Send + 'static,
    {
        self.transformers.push(Box::new(transformer));
    }

    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    #[must_use]
    pub fn transformer_count(&self) -> usize {
        self.transformers.len()
    }

    /// Take the composed stream, leaving the flow empty.
    ///
    /// A flow without a source yields an empty stream through the same
    /// transformers.
    pub fn take(&mut self) -> MessageStream {
        let source = self
            .source
            .take()
            .unwrap_or_else(|| stream::empty().boxed());
        self.transformers
            .drain(..)
            .fold(source, |upstream, transform| transform(upstream))
    }
}

impl std::fmt::Debug for MessageFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFlow")
            .field("has_source", &self.source.is_some())
            .field("transformers", &self.transformers.len())
            .finish()
    }
}
