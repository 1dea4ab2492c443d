use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tracing::debug;

use crate::context::attributes::ATTR_INTERNAL_MESSAGES_RESUME_LAST_ID;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::message::{Message, MessageStream};

/// Calls the backend of an API and installs its response on the context.
#[async_trait]
pub trait Invoker: Send + Sync {
    fn id(&self) -> &str;

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult;
}

/// A backend that produces messages on demand.
pub trait MessageSource: Send + Sync {
    /// A lazy stream of messages positioned strictly after `resume_after`,
    /// or from the beginning when the cursor is absent or unknown.
    fn subscribe(&self, resume_after: Option<&str>) -> MessageStream;
}

/// Invoker backed by a [`MessageSource`]: the subscription becomes the
/// response message stream, resumed from the request cursor.
pub struct MessageSourceInvoker {
    source: Arc<dyn MessageSource>,
}

impl MessageSourceInvoker {
    #[must_use]
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Invoker for MessageSourceInvoker {
    fn id(&self) -> &str {
        "message-source"
    }

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let cursor: Option<String> = ctx.get_internal_attribute(ATTR_INTERNAL_MESSAGES_RESUME_LAST_ID);
        debug!(request_id = %ctx.request().id(), cursor = ?cursor, "Subscribing to message source");
        let messages = self.source.subscribe(cursor.as_deref());
        ctx.response_mut().set_messages(messages);
        Ok(())
    }
}

/// Message source over an in-memory, append-only log.
///
/// Cursors are message ids. A cursor that matches no retained message
/// replays the log from the beginning.
#[derive(Debug, Default)]
pub struct InMemoryMessageSource {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageSource {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: RwLock::new(messages),
        }
    }

    pub fn push(&self, message: Message) {
        self.messages.write().push(message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl MessageSource for InMemoryMessageSource {
    fn subscribe(&self, resume_after: Option<&str>) -> MessageStream {
        let messages = self.messages.read();
        let start = resume_after
            .and_then(|cursor| messages.iter().position(|m| m.id() == cursor))
            .map_or(0, |index| index + 1);
        let snapshot: Vec<Message> = messages[start..].to_vec();
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }
}
