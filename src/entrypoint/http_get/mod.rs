//! HTTP GET message entrypoint.
//!
//! Serves a message API as a single paginated response: the client issues
//! `GET /topic?limit=20&cursor=<id>` and receives the messages available
//! within the configured count and duration bounds, followed by a
//! pagination trailer whose `nextCursor` resumes the stream on the next
//! call.

mod framing;

pub use framing::{Framer, Pagination};

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use http::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{BoundedMessages, EntrypointConnector};
use crate::context::attributes::{
    InternalAttributes, ATTR_INTERNAL_LAST_MESSAGE_ID, ATTR_INTERNAL_MESSAGES_LIMIT_COUNT,
    ATTR_INTERNAL_MESSAGES_LIMIT_DURATION_MS, ATTR_INTERNAL_MESSAGES_RESUME_LAST_ID,
    ATTR_INTERNAL_RESPONSE_CONTENT_TYPE,
};
use crate::context::{ExecutionContext, ExecutionResult};
use crate::failure::{negotiate, ExecutionFailure, ResponseMediaType};
use crate::message::MessageStream;
use crate::transport::BodyStream;

pub const ENTRYPOINT_ID: &str = "http-get";
pub const CURSOR_QUERY_PARAM: &str = "cursor";
pub const LIMIT_QUERY_PARAM: &str = "limit";

/// Connector settings, deserialized from the entrypoint definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpGetConfiguration {
    pub messages_limit_count: usize,
    pub messages_limit_duration_ms: u64,
    pub headers_in_payload: bool,
    pub metadata_in_payload: bool,
}

impl Default for HttpGetConfiguration {
    fn default() -> Self {
        Self {
            messages_limit_count: 500,
            messages_limit_duration_ms: 5000,
            headers_in_payload: false,
            metadata_in_payload: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpGetEntrypointConnector {
    configuration: HttpGetConfiguration,
}

impl HttpGetEntrypointConnector {
    #[must_use]
    pub fn new(configuration: HttpGetConfiguration) -> Self {
        Self { configuration }
    }

    #[must_use]
    pub fn configuration(&self) -> &HttpGetConfiguration {
        &self.configuration
    }

    /// Count bound: configured ceiling, lowered by a numeric `limit` parameter.
    fn messages_limit_count(&self, limit: Option<&str>) -> usize {
        let configured = self.configuration.messages_limit_count;
        match limit.filter(|l| !l.is_empty()) {
            None => configured,
            Some(raw) => match raw.parse::<usize>() {
                Ok(requested) => configured.min(requested),
                Err(_) => {
                    warn!(limit = %raw, "Ignoring non-numeric limit parameter");
                    configured
                }
            },
        }
    }
}

#[async_trait]
impl EntrypointConnector for HttpGetEntrypointConnector {
    fn id(&self) -> &'static str {
        ENTRYPOINT_ID
    }

    fn matches(&self, ctx: &ExecutionContext) -> bool {
        ctx.request().method() == Method::GET
    }

    async fn handle_request(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let accept = ctx.request().headers().get_all("accept");
        let media_type = match negotiate(&accept) {
            Ok(media_type) => media_type,
            Err(unsupported) => {
                let failure = ExecutionFailure::new(400).with_message(unsupported.to_string());
                return Err(ctx.interrupt_with(failure));
            }
        };

        let limit_count = self.messages_limit_count(ctx.request().parameter(LIMIT_QUERY_PARAM));
        let cursor = ctx
            .request()
            .parameter(CURSOR_QUERY_PARAM)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let internal = ctx.internal_attributes();
        internal.put(ATTR_INTERNAL_RESPONSE_CONTENT_TYPE, media_type);
        internal.put(
            ATTR_INTERNAL_MESSAGES_LIMIT_DURATION_MS,
            self.configuration.messages_limit_duration_ms,
        );
        internal.put(ATTR_INTERNAL_MESSAGES_LIMIT_COUNT, limit_count);
        if let Some(cursor) = cursor {
            internal.put(ATTR_INTERNAL_MESSAGES_RESUME_LAST_ID, cursor);
        }
        debug!(
            request_id = %ctx.request().id(),
            media_type = media_type.as_str(),
            limit_count,
            "Message entrypoint request prepared"
        );
        Ok(())
    }

    async fn handle_response(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let internal = ctx.internal_attributes();
        let media_type: ResponseMediaType = internal
            .get(ATTR_INTERNAL_RESPONSE_CONTENT_TYPE)
            .unwrap_or(ResponseMediaType::Text);

        let mut bounded = BoundedMessages::new(ctx.response_mut().messages());
        if let Some(count) = internal.get::<usize>(ATTR_INTERNAL_MESSAGES_LIMIT_COUNT) {
            bounded = bounded.with_count_limit(count);
        }
        if let Some(duration_ms) = internal.get::<u64>(ATTR_INTERNAL_MESSAGES_LIMIT_DURATION_MS) {
            bounded = bounded.with_deadline_from(ctx.request().timestamp(), duration_ms);
        }

        // empty query values count as absent, as in handle_request
        let echo = |name: &str| {
            ctx.request()
                .parameter(name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let echoed = Pagination {
            cursor: echo(CURSOR_QUERY_PARAM),
            next_cursor: None,
            limit: echo(LIMIT_QUERY_PARAM),
        };
        let framer = Framer::new(
            media_type,
            self.configuration.headers_in_payload,
            self.configuration.metadata_in_payload,
        );

        let response = ctx.response_mut();
        response.headers_mut().set("content-type", media_type.as_str());
        response.set_chunks(frame_messages(bounded.boxed(), framer, internal, echoed));
        Ok(())
    }
}

/// Frame `messages` into the response body.
///
/// Each item updates the last-message-id attribute as it is written; the
/// trailer reads it back as `nextCursor`. Error messages are held back and
/// the last one is rendered after the item list.
pub fn frame_messages(
    messages: MessageStream,
    framer: Framer,
    internal: InternalAttributes,
    mut pagination: Pagination,
) -> BodyStream {
    Box::pin(stream! {
        let mut messages = messages;
        let mut first = true;
        let mut error_message = None;

        yield Ok(framer.open());
        while let Some(item) = messages.next().await {
            match item {
                Ok(message) if message.is_error() => error_message = Some(message),
                Ok(message) => {
                    internal.put(ATTR_INTERNAL_LAST_MESSAGE_ID, message.id().to_string());
                    yield Ok(framer.item(&message, first));
                    first = false;
                }
                Err(err) => {
                    yield Err(anyhow::Error::new(err));
                    return;
                }
            }
        }

        let close_items = framer.close_items();
        if !close_items.is_empty() {
            yield Ok(close_items);
        }
        if let Some(message) = error_message {
            yield Ok(framer.error(&message));
        }
        pagination.next_cursor = internal.get::<String>(ATTR_INTERNAL_LAST_MESSAGE_ID);
        yield Ok(framer.close(&pagination));
    })
}
