use http::Method;
use std::sync::Arc;

use crate::headers::HttpHeaders;
use crate::message::{MessageFlow, MessageStream};
use crate::transport::{parse_query_params, BodyStream, ParamVec, ServerRequest};

/// Request side of an [`ExecutionContext`](super::ExecutionContext).
#[derive(Debug)]
pub struct Request {
    id: String,
    transaction_id: String,
    method: Method,
    uri: String,
    path: String,
    context_path: String,
    path_info: String,
    host: Option<String>,
    remote_address: Option<String>,
    headers: HttpHeaders,
    parameters: ParamVec,
    path_parameters: ParamVec,
    timestamp: u64,
    body: Option<BodyStreamSlot>,
    messages: MessageFlow,
}

// Debug for a boxed stream
struct BodyStreamSlot(BodyStream);

impl std::fmt::Debug for BodyStreamSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BodyStream")
    }
}

impl Request {
    /// Build the request view from a transport request.
    ///
    /// The context path starts as `/` and is narrowed once an acceptor matched.
    #[must_use]
    pub fn from_server_request(
        server: &mut ServerRequest,
        id: String,
        transaction_id: String,
    ) -> Self {
        let path = server.path().to_string();
        Self {
            id,
            transaction_id,
            method: server.method().clone(),
            uri: server.uri().to_string(),
            parameters: parse_query_params(server.uri()),
            path_info: path.clone(),
            path,
            context_path: "/".to_string(),
            host: server.host().map(str::to_string),
            remote_address: server.remote_address().map(str::to_string),
            headers: server.headers().clone(),
            path_parameters: ParamVec::new(),
            timestamp: server.timestamp(),
            body: server.take_body().map(BodyStreamSlot),
            messages: MessageFlow::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Path relative to the context path, always starting with `/`.
    #[must_use]
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// Narrow the request to an acceptor's context path and recompute the path info.
    pub fn set_context_path(&mut self, context_path: &str) {
        let trimmed = context_path.trim_end_matches('/');
        let rest = self.path.strip_prefix(trimmed).unwrap_or(&self.path);
        self.path_info = if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        };
        self.context_path = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("{trimmed}/")
        };
    }

    /// Replace the context path without touching the path info.
    pub fn override_context_path(&mut self, context_path: String) {
        self.context_path = context_path;
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// Query parameter, last occurrence wins.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn parameters(&self) -> &ParamVec {
        &self.parameters
    }

    /// Path parameter, last occurrence wins.
    #[must_use]
    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn path_parameters(&self) -> &ParamVec {
        &self.path_parameters
    }

    pub fn add_path_parameter(&mut self, name: &str, value: String) {
        self.path_parameters.push((Arc::from(name), value));
    }

    /// Arrival timestamp, milliseconds since the epoch.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn take_body(&mut self) -> Option<BodyStream> {
        self.body.take().map(|slot| slot.0)
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

    /// Take the composed request message stream.
    pub fn messages(&mut self) -> MessageStream {
        self.messages.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        let mut server = ServerRequest::new(Method::GET, uri);
        Request::from_server_request(&mut server, "r".into(), "t".into())
    }

    #[test]
    fn context_path_splits_path_info() {
        let mut req = request("/teams/members/1?cursor=abc");
        req.set_context_path("/teams/");
        assert_eq!(req.context_path(), "/teams/");
        assert_eq!(req.path_info(), "/members/1");
        assert_eq!(req.parameter("cursor"), Some("abc"));

        let mut req = request("/teams");
        req.set_context_path("/teams/");
        assert_eq!(req.path_info(), "/");
    }

    #[test]
    fn root_context_path_keeps_full_path() {
        let mut req = request("/a/b");
        req.set_context_path("/");
        assert_eq!(req.context_path(), "/");
        assert_eq!(req.path_info(), "/a/b");
    }
}
