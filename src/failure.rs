//! Structured failures and their content-negotiated rendering.
//!
//! An [`ExecutionFailure`] travels through the interrupt channel from the
//! processor that aborted the request to whatever renders the error: the
//! `SimpleFailure` processor for whole responses, the failure message
//! processor for message streams, and the dispatcher's timeout path. All
//! three use [`render_failure`] so the body format stays consistent.

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_XML: &str = "application/xml";
pub const MEDIA_TYPE_TEXT: &str = "text/plain";
pub const MEDIA_TYPE_WILDCARD: &str = "*/*";

/// A structured failure carried across the interrupt boundary.
///
/// Absence of a failure (a bare interruption or an unexpected error) renders
/// as a 500 with the generic reason phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Value>,
}

impl ExecutionFailure {
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            message: None,
            content_type: None,
            key: None,
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Message text, or the status reason phrase when none was set.
    #[must_use]
    pub fn message_or_reason(&self) -> String {
        match &self.message {
            Some(m) => m.clone(),
            None => reason_phrase(self.status_code).to_string(),
        }
    }
}

/// JSON shape of a failure body.
#[derive(Debug, Serialize)]
struct FailureBody<'a> {
    message: String,
    http_status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<&'a str, &'a Value>,
}

/// Canonical reason phrase for a status code, `"Unknown"` when there is none.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// One of the three body formats the gateway knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMediaType {
    Json,
    Xml,
    Text,
}

impl ResponseMediaType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMediaType::Json => MEDIA_TYPE_JSON,
            ResponseMediaType::Xml => MEDIA_TYPE_XML,
            ResponseMediaType::Text => MEDIA_TYPE_TEXT,
        }
    }

    fn from_exact(media_type: &str) -> Option<Self> {
        if media_type.eq_ignore_ascii_case(MEDIA_TYPE_JSON) {
            Some(ResponseMediaType::Json)
        } else if media_type.eq_ignore_ascii_case(MEDIA_TYPE_XML) {
            Some(ResponseMediaType::Xml)
        } else if media_type.eq_ignore_ascii_case(MEDIA_TYPE_TEXT) {
            Some(ResponseMediaType::Text)
        } else {
            None
        }
    }
}

/// The Accept header named no media type this gateway can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported accept header: {0}")]
pub struct UnsupportedAccept(pub String);

/// Select the response media type from raw `Accept` header values.
///
/// Entries are ranked by their `q` parameter (stable for ties). An exact
/// match on a supported type wins over a wildcard anywhere in the list; a
/// `*/*` entry, or no Accept header at all, selects plain text.
pub fn negotiate(accept_values: &[&str]) -> Result<ResponseMediaType, UnsupportedAccept> {
    let mut ranges: Vec<(&str, f32)> = accept_values
        .iter()
        .flat_map(|v| v.split(','))
        .filter_map(parse_media_range)
        .filter(|(_, q)| *q > 0.0)
        .collect();

    if ranges.is_empty() {
        if accept_values.iter().all(|v| v.trim().is_empty()) {
            return Ok(ResponseMediaType::Text);
        }
        return Err(UnsupportedAccept(accept_values.join(", ")));
    }

    ranges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(exact) = ranges
        .iter()
        .find_map(|(media, _)| ResponseMediaType::from_exact(media))
    {
        return Ok(exact);
    }
    if ranges.iter().any(|(media, _)| *media == MEDIA_TYPE_WILDCARD) {
        return Ok(ResponseMediaType::Text);
    }
    Err(UnsupportedAccept(accept_values.join(", ")))
}

fn parse_media_range(raw: &str) -> Option<(&str, f32)> {
    let mut parts = raw.split(';');
    let media = parts.next()?.trim();
    if media.is_empty() {
        return None;
    }
    let q = parts
        .filter_map(|p| p.trim().strip_prefix("q="))
        .find_map(|q| q.trim().parse::<f32>().ok())
        .unwrap_or(1.0);
    Some((media, q))
}

/// A failure rendered into status, reason, content type and body.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFailure {
    pub status: u16,
    pub reason: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Render `failure` for a client that sent `accept_values`.
///
/// An explicit failure content type wins and uses the message verbatim.
/// Otherwise JSON clients get the structured body and everyone else the
/// message text. No failure renders as a plain-text 500.
#[must_use]
pub fn render_failure(failure: Option<&ExecutionFailure>, accept_values: &[&str]) -> RenderedFailure {
    let Some(failure) = failure else {
        let reason = reason_phrase(500);
        return RenderedFailure {
            status: 500,
            reason: reason.to_string(),
            content_type: MEDIA_TYPE_TEXT.to_string(),
            body: Bytes::from_static(reason.as_bytes()),
        };
    };

    let status = failure.status_code();
    let reason = reason_phrase(status).to_string();
    let message = failure.message_or_reason();

    if let Some(content_type) = failure.content_type() {
        return RenderedFailure {
            status,
            reason,
            content_type: content_type.to_string(),
            body: Bytes::from(message),
        };
    }

    match negotiate(accept_values).unwrap_or(ResponseMediaType::Text) {
        ResponseMediaType::Json => {
            let body = FailureBody {
                message,
                http_status_code: status,
                key: failure.key(),
                parameters: failure.parameters().iter().map(|(k, v)| (k.as_str(), v)).collect(),
            };
            let json = serde_json::to_vec(&body).unwrap_or_default();
            RenderedFailure {
                status,
                reason,
                content_type: MEDIA_TYPE_JSON.to_string(),
                body: Bytes::from(json),
            }
        }
        _ => RenderedFailure {
            status,
            reason,
            content_type: MEDIA_TYPE_TEXT.to_string(),
            body: Bytes::from(message),
        },
    }
}
