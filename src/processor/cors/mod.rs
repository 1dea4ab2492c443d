//! CORS processors.
//!
//! [`CorsPolicy`] is compiled once per API from its listener's
//! [`CorsDefinition`]. Two processors share it:
//!
//! - [`CorsPreflightProcessor`] (before-security-chain) answers `OPTIONS`
//!   preflight requests directly and interrupts the pipeline
//! - [`CorsSimpleRequestProcessor`] (after-api-execution) decorates regular
//!   responses for allowed origins
//!
//! # Security
//!
//! - Origins are validated against the allow list (exact, wildcard or regex)
//! - Wildcard origins cannot be combined with credentials
//! - `Vary: Origin` is always sent when the allowed origin is echoed back

mod error;

pub use error::CorsConfigError;

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use regex::Regex;
use tracing::{debug, warn};

use super::Processor;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::definition::CorsDefinition;
use crate::headers::HttpHeaders;

const HEADER_ORIGIN: &str = "origin";
const HEADER_REQUEST_METHOD: &str = "access-control-request-method";
const HEADER_REQUEST_HEADERS: &str = "access-control-request-headers";
const HEADER_ALLOW_ORIGIN: &str = "access-control-allow-origin";
const HEADER_ALLOW_METHODS: &str = "access-control-allow-methods";
const HEADER_ALLOW_HEADERS: &str = "access-control-allow-headers";
const HEADER_ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
const HEADER_EXPOSE_HEADERS: &str = "access-control-expose-headers";
const HEADER_MAX_AGE: &str = "access-control-max-age";

/// Origin validation strategy
#[derive(Clone)]
pub enum OriginValidation {
    /// Exact string matching
    Exact(Vec<String>),
    /// Wildcard (allow all origins)
    Wildcard,
    /// Regex pattern matching
    Regex(Vec<Regex>),
}

impl std::fmt::Debug for OriginValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginValidation::Exact(origins) => f.debug_tuple("Exact").field(origins).finish(),
            OriginValidation::Wildcard => write!(f, "Wildcard"),
            OriginValidation::Regex(patterns) => f
                .debug_tuple("Regex")
                .field(&patterns.iter().map(Regex::as_str).collect::<Vec<_>>())
                .finish(),
        }
    }
}

impl OriginValidation {
    /// Classify allow-list entries: `*` wins, any pattern-like entry turns
    /// the whole list into anchored regexes, otherwise exact matching.
    fn from_entries(entries: &[String]) -> Result<Self, CorsConfigError> {
        if entries.iter().any(|o| o == "*") {
            return Ok(OriginValidation::Wildcard);
        }
        let is_pattern = |o: &str| o.chars().any(|c| "^$()[]|\\*+?{}".contains(c));
        if !entries.iter().any(|o| is_pattern(o)) {
            return Ok(OriginValidation::Exact(entries.to_vec()));
        }
        entries
            .iter()
            .map(|o| {
                let source = if is_pattern(o) {
                    format!("^(?:{})$", o.trim_start_matches('^').trim_end_matches('$'))
                } else {
                    format!("^{}$", regex::escape(o))
                };
                Regex::new(&source).map_err(|e| CorsConfigError::InvalidOriginPattern {
                    origin: o.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(OriginValidation::Regex)
    }

    fn is_allowed(&self, origin: &str) -> bool {
        match self {
            OriginValidation::Exact(origins) => origins.iter().any(|o| o == origin),
            OriginValidation::Wildcard => true,
            OriginValidation::Regex(patterns) => patterns.iter().any(|re| re.is_match(origin)),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, OriginValidation::Wildcard)
    }
}

/// Compiled CORS settings of one API.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin_validation: OriginValidation,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
}

impl CorsPolicy {
    pub fn from_definition(definition: &CorsDefinition) -> Result<Self, CorsConfigError> {
        let origin_validation = OriginValidation::from_entries(&definition.allow_origin)?;
        if definition.allow_credentials && origin_validation.is_wildcard() {
            return Err(CorsConfigError::WildcardWithCredentials);
        }

        let allowed_methods = if definition.allow_methods.is_empty() {
            vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ]
        } else {
            definition
                .allow_methods
                .iter()
                .map(|m| {
                    m.to_ascii_uppercase()
                        .parse::<Method>()
                        .map_err(|_| CorsConfigError::InvalidMethod { method: m.clone() })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            origin_validation,
            allowed_headers: definition.allow_headers.clone(),
            allowed_methods,
            allow_credentials: definition.allow_credentials,
            expose_headers: definition.expose_headers.clone(),
            max_age: u32::try_from(definition.max_age).ok(),
        })
    }

    /// Value for `Access-Control-Allow-Origin`, or `None` if the origin is refused.
    fn validate_origin(&self, origin: &str) -> Option<String> {
        if !self.origin_validation.is_allowed(origin) {
            return None;
        }
        if self.origin_validation.is_wildcard() {
            Some("*".to_string())
        } else {
            Some(origin.to_string())
        }
    }

    /// Validate a preflight request and build its response headers.
    ///
    /// Returns the refusal reason when the origin, method or any requested
    /// header is not allowed.
    fn preflight_headers(&self, request: &HttpHeaders) -> Result<HttpHeaders, String> {
        let origin = request.get(HEADER_ORIGIN).unwrap_or_default();
        let allow_origin = self
            .validate_origin(origin)
            .ok_or_else(|| format!("origin '{origin}' is not allowed"))?;

        let requested_method = request.get(HEADER_REQUEST_METHOD).unwrap_or_default();
        let method = requested_method
            .parse::<Method>()
            .map_err(|_| format!("invalid Access-Control-Request-Method '{requested_method}'"))?;
        if !self.allowed_methods.contains(&method) {
            return Err(format!("method {method} not in allowed methods"));
        }

        if let Some(requested) = request.get(HEADER_REQUEST_HEADERS) {
            let allow_all = self.allowed_headers.iter().any(|h| h == "*");
            if !allow_all {
                for header in requested.split(',').map(str::trim).filter(|h| !h.is_empty()) {
                    if !self
                        .allowed_headers
                        .iter()
                        .any(|h| h.eq_ignore_ascii_case(header))
                    {
                        return Err(format!("header '{header}' not in allowed headers"));
                    }
                }
            }
        }

        let mut headers = HttpHeaders::new();
        headers.set(HEADER_ALLOW_ORIGIN, allow_origin);
        headers.set(
            HEADER_ALLOW_METHODS,
            self.allowed_methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        );
        if !self.allowed_headers.is_empty() {
            headers.set(HEADER_ALLOW_HEADERS, self.allowed_headers.join(", "));
        }
        if self.allow_credentials {
            headers.set(HEADER_ALLOW_CREDENTIALS, "true");
        }
        if let Some(age) = self.max_age {
            headers.set(HEADER_MAX_AGE, age.to_string());
        }
        headers.set("vary", "Origin");
        Ok(headers)
    }

    /// Headers added to a regular response for an allowed origin.
    fn simple_request_headers(&self, origin: &str) -> Option<HttpHeaders> {
        let allow_origin = self.validate_origin(origin)?;
        let mut headers = HttpHeaders::new();
        headers.set(HEADER_ALLOW_ORIGIN, allow_origin);
        if self.allow_credentials {
            headers.set(HEADER_ALLOW_CREDENTIALS, "true");
        }
        if !self.expose_headers.is_empty() {
            headers.set(HEADER_EXPOSE_HEADERS, self.expose_headers.join(", "));
        }
        if !self.origin_validation.is_wildcard() {
            headers.set("vary", "Origin");
        }
        Some(headers)
    }
}

fn is_preflight(ctx: &ExecutionContext) -> bool {
    let request = ctx.request();
    request.method() == Method::OPTIONS
        && request.headers().contains(HEADER_ORIGIN)
        && request.headers().contains(HEADER_REQUEST_METHOD)
}

fn merge_headers(target: &mut HttpHeaders, source: HttpHeaders) {
    for (name, value) in source.iter() {
        target.set(name, value);
    }
}

/// Answers preflight requests and stops the pipeline.
#[derive(Debug, Clone)]
pub struct CorsPreflightProcessor {
    policy: Arc<CorsPolicy>,
}

impl CorsPreflightProcessor {
    #[must_use]
    pub fn new(policy: Arc<CorsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Processor for CorsPreflightProcessor {
    fn id(&self) -> &'static str {
        "cors-preflight"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        if !is_preflight(ctx) {
            return Ok(());
        }

        match self.policy.preflight_headers(ctx.request().headers()) {
            Ok(headers) => {
                debug!(request_id = %ctx.request().id(), "CORS preflight accepted");
                let response = ctx.response_mut();
                response.set_status(200);
                merge_headers(response.headers_mut(), headers);
            }
            Err(reason) => {
                warn!(request_id = %ctx.request().id(), %reason, "CORS preflight rejected");
                ctx.response_mut().set_status(400);
            }
        }
        Err(ctx.interrupt())
    }
}

/// Adds CORS headers to non-preflight responses.
#[derive(Debug, Clone)]
pub struct CorsSimpleRequestProcessor {
    policy: Arc<CorsPolicy>,
}

impl CorsSimpleRequestProcessor {
    #[must_use]
    pub fn new(policy: Arc<CorsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Processor for CorsSimpleRequestProcessor {
    fn id(&self) -> &'static str {
        "cors-simple-request"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        if is_preflight(ctx) {
            return Ok(());
        }
        let Some(origin) = ctx.request().headers().get(HEADER_ORIGIN).map(str::to_string) else {
            return Ok(());
        };
        if let Some(headers) = self.policy.simple_request_headers(&origin) {
            merge_headers(ctx.response_mut().headers_mut(), headers);
        }
        Ok(())
    }
}
