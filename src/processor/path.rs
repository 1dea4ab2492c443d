//! Path rewriting and path-template processors.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::Processor;
use crate::context::attributes::ATTR_CONTEXT_PATH;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::definition::PathOperator;

const HEADER_X_FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// `:name` path segment
#[allow(clippy::expect_used)]
static PARAM_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^:([A-Za-z_][A-Za-z0-9_\-]*)$").expect("path parameter regex should be valid")
});

/// Compiled path template such as `/products/:id/items`.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

impl PathTemplate {
    /// Compile `template`; `operator` decides whether trailing segments may follow.
    pub fn compile(template: &str, operator: PathOperator) -> Result<Self, regex::Error> {
        let mut names = Vec::new();
        let mut source = String::from("^");
        for segment in template.trim_end_matches('/').split('/').skip(1) {
            source.push('/');
            match PARAM_SEGMENT.captures(segment) {
                Some(caps) => {
                    names.push(caps[1].to_string());
                    source.push_str("([^/]+)");
                }
                None => source.push_str(&regex::escape(segment)),
            }
        }
        match operator {
            PathOperator::Equals => source.push_str("/?$"),
            PathOperator::StartsWith => source.push_str("(?:/.*)?$"),
        }
        Ok(Self {
            template: template.to_string(),
            regex: Regex::new(&source)?,
            names,
        })
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.names.is_empty()
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Parameter values in declaration order, or `None` if `path` does not match.
    #[must_use]
    pub fn extract(&self, path: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(path)?;
        Some(
            self.names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| caps.get(i + 1).map(|m| (name.clone(), m.as_str().to_string())))
                .collect(),
        )
    }
}

/// Prepends the `X-Forwarded-Prefix` header to the context path.
#[derive(Debug, Clone, Default)]
pub struct XForwardedPrefixProcessor;

#[async_trait]
impl Processor for XForwardedPrefixProcessor {
    fn id(&self) -> &'static str {
        "x-forwarded-prefix"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let Some(prefix) = ctx
            .request()
            .headers()
            .get(HEADER_X_FORWARDED_PREFIX)
            .map(|p| p.trim_end_matches('/').to_string())
        else {
            return Ok(());
        };
        if prefix.is_empty() {
            return Ok(());
        }
        let context_path = format!("{prefix}{}", ctx.request().context_path());
        debug!(request_id = %ctx.request().id(), %context_path, "Applying X-Forwarded-Prefix");
        ctx.request_mut().override_context_path(context_path.clone());
        ctx.put_attribute(ATTR_CONTEXT_PATH, context_path)
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

/// Extracts `:param` values of matching flow paths into the request.
#[derive(Debug, Clone)]
pub struct PathParametersProcessor {
    templates: Vec<PathTemplate>,
}

impl PathParametersProcessor {
    #[must_use]
    pub fn new(templates: Vec<PathTemplate>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl Processor for PathParametersProcessor {
    fn id(&self) -> &'static str {
        "path-parameters"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let path_info = ctx.request().path_info().to_string();
        for template in self.templates.iter().filter(|t| t.has_parameters()) {
            if let Some(params) = template.extract(&path_info) {
                for (name, value) in params {
                    ctx.request_mut().add_path_parameter(&name, value);
                }
            }
        }
        Ok(())
    }
}

/// Records the first matching path mapping in the metrics.
#[derive(Debug, Clone)]
pub struct PathMappingProcessor {
    mappings: Vec<PathTemplate>,
}

impl PathMappingProcessor {
    #[must_use]
    pub fn new(mappings: Vec<PathTemplate>) -> Self {
        Self { mappings }
    }
}

#[async_trait]
impl Processor for PathMappingProcessor {
    fn id(&self) -> &'static str {
        "path-mapping"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let mapped = self
            .mappings
            .iter()
            .find(|m| m.is_match(ctx.request().path_info()))
            .map(|m| m.template().to_string());
        if mapped.is_some() {
            ctx.metrics_mut().mapped_path = mapped;
        }
        Ok(())
    }
}
