use std::sync::Arc;

use super::cors::{CorsConfigError, CorsPolicy, CorsPreflightProcessor, CorsSimpleRequestProcessor};
use super::failure::{SimpleFailureMessageProcessor, SimpleFailureProcessor};
use super::logging::{LogInitProcessor, LogRequestProcessor, LogResponseProcessor};
use super::notfound::{
    NotFoundProcessor, NotFoundReporterProcessor, Reporter, ResponseTimeProcessor, TracingReporter,
};
use super::path::{PathMappingProcessor, PathParametersProcessor, PathTemplate, XForwardedPrefixProcessor};
use super::shutdown::{NodeState, ShutdownProcessor};
use super::subscription::SubscriptionProcessor;
use super::transaction::TransactionPostProcessor;
use super::{Processor, ProcessorChain};
use crate::config::GatewayConfiguration;
use crate::definition::{Api, PathOperator, Selector};

pub const CHAIN_BEFORE_API_HANDLE: &str = "before-api-handle";
pub const CHAIN_BEFORE_API_EXECUTION: &str = "before-api-execution";
pub const CHAIN_BEFORE_SECURITY_CHAIN: &str = "before-security-chain";
pub const CHAIN_AFTER_API_EXECUTION: &str = "after-api-execution";
pub const CHAIN_API_ERROR: &str = "api-error";
pub const CHAIN_AFTER_API_HANDLE: &str = "after-api-handle";
pub const CHAIN_API_MESSAGE: &str = "api-message";
pub const CHAIN_NOT_FOUND: &str = "not-found";

/// An API definition that cannot be turned into processor chains.
#[derive(Debug, thiserror::Error)]
pub enum ChainFactoryError {
    #[error(transparent)]
    Cors(#[from] CorsConfigError),
    #[error("invalid path template '{template}': {source}")]
    PathTemplate {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// Every chain of one API, built together.
#[derive(Debug, Clone)]
pub struct ApiProcessorChains {
    pub before_handle: ProcessorChain,
    pub before_security_chain: ProcessorChain,
    pub before_api_execution: ProcessorChain,
    pub after_api_execution: ProcessorChain,
    pub on_error: ProcessorChain,
    pub after_handle: ProcessorChain,
    /// Only for message APIs.
    pub on_message: Option<ProcessorChain>,
}

/// Assembles the per-phase chains of an API from the fixed processor catalog.
///
/// Gateway configuration is read once, when the factory is created; every
/// append condition is then a pure function of the API definition.
#[derive(Debug, Clone)]
pub struct ApiProcessorChainFactory {
    x_forwarded_prefix: bool,
    transaction_header: String,
    request_header: String,
    client_identifier_header: String,
    node: Arc<NodeState>,
}

impl ApiProcessorChainFactory {
    #[must_use]
    pub fn new(config: &GatewayConfiguration) -> Self {
        Self {
            x_forwarded_prefix: config.x_forwarded_prefix_enabled(),
            transaction_header: config.transaction_header(),
            request_header: config.request_header(),
            client_identifier_header: config.client_identifier_header(),
            node: NodeState::new(),
        }
    }

    /// Share the node lifecycle flag read by the shutdown processor.
    #[must_use]
    pub fn with_node_state(mut self, node: Arc<NodeState>) -> Self {
        self.node = node;
        self
    }

    #[must_use]
    pub fn node_state(&self) -> &Arc<NodeState> {
        &self.node
    }

    /// `LogInit`, `LogRequest` when logging is enabled.
    #[must_use]
    pub fn before_handle(&self, api: &Api) -> ProcessorChain {
        let mode = api.logging_mode();
        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if mode.is_enabled() {
            processors.push(Arc::new(LogInitProcessor::new(api.id.clone())));
            processors.push(Arc::new(LogRequestProcessor::new(mode)));
        }
        ProcessorChain::new(CHAIN_BEFORE_API_HANDLE, processors)
    }

    /// `XForwardedPrefix`?, `PathParameters`?, `Subscription`, `PathMapping`?
    pub fn before_api_execution(&self, api: &Api) -> Result<ProcessorChain, ChainFactoryError> {
        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if self.x_forwarded_prefix {
            processors.push(Arc::new(XForwardedPrefixProcessor));
        }
        if api.has_path_parameters() {
            processors.push(Arc::new(PathParametersProcessor::new(flow_templates(api)?)));
        }
        processors.push(Arc::new(SubscriptionProcessor::new(
            self.client_identifier_header.clone(),
        )));
        if !api.path_mappings().is_empty() {
            let mappings = api
                .path_mappings()
                .iter()
                .map(|m| compile(m, PathOperator::Equals))
                .collect::<Result<Vec<_>, _>>()?;
            processors.push(Arc::new(PathMappingProcessor::new(mappings)));
        }
        Ok(ProcessorChain::new(CHAIN_BEFORE_API_EXECUTION, processors))
    }

    /// `CorsPreflight` when CORS is enabled.
    pub fn before_security_chain(&self, api: &Api) -> Result<ProcessorChain, ChainFactoryError> {
        Ok(self.security_chain_with(cors_policy(api)?))
    }

    /// `Shutdown`, `TransactionPost`, then `CorsSimpleRequest` when CORS is enabled.
    pub fn after_api_execution(&self, api: &Api) -> Result<ProcessorChain, ChainFactoryError> {
        Ok(self.after_api_execution_with(cors_policy(api)?))
    }

    /// `Shutdown`, `TransactionPost`, `SimpleFailure`, whatever the definition.
    #[must_use]
    pub fn on_error(&self, _api: &Api) -> ProcessorChain {
        ProcessorChain::new(
            CHAIN_API_ERROR,
            vec![
                Arc::new(ShutdownProcessor::new(Arc::clone(&self.node))),
                Arc::new(self.transaction_post()),
                Arc::new(SimpleFailureProcessor),
            ],
        )
    }

    /// `LogResponse` when logging is enabled.
    #[must_use]
    pub fn after_handle(&self, api: &Api) -> ProcessorChain {
        let mode = api.logging_mode();
        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if mode.is_enabled() {
            processors.push(Arc::new(LogResponseProcessor::new(mode)));
        }
        ProcessorChain::new(CHAIN_AFTER_API_HANDLE, processors)
    }

    /// `SimpleFailureMessage`, run for message APIs before the entrypoint.
    #[must_use]
    pub fn on_message(&self, _api: &Api) -> ProcessorChain {
        ProcessorChain::new(CHAIN_API_MESSAGE, vec![Arc::new(SimpleFailureMessageProcessor)])
    }

    /// Build every chain of `api`, compiling its CORS policy once.
    pub fn build(&self, api: &Api) -> Result<ApiProcessorChains, ChainFactoryError> {
        let cors = cors_policy(api)?;
        Ok(ApiProcessorChains {
            before_handle: self.before_handle(api),
            before_security_chain: self.security_chain_with(cors.clone()),
            before_api_execution: self.before_api_execution(api)?,
            after_api_execution: self.after_api_execution_with(cors),
            on_error: self.on_error(api),
            after_handle: self.after_handle(api),
            on_message: api.is_message_api().then(|| self.on_message(api)),
        })
    }

    fn security_chain_with(&self, cors: Option<Arc<CorsPolicy>>) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if let Some(policy) = cors {
            processors.push(Arc::new(CorsPreflightProcessor::new(policy)));
        }
        ProcessorChain::new(CHAIN_BEFORE_SECURITY_CHAIN, processors)
    }

    fn after_api_execution_with(&self, cors: Option<Arc<CorsPolicy>>) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> = vec![
            Arc::new(ShutdownProcessor::new(Arc::clone(&self.node))),
            Arc::new(self.transaction_post()),
        ];
        if let Some(policy) = cors {
            processors.push(Arc::new(CorsSimpleRequestProcessor::new(policy)));
        }
        ProcessorChain::new(CHAIN_AFTER_API_EXECUTION, processors)
    }

    fn transaction_post(&self) -> TransactionPostProcessor {
        TransactionPostProcessor::new(self.transaction_header.clone(), self.request_header.clone())
    }
}

fn cors_policy(api: &Api) -> Result<Option<Arc<CorsPolicy>>, ChainFactoryError> {
    api.cors()
        .map(|definition| CorsPolicy::from_definition(definition).map(Arc::new))
        .transpose()
        .map_err(ChainFactoryError::from)
}

fn compile(template: &str, operator: PathOperator) -> Result<PathTemplate, ChainFactoryError> {
    PathTemplate::compile(template, operator).map_err(|source| ChainFactoryError::PathTemplate {
        template: template.to_string(),
        source,
    })
}

fn flow_templates(api: &Api) -> Result<Vec<PathTemplate>, ChainFactoryError> {
    api.flows
        .iter()
        .filter(|f| f.enabled)
        .flat_map(|f| f.selectors.iter())
        .filter_map(|s| match s {
            Selector::Http(http) => Some(compile(&http.path, http.path_operator)),
            Selector::Condition { .. } => None,
        })
        .filter(|t| t.as_ref().map_or(true, PathTemplate::has_parameters))
        .collect()
}

/// Builds the chain run when no acceptor matches a request:
/// `NotFound`, `ResponseTime`, then `NotFoundReporter` when not-found
/// analytics are enabled.
pub struct NotFoundProcessorChainFactory {
    analytics_enabled: bool,
    reporter: Arc<dyn Reporter>,
}

impl NotFoundProcessorChainFactory {
    #[must_use]
    pub fn new(config: &GatewayConfiguration) -> Self {
        Self {
            analytics_enabled: config.not_found_analytics_enabled(),
            reporter: Arc::new(TracingReporter),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn processor_chain(&self) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> =
            vec![Arc::new(NotFoundProcessor), Arc::new(ResponseTimeProcessor)];
        if self.analytics_enabled {
            processors.push(Arc::new(NotFoundReporterProcessor::new(Arc::clone(
                &self.reporter,
            ))));
        }
        ProcessorChain::new(CHAIN_NOT_FOUND, processors)
    }
}
