use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{Acceptor, Invoker, ReactiveReactor, ReactorHandler};
use crate::config::GatewayConfiguration;
use crate::context::attributes::{
    ATTR_API, ATTR_API_NAME, ATTR_CONTEXT_PATH, ATTR_INTERNAL_ENTRYPOINT_CONNECTOR,
};
use crate::context::{ExecutionContext, ExecutionError, ExecutionResult};
use crate::definition::Api;
use crate::entrypoint::{create_connector, EntrypointConnector, EntrypointError};
use crate::failure::{reason_phrase, ExecutionFailure};
use crate::processor::{ApiProcessorChainFactory, ApiProcessorChains, ChainFactoryError};
use crate::transport::now_millis;

pub const NO_ENTRYPOINT_KEY: &str = "NO_ENTRYPOINT";
const NO_ENTRYPOINT_MESSAGE: &str = "No entrypoint matches the incoming request";
const DEFAULT_PENDING_REQUESTS_TIMEOUT: Duration = Duration::from_millis(10_000);
const PENDING_REQUESTS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An API definition the reactor cannot be built from.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error(transparent)]
    Chains(#[from] ChainFactoryError),
    #[error(transparent)]
    Entrypoint(#[from] EntrypointError),
}

/// Decrements the pending counter when the request future completes or is dropped.
struct PendingGuard<'a>(&'a AtomicU64);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reactive reactor running the processor chains of one API around its
/// entrypoint connectors and backend invoker.
///
/// ## Pipeline
///
/// 1. `before-api-handle`, `before-security-chain`, `before-api-execution`
/// 2. `api-message` for message APIs
/// 3. entrypoint request handling, backend invocation
/// 4. `after-api-execution`
///
/// An error anywhere in that block is classified: a bare interruption runs
/// `after-api-execution`, an interruption with a failure runs `api-error`,
/// anything else is logged and runs `api-error`. The entrypoint response is
/// only handled when the block succeeded; `after-api-handle` and the
/// response end always run.
pub struct DefaultApiReactor {
    api: Api,
    chains: ApiProcessorChains,
    entrypoints: Vec<Arc<dyn EntrypointConnector>>,
    invoker: Arc<dyn Invoker>,
    pending_requests: AtomicU64,
    pending_requests_timeout: Duration,
}

impl DefaultApiReactor {
    /// Build the chains and entrypoint connectors of `api`.
    pub fn new(
        api: Api,
        factory: &ApiProcessorChainFactory,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Self, ReactorError> {
        let chains = factory.build(&api)?;
        let entrypoints = api
            .entrypoints()
            .map(create_connector)
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            api_id = %api.id,
            entrypoints = entrypoints.len(),
            "API reactor created"
        );
        Ok(Self {
            api,
            chains,
            entrypoints,
            invoker,
            pending_requests: AtomicU64::new(0),
            pending_requests_timeout: DEFAULT_PENDING_REQUESTS_TIMEOUT,
        })
    }

    /// Build with a chain factory and pending-request timeout read from `config`.
    pub fn from_configuration(
        api: Api,
        config: &GatewayConfiguration,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Self, ReactorError> {
        let reactor = Self::new(api, &ApiProcessorChainFactory::new(config), invoker)?;
        Ok(reactor.with_pending_requests_timeout(Duration::from_millis(
            config.pending_requests_timeout_ms(),
        )))
    }

    #[must_use]
    pub fn with_pending_requests_timeout(mut self, timeout: Duration) -> Self {
        self.pending_requests_timeout = timeout;
        self
    }

    #[must_use]
    pub fn api(&self) -> &Api {
        &self.api
    }

    #[must_use]
    pub fn chains(&self) -> &ApiProcessorChains {
        &self.chains
    }

    #[must_use]
    pub fn pending_requests(&self) -> u64 {
        self.pending_requests.load(Ordering::SeqCst)
    }

    /// One acceptor per path of the HTTP listener, all routed to this reactor.
    #[must_use]
    pub fn acceptors(self: &Arc<Self>) -> Vec<Acceptor> {
        let Some(listener) = self.api.http_listener() else {
            return Vec::new();
        };
        let reactor: Arc<dyn ReactiveReactor> = Arc::clone(self) as Arc<dyn ReactiveReactor>;
        listener
            .paths
            .iter()
            .map(|p| {
                Acceptor::new(
                    p.host.as_deref(),
                    &p.path,
                    ReactorHandler::Reactive(Arc::clone(&reactor)),
                )
            })
            .collect()
    }

    /// Wait until in-flight requests drain, polling every 100 ms.
    ///
    /// Returns `false` when requests were still pending after the configured
    /// timeout.
    pub async fn stop(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.pending_requests_timeout;
        loop {
            let pending = self.pending_requests();
            if pending == 0 {
                info!(api_id = %self.api.id, "API reactor stopped");
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    api_id = %self.api.id,
                    pending,
                    "API reactor stopped with pending requests"
                );
                return false;
            }
            debug!(api_id = %self.api.id, pending, "Waiting for pending requests");
            tokio::time::sleep(PENDING_REQUESTS_POLL_INTERVAL).await;
        }
    }

    fn prepare(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        ctx.put_attribute(ATTR_CONTEXT_PATH, ctx.request().context_path().to_string())?;
        ctx.put_attribute(ATTR_API, self.api.id.clone())?;
        ctx.put_attribute(ATTR_API_NAME, self.api.name.clone())?;

        let path_info = ctx.request().path_info().to_string();
        let metrics = ctx.metrics_mut();
        metrics.api_id = Some(self.api.id.clone());
        metrics.api_name = Some(self.api.name.clone());
        metrics.path_info = Some(path_info);
        Ok(())
    }

    fn resolve_entrypoint(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<Arc<dyn EntrypointConnector>, ExecutionError> {
        match self.entrypoints.iter().find(|e| e.matches(ctx)) {
            Some(connector) => {
                ctx.put_internal_attribute(ATTR_INTERNAL_ENTRYPOINT_CONNECTOR, connector.id().to_string());
                Ok(Arc::clone(connector))
            }
            None => Err(ctx.interrupt_with(
                ExecutionFailure::new(404)
                    .with_key(NO_ENTRYPOINT_KEY)
                    .with_message(NO_ENTRYPOINT_MESSAGE),
            )),
        }
    }

    async fn invoke_backend(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let started = now_millis();
        let result = self.invoker.invoke(ctx).await;
        ctx.metrics_mut().endpoint_response_time_ms = now_millis().saturating_sub(started);
        result
    }

    async fn handle_request(
        &self,
        ctx: &mut ExecutionContext,
        entrypoint: &mut Option<Arc<dyn EntrypointConnector>>,
    ) -> ExecutionResult {
        self.chains.before_handle.execute(ctx).await?;
        self.chains.before_security_chain.execute(ctx).await?;
        self.chains.before_api_execution.execute(ctx).await?;
        if let Some(on_message) = &self.chains.on_message {
            on_message.execute(ctx).await?;
        }

        let connector = self.resolve_entrypoint(ctx)?;
        connector.handle_request(ctx).await?;
        *entrypoint = Some(connector);

        self.invoke_backend(ctx).await?;
        self.chains.after_api_execution.execute(ctx).await
    }

    async fn process_error(&self, ctx: &mut ExecutionContext, err: ExecutionError) -> ExecutionResult {
        match err {
            ExecutionError::Interrupted => self.chains.after_api_execution.execute(ctx).await,
            ExecutionError::InterruptedWith(_) => self.chains.on_error.execute(ctx).await,
            ExecutionError::Failed(err) => {
                error!(
                    request_id = %ctx.request().id(),
                    api_id = %self.api.id,
                    error = %err,
                    "Unexpected error while handling request"
                );
                self.chains.on_error.execute(ctx).await
            }
        }
    }

    fn handle_unexpected_error(&self, ctx: &mut ExecutionContext, err: &ExecutionError) {
        error!(
            request_id = %ctx.request().id(),
            api_id = %self.api.id,
            error = %err,
            "Unexpected error while handling request"
        );
        let response = ctx.response_mut();
        response.set_status(500);
        response.set_reason(reason_phrase(500));
    }
}

#[async_trait]
impl ReactiveReactor for DefaultApiReactor {
    async fn handle(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        let _pending = PendingGuard::enter(&self.pending_requests);
        self.prepare(ctx)?;

        let mut entrypoint = None;
        let handled = match self.handle_request(ctx, &mut entrypoint).await {
            Ok(()) => Ok(true),
            Err(err) => self.process_error(ctx, err).await.map(|()| false),
        };

        let outcome = match handled {
            Ok(true) => match entrypoint {
                Some(connector) => connector.handle_response(ctx).await,
                None => Ok(()),
            },
            Ok(false) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            self.handle_unexpected_error(ctx, &err);
        }
        if let Err(err) = self.chains.after_handle.execute(ctx).await {
            self.handle_unexpected_error(ctx, &err);
        }

        let status = ctx.response().status();
        let metrics = ctx.metrics_mut();
        metrics.status = status;
        metrics.gateway_response_time_ms = metrics.elapsed_since_arrival(now_millis());
        debug!(
            request_id = %ctx.request().id(),
            api_id = %self.api.id,
            status,
            "API request handled"
        );

        ctx.response_mut().end().await?;
        Ok(())
    }
}

impl std::fmt::Debug for DefaultApiReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultApiReactor")
            .field("api", &self.api.id)
            .field("entrypoints", &self.entrypoints.len())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}
