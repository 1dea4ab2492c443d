//! # gateway-dispatch
//!
//! The request-dispatch core of an API gateway data plane: it takes an
//! already-decoded HTTP request, finds the API deployed for its host and
//! path, runs that API's processor chains around the reactor and streams the
//! response back, under a request timeout and with client-disconnect
//! cancellation.
//!
//! ## Architecture
//!
//! - **[`dispatcher`]** - acceptor resolution, execution-mode branching, timeout and termination
//! - **[`reactor`]** - reactor contracts, the acceptor table and the default API reactor
//! - **[`processor`]** - processor chains and the catalog they are assembled from
//! - **[`context`]** - per-request execution context, attribute views and metrics
//! - **[`entrypoint`]** - client-facing protocol adapters (HTTP GET message polling)
//! - **[`message`]** - messages and lazily composed message streams
//! - **[`failure`]** - execution failures, `Accept` negotiation and failure rendering
//! - **[`transport`]** - the decoded request and the end-once response handle
//! - **[`definition`]** - API definitions loaded from YAML or JSON
//! - **[`config`]** - gateway configuration from file and environment
//! - **[`logging`]** - `tracing` subscriber initialization
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant Dispatcher as HttpRequestDispatcher
//!     participant Table as AcceptorTable
//!     participant Reactor as DefaultApiReactor
//!     participant Chains as Processor chains
//!     participant Entrypoint as EntrypointConnector
//!     participant Backend as Invoker
//!
//!     Transport->>Dispatcher: dispatch(request, response)
//!     Dispatcher->>Table: resolve(host, path)
//!     alt no acceptor
//!         Dispatcher->>Chains: not-found chain
//!     else reactive acceptor
//!         Dispatcher->>Reactor: handle(ctx)
//!         Reactor->>Chains: before-api-handle, before-security-chain, before-api-execution
//!         Reactor->>Entrypoint: handle_request(ctx)
//!         Reactor->>Backend: invoke(ctx)
//!         Reactor->>Chains: after-api-execution (or api-error)
//!         Reactor->>Entrypoint: handle_response(ctx)
//!         Reactor->>Chains: after-api-handle
//!     end
//!     Dispatcher-->>Transport: DispatchOutcome
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gateway_dispatch::config::GatewayConfiguration;
//! use gateway_dispatch::definition::Api;
//! use gateway_dispatch::dispatcher::HttpRequestDispatcher;
//! use gateway_dispatch::reactor::{AcceptorTable, DefaultApiReactor, InMemoryMessageSource, MessageSourceInvoker};
//!
//! let config = GatewayConfiguration::load(None)?;
//! let api = Api::from_path("apis/orders.yaml")?;
//! let source = Arc::new(InMemoryMessageSource::default());
//! let reactor = Arc::new(DefaultApiReactor::from_configuration(
//!     api,
//!     &config,
//!     Arc::new(MessageSourceInvoker::new(source)),
//! )?);
//! let table = Arc::new(AcceptorTable::new(reactor.acceptors()));
//! let dispatcher = HttpRequestDispatcher::new(&config, table);
//! // for every decoded request:
//! let outcome = dispatcher.dispatch(request, response).await?;
//! ```

pub mod config;
pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod entrypoint;
pub mod failure;
pub mod headers;
pub mod ids;
pub mod logging;
pub mod message;
pub mod processor;
pub mod reactor;
pub mod transport;

pub use context::ExecutionContext;
pub use dispatcher::{DispatchError, DispatchOutcome, HttpRequestDispatcher};
pub use ids::generate_id;
pub use message::Message;
