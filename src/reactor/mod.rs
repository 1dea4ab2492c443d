//! # Reactor Module
//!
//! A reactor executes the gateway pipeline for one deployed API. Two reactor
//! contracts coexist while APIs migrate from the legacy engine:
//!
//! - [`LegacyReactor`]: takes ownership of the context and reports completion
//!   through a callback, possibly from another task
//! - [`ReactiveReactor`]: an async `handle` that completes or fails exactly once
//!
//! The dispatcher never sees either contract directly: an [`Acceptor`] holds
//! a [`ReactorHandler`] and the dispatcher matches on it once.
//!
//! ## Routing
//!
//! [`AcceptorTable`] maps `(host, path)` to acceptors. Readers load an
//! immutable snapshot; updates swap the whole sorted table atomically so a
//! resolution racing an update sees either the old or the new mapping.

mod acceptor;
mod api;
mod invoker;

pub use acceptor::{Acceptor, AcceptorTable};
pub use api::{DefaultApiReactor, ReactorError, NO_ENTRYPOINT_KEY};
pub use invoker::{InMemoryMessageSource, Invoker, MessageSource, MessageSourceInvoker};

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;

/// How the dispatcher drives the reactor of a resolved acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Callback-style legacy engine.
    V3,
    /// Async reactor.
    Reactive,
}

/// Completion callback handed to a legacy reactor.
pub type LegacyCompletion = Box<dyn FnOnce(ExecutionContext) + Send>;

/// Callback-style reactor contract.
///
/// `handle` takes the context by value and must eventually pass it back
/// through `on_complete`. An `Err` returned synchronously is a dispatch
/// failure; `on_complete` is then never expected to fire.
pub trait LegacyReactor: Send + Sync {
    fn handle(&self, ctx: ExecutionContext, on_complete: LegacyCompletion) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReactiveReactor: Send + Sync {
    async fn handle(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()>;
}

/// The reactor behind an acceptor, tagged with its contract.
#[derive(Clone)]
pub enum ReactorHandler {
    Legacy(Arc<dyn LegacyReactor>),
    Reactive(Arc<dyn ReactiveReactor>),
}

impl ReactorHandler {
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        match self {
            ReactorHandler::Legacy(_) => ExecutionMode::V3,
            ReactorHandler::Reactive(_) => ExecutionMode::Reactive,
        }
    }
}

impl std::fmt::Debug for ReactorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReactorHandler::Legacy(_) => f.write_str("ReactorHandler::Legacy"),
            ReactorHandler::Reactive(_) => f.write_str("ReactorHandler::Reactive"),
        }
    }
}
