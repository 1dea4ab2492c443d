use std::any::Any;

use super::attributes::{
    AttributeError, AttributeStore, InternalAttributes, PublicAttributes,
    ATTR_INTERNAL_EXECUTION_FAILURE, ATTR_REQUEST_ID, ATTR_TRANSACTION_ID,
};
use super::{Metrics, Request, Response};
use crate::failure::ExecutionFailure;
use crate::message::MessageError;
use crate::transport::TransportError;

/// Signal returned by a processor or reactor step that did not complete normally.
///
/// Interruptions are expected control flow: the remaining processors of the
/// chain are skipped and the caller decides what runs next. `Failed` is an
/// unrecoverable error propagated unchanged to the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution interrupted")]
    Interrupted,
    #[error("execution interrupted with status {}", .0.status_code())]
    InterruptedWith(ExecutionFailure),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ExecutionError {
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        !matches!(self, ExecutionError::Failed(_))
    }
}

impl From<TransportError> for ExecutionError {
    fn from(err: TransportError) -> Self {
        ExecutionError::Failed(err.into())
    }
}

pub type ExecutionResult = Result<(), ExecutionError>;

/// Per-request mutable state, exclusively owned by the dispatch pipeline.
#[derive(Debug)]
pub struct ExecutionContext {
    request: Request,
    response: Response,
    attributes: AttributeStore,
    metrics: Metrics,
    interrupted: bool,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(request: Request, response: Response) -> Self {
        Self::with_store(request, response, AttributeStore::new())
    }

    /// Build a context over an existing attribute store.
    ///
    /// The request and transaction ids are published as attributes.
    #[must_use]
    pub fn with_store(request: Request, response: Response, attributes: AttributeStore) -> Self {
        let public = attributes.public();
        for (key, value) in [
            (ATTR_REQUEST_ID, request.id().to_string()),
            (ATTR_TRANSACTION_ID, request.transaction_id().to_string()),
        ] {
            if let Err(err) = public.put(key, value) {
                tracing::debug!(key, error = %err, "Skipping id attribute");
            }
        }
        Self {
            request,
            response,
            attributes,
            metrics: Metrics::default(),
            interrupted: false,
        }
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    /// The shared backing store, for adapters that need their own view.
    #[must_use]
    pub fn attribute_store(&self) -> &AttributeStore {
        &self.attributes
    }

    #[must_use]
    pub fn attributes(&self) -> PublicAttributes {
        self.attributes.public()
    }

    #[must_use]
    pub fn internal_attributes(&self) -> InternalAttributes {
        self.attributes.internal()
    }

    #[must_use]
    pub fn get_attribute<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.attributes.public().get(key)
    }

    pub fn put_attribute<T: Any + Send + Sync>(&self, key: &str, value: T) -> Result<(), AttributeError> {
        self.attributes.public().put(key, value)
    }

    pub fn remove_attribute(&self, key: &str) -> bool {
        self.attributes.public().remove(key)
    }

    #[must_use]
    pub fn get_internal_attribute<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.attributes.internal().get(key)
    }

    pub fn put_internal_attribute<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.attributes.internal().put(key, value);
    }

    pub fn remove_internal_attribute(&self, key: &str) -> bool {
        self.attributes.internal().remove(key)
    }

    /// Mark the context interrupted without a failure.
    ///
    /// Return the result from the processor so the chain stops:
    /// `return Err(ctx.interrupt());`
    pub fn interrupt(&mut self) -> ExecutionError {
        self.interrupted = true;
        ExecutionError::Interrupted
    }

    /// Store `failure` in the internal failure slot and mark the context interrupted.
    pub fn interrupt_with(&mut self, failure: ExecutionFailure) -> ExecutionError {
        self.interrupted = true;
        self.put_internal_attribute(ATTR_INTERNAL_EXECUTION_FAILURE, failure.clone());
        ExecutionError::InterruptedWith(failure)
    }

    /// Error to end a message stream with, without a failure.
    #[must_use]
    pub fn interrupt_messages(&self) -> MessageError {
        MessageError::Interrupted
    }

    /// Store `failure` and return the error that ends a message stream with it.
    #[must_use]
    pub fn interrupt_messages_with(&self, failure: ExecutionFailure) -> MessageError {
        self.put_internal_attribute(ATTR_INTERNAL_EXECUTION_FAILURE, failure.clone());
        MessageError::InterruptedWith(failure)
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// The failure stored by the last `interrupt_with`, if any.
    #[must_use]
    pub fn execution_failure(&self) -> Option<ExecutionFailure> {
        self.get_internal_attribute(ATTR_INTERNAL_EXECUTION_FAILURE)
    }
}
