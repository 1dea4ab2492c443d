use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::{ExecutionContext, ExecutionError, ExecutionResult};

/// A single step of a gateway phase.
///
/// Implementations stop their chain by returning the signal produced by
/// [`ExecutionContext::interrupt`] or [`ExecutionContext::interrupt_with`].
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable identifier used in logs and chain assertions.
    fn id(&self) -> &'static str;

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult;
}

/// Ordered, immutable sequence of processors for one gateway phase.
#[derive(Clone)]
pub struct ProcessorChain {
    id: &'static str,
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    #[must_use]
    pub fn new(id: &'static str, processors: Vec<Arc<dyn Processor>>) -> Self {
        Self { id, processors }
    }

    /// A chain that completes immediately.
    #[must_use]
    pub fn empty(id: &'static str) -> Self {
        Self::new(id, Vec::new())
    }

    #[must_use]
    pub fn id(&self) -> &'static str {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    #[must_use]
    pub fn processor_ids(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.id()).collect()
    }

    /// Run every processor in order, stopping at the first interruption or error.
    pub async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        for (index, processor) in self.processors.iter().enumerate() {
            debug!(
                chain_id = self.id,
                processor_id = processor.id(),
                index,
                request_id = %ctx.request().id(),
                "Executing processor"
            );
            if let Err(err) = processor.execute(ctx).await {
                match &err {
                    ExecutionError::Failed(cause) => warn!(
                        chain_id = self.id,
                        processor_id = processor.id(),
                        request_id = %ctx.request().id(),
                        error = %cause,
                        "Processor failed"
                    ),
                    _ => debug!(
                        chain_id = self.id,
                        processor_id = processor.id(),
                        request_id = %ctx.request().id(),
                        "Processor chain interrupted"
                    ),
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("id", &self.id)
            .field("processors", &self.processor_ids())
            .finish()
    }
}
