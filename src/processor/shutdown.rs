use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::Processor;
use crate::context::{ExecutionContext, ExecutionResult};

/// Lifecycle flag of the gateway node, shared by every API of the node.
#[derive(Debug, Default)]
pub struct NodeState {
    stopping: AtomicBool,
}

impl NodeState {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin_shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Back to running, e.g. after a restart of the node services.
    pub fn reset(&self) {
        self.stopping.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Asks clients to close their connection once the node is stopping.
#[derive(Debug, Clone)]
pub struct ShutdownProcessor {
    node: Arc<NodeState>,
}

impl ShutdownProcessor {
    #[must_use]
    pub fn new(node: Arc<NodeState>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Processor for ShutdownProcessor {
    fn id(&self) -> &'static str {
        "shutdown"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        if self.node.is_stopping() {
            ctx.response_mut().headers_mut().set("connection", "close");
        }
        Ok(())
    }
}
