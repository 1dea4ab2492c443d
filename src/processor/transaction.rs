use async_trait::async_trait;

use super::Processor;
use crate::context::{ExecutionContext, ExecutionResult};

/// Echoes the transaction and request ids on the response.
#[derive(Debug, Clone)]
pub struct TransactionPostProcessor {
    transaction_header: String,
    request_header: String,
}

impl TransactionPostProcessor {
    #[must_use]
    pub fn new(transaction_header: impl Into<String>, request_header: impl Into<String>) -> Self {
        Self {
            transaction_header: transaction_header.into(),
            request_header: request_header.into(),
        }
    }
}

#[async_trait]
impl Processor for TransactionPostProcessor {
    fn id(&self) -> &'static str {
        "transaction-post"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let transaction_id = ctx.request().transaction_id().to_string();
        let request_id = ctx.request().id().to_string();
        let headers = ctx.response_mut().headers_mut();
        headers.set(&self.transaction_header, transaction_id);
        headers.set(&self.request_header, request_id);
        Ok(())
    }
}
