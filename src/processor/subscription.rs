use async_trait::async_trait;

use super::Processor;
use crate::context::attributes::{
    ATTR_CLIENT_IDENTIFIER, ATTR_INTERNAL_APPLICATION_ID, ATTR_INTERNAL_PLAN_ID,
    ATTR_INTERNAL_SUBSCRIPTION_ID,
};
use crate::context::{ExecutionContext, ExecutionResult};

/// Resolves the client identifier and copies plan/application/subscription
/// ids into the metrics.
///
/// The identifier is, in order of preference: the client identifier request
/// header, the subscription id, the transaction id. It is echoed on the
/// response under the same header.
#[derive(Debug, Clone)]
pub struct SubscriptionProcessor {
    client_identifier_header: String,
}

impl SubscriptionProcessor {
    #[must_use]
    pub fn new(client_identifier_header: impl Into<String>) -> Self {
        Self {
            client_identifier_header: client_identifier_header.into(),
        }
    }
}

#[async_trait]
impl Processor for SubscriptionProcessor {
    fn id(&self) -> &'static str {
        "subscription"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let subscription_id: Option<String> = ctx.get_internal_attribute(ATTR_INTERNAL_SUBSCRIPTION_ID);
        let plan_id: Option<String> = ctx.get_internal_attribute(ATTR_INTERNAL_PLAN_ID);
        let application_id: Option<String> = ctx.get_internal_attribute(ATTR_INTERNAL_APPLICATION_ID);

        let client_identifier = ctx
            .request()
            .headers()
            .get(&self.client_identifier_header)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| subscription_id.clone())
            .unwrap_or_else(|| ctx.request().transaction_id().to_string());

        ctx.response_mut()
            .headers_mut()
            .set(&self.client_identifier_header, client_identifier.clone());
        ctx.put_attribute(ATTR_CLIENT_IDENTIFIER, client_identifier.clone())
            .map_err(anyhow::Error::from)?;

        let metrics = ctx.metrics_mut();
        metrics.client_identifier = Some(client_identifier);
        metrics.subscription_id = subscription_id;
        metrics.plan_id = plan_id;
        metrics.application_id = application_id;
        Ok(())
    }
}
