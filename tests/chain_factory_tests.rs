#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for processor chain assembly
//!
//! # Test Coverage
//!
//! - Per-phase chain composition for minimal and fully featured definitions
//! - Gateway configuration switches (X-Forwarded-Prefix, not-found analytics)
//! - Invalid CORS settings rejected at build time
//! - Not-found chain contents and its reporter
//! - Behaviour of the assembled chains on a context (path parameters,
//!   path mapping, shutdown)

mod common;

use std::sync::Arc;

use common::{context, get};
use gateway_dispatch::config::{GatewayConfiguration, KEY_NOT_FOUND_ANALYTICS, KEY_X_FORWARDED_PREFIX};
use gateway_dispatch::context::Metrics;
use gateway_dispatch::definition::Api;
use gateway_dispatch::dispatcher::{DispatchOutcome, HttpRequestDispatcher};
use gateway_dispatch::processor::notfound::Reporter;
use gateway_dispatch::processor::shutdown::NodeState;
use gateway_dispatch::processor::{
    ApiProcessorChainFactory, ChainFactoryError, NotFoundProcessorChainFactory,
    CHAIN_AFTER_API_EXECUTION, CHAIN_API_ERROR, CHAIN_API_MESSAGE, CHAIN_BEFORE_API_HANDLE,
    CHAIN_NOT_FOUND,
};
use gateway_dispatch::reactor::AcceptorTable;
use gateway_dispatch::transport::RecordingResponse;
use parking_lot::Mutex;

const MINIMAL: &str = r#"
id: orders
name: Orders
listeners:
  - type: http
    paths:
      - path: /orders
"#;

const FULL: &str = r#"
id: teams
name: Teams
type: message
listeners:
  - type: http
    paths:
      - path: /teams
    pathMappings:
      - /:teamId/members
    cors:
      enabled: true
      allowOrigin: ["https://console.example.com"]
    entrypoints:
      - type: http-get
flows:
  - name: team
    selectors:
      - type: http
        path: /:teamId
analytics:
  logging:
    mode: CLIENT_PROXY
"#;

#[test]
fn test_minimal_definition_gets_the_fixed_processors_only() {
    let factory = ApiProcessorChainFactory::new(&GatewayConfiguration::new());
    let chains = factory.build(&Api::from_yaml_str(MINIMAL).unwrap()).unwrap();

    assert!(chains.before_handle.is_empty());
    assert_eq!(chains.before_handle.id(), CHAIN_BEFORE_API_HANDLE);
    assert!(chains.before_security_chain.is_empty());
    assert_eq!(chains.before_api_execution.processor_ids(), vec!["subscription"]);
    assert_eq!(chains.after_api_execution.id(), CHAIN_AFTER_API_EXECUTION);
    assert_eq!(
        chains.after_api_execution.processor_ids(),
        vec!["shutdown", "transaction-post"]
    );
    assert_eq!(chains.on_error.id(), CHAIN_API_ERROR);
    assert_eq!(
        chains.on_error.processor_ids(),
        vec!["shutdown", "transaction-post", "simple-failure"]
    );
    assert!(chains.after_handle.is_empty());
    assert!(chains.on_message.is_none());
}

#[test]
fn test_full_definition_appends_every_conditional_processor() {
    let config = GatewayConfiguration::new().with_property(KEY_X_FORWARDED_PREFIX, "true");
    let factory = ApiProcessorChainFactory::new(&config);
    let chains = factory.build(&Api::from_yaml_str(FULL).unwrap()).unwrap();

    assert_eq!(chains.before_handle.processor_ids(), vec!["log-init", "log-request"]);
    assert_eq!(chains.before_security_chain.processor_ids(), vec!["cors-preflight"]);
    assert_eq!(
        chains.before_api_execution.processor_ids(),
        vec!["x-forwarded-prefix", "path-parameters", "subscription", "path-mapping"]
    );
    assert_eq!(
        chains.after_api_execution.processor_ids(),
        vec!["shutdown", "transaction-post", "cors-simple-request"]
    );
    assert_eq!(
        chains.on_error.processor_ids(),
        vec!["shutdown", "transaction-post", "simple-failure"]
    );
    assert_eq!(chains.after_handle.processor_ids(), vec!["log-response"]);
    let on_message = chains.on_message.unwrap();
    assert_eq!(on_message.id(), CHAIN_API_MESSAGE);
    assert_eq!(on_message.processor_ids(), vec!["simple-failure-message"]);
}

#[test]
fn test_disabled_cors_adds_nothing() {
    let api = Api::from_yaml_str(
        r#"
id: orders
name: Orders
listeners:
  - type: http
    paths:
      - path: /orders
    cors:
      enabled: false
      allowOrigin: ["*"]
"#,
    )
    .unwrap();
    let factory = ApiProcessorChainFactory::new(&GatewayConfiguration::new());

    assert!(factory.before_security_chain(&api).unwrap().is_empty());
    assert_eq!(
        factory.after_api_execution(&api).unwrap().processor_ids(),
        vec!["shutdown", "transaction-post"]
    );
}

#[test]
fn test_wildcard_origin_with_credentials_is_rejected() {
    let api = Api::from_yaml_str(
        r#"
id: orders
name: Orders
listeners:
  - type: http
    paths:
      - path: /orders
    cors:
      enabled: true
      allowOrigin: ["*"]
      allowCredentials: true
"#,
    )
    .unwrap();
    let factory = ApiProcessorChainFactory::new(&GatewayConfiguration::new());

    assert!(matches!(factory.build(&api), Err(ChainFactoryError::Cors(_))));
}

#[tokio::test]
async fn test_path_parameters_and_mapping_are_applied() {
    let factory = ApiProcessorChainFactory::new(&GatewayConfiguration::new());
    let chain = factory
        .before_api_execution(&Api::from_yaml_str(FULL).unwrap())
        .unwrap();
    let (mut ctx, _recorder) = context(get("/teams/blue/members"));
    ctx.request_mut().set_context_path("/teams/");

    chain.execute(&mut ctx).await.unwrap();

    assert_eq!(ctx.request().path_parameter("teamId"), Some("blue"));
    assert_eq!(ctx.metrics().mapped_path.as_deref(), Some("/:teamId/members"));
}

#[tokio::test]
async fn test_x_forwarded_prefix_rewrites_context_path() {
    let config = GatewayConfiguration::new().with_property(KEY_X_FORWARDED_PREFIX, "true");
    let factory = ApiProcessorChainFactory::new(&config);
    let chain = factory
        .before_api_execution(&Api::from_yaml_str(MINIMAL).unwrap())
        .unwrap();
    let (mut ctx, _recorder) = context(get("/orders/1").with_header("X-Forwarded-Prefix", "/edge"));
    ctx.request_mut().set_context_path("/orders/");

    chain.execute(&mut ctx).await.unwrap();

    assert_eq!(ctx.request().context_path(), "/edge/orders/");
}

#[tokio::test]
async fn test_shutting_down_node_closes_connections() {
    let node = NodeState::new();
    let factory =
        ApiProcessorChainFactory::new(&GatewayConfiguration::new()).with_node_state(Arc::clone(&node));
    let chain = factory
        .after_api_execution(&Api::from_yaml_str(MINIMAL).unwrap())
        .unwrap();

    let (mut ctx, _recorder) = context(get("/orders"));
    chain.execute(&mut ctx).await.unwrap();
    assert!(ctx.response().headers().get("connection").is_none());

    node.begin_shutdown();
    let (mut ctx, _recorder) = context(get("/orders"));
    chain.execute(&mut ctx).await.unwrap();
    assert_eq!(ctx.response().headers().get("connection"), Some("close"));
    assert_eq!(ctx.response().headers().get("X-Gravitee-Transaction-Id"), Some("tx-1"));
    assert_eq!(ctx.response().headers().get("X-Gravitee-Request-Id"), Some("req-1"));
}

#[test]
fn test_not_found_chain_composition() {
    let chain = NotFoundProcessorChainFactory::new(&GatewayConfiguration::new()).processor_chain();
    assert_eq!(chain.id(), CHAIN_NOT_FOUND);
    assert_eq!(chain.processor_ids(), vec!["not-found", "response-time"]);

    let config = GatewayConfiguration::new().with_property(KEY_NOT_FOUND_ANALYTICS, "true");
    let chain = NotFoundProcessorChainFactory::new(&config).processor_chain();
    assert_eq!(
        chain.processor_ids(),
        vec!["not-found", "response-time", "not-found-reporter"]
    );
}

#[derive(Default)]
struct CollectingReporter(Mutex<Vec<Metrics>>);

impl Reporter for CollectingReporter {
    fn report(&self, metrics: &Metrics) {
        self.0.lock().push(metrics.clone());
    }
}

#[tokio::test]
async fn test_not_found_reporter_receives_metrics() {
    let reporter = Arc::new(CollectingReporter::default());
    let config = GatewayConfiguration::new().with_property(KEY_NOT_FOUND_ANALYTICS, "true");
    let chain = NotFoundProcessorChainFactory::new(&config)
        .with_reporter(Arc::clone(&reporter) as Arc<dyn Reporter>)
        .processor_chain();
    let dispatcher = HttpRequestDispatcher::new(&config, Arc::new(AcceptorTable::default()))
        .with_not_found_chain(chain);

    let outcome = dispatcher
        .dispatch(get("/missing"), RecordingResponse::new().boxed())
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::NotFound);
    let reported = reporter.0.lock();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].status, 404);
    assert_eq!(reported[0].uri, "/missing");
}
