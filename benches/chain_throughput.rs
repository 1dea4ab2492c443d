#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Throughput of the per-API processor chains and of full dispatches to a
//! message API.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use gateway_dispatch::config::GatewayConfiguration;
use gateway_dispatch::context::{ExecutionContext, Request, Response};
use gateway_dispatch::definition::Api;
use gateway_dispatch::message::Message;
use gateway_dispatch::processor::ApiProcessorChainFactory;
use gateway_dispatch::reactor::{
    AcceptorTable, DefaultApiReactor, InMemoryMessageSource, MessageSourceInvoker,
};
use gateway_dispatch::transport::{RecordingResponse, ServerRequest, TransportResponse};
use gateway_dispatch::HttpRequestDispatcher;
use http::Method;

fn teams_api() -> Api {
    Api::from_yaml_str(
        r#"
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
      allowOrigin: ["https://app.example.com"]
    entrypoints:
      - type: http-get
        configuration:
          messagesLimitCount: 50
flows:
  - name: team
    selectors:
      - type: http
        path: /:teamId
analytics:
  logging:
    mode: NONE
"#,
    )
    .expect("bench definition")
}

fn request(uri: &str) -> ServerRequest {
    ServerRequest::new(Method::GET, uri)
        .with_host("api.example.com")
        .with_header("Accept", "application/json")
        .with_header("Origin", "https://app.example.com")
}

fn bench_before_api_execution_chain(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let config = GatewayConfiguration::new();
    let api = teams_api();
    let chains = ApiProcessorChainFactory::new(&config)
        .build(&api)
        .expect("chains");

    c.bench_function("before_api_execution_chain", |b| {
        b.to_async(&runtime).iter(|| {
            let chain = chains.before_api_execution.clone();
            async move {
                let mut server = request("/teams/blue/members?limit=10");
                let mut ctx = ExecutionContext::new(
                    Request::from_server_request(&mut server, "req-1".into(), "tx-1".into()),
                    Response::new(TransportResponse::new(RecordingResponse::new().boxed())),
                );
                black_box(chain.execute(&mut ctx).await.is_ok())
            }
        });
    });
}

fn bench_dispatch_message_api(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let config = GatewayConfiguration::new();
    let messages = (0..100)
        .map(|i| Message::with_id(format!("m-{i}"), format!("payload-{i}")))
        .collect();
    let source = Arc::new(InMemoryMessageSource::new(messages));
    let reactor = Arc::new(
        DefaultApiReactor::from_configuration(
            teams_api(),
            &config,
            Arc::new(MessageSourceInvoker::new(source)),
        )
        .expect("reactor"),
    );
    let dispatcher = Arc::new(HttpRequestDispatcher::new(
        &config,
        Arc::new(AcceptorTable::new(reactor.acceptors())),
    ));

    let mut group = c.benchmark_group("dispatch");
    for limit in [1_usize, 10, 50] {
        let uri = format!("/teams?limit={limit}");
        group.bench_function(format!("http_get_limit_{limit}"), |b| {
            b.to_async(&runtime).iter(|| {
                let dispatcher = Arc::clone(&dispatcher);
                let uri = uri.clone();
                async move {
                    let recorder = RecordingResponse::new();
                    let outcome = dispatcher.dispatch(request(&uri), recorder.boxed()).await;
                    black_box(outcome.is_ok())
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_before_api_execution_chain, bench_dispatch_message_api);
criterion_main!(benches);
