#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for the failure rendering processors
//!
//! # Test Coverage
//!
//! - `SimpleFailureProcessor` renders the stored failure per `Accept`
//! - A committed response is left untouched
//! - `SimpleFailureMessageProcessor` splices one terminal error message into
//!   the response stream, whether the interruption happened on the request
//!   or on the response side
//! - A bare request-side interruption yields exactly one plain-text 500

mod common;

use bytes::Bytes;
use common::{context, get, message_stream};
use futures::StreamExt;
use gateway_dispatch::failure::ExecutionFailure;
use gateway_dispatch::headers::HttpHeaders;
use gateway_dispatch::message::{Message, MessageError};
use gateway_dispatch::processor::failure::{
    SimpleFailureMessageProcessor, SimpleFailureProcessor, METADATA_STATUS_CODE,
};
use gateway_dispatch::processor::Processor;
use serde_json::{json, Value};

async fn collect(stream: gateway_dispatch::message::MessageStream) -> Vec<Message> {
    stream
        .map(|item| item.unwrap())
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn test_stored_failure_is_rendered_as_json() {
    let (mut ctx, _recorder) = context(get("/teams").with_header("Accept", "application/json"));
    let _interrupted = ctx.interrupt_with(
        ExecutionFailure::new(429)
            .with_key("RATE_LIMIT_TOO_MANY_REQUESTS")
            .with_message("Slow down")
            .with_parameter("limit", 10),
    );

    SimpleFailureProcessor.execute(&mut ctx).await.unwrap();

    let response = ctx.response();
    assert_eq!(response.status(), 429);
    assert_eq!(response.reason(), Some("Too Many Requests"));
    assert_eq!(response.headers().get("content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(response.buffered_body().unwrap()).unwrap();
    assert_eq!(
        body,
        json!({
            "message": "Slow down",
            "http_status_code": 429,
            "key": "RATE_LIMIT_TOO_MANY_REQUESTS",
            "parameters": {"limit": 10}
        })
    );
    assert_eq!(ctx.metrics().error_key.as_deref(), Some("RATE_LIMIT_TOO_MANY_REQUESTS"));
    assert_eq!(ctx.metrics().error_message.as_deref(), Some("Slow down"));
}

#[tokio::test]
async fn test_missing_failure_renders_plain_500() {
    let (mut ctx, _recorder) = context(get("/teams"));

    SimpleFailureProcessor.execute(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().status(), 500);
    assert_eq!(
        ctx.response().buffered_body(),
        Some(&Bytes::from_static(b"Internal Server Error"))
    );
}

#[tokio::test]
async fn test_committed_response_is_not_rewritten() {
    let (mut ctx, recorder) = context(get("/teams"));
    ctx.response()
        .transport()
        .write_head(200, None, &HttpHeaders::new())
        .await
        .unwrap();
    let _interrupted = ctx.interrupt_with(ExecutionFailure::new(502).with_message("Bad upstream"));

    SimpleFailureProcessor.execute(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().status(), 200);
    assert!(ctx.response().buffered_body().is_none());
    assert_eq!(recorder.snapshot().status, Some(200));
}

#[tokio::test]
async fn test_request_side_interruption_is_spliced_into_response() {
    let (mut ctx, _recorder) = context(get("/teams").with_header("Accept", "application/json"));
    SimpleFailureMessageProcessor.execute(&mut ctx).await.unwrap();

    ctx.request_mut().set_messages(message_stream(vec![
        Ok(Message::with_id("in-1", "first")),
        Err(MessageError::InterruptedWith(
            ExecutionFailure::new(401).with_message("denied"),
        )),
        Ok(Message::with_id("in-2", "never")),
    ]));
    ctx.response_mut().set_messages(message_stream(vec![
        Ok(Message::with_id("out-1", "reply")),
    ]));

    let forwarded = collect(ctx.request_mut().messages()).await;
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].id(), "in-1");

    let delivered = collect(ctx.response_mut().messages()).await;
    assert_eq!(delivered.len(), 1, "error message must end the response stream");
    let error = &delivered[0];
    assert!(error.is_error());
    assert_eq!(error.metadata().get(METADATA_STATUS_CODE), Some(&json!(401)));
    assert_eq!(error.headers().get("content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(error.content()).unwrap();
    assert_eq!(body["message"], "denied");
}

#[tokio::test]
async fn test_bare_request_side_interruption_yields_one_plain_500() {
    let (mut ctx, _recorder) = context(get("/teams"));
    SimpleFailureMessageProcessor.execute(&mut ctx).await.unwrap();

    ctx.request_mut().set_messages(message_stream(vec![
        Err(MessageError::Interrupted),
        Ok(Message::with_id("in-2", "never")),
    ]));
    ctx.response_mut().set_messages(message_stream(vec![
        Ok(Message::with_id("out-1", "reply")),
        Ok(Message::with_id("out-2", "reply")),
    ]));

    let forwarded = collect(ctx.request_mut().messages()).await;
    assert!(forwarded.is_empty());

    let delivered = collect(ctx.response_mut().messages()).await;
    assert_eq!(delivered.len(), 1);
    let error = &delivered[0];
    assert!(error.is_error());
    assert_eq!(error.metadata().get(METADATA_STATUS_CODE), Some(&json!(500)));
    assert_eq!(error.content_str(), "Internal Server Error");
    assert_eq!(error.headers().get("content-type"), Some("text/plain"));
    assert_eq!(error.headers().get("content-length"), Some("21"));
}

#[tokio::test]
async fn test_response_side_interruption_becomes_error_message() {
    let (mut ctx, _recorder) = context(get("/teams"));
    SimpleFailureMessageProcessor.execute(&mut ctx).await.unwrap();

    ctx.response_mut().set_messages(message_stream(vec![
        Ok(Message::with_id("out-1", "reply")),
        Err(MessageError::Interrupted),
        Ok(Message::with_id("out-2", "never")),
    ]));

    let delivered = collect(ctx.response_mut().messages()).await;

    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].id(), "out-1");
    assert!(!delivered[0].is_error());
    assert!(delivered[1].is_error());
    assert_eq!(delivered[1].metadata().get(METADATA_STATUS_CODE), Some(&json!(500)));
    assert_eq!(delivered[1].content_str(), "Internal Server Error");
}

#[tokio::test]
async fn test_untouched_streams_pass_through() {
    let (mut ctx, _recorder) = context(get("/teams"));
    SimpleFailureMessageProcessor.execute(&mut ctx).await.unwrap();

    ctx.response_mut().set_messages(message_stream(vec![
        Ok(Message::with_id("a", "1")),
        Ok(Message::with_id("b", "2")),
    ]));

    let delivered = collect(ctx.response_mut().messages()).await;
    let ids: Vec<&str> = delivered.iter().map(Message::id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}
