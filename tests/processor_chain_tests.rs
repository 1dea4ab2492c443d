#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for processor chain execution
//!
//! # Test Coverage
//!
//! - Processors run in declaration order
//! - A bare interruption stops the chain without a failure
//! - An interruption with a failure stores it in the context
//! - A failed processor stops the chain and propagates its error unchanged
//! - Empty chains complete immediately

mod common;

use std::sync::Arc;

use common::{context, get, JournalProcessor, Outcome};
use gateway_dispatch::context::ExecutionError;
use gateway_dispatch::processor::{Processor, ProcessorChain};
use parking_lot::Mutex;

fn chain(journal: &Arc<Mutex<Vec<&'static str>>>, steps: &[(&'static str, Outcome)]) -> ProcessorChain {
    let processors: Vec<Arc<dyn Processor>> = steps
        .iter()
        .map(|(name, outcome)| JournalProcessor::new(*name, journal, *outcome) as Arc<dyn Processor>)
        .collect();
    ProcessorChain::new("test-chain", processors)
}

#[tokio::test]
async fn test_processors_run_in_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let chain = chain(
        &journal,
        &[("first", Outcome::Continue), ("second", Outcome::Continue), ("third", Outcome::Continue)],
    );
    let (mut ctx, _recorder) = context(get("/teams"));

    chain.execute(&mut ctx).await.unwrap();

    assert_eq!(*journal.lock(), vec!["first", "second", "third"]);
    assert_eq!(chain.len(), 3);
    assert_eq!(chain.processor_ids(), vec!["first", "second", "third"]);
    assert!(!ctx.is_interrupted());
}

#[tokio::test]
async fn test_interrupt_stops_the_chain() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let chain = chain(
        &journal,
        &[("first", Outcome::Interrupt), ("second", Outcome::Continue)],
    );
    let (mut ctx, _recorder) = context(get("/teams"));

    let err = chain.execute(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ExecutionError::Interrupted));
    assert!(err.is_interruption());
    assert_eq!(*journal.lock(), vec!["first"]);
    assert!(ctx.is_interrupted());
    assert!(ctx.execution_failure().is_none());
}

#[tokio::test]
async fn test_interrupt_with_failure_is_stored() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let chain = chain(
        &journal,
        &[("guard", Outcome::InterruptWith(403)), ("never", Outcome::Continue)],
    );
    let (mut ctx, _recorder) = context(get("/teams"));

    let err = chain.execute(&mut ctx).await.unwrap_err();

    match err {
        ExecutionError::InterruptedWith(failure) => assert_eq!(failure.status_code(), 403),
        other => panic!("unexpected result: {other:?}"),
    }
    let stored = ctx.execution_failure().unwrap();
    assert_eq!(stored.status_code(), 403);
    assert_eq!(stored.message(), Some("stopped"));
    assert_eq!(*journal.lock(), vec!["guard"]);
}

#[tokio::test]
async fn test_failure_propagates_unchanged() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let chain = chain(
        &journal,
        &[("ok", Outcome::Continue), ("broken", Outcome::Fail), ("never", Outcome::Continue)],
    );
    let (mut ctx, _recorder) = context(get("/teams"));

    let err = chain.execute(&mut ctx).await.unwrap_err();

    assert!(!err.is_interruption());
    assert_eq!(err.to_string(), "processor broken failed");
    assert_eq!(*journal.lock(), vec!["ok", "broken"]);
    assert!(!ctx.is_interrupted());
}

#[tokio::test]
async fn test_empty_chain_completes() {
    let chain = ProcessorChain::empty("nothing");
    let (mut ctx, _recorder) = context(get("/teams"));

    chain.execute(&mut ctx).await.unwrap();

    assert!(chain.is_empty());
    assert_eq!(chain.id(), "nothing");
}
