use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{ServerResponse, TransportError};
use crate::headers::HttpHeaders;

struct Shared {
    sink: Mutex<Box<dyn ServerResponse>>,
    head_written: AtomicBool,
    ended: AtomicBool,
    bytes_written: AtomicU64,
}

/// Cloneable handle over a [`ServerResponse`] sink.
///
/// Every clone writes to the same sink; the head and the end reach the sink
/// at most once. Handles created by [`TransportResponse::timeout_aware`]
/// additionally check a [`TimeoutGate`] and silently drop every operation
/// once it is closed.
#[derive(Clone)]
pub struct TransportResponse {
    shared: Arc<Shared>,
    gate: Option<TimeoutGate>,
}

/// Closing the gate turns the associated handle into a no-op sink.
#[derive(Clone, Default, Debug)]
pub struct TimeoutGate(Arc<AtomicBool>);

impl TimeoutGate {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl TransportResponse {
    #[must_use]
    pub fn new(sink: Box<dyn ServerResponse>) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink: Mutex::new(sink),
                head_written: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                bytes_written: AtomicU64::new(0),
            }),
            gate: None,
        }
    }

    /// A handle over the same sink whose operations are ignored once the
    /// returned gate is closed.
    #[must_use]
    pub fn timeout_aware(&self) -> (TransportResponse, TimeoutGate) {
        let gate = TimeoutGate::default();
        let handle = TransportResponse {
            shared: Arc::clone(&self.shared),
            gate: Some(gate.clone()),
        };
        (handle, gate)
    }

    fn gated(&self) -> bool {
        self.gate.as_ref().is_some_and(TimeoutGate::is_closed)
    }

    /// Whether the head has been sent.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.shared.head_written.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::Relaxed)
    }

    /// Send the head unless it was already sent. Returns whether this call sent it.
    pub async fn write_head(
        &self,
        status: u16,
        reason: Option<&str>,
        headers: &HttpHeaders,
    ) -> Result<bool, TransportError> {
        if self.gated() {
            trace!(status, "Dropping head write on timed-out response");
            return Ok(false);
        }
        let mut sink = self.shared.sink.lock().await;
        if self.shared.head_written.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        sink.write_head(status, reason, headers)?;
        Ok(true)
    }

    /// Write a body chunk, sending a default head first if needed.
    pub async fn write(&self, chunk: Bytes) -> Result<(), TransportError> {
        if self.gated() {
            trace!(len = chunk.len(), "Dropping late write on timed-out response");
            return Ok(());
        }
        if self.is_ended() {
            return Err(TransportError::AlreadyEnded);
        }
        if !self.is_committed() {
            self.write_head(200, None, &HttpHeaders::new()).await?;
        }
        let len = chunk.len() as u64;
        let mut sink = self.shared.sink.lock().await;
        sink.write(chunk).await?;
        self.shared.bytes_written.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// End the response. Returns whether this call ended it.
    pub async fn end(&self) -> Result<bool, TransportError> {
        if self.gated() {
            trace!("Dropping end on timed-out response");
            return Ok(false);
        }
        if self.shared.ended.swap(true, Ordering::SeqCst) {
            debug!("Response already ended");
            return Ok(false);
        }
        let mut sink = self.shared.sink.lock().await;
        if !self.shared.head_written.swap(true, Ordering::SeqCst) {
            sink.write_head(200, None, &HttpHeaders::new())?;
        }
        sink.end().await?;
        Ok(true)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("committed", &self.is_committed())
            .field("ended", &self.is_ended())
            .field("gated", &self.gated())
            .finish()
    }
}
