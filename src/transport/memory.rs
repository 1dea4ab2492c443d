use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{ServerResponse, TransportError};
use crate::headers::HttpHeaders;

/// Everything a [`RecordingResponse`] has seen.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub status: Option<u16>,
    pub reason: Option<String>,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
    pub chunks: usize,
    pub head_count: usize,
    pub end_count: usize,
}

impl Recorded {
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// In-memory [`ServerResponse`] that records the exchange.
///
/// Clones share the recording, so one clone can be handed to the dispatcher
/// while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct RecordingResponse {
    state: Arc<Mutex<Recorded>>,
}

impl RecordingResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn boxed(&self) -> Box<dyn ServerResponse> {
        Box::new(self.clone())
    }

    #[must_use]
    pub fn snapshot(&self) -> Recorded {
        self.state.lock().clone()
    }
}

#[async_trait]
impl ServerResponse for RecordingResponse {
    fn write_head(
        &mut self,
        status: u16,
        reason: Option<&str>,
        headers: &HttpHeaders,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.status = Some(status);
        state.reason = reason.map(str::to_string);
        state.headers = headers.clone();
        state.head_count += 1;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.end_count > 0 {
            return Err(TransportError::AlreadyEnded);
        }
        state.body.extend_from_slice(&chunk);
        state.chunks += 1;
        Ok(())
    }

    async fn end(&mut self) -> Result<(), TransportError> {
        self.state.lock().end_count += 1;
        Ok(())
    }
}
