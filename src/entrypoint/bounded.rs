use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::time::{Instant, Sleep};

use crate::message::{Message, MessageError, MessageStream};
use crate::transport::now_millis;

/// A message stream cut short by a count bound, a deadline, or both.
///
/// Whichever bound fires first ends the stream and drops the upstream, which
/// cancels the producer. Neither bound buffers: each element is pulled from
/// upstream only when the consumer asks for it.
pub struct BoundedMessages {
    inner: Option<MessageStream>,
    remaining: Option<usize>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl BoundedMessages {
    #[must_use]
    pub fn new(inner: MessageStream) -> Self {
        Self {
            inner: Some(inner),
            remaining: None,
            deadline: None,
        }
    }

    /// End after `count` elements.
    #[must_use]
    pub fn with_count_limit(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    /// End once `duration_ms` elapsed since `arrival_ms` (epoch millis).
    /// A zero duration disables the bound.
    #[must_use]
    pub fn with_deadline_from(mut self, arrival_ms: u64, duration_ms: u64) -> Self {
        if duration_ms > 0 {
            let left = arrival_ms
                .saturating_add(duration_ms)
                .saturating_sub(now_millis());
            self.deadline = Some(Box::pin(tokio::time::sleep_until(
                Instant::now() + Duration::from_millis(left),
            )));
        }
        self
    }

    fn finish(&mut self) -> Poll<Option<Result<Message, MessageError>>> {
        self.inner = None;
        self.deadline = None;
        Poll::Ready(None)
    }
}

impl Stream for BoundedMessages {
    type Item = Result<Message, MessageError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.inner.is_none() || this.remaining == Some(0) {
            return this.finish();
        }
        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return this.finish();
            }
        }
        let Some(inner) = this.inner.as_mut() else {
            return this.finish();
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(item)) => {
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining -= 1;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => this.finish(),
            Poll::Pending => Poll::Pending,
        }
    }
}
