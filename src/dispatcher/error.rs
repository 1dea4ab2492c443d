use crate::transport::TransportError;

/// How a dispatched request finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reactor handled the request.
    Completed,
    /// No acceptor matched; the not-found chain produced the response.
    NotFound,
    /// The request timeout fired and the timeout response was produced.
    TimedOut,
    /// The client went away before the response completed.
    ClientClosed,
}

/// A dispatch that failed. The transport layer logs it and closes the connection.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The reactor failed; the message is the reactor's own.
    #[error(transparent)]
    Reactor(anyhow::Error),
    #[error("legacy reactor panicked: {0}")]
    LegacyPanic(String),
    #[error("legacy reactor dropped its completion handler")]
    LegacyCompletionDropped,
    #[error("not-found chain failed: {0}")]
    NotFoundChain(#[source] anyhow::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
