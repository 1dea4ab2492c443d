//! # Dispatcher Module
//!
//! [`HttpRequestDispatcher`] is where every decoded request enters the
//! gateway core. For each request it:
//!
//! 1. pauses the request body and assigns the transaction and request ids
//! 2. resolves `(host, path)` against the [`AcceptorTable`](crate::reactor::AcceptorTable)
//! 3. builds the [`ExecutionContext`](crate::context::ExecutionContext) and its metrics
//! 4. runs the not-found chain on a miss, or the acceptor's reactor otherwise
//! 5. races the execution against the request timeout and client disconnection
//!
//! ## Execution modes
//!
//! | Mode | Contract | Completion |
//! |------|----------|------------|
//! | `V3` | [`LegacyReactor`](crate::reactor::LegacyReactor) | callback; panics and sync errors become [`DispatchError`] |
//! | `Reactive` | [`ReactiveReactor`](crate::reactor::ReactiveReactor) | awaited; failures propagate unchanged |
//!
//! ## Termination
//!
//! Whatever the path, the transport response is ended exactly once. The
//! handler writes through a timeout-aware view of the response; when the
//! timeout fires before anything was written, that view is gated, late
//! writes are dropped and a 504 `REQUEST_TIMEOUT` failure is rendered with
//! the client's `Accept` header. A response that is already streaming keeps
//! going for the grace delay, then is force-ended.
//!
//! Client disconnection cancels the execution future, which drops every
//! message stream subscription tied to the request.

mod core;
mod error;

pub use core::{HttpRequestDispatcher, REQUEST_TIMEOUT_KEY, REQUEST_TIMEOUT_MESSAGE};
pub use error::{DispatchError, DispatchOutcome};
