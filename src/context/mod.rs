//! # Execution Context Module
//!
//! One [`ExecutionContext`] exists per inbound request. It is created by the
//! dispatcher, threaded through every processor chain and the reactor, and
//! dropped once the response has been ended or the client went away.
//!
//! ## Contents
//!
//! - [`Request`] / [`Response`]: the two sides of the exchange, each with a
//!   lazily composed message stream
//! - attributes: a public view and an internal view over one
//!   [`AttributeStore`]; see [`attributes`]
//! - [`Metrics`]: identifiers and timings reported at the end of the request
//! - the interrupt slot: [`ExecutionContext::interrupt`] and
//!   [`ExecutionContext::interrupt_with`] return the [`ExecutionError`] a
//!   processor propagates to stop its chain
//!
//! ## Interrupt protocol
//!
//! ```rust,ignore
//! async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
//!     if ctx.request().headers().get("x-api-key").is_none() {
//!         return Err(ctx.interrupt_with(ExecutionFailure::new(401).with_key("API_KEY_MISSING")));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The failure is stored in the internal attribute
//! [`ATTR_INTERNAL_EXECUTION_FAILURE`](attributes::ATTR_INTERNAL_EXECUTION_FAILURE),
//! where the error processors and the failure message processor read it.

pub mod attributes;
mod core;
mod metrics;
mod request;
mod response;

pub use attributes::{AttributeError, AttributeStore, InternalAttributes, PublicAttributes};
pub use core::{ExecutionContext, ExecutionError, ExecutionResult};
pub use metrics::Metrics;
pub use request::Request;
pub use response::{Response, ResponseBody};
