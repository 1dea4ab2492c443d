//! # Processor Module
//!
//! A [`Processor`] is a single named unit of pipeline behavior. Processors are
//! grouped into [`ProcessorChain`]s, one per gateway phase, and chains are
//! assembled by [`ApiProcessorChainFactory`] / [`NotFoundProcessorChainFactory`]
//! once per API deployment.
//!
//! ## Execution
//!
//! A chain runs its processors strictly in order against one
//! [`ExecutionContext`](crate::context::ExecutionContext). The first processor
//! returning `Err` stops the chain and the error is handed back unchanged:
//!
//! - `ExecutionError::Interrupted` / `InterruptedWith(_)`: expected control flow
//! - `ExecutionError::Failed(_)`: unrecoverable, never swallowed
//!
//! ## Catalog
//!
//! | Id | Phase |
//! |----|-------|
//! | `log-init`, `log-request` | before-api-handle |
//! | `x-forwarded-prefix`, `path-parameters`, `subscription`, `path-mapping` | before-api-execution |
//! | `cors-preflight` | before-security-chain |
//! | `shutdown`, `transaction-post`, `cors-simple-request` | after-api-execution |
//! | `shutdown`, `transaction-post`, `simple-failure` | api-error |
//! | `log-response` | after-api-handle |
//! | `simple-failure-message` | api-message |
//! | `not-found`, `response-time`, `not-found-reporter` | not-found |

mod chain;
pub mod cors;
mod factory;
pub mod failure;
pub mod logging;
pub mod notfound;
pub mod path;
pub mod shutdown;
pub mod subscription;
pub mod transaction;

pub use chain::{Processor, ProcessorChain};
pub use factory::{
    ApiProcessorChainFactory, ApiProcessorChains, ChainFactoryError,
    NotFoundProcessorChainFactory, CHAIN_AFTER_API_EXECUTION,
    CHAIN_AFTER_API_HANDLE, CHAIN_API_ERROR, CHAIN_API_MESSAGE, CHAIN_BEFORE_API_EXECUTION,
    CHAIN_BEFORE_API_HANDLE, CHAIN_BEFORE_SECURITY_CHAIN, CHAIN_NOT_FOUND,
};
