//! Gated execution of registered tools.
//!
//! [`ToolGateway`] is the request surface: it rate limits callers, keeps
//! confirmation-gated tools off the direct path, runs handlers through the
//! [`InvocationExecutor`] with validation, caching, retries and timeouts, and
//! records one audit entry per attempt.

#![warn(missing_docs, clippy::pedantic)]

mod cache;
mod error;
mod executor;
mod gateway;
mod maintenance;
mod proposals;
mod request;
mod resilience;

pub use cache::{CacheKey, ResultCache};
pub use error::{ErrorKind, InvocationError, InvocationResult};
pub use executor::{Execution, ExecutorSettings, InvocationExecutor};
pub use gateway::{GatewayBuildError, GatewayBuilder, ToolGateway};
pub use maintenance::{MaintenanceHandle, SweepReport};
pub use proposals::{Proposal, ProposalId};
pub use request::{ErrorBody, ToolCallRequest, ToolCallResponse};
pub use resilience::RetryPolicy;
