//! Core shared types for the toolgate invocation runtime.

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod error;
mod ids;
mod secrets;

/// Caller identity and trust classification attached to every request.
pub use context::{CallerContext, TrustLevel};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Identifiers for callers and individual invocations.
pub use ids::{CallerId, InvocationId};
/// Secret material reserved for privileged handlers.
pub use secrets::Secrets;
