//! Gated tool invocation for LLM agents.
//!
//! Depend on this crate via `cargo add toolgate`. It bundles the internal crates
//! behind feature flags so downstream users can pull in only the pieces they need.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use toolgate_primitives as primitives;

/// Gateway, executor and proposals (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use toolgate_kernel as kernel;

/// Tool descriptors and the registry (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use toolgate_tools as tools;

/// Rate limiting and confirmation policy (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use toolgate_policy as policy;

/// Audit trail (enabled by `audit` feature).
#[cfg(feature = "audit")]
pub use toolgate_audit as audit;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use toolgate_telemetry as telemetry;

/// Gateway configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use toolgate_config as config;
