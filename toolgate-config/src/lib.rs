//! Gateway configuration.
//!
//! [`GatewayConfig`] deserializes from JSON with every field defaulted, can be
//! adjusted through `TOOLGATE_*` environment variables, and is checked by
//! [`GatewayConfig::validate`] before a gateway is built from it.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use schema::{AuditConfig, CacheConfig, GatewayConfig, LimitConfig, RetryConfig};
