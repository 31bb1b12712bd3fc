//! Shared error definitions for toolgate primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the toolgate runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided invocation identifier could not be parsed.
    #[error("invalid invocation id: {source}")]
    InvalidInvocationId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Caller identifier failed validation.
    #[error("invalid caller id `{id}`: {reason}")]
    InvalidCallerId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
