//! Errors produced by tool construction and execution.

use thiserror::Error;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A declared JSON schema could not be compiled.
    #[error("invalid schema for tool `{name}`: {reason}")]
    InvalidSchema {
        /// Name of the tool owning the schema.
        name: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// The descriptor carries no handler usable for the request.
    #[error("tool `{name}` has no handler")]
    MissingHandler {
        /// Name of the tool without a handler.
        name: String,
    },

    /// Input could not be converted into the handler's typed input.
    #[error("tool input could not be decoded: {reason}")]
    Decode {
        /// Decoder diagnostic.
        reason: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}
