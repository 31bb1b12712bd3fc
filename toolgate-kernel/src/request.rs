//! Transport-neutral request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_tools::FieldViolation;

use crate::error::{ErrorKind, InvocationResult};

/// Request body for both execute operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Tool name.
    pub tool: String,
    /// Raw, unvalidated input.
    #[serde(default)]
    pub input: Value,
}

impl ToolCallRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(tool: impl Into<String>, input: Value) -> Self {
        Self {
            tool: tool.into(),
            input,
        }
    }
}

/// Error part of a [`ToolCallResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error label.
    pub kind: ErrorKind,
    /// Sanitized message.
    pub message: String,
    /// Field-level detail for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<FieldViolation>>,
    /// Requests left in the window, for rate-limit failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// Milliseconds until the window frees a slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_after_ms: Option<u64>,
}

/// Response envelope: `{"ok":true,"result":..}` or `{"ok":false,"error":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolCallResponse {
    /// Successful invocation.
    Success {
        /// Always `true`.
        ok: bool,
        /// Handler output.
        result: Value,
    },
    /// Failed invocation.
    Failure {
        /// Always `false`.
        ok: bool,
        /// Sanitized error.
        error: ErrorBody,
    },
}

impl ToolCallResponse {
    /// Returns `true` for successful responses.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<InvocationResult<Value>> for ToolCallResponse {
    fn from(result: InvocationResult<Value>) -> Self {
        match result {
            Ok(result) => Self::Success { ok: true, result },
            Err(err) => Self::Failure {
                ok: false,
                error: err.to_response(),
            },
        }
    }
}
