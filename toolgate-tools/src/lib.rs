//! Tool descriptors, input validation, and registry.
//!
//! A [`ToolDescriptor`] is assembled once through [`ToolBuilder`], registered
//! with a [`ToolRegistry`], and looked up read-only for every request.

#![warn(missing_docs, clippy::pedantic)]

pub mod descriptor;
pub mod error;
pub mod handler;
pub mod registry;
pub mod schema;

pub use descriptor::{
    CachePolicy, ConfirmationMode, ConfirmationPolicy, ToolBuilder, ToolDescriptor, ToolSummary,
};
pub use error::{ToolError, ToolResult};
pub use handler::{
    HandlerSelection, PrivilegedContext, PrivilegedHandler, ToolHandlers, UnprivilegedContext,
    UnprivilegedHandler,
};
pub use registry::ToolRegistry;
pub use schema::{FieldViolation, JsonSchema};
