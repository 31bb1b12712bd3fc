//! Privileged and unprivileged handler variants.
//!
//! Every tool has a privileged handler that runs with trusted secrets and may
//! additionally carry an unprivileged handler that is safe to run on behalf of
//! caller-controlled contexts. The unprivileged variant never receives
//! [`Secrets`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use toolgate_primitives::{CallerContext, CallerId, InvocationId, Secrets, TrustLevel};

use crate::error::ToolResult;

/// Execution context handed to privileged handlers.
#[derive(Clone)]
pub struct PrivilegedContext {
    caller: CallerId,
    invocation_id: InvocationId,
    secrets: Arc<Secrets>,
}

impl PrivilegedContext {
    /// Creates a privileged context for the supplied caller.
    #[must_use]
    pub fn new(caller: &CallerContext, secrets: Arc<Secrets>) -> Self {
        Self {
            caller: caller.caller().clone(),
            invocation_id: caller.invocation_id(),
            secrets,
        }
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the invocation identifier.
    #[must_use]
    pub const fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    /// Returns the trusted secret store.
    #[must_use]
    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }
}

impl fmt::Debug for PrivilegedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivilegedContext")
            .field("caller", &self.caller)
            .field("invocation_id", &self.invocation_id)
            .finish_non_exhaustive()
    }
}

/// Execution context handed to unprivileged handlers.
#[derive(Debug, Clone)]
pub struct UnprivilegedContext {
    caller: CallerId,
    invocation_id: InvocationId,
}

impl UnprivilegedContext {
    /// Creates an unprivileged context for the supplied caller.
    #[must_use]
    pub fn new(caller: &CallerContext) -> Self {
        Self {
            caller: caller.caller().clone(),
            invocation_id: caller.invocation_id(),
        }
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the invocation identifier.
    #[must_use]
    pub const fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }
}

/// Handler running in the trusted execution context.
#[async_trait]
pub trait PrivilegedHandler: Send + Sync {
    /// Invokes the tool with validated JSON input.
    async fn call(&self, input: Value, ctx: PrivilegedContext) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> PrivilegedHandler for F
where
    F: Send + Sync + Fn(Value, PrivilegedContext) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn call(&self, input: Value, ctx: PrivilegedContext) -> ToolResult<Value> {
        (self)(input, ctx).await
    }
}

/// Handler safe to run on behalf of untrusted callers.
#[async_trait]
pub trait UnprivilegedHandler: Send + Sync {
    /// Invokes the tool with validated JSON input.
    async fn call(&self, input: Value, ctx: UnprivilegedContext) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> UnprivilegedHandler for F
where
    F: Send + Sync + Fn(Value, UnprivilegedContext) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn call(&self, input: Value, ctx: UnprivilegedContext) -> ToolResult<Value> {
        (self)(input, ctx).await
    }
}

/// Handler pair owned by a descriptor.
#[derive(Clone, Default)]
pub struct ToolHandlers {
    privileged: Option<Arc<dyn PrivilegedHandler>>,
    unprivileged: Option<Arc<dyn UnprivilegedHandler>>,
}

/// Handler chosen for a particular request.
#[derive(Clone)]
pub enum HandlerSelection {
    /// Run the privileged handler with trusted secrets.
    Privileged(Arc<dyn PrivilegedHandler>),
    /// Run the unprivileged handler without secrets.
    Unprivileged(Arc<dyn UnprivilegedHandler>),
}

impl HandlerSelection {
    /// Returns a short label for logs and audit entries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Privileged(_) => "privileged",
            Self::Unprivileged(_) => "unprivileged",
        }
    }
}

impl fmt::Debug for HandlerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl ToolHandlers {
    pub(crate) fn set_privileged(&mut self, handler: Arc<dyn PrivilegedHandler>) {
        self.privileged = Some(handler);
    }

    pub(crate) fn set_unprivileged(&mut self, handler: Arc<dyn UnprivilegedHandler>) {
        self.unprivileged = Some(handler);
    }

    /// Returns `true` when a privileged handler is present.
    #[must_use]
    pub fn has_privileged(&self) -> bool {
        self.privileged.is_some()
    }

    /// Returns `true` when an unprivileged handler is present.
    #[must_use]
    pub fn has_unprivileged(&self) -> bool {
        self.unprivileged.is_some()
    }

    /// Picks the handler for the given trust level.
    ///
    /// Untrusted callers get the unprivileged handler when one exists. Everyone
    /// else gets the privileged handler, falling back to the unprivileged one
    /// when no privileged handler was registered. Returns `None` when the
    /// descriptor has no handler at all.
    #[must_use]
    pub fn select(&self, trust: TrustLevel) -> Option<HandlerSelection> {
        if trust.is_untrusted() {
            if let Some(handler) = &self.unprivileged {
                return Some(HandlerSelection::Unprivileged(Arc::clone(handler)));
            }
        }

        self.privileged
            .as_ref()
            .map(|handler| HandlerSelection::Privileged(Arc::clone(handler)))
            .or_else(|| {
                self.unprivileged
                    .as_ref()
                    .map(|handler| HandlerSelection::Unprivileged(Arc::clone(handler)))
            })
    }
}

impl fmt::Debug for ToolHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandlers")
            .field("privileged", &self.has_privileged())
            .field("unprivileged", &self.has_unprivileged())
            .finish()
    }
}
