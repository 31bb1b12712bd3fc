//! Validation, handler dispatch, caching and resilience for a single call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use toolgate_primitives::{CallerContext, Secrets};
use toolgate_tools::{
    CachePolicy, HandlerSelection, PrivilegedContext, ToolDescriptor, ToolError, ToolRegistry,
    ToolResult, UnprivilegedContext,
};
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::error::{InvocationError, InvocationResult};
use crate::resilience::{AttemptError, RetryPolicy, run_with_retry};

/// Defaults applied when a descriptor leaves a setting open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Per-attempt deadline.
    pub default_timeout: Duration,
    /// TTL for tools that enable caching without one.
    pub default_cache_ttl: Duration,
    /// Backoff between attempts.
    pub retry: RetryPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            default_cache_ttl: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Successful run with execution metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Handler output.
    pub output: Value,
    /// `true` when served from the cache.
    pub cached: bool,
    /// Handler attempts made; zero on a cache hit.
    pub attempts: u32,
    /// Handler variant that was selected.
    pub handler: &'static str,
}

/// Runs tools from a registry.
#[derive(Clone)]
pub struct InvocationExecutor {
    registry: Arc<ToolRegistry>,
    cache: Arc<ResultCache>,
    secrets: Arc<Secrets>,
    settings: ExecutorSettings,
}

impl fmt::Debug for InvocationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationExecutor")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl InvocationExecutor {
    /// Creates an executor with default settings, an empty cache and no secrets.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            cache: Arc::new(ResultCache::default()),
            secrets: Arc::new(Secrets::new()),
            settings: ExecutorSettings::default(),
        }
    }

    /// Replaces the secrets handed to privileged handlers.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = Arc::new(secrets);
        self
    }

    /// Replaces the result cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the default settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Returns the result cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// Looks up a tool.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NotFound`] for unknown names.
    pub fn lookup(&self, tool: &str) -> InvocationResult<Arc<ToolDescriptor>> {
        self.registry
            .get(tool)
            .ok_or_else(|| InvocationError::NotFound {
                tool: tool.to_owned(),
            })
    }

    /// Looks up, validates and executes a tool.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NotFound`], [`InvocationError::Validation`],
    /// [`InvocationError::Timeout`] or [`InvocationError::ExecutionFailed`].
    pub async fn run(
        &self,
        tool: &str,
        input: Value,
        ctx: &CallerContext,
    ) -> InvocationResult<Execution> {
        let descriptor = self.lookup(tool)?;
        self.run_descriptor(&descriptor, input, ctx).await
    }

    /// Validates and executes an already resolved descriptor.
    ///
    /// # Errors
    ///
    /// See [`InvocationExecutor::run`].
    pub async fn run_descriptor(
        &self,
        descriptor: &ToolDescriptor,
        input: Value,
        ctx: &CallerContext,
    ) -> InvocationResult<Execution> {
        let tool = descriptor.name();

        descriptor
            .input_schema()
            .validate(&input)
            .map_err(|violations| InvocationError::Validation {
                tool: tool.to_owned(),
                violations,
            })?;

        let selection = descriptor.handlers().select(ctx.trust()).ok_or_else(|| {
            InvocationError::ExecutionFailed {
                tool: tool.to_owned(),
                detail: ToolError::MissingHandler {
                    name: tool.to_owned(),
                }
                .to_string(),
            }
        })?;
        let handler = selection.label();

        let cache_slot = match descriptor.cache() {
            CachePolicy::Disabled => None,
            CachePolicy::Enabled { ttl } => Some((
                CacheKey::scoped(tool, handler, &input),
                ttl.unwrap_or(self.settings.default_cache_ttl),
            )),
        };

        if let Some((key, _)) = &cache_slot {
            if let Some(output) = self.cache.get(key) {
                debug!(tool, key = %key, "cache hit");
                return Ok(Execution {
                    output,
                    cached: true,
                    attempts: 0,
                    handler,
                });
            }
        }

        let deadline = descriptor
            .timeout()
            .unwrap_or(self.settings.default_timeout);
        let secrets = Arc::clone(&self.secrets);

        let attempted = run_with_retry(self.settings.retry, descriptor.attempts(), deadline, || {
            dispatch(selection.clone(), input.clone(), ctx.clone(), Arc::clone(&secrets))
        })
        .await
        .map_err(|err| match err {
            AttemptError::TimedOut(after) => InvocationError::Timeout {
                tool: tool.to_owned(),
                after,
            },
            other => InvocationError::ExecutionFailed {
                tool: tool.to_owned(),
                detail: other.to_string(),
            },
        })?;

        if let Some(schema) = descriptor.output_schema() {
            if let Err(violations) = schema.validate(&attempted.value) {
                warn!(tool, ?violations, "tool output does not match its declared schema");
            }
        }

        if let Some((key, ttl)) = cache_slot {
            self.cache.insert(key, attempted.value.clone(), ttl);
        }

        Ok(Execution {
            output: attempted.value,
            cached: false,
            attempts: attempted.attempts,
            handler,
        })
    }
}

async fn dispatch(
    selection: HandlerSelection,
    input: Value,
    ctx: CallerContext,
    secrets: Arc<Secrets>,
) -> ToolResult<Value> {
    match selection {
        HandlerSelection::Privileged(handler) => {
            handler.call(input, PrivilegedContext::new(&ctx, secrets)).await
        }
        HandlerSelection::Unprivileged(handler) => {
            handler.call(input, UnprivilegedContext::new(&ctx)).await
        }
    }
}
