//! Immutable tool descriptors and the fluent builder that produces them.

use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ToolError, ToolResult};
use crate::handler::{
    PrivilegedContext, PrivilegedHandler, ToolHandlers, UnprivilegedContext, UnprivilegedHandler,
};
use crate::schema::JsonSchema;

type ConfirmPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Whether invoking a tool requires a separate human confirmation step.
#[derive(Clone, Default)]
pub enum ConfirmationPolicy {
    /// The tool runs through the direct execution path.
    #[default]
    Never,
    /// Every invocation must go through the confirmation path.
    Always,
    /// Confirmation depends on the input.
    When(ConfirmPredicate),
}

impl ConfirmationPolicy {
    /// Returns `true` when the supplied input must be confirmed before running.
    #[must_use]
    pub fn requires_confirmation(&self, input: &Value) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::When(predicate) => predicate(input),
        }
    }

    /// Returns the discovery label for the policy.
    #[must_use]
    pub const fn mode(&self) -> ConfirmationMode {
        match self {
            Self::Never => ConfirmationMode::Never,
            Self::Always => ConfirmationMode::Always,
            Self::When(_) => ConfirmationMode::Conditional,
        }
    }
}

impl fmt::Debug for ConfirmationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.mode(), f)
    }
}

/// Serializable label for a [`ConfirmationPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    /// No confirmation required.
    Never,
    /// Confirmation always required.
    Always,
    /// Confirmation required for some inputs.
    Conditional,
}

/// Result caching declared by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Results are never cached.
    #[default]
    Disabled,
    /// Successful results are cached for the given TTL, or the gateway default when `None`.
    Enabled {
        /// Explicit time-to-live.
        ttl: Option<Duration>,
    },
}

/// Frozen description of a callable tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    input_schema: JsonSchema,
    output_schema: Option<JsonSchema>,
    handlers: ToolHandlers,
    confirmation: ConfirmationPolicy,
    cache: CachePolicy,
    attempts: NonZeroU32,
    timeout: Option<Duration>,
}

impl ToolDescriptor {
    /// Starts building a descriptor with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    /// Returns the unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the free-form tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the input schema.
    #[must_use]
    pub fn input_schema(&self) -> &JsonSchema {
        &self.input_schema
    }

    /// Returns the output schema, if declared.
    #[must_use]
    pub fn output_schema(&self) -> Option<&JsonSchema> {
        self.output_schema.as_ref()
    }

    /// Returns the handler pair.
    #[must_use]
    pub fn handlers(&self) -> &ToolHandlers {
        &self.handlers
    }

    /// Returns the confirmation policy.
    #[must_use]
    pub fn confirmation(&self) -> &ConfirmationPolicy {
        &self.confirmation
    }

    /// Returns `true` when this input must be confirmed before running.
    #[must_use]
    pub fn requires_confirmation(&self, input: &Value) -> bool {
        self.confirmation.requires_confirmation(input)
    }

    /// Returns the caching policy.
    #[must_use]
    pub const fn cache(&self) -> CachePolicy {
        self.cache
    }

    /// Returns how many times the handler is attempted before failing.
    #[must_use]
    pub const fn attempts(&self) -> NonZeroU32 {
        self.attempts
    }

    /// Returns the per-attempt timeout, if declared.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the discovery view of this descriptor.
    #[must_use]
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            input_schema: self.input_schema.document().clone(),
            output_schema: self
                .output_schema
                .as_ref()
                .map(|schema| schema.document().clone()),
            confirmation: self.confirmation.mode(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .field("confirmation", &self.confirmation)
            .field("cache", &self.cache)
            .field("attempts", &self.attempts)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Discovery entry describing a tool without exposing its handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// JSON schema for the input.
    pub input_schema: Value,
    /// JSON schema for the output, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Confirmation requirement.
    pub confirmation: ConfirmationMode,
}

/// Fluent builder accumulating descriptor fields.
pub struct ToolBuilder {
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
    handlers: ToolHandlers,
    confirmation: ConfirmationPolicy,
    cache: CachePolicy,
    attempts: u32,
    timeout: Option<Duration>,
}

impl ToolBuilder {
    /// Creates a builder for the named tool.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            input_schema: None,
            output_schema: None,
            handlers: ToolHandlers::default(),
            confirmation: ConfirmationPolicy::Never,
            cache: CachePolicy::Disabled,
            attempts: 1,
            timeout: None,
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a tag, ignoring blank values.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !tag.trim().is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Sets the JSON schema validating raw input. Defaults to accepting anything.
    #[must_use]
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Sets the JSON schema describing successful output.
    #[must_use]
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Installs the privileged handler from a closure.
    #[must_use]
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, PrivilegedContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        self.handlers.set_privileged(Arc::new(handler));
        self
    }

    /// Installs a privileged handler implemented as a type.
    #[must_use]
    pub fn privileged(mut self, handler: impl PrivilegedHandler + 'static) -> Self {
        self.handlers.set_privileged(Arc::new(handler));
        self
    }

    /// Installs a privileged handler that receives input decoded into `T`.
    #[must_use]
    pub fn typed_handler<T, F, Fut>(mut self, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, PrivilegedContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        let wrapped = move |input: Value, ctx: PrivilegedContext| {
            let pending = serde_json::from_value::<T>(input)
                .map_err(|err| ToolError::Decode {
                    reason: err.to_string(),
                })
                .map(|typed| handler(typed, ctx));
            async move { pending?.await }
        };
        self.handlers.set_privileged(Arc::new(wrapped));
        self
    }

    /// Installs the unprivileged handler from a closure.
    #[must_use]
    pub fn unprivileged_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, UnprivilegedContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        self.handlers.set_unprivileged(Arc::new(handler));
        self
    }

    /// Installs an unprivileged handler implemented as a type.
    #[must_use]
    pub fn unprivileged(mut self, handler: impl UnprivilegedHandler + 'static) -> Self {
        self.handlers.set_unprivileged(Arc::new(handler));
        self
    }

    /// Sets whether every invocation requires confirmation.
    #[must_use]
    pub fn requires_confirmation(mut self, required: bool) -> Self {
        self.confirmation = if required {
            ConfirmationPolicy::Always
        } else {
            ConfirmationPolicy::Never
        };
        self
    }

    /// Requires confirmation only for inputs matching the predicate.
    #[must_use]
    pub fn confirm_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.confirmation = ConfirmationPolicy::When(Arc::new(predicate));
        self
    }

    /// Enables result caching with the gateway's default TTL.
    #[must_use]
    pub fn cached(mut self) -> Self {
        self.cache = CachePolicy::Enabled { ttl: None };
        self
    }

    /// Enables result caching with an explicit TTL.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = CachePolicy::Enabled { ttl: Some(ttl) };
        self
    }

    /// Sets the total number of attempts. Values below one are treated as one.
    #[must_use]
    pub fn retries(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Freezes the accumulated fields into a descriptor.
    ///
    /// Handlers are not required here; a descriptor without one fails when it
    /// is first invoked.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] for an empty name and
    /// [`ToolError::InvalidSchema`] when a schema does not compile.
    pub fn build(self) -> ToolResult<ToolDescriptor> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool name cannot be empty".into(),
            });
        }

        let compile = |document: Value| {
            JsonSchema::compile(document).map_err(|reason| ToolError::InvalidSchema {
                name: name.clone(),
                reason,
            })
        };

        let input_schema = match self.input_schema {
            Some(document) => compile(document)?,
            None => JsonSchema::any(),
        };
        let output_schema = self.output_schema.map(compile).transpose()?;

        Ok(ToolDescriptor {
            name,
            description: self.description,
            tags: self.tags,
            input_schema,
            output_schema,
            handlers: self.handlers,
            confirmation: self.confirmation,
            cache: self.cache,
            attempts: NonZeroU32::new(self.attempts).unwrap_or(NonZeroU32::MIN),
            timeout: self.timeout,
        })
    }
}

impl fmt::Debug for ToolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolBuilder")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
