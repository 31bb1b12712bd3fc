//! Request surface: rate limiting, the confirmation gate and auditing around
//! the executor.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use toolgate_audit::{
    AuditAction, AuditEntry, AuditError, AuditLog, AuditOutcome, JournalAuditSink,
    PendingAuditEntry, TracingAuditSink,
};
use toolgate_config::{ConfigError, GatewayConfig};
use toolgate_policy::{
    ConfirmationEvent, DecisionKind, ExecutionPath, PathPolicy, PolicyError, RateLimitConfig,
    RateLimiter,
};
use toolgate_primitives::{CallerContext, Secrets};
use toolgate_telemetry::invocation_span;
use toolgate_tools::{ToolDescriptor, ToolRegistry, ToolSummary};
use tracing::{Instrument, debug, warn};

use crate::cache::ResultCache;
use crate::error::{ErrorKind, InvocationError, InvocationResult};
use crate::executor::{Execution, ExecutorSettings, InvocationExecutor};
use crate::maintenance::{self, MaintenanceHandle, SweepReport, Sweeper};
use crate::proposals::{Proposal, ProposalBook, ProposalId};
use crate::request::{ToolCallRequest, ToolCallResponse};
use crate::resilience::RetryPolicy;

/// Errors raised while wiring a gateway.
#[derive(Debug, Error)]
pub enum GatewayBuildError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A limiter could not be built.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// The audit journal could not be opened.
    #[error(transparent)]
    Audit(#[from] AuditError),
    /// The confirmation path limit is looser than the direct path limit.
    #[error("confirmation limit {confirm:?} is looser than execute limit {execute:?}")]
    LooseConfirmLimit {
        /// Limit requested for the confirmation path.
        confirm: RateLimitConfig,
        /// Limit of the direct path.
        execute: RateLimitConfig,
    },
}

/// Builder for [`ToolGateway`].
pub struct GatewayBuilder {
    registry: Arc<ToolRegistry>,
    secrets: Secrets,
    execute_limit: RateLimitConfig,
    confirm_limit: RateLimitConfig,
    settings: ExecutorSettings,
    cache: Option<Arc<ResultCache>>,
    audit: AuditLog,
    proposal_ttl: Duration,
    sweep_interval: Duration,
}

impl fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("execute_limit", &self.execute_limit)
            .field("confirm_limit", &self.confirm_limit)
            .field("settings", &self.settings)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            secrets: Secrets::new(),
            execute_limit: RateLimitConfig::default(),
            confirm_limit: RateLimitConfig::per_minute(5).unwrap_or_default(),
            settings: ExecutorSettings::default(),
            cache: None,
            audit: AuditLog::new().with_sink(Arc::new(TracingAuditSink)),
            proposal_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Sets the secrets handed to privileged handlers.
    #[must_use]
    pub fn secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    /// Sets the limit for the unconfirmed path.
    #[must_use]
    pub fn execute_limit(mut self, limit: RateLimitConfig) -> Self {
        self.execute_limit = limit;
        self
    }

    /// Sets the limit for the confirmation path.
    ///
    /// [`build`](Self::build) rejects a limit looser than the direct path's.
    #[must_use]
    pub fn confirm_limit(mut self, limit: RateLimitConfig) -> Self {
        self.confirm_limit = limit;
        self
    }

    /// Sets executor defaults.
    #[must_use]
    pub fn settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shares an existing result cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the audit log.
    #[must_use]
    pub fn audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Sets how long an unresolved proposal stays valid.
    #[must_use]
    pub fn proposal_ttl(mut self, ttl: Duration) -> Self {
        self.proposal_ttl = ttl;
        self
    }

    /// Sets the maintenance sweep period.
    #[must_use]
    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }

    /// Applies a validated configuration, opening the audit journal if one is set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayBuildError`] when the configuration is invalid or the
    /// journal cannot be opened.
    pub async fn apply_config(mut self, config: &GatewayConfig) -> Result<Self, GatewayBuildError> {
        config.validate()?;

        let mut audit = AuditLog::new();
        if config.audit.tracing {
            audit = audit.with_sink(Arc::new(TracingAuditSink));
        }
        if let Some(path) = &config.audit.journal_path {
            audit = audit.with_sink(Arc::new(JournalAuditSink::open(path).await?));
        }

        let max_entries = NonZeroUsize::new(config.cache.max_entries).unwrap_or(NonZeroUsize::MIN);
        self.execute_limit = config.execute_limit.to_rate_limit()?;
        self.confirm_limit = config.confirm_limit.to_rate_limit()?;
        self.settings = ExecutorSettings {
            default_timeout: config.default_timeout(),
            default_cache_ttl: config.cache.default_ttl(),
            retry: RetryPolicy::new(config.retry.base_delay(), config.retry.max_delay()),
        };
        self.cache = Some(Arc::new(ResultCache::new(max_entries)));
        self.audit = audit;
        self.proposal_ttl = config.proposal_ttl();
        self.sweep_interval = config.sweep_interval();
        Ok(self)
    }

    /// Builds the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayBuildError::LooseConfirmLimit`] when the confirmation
    /// path would admit more requests per unit of time than the direct path.
    pub fn build(self) -> Result<ToolGateway, GatewayBuildError> {
        if !self.confirm_limit.is_no_looser_than(self.execute_limit) {
            return Err(GatewayBuildError::LooseConfirmLimit {
                confirm: self.confirm_limit,
                execute: self.execute_limit,
            });
        }

        let mut executor = InvocationExecutor::new(self.registry)
            .with_secrets(self.secrets)
            .with_settings(self.settings);
        if let Some(cache) = self.cache {
            executor = executor.with_cache(cache);
        }

        Ok(ToolGateway {
            executor,
            execute_limiter: Arc::new(RateLimiter::new(self.execute_limit)),
            confirm_limiter: Arc::new(RateLimiter::new(self.confirm_limit)),
            audit: self.audit,
            proposals: Arc::new(ProposalBook::new(self.proposal_ttl)),
            sweep_interval: self.sweep_interval,
        })
    }
}

/// Gated entry point for tool invocations.
///
/// Every operation is rate limited, checked against the execution-path policy
/// and recorded as exactly one audit entry, whatever its outcome. Tools that
/// require confirmation run only through [`ToolGateway::execute_confirmed`] or
/// [`ToolGateway::confirm_proposal`].
pub struct ToolGateway {
    executor: InvocationExecutor,
    execute_limiter: Arc<RateLimiter>,
    confirm_limiter: Arc<RateLimiter>,
    audit: AuditLog,
    proposals: Arc<ProposalBook>,
    sweep_interval: Duration,
}

impl fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolGateway")
            .field("executor", &self.executor)
            .field("execute_limit", &self.execute_limiter.config())
            .field("confirm_limit", &self.confirm_limiter.config())
            .field("audit", &self.audit)
            .field("proposals", &self.proposals.len())
            .finish_non_exhaustive()
    }
}

impl ToolGateway {
    /// Starts building a gateway over `registry`.
    #[must_use]
    pub fn builder(registry: Arc<ToolRegistry>) -> GatewayBuilder {
        GatewayBuilder::new(registry)
    }

    /// Builds a gateway from configuration.
    ///
    /// # Errors
    ///
    /// See [`GatewayBuilder::apply_config`].
    pub async fn from_config(
        registry: Arc<ToolRegistry>,
        config: &GatewayConfig,
    ) -> Result<Self, GatewayBuildError> {
        Self::builder(registry).apply_config(config).await?.build()
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &InvocationExecutor {
        &self.executor
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.executor.registry()
    }

    /// Returns the limiter guarding the unconfirmed path.
    #[must_use]
    pub fn execute_limiter(&self) -> &RateLimiter {
        &self.execute_limiter
    }

    /// Returns the limiter guarding the confirmation path.
    #[must_use]
    pub fn confirm_limiter(&self) -> &RateLimiter {
        &self.confirm_limiter
    }

    /// Lists every registered tool, sorted by name, without handler detail.
    #[must_use]
    pub fn discover(&self) -> Vec<ToolSummary> {
        self.registry().summaries()
    }

    /// Runs a tool that does not require confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::ConfirmationRequired`] for confirmation-gated
    /// tools, whatever the input, before any handler runs.
    pub async fn execute(
        &self,
        request: ToolCallRequest,
        ctx: &CallerContext,
    ) -> InvocationResult<Value> {
        self.gated(AuditAction::Execute, ExecutionPath::Direct, request, ctx)
            .await
    }

    /// Runs a confirmation-gated tool after a human approved it.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::PolicyBlocked`] for tools that do not require
    /// confirmation.
    pub async fn execute_confirmed(
        &self,
        request: ToolCallRequest,
        ctx: &CallerContext,
    ) -> InvocationResult<Value> {
        self.gated(
            AuditAction::ExecuteConfirmed,
            ExecutionPath::Confirmed,
            request,
            ctx,
        )
        .await
    }

    /// Runs a request on `path` and wraps the outcome in the response envelope.
    pub async fn handle(
        &self,
        path: ExecutionPath,
        request: ToolCallRequest,
        ctx: &CallerContext,
    ) -> ToolCallResponse {
        match path {
            ExecutionPath::Direct => self.execute(request, ctx).await,
            ExecutionPath::Confirmed => self.execute_confirmed(request, ctx).await,
        }
        .into()
    }

    /// Records a proposal for a confirmation-gated call without running it.
    ///
    /// # Errors
    ///
    /// Fails like [`ToolGateway::execute_confirmed`] would, minus execution
    /// errors: unknown tool, wrong path, invalid input or rate limit.
    pub async fn propose(
        &self,
        request: ToolCallRequest,
        ctx: &CallerContext,
    ) -> InvocationResult<Proposal> {
        let ToolCallRequest { tool, input } = request;
        let mut entry = begin(AuditAction::Propose, &tool, ctx);
        let span = invocation_span(AuditAction::Propose.label(), &tool, ctx.caller(), ctx.invocation_id());

        let result = async {
            self.admit(ExecutionPath::Direct, ctx)?;
            let descriptor = self.executor.lookup(&tool)?;
            enforce_path(ExecutionPath::Confirmed, &descriptor, &input, ctx)?;
            descriptor
                .input_schema()
                .validate(&input)
                .map_err(|violations| InvocationError::Validation {
                    tool: tool.clone(),
                    violations,
                })?;

            let proposal = self.proposals.open(descriptor.name(), input, ctx.caller().clone());
            entry.insert_metadata("proposal", Value::from(proposal.id().to_string()));
            Ok::<_, InvocationError>(proposal)
        }
        .instrument(span)
        .await;

        self.finish(entry, &result).await;
        result
    }

    /// Confirms a proposal and runs it through the confirmation path.
    ///
    /// The proposal ends in [`ConfirmationState::Executed`](toolgate_policy::ConfirmationState)
    /// once its handler has been dispatched, even when the run fails or times
    /// out. A failed run may still have had side effects, so it cannot be
    /// confirmed a second time; the failure is returned here and recorded in
    /// the audit entry. Propose again to retry.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::UnknownProposal`] for unknown or expired ids,
    /// [`InvocationError::PolicyBlocked`] when the caller did not propose it or
    /// it was already resolved, and any error of the confirmed execution.
    pub async fn confirm_proposal(
        &self,
        id: ProposalId,
        ctx: &CallerContext,
    ) -> InvocationResult<Value> {
        let tool = self.proposal_tool(id);
        let mut entry = begin(AuditAction::Confirm, &tool, ctx);
        entry.insert_metadata("proposal", Value::from(id.to_string()));
        let span = invocation_span(AuditAction::Confirm.label(), &tool, ctx.caller(), ctx.invocation_id());

        let result = async {
            self.admit(ExecutionPath::Confirmed, ctx)?;
            let proposal = self
                .proposals
                .apply(id, ctx.caller(), ConfirmationEvent::Confirm)?;
            let outcome = self
                .dispatch(
                    ExecutionPath::Confirmed,
                    proposal.tool(),
                    proposal.input().clone(),
                    ctx,
                    &mut entry,
                )
                .await;
            if let Err(err) = self.proposals.apply(id, ctx.caller(), ConfirmationEvent::Execute) {
                debug!(proposal = %id, error = %err, "proposal expired while executing");
            }
            outcome
        }
        .instrument(span)
        .await;

        self.finish(entry, &result).await;
        result.map(|execution| execution.output)
    }

    /// Rejects a proposal.
    ///
    /// # Errors
    ///
    /// Same lookup and ownership errors as [`ToolGateway::confirm_proposal`].
    pub async fn reject_proposal(
        &self,
        id: ProposalId,
        ctx: &CallerContext,
    ) -> InvocationResult<Proposal> {
        let tool = self.proposal_tool(id);
        let mut entry = begin(AuditAction::Reject, &tool, ctx);
        entry.insert_metadata("proposal", Value::from(id.to_string()));

        let result = self
            .proposals
            .apply(id, ctx.caller(), ConfirmationEvent::Reject);
        self.finish(entry, &result).await;
        result
    }

    fn proposal_tool(&self, id: ProposalId) -> String {
        self.proposals.get(id).map_or_else(
            || format!("proposal:{id}"),
            |proposal| proposal.tool().to_owned(),
        )
    }

    /// Returns a live proposal.
    #[must_use]
    pub fn proposal(&self, id: ProposalId) -> Option<Proposal> {
        self.proposals.get(id)
    }

    /// Runs one maintenance sweep immediately.
    pub fn sweep(&self) -> SweepReport {
        self.sweeper().sweep()
    }

    /// Starts the periodic maintenance sweep on the current runtime.
    #[must_use = "dropping the handle leaves the sweeper running detached"]
    pub fn spawn_maintenance(&self) -> MaintenanceHandle {
        maintenance::spawn(self.sweep_interval, self.sweeper())
    }

    fn sweeper(&self) -> Sweeper {
        Sweeper {
            limiters: [
                Arc::clone(&self.execute_limiter),
                Arc::clone(&self.confirm_limiter),
            ],
            cache: Arc::clone(self.executor.cache()),
            proposals: Arc::clone(&self.proposals),
        }
    }

    async fn gated(
        &self,
        action: AuditAction,
        path: ExecutionPath,
        request: ToolCallRequest,
        ctx: &CallerContext,
    ) -> InvocationResult<Value> {
        let ToolCallRequest { tool, input } = request;
        let mut entry = begin(action, &tool, ctx);
        let span = invocation_span(action.label(), &tool, ctx.caller(), ctx.invocation_id());

        let result = async {
            self.admit(path, ctx)?;
            self.dispatch(path, &tool, input, ctx, &mut entry).await
        }
        .instrument(span)
        .await;

        self.finish(entry, &result).await;
        result.map(|execution| execution.output)
    }

    fn admit(&self, path: ExecutionPath, ctx: &CallerContext) -> InvocationResult<()> {
        let limiter = match path {
            ExecutionPath::Direct => &self.execute_limiter,
            ExecutionPath::Confirmed => &self.confirm_limiter,
        };

        let decision = limiter.admit(ctx.caller());
        if decision.is_allowed() {
            return Ok(());
        }

        warn!(
            caller = %ctx.caller(),
            path = path.label(),
            limit = decision.limit(),
            reset_after_ms = u64::try_from(decision.reset_after().as_millis()).unwrap_or(u64::MAX),
            "rate limit exceeded"
        );
        Err(InvocationError::RateLimited {
            limit: decision.limit(),
            remaining: decision.remaining(),
            reset_after: decision.reset_after(),
        })
    }

    async fn dispatch(
        &self,
        path: ExecutionPath,
        tool: &str,
        input: Value,
        ctx: &CallerContext,
        entry: &mut PendingAuditEntry,
    ) -> InvocationResult<Execution> {
        let descriptor = self.executor.lookup(tool)?;
        enforce_path(path, &descriptor, &input, ctx)?;

        let execution = self.executor.run_descriptor(&descriptor, input, ctx).await?;
        entry.insert_metadata("handler", Value::from(execution.handler));
        entry.insert_metadata("cached", Value::from(execution.cached));
        entry.insert_metadata("attempts", Value::from(execution.attempts));
        Ok(execution)
    }

    async fn finish<T>(&self, entry: PendingAuditEntry, result: &InvocationResult<T>) {
        let entry = match result {
            Ok(_) => entry.finish(AuditOutcome::Success, None),
            Err(err) => {
                if err.kind() == ErrorKind::ExecutionFailed {
                    warn!(error = %err, "tool execution failed");
                }
                entry.finish(err.audit_outcome(), Some(err.to_string()))
            }
        };
        self.audit.log(entry).await;
    }
}

fn begin(action: AuditAction, tool: &str, ctx: &CallerContext) -> PendingAuditEntry {
    let trust = if ctx.trust().is_untrusted() { "untrusted" } else { "trusted" };
    let mut entry = AuditEntry::begin(action, tool, ctx.caller().clone(), ctx.invocation_id());
    entry.insert_metadata("trust", Value::from(trust));
    entry
}

fn enforce_path(
    path: ExecutionPath,
    descriptor: &ToolDescriptor,
    input: &Value,
    ctx: &CallerContext,
) -> InvocationResult<()> {
    let decision = PathPolicy.evaluate(path, descriptor.requires_confirmation(input));
    match decision.kind() {
        DecisionKind::Allow => Ok(()),
        DecisionKind::RequireConfirmation => {
            warn!(
                tool = descriptor.name(),
                caller = %ctx.caller(),
                "confirmation-gated tool requested on the direct path; possible bypass attempt"
            );
            Err(InvocationError::ConfirmationRequired {
                tool: descriptor.name().to_owned(),
            })
        }
        DecisionKind::Deny => Err(InvocationError::PolicyBlocked {
            tool: descriptor.name().to_owned(),
            reason: decision
                .reason()
                .unwrap_or("tool is not allowed on this path")
                .to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolgate_audit::InMemoryAuditLog;
    use toolgate_policy::ConfirmationState;
    use toolgate_primitives::CallerId;
    use toolgate_tools::ToolError;

    fn registry() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            ToolDescriptor::builder("echo")
                .handler(|input: Value, _ctx| async move { Ok(input) })
                .build()
                .unwrap(),
        );
        registry.register(
            ToolDescriptor::builder("deleteFile")
                .requires_confirmation(true)
                .input_schema(json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"]
                }))
                .handler(|input: Value, _ctx| async move {
                    Ok(json!({"deleted": input["path"]}))
                })
                .build()
                .unwrap(),
        );
        registry.register(
            ToolDescriptor::builder("transfer")
                .confirm_when(|input| input["amount"].as_u64().unwrap_or(0) > 100)
                .handler(|input: Value, _ctx| async move { Ok(json!({"moved": input["amount"]})) })
                .build()
                .unwrap(),
        );
        registry.register(
            ToolDescriptor::builder("broken")
                .handler(|_input: Value, _ctx| async move {
                    Err(ToolError::execution("db password rejected"))
                })
                .build()
                .unwrap(),
        );
        registry
    }

    fn gateway() -> (ToolGateway, Arc<InMemoryAuditLog>) {
        let (audit, store) = AuditLog::in_memory();
        let gateway = ToolGateway::builder(registry()).audit(audit).build().unwrap();
        (gateway, store)
    }

    fn caller(id: &str) -> CallerContext {
        CallerContext::trusted(CallerId::new(id).unwrap())
    }

    #[tokio::test]
    async fn direct_path_runs_plain_tools() {
        let (gateway, store) = gateway();
        let output = gateway
            .execute(ToolCallRequest::new("echo", json!({"x": 1})), &caller("a"))
            .await
            .unwrap();
        assert_eq!(output, json!({"x": 1}));

        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_success());
        assert_eq!(entries[0].action(), AuditAction::Execute);
        assert_eq!(entries[0].metadata()["handler"], "privileged");
    }

    #[tokio::test]
    async fn confirmation_tool_is_blocked_before_validation() {
        let (gateway, store) = gateway();
        let err = gateway
            .execute(ToolCallRequest::new("deleteFile", json!("garbage")), &caller("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::ConfirmationRequired { .. }));

        let flagged = store.flagged().await;
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].outcome(), AuditOutcome::ConfirmationRequired);
    }

    #[tokio::test]
    async fn conditional_confirmation_follows_input() {
        let (gateway, _) = gateway();
        let small = ToolCallRequest::new("transfer", json!({"amount": 10}));
        let large = ToolCallRequest::new("transfer", json!({"amount": 500}));

        assert!(gateway.execute(small.clone(), &caller("a")).await.is_ok());
        assert!(gateway.execute(large.clone(), &caller("a")).await.unwrap_err().is_policy_block());
        assert_eq!(
            gateway.execute_confirmed(large, &caller("a")).await.unwrap(),
            json!({"moved": 500})
        );
        assert!(matches!(
            gateway.execute_confirmed(small, &caller("a")).await,
            Err(InvocationError::PolicyBlocked { .. })
        ));
    }

    #[tokio::test]
    async fn execution_detail_stays_in_audit() {
        let (gateway, store) = gateway();
        let response = gateway
            .handle(ExecutionPath::Direct, ToolCallRequest::new("broken", json!({})), &caller("a"))
            .await;

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["message"], "tool execution failed");
        assert!(!json.to_string().contains("password"));

        let entries = store.entries().await;
        assert_eq!(entries[0].outcome(), AuditOutcome::ExecutionFailed);
        assert!(entries[0].reason().unwrap().contains("password"));
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_limit_is_separate_and_audited() {
        let (audit, store) = AuditLog::in_memory();
        let gateway = ToolGateway::builder(registry())
            .audit(audit)
            .confirm_limit(RateLimitConfig::new(1, Duration::from_secs(10)).unwrap())
            .build()
            .unwrap();
        let request = ToolCallRequest::new("deleteFile", json!({"path": "/tmp/a"}));

        gateway.execute_confirmed(request.clone(), &caller("a")).await.unwrap();
        let err = gateway
            .execute_confirmed(request, &caller("a"))
            .await
            .unwrap_err();
        let InvocationError::RateLimited { remaining, reset_after, .. } = err else {
            panic!("expected a rate limit error");
        };
        assert_eq!(remaining, 0);
        assert_eq!(reset_after, Duration::from_secs(10));

        assert!(gateway.execute(ToolCallRequest::new("echo", json!(1)), &caller("a")).await.is_ok());
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn proposal_lifecycle() {
        let (gateway, store) = gateway();
        let owner = caller("owner");

        let proposal = gateway
            .propose(ToolCallRequest::new("deleteFile", json!({"path": "/tmp/x"})), &owner)
            .await
            .unwrap();
        assert_eq!(proposal.state(), ConfirmationState::Proposed);

        let stranger = gateway
            .confirm_proposal(proposal.id(), &caller("stranger"))
            .await
            .unwrap_err();
        assert!(stranger.is_policy_block());

        let output = gateway.confirm_proposal(proposal.id(), &owner).await.unwrap();
        assert_eq!(output, json!({"deleted": "/tmp/x"}));
        assert_eq!(
            gateway.proposal(proposal.id()).unwrap().state(),
            ConfirmationState::Executed
        );

        let replay = gateway.confirm_proposal(proposal.id(), &owner).await.unwrap_err();
        assert!(replay.is_policy_block());

        let actions: Vec<_> = store.entries().await.iter().map(AuditEntry::action).collect();
        assert_eq!(
            actions,
            [AuditAction::Propose, AuditAction::Confirm, AuditAction::Confirm, AuditAction::Confirm]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn proposals_reject_and_validate() {
        let (gateway, _) = gateway();
        let owner = caller("owner");

        let invalid = gateway
            .propose(ToolCallRequest::new("deleteFile", json!({})), &owner)
            .await
            .unwrap_err();
        assert_eq!(invalid.kind(), ErrorKind::Validation);

        let wrong_path = gateway
            .propose(ToolCallRequest::new("echo", json!({})), &owner)
            .await
            .unwrap_err();
        assert!(matches!(wrong_path, InvocationError::PolicyBlocked { .. }));

        let proposal = gateway
            .propose(ToolCallRequest::new("deleteFile", json!({"path": "/tmp/y"})), &owner)
            .await
            .unwrap();
        let rejected = gateway.reject_proposal(proposal.id(), &owner).await.unwrap();
        assert_eq!(rejected.state(), ConfirmationState::Rejected);
        assert!(gateway.confirm_proposal(proposal.id(), &owner).await.is_err());

        let unknown = gateway
            .confirm_proposal(ProposalId::random(), &owner)
            .await
            .unwrap_err();
        assert!(matches!(unknown, InvocationError::UnknownProposal { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_confirmation_consumes_the_proposal() {
        let registry = registry();
        registry.register(
            ToolDescriptor::builder("wipeDisk")
                .requires_confirmation(true)
                .handler(|_input: Value, _ctx| async move {
                    Err(ToolError::execution("disk busy"))
                })
                .build()
                .unwrap(),
        );
        let (audit, store) = AuditLog::in_memory();
        let gateway = ToolGateway::builder(registry).audit(audit).build().unwrap();
        let owner = caller("owner");

        let proposal = gateway
            .propose(ToolCallRequest::new("wipeDisk", json!({})), &owner)
            .await
            .unwrap();
        let failed = gateway.confirm_proposal(proposal.id(), &owner).await.unwrap_err();
        assert_eq!(failed.kind(), ErrorKind::ExecutionFailed);
        assert_eq!(
            gateway.proposal(proposal.id()).unwrap().state(),
            ConfirmationState::Executed
        );

        let retry = gateway.confirm_proposal(proposal.id(), &owner).await.unwrap_err();
        assert!(retry.is_policy_block());
        let outcomes: Vec<_> = store.entries().await.iter().map(AuditEntry::outcome).collect();
        assert_eq!(outcomes[1], AuditOutcome::ExecutionFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_proposals_are_audited_by_id() {
        let (gateway, store) = gateway();
        let owner = caller("owner");
        let confirm_id = ProposalId::random();
        let reject_id = ProposalId::random();

        assert!(gateway.confirm_proposal(confirm_id, &owner).await.is_err());
        assert!(gateway.reject_proposal(reject_id, &owner).await.is_err());

        let tools: Vec<_> = store
            .entries()
            .await
            .iter()
            .map(|entry| entry.tool().to_owned())
            .collect();
        assert_eq!(tools, [format!("proposal:{confirm_id}"), format!("proposal:{reject_id}")]);
    }

    #[test]
    fn build_rejects_looser_confirm_limit() {
        let (audit, _) = AuditLog::in_memory();
        let result = ToolGateway::builder(registry())
            .audit(audit)
            .execute_limit(RateLimitConfig::per_minute(20).unwrap())
            .confirm_limit(RateLimitConfig::per_minute(50).unwrap())
            .build();
        assert!(matches!(result, Err(GatewayBuildError::LooseConfirmLimit { .. })));

        let (audit, _) = AuditLog::in_memory();
        let equal = ToolGateway::builder(registry())
            .audit(audit)
            .confirm_limit(RateLimitConfig::default())
            .build();
        assert!(equal.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_proposals_are_swept() {
        let (audit, _) = AuditLog::in_memory();
        let gateway = ToolGateway::builder(registry())
            .audit(audit)
            .proposal_ttl(Duration::from_secs(5))
            .build()
            .unwrap();
        let proposal = gateway
            .propose(ToolCallRequest::new("deleteFile", json!({"path": "/tmp/z"})), &caller("a"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(gateway.proposal(proposal.id()).is_none());
        assert_eq!(gateway.sweep().proposals, 1);
    }

    #[tokio::test]
    async fn discovery_is_sorted_and_handler_free() {
        let (gateway, _) = gateway();
        let names: Vec<_> = gateway.discover().into_iter().map(|tool| tool.name).collect();
        assert_eq!(names, ["broken", "deleteFile", "echo", "transfer"]);

        let json = serde_json::to_value(gateway.discover()).unwrap();
        assert_eq!(json[1]["confirmation"], "always");
        assert_eq!(json[3]["confirmation"], "conditional");
    }

    #[tokio::test]
    async fn from_config_wires_limits() {
        let config = GatewayConfig::from_json_str(
            r#"{"execute_limit": {"max_requests": 2, "window_ms": 1000}, "confirm_limit": {"max_requests": 1, "window_ms": 1000}, "audit": {"tracing": false}}"#,
        )
        .unwrap();
        let gateway = ToolGateway::from_config(registry(), &config).await.unwrap();
        assert_eq!(gateway.execute_limiter().config().max_requests().get(), 2);
        assert_eq!(gateway.confirm_limiter().config().max_requests().get(), 1);

        let mut bad = GatewayConfig::default();
        bad.sweep_interval_ms = 0;
        assert!(matches!(
            ToolGateway::from_config(registry(), &bad).await,
            Err(GatewayBuildError::Config(_))
        ));
    }
}
