use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};
use toolgate::audit::{AuditAction, AuditLog, AuditOutcome, InMemoryAuditLog};
use toolgate::config::GatewayConfig;
use toolgate::kernel::{
    ErrorKind, InvocationError, ToolCallRequest, ToolCallResponse, ToolGateway,
};
use toolgate::policy::{ConfirmationState, ExecutionPath, RateLimitConfig};
use toolgate::primitives::{CallerContext, CallerId, Secrets};
use toolgate::tools::{
    ToolDescriptor, ToolError, ToolRegistry, ToolResult, UnprivilegedContext, UnprivilegedHandler,
};

struct RedactedLookup;

#[async_trait]
impl UnprivilegedHandler for RedactedLookup {
    async fn call(&self, input: Value, _ctx: UnprivilegedContext) -> ToolResult<Value> {
        Ok(json!({"user": input["user"], "email": "hidden"}))
    }
}

struct Fixture {
    gateway: ToolGateway,
    audit: Arc<InMemoryAuditLog>,
    lookups: Arc<AtomicUsize>,
    flaky_calls: Arc<AtomicUsize>,
}

fn registry(lookups: &Arc<AtomicUsize>, flaky_calls: &Arc<AtomicUsize>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());

    registry.register(
        ToolDescriptor::builder("sendEmail")
            .description("Send an email")
            .requires_confirmation(true)
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "subject": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["to", "subject", "body"]
            }))
            .handler(|input: Value, ctx| async move {
                let key = ctx.secrets().get("smtp_password").unwrap_or_default();
                Ok(json!({"status": "sent", "to": input["to"], "authenticated": !key.is_empty()}))
            })
            .build()
            .unwrap(),
    );

    let counter = Arc::clone(lookups);
    registry.register(
        ToolDescriptor::builder("lookupUser")
            .cached()
            .handler(move |input: Value, _ctx| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"user": input["user"], "email": "u@example.com"}))
                }
            })
            .unprivileged(RedactedLookup)
            .build()
            .unwrap(),
    );

    let calls = Arc::clone(flaky_calls);
    registry.register(
        ToolDescriptor::builder("flaky")
            .retries(3)
            .handler(move |_input: Value, _ctx| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ToolError::execution("upstream unavailable"))
                    } else {
                        Ok(json!("recovered"))
                    }
                }
            })
            .build()
            .unwrap(),
    );

    registry.register(
        ToolDescriptor::builder("slow")
            .timeout(Duration::from_secs(1))
            .handler(|_input: Value, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            })
            .build()
            .unwrap(),
    );

    registry
}

fn fixture(execute_limit: RateLimitConfig) -> Fixture {
    let lookups = Arc::new(AtomicUsize::new(0));
    let flaky_calls = Arc::new(AtomicUsize::new(0));
    let (audit_log, audit) = AuditLog::in_memory();
    let gateway = ToolGateway::builder(registry(&lookups, &flaky_calls))
        .secrets(Secrets::new().with("smtp_password", "hunter2"))
        .execute_limit(execute_limit)
        .audit(audit_log)
        .build()
        .unwrap();
    Fixture {
        gateway,
        audit,
        lookups,
        flaky_calls,
    }
}

fn default_fixture() -> Fixture {
    fixture(RateLimitConfig::per_minute(100).unwrap())
}

fn trusted(id: &str) -> CallerContext {
    CallerContext::trusted(CallerId::new(id).unwrap())
}

fn email() -> ToolCallRequest {
    ToolCallRequest::new(
        "sendEmail",
        json!({"to": "a@example.com", "subject": "Hi", "body": "Hello"}),
    )
}

#[tokio::test]
async fn confirmed_email_is_sent_and_unconfirmed_is_blocked() {
    let fx = default_fixture();
    let ctx = trusted("10.0.0.1");

    let output = fx.gateway.execute_confirmed(email(), &ctx).await.unwrap();
    assert_eq!(output["status"], "sent");
    assert_eq!(output["authenticated"], true);

    let err = fx.gateway.execute(email(), &ctx).await.unwrap_err();
    assert!(err.is_policy_block());
    assert_eq!(err.status().as_u16(), 400);

    let entries = fx.audit.entries().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action(), AuditAction::ExecuteConfirmed);
    assert!(entries[0].is_success());
    assert!(entries[1].is_flagged());
}

#[tokio::test]
async fn unknown_tool_is_not_found_on_both_paths() {
    let fx = default_fixture();
    let ctx = trusted("10.0.0.1");

    for path in [ExecutionPath::Direct, ExecutionPath::Confirmed] {
        let response = fx
            .gateway
            .handle(path, ToolCallRequest::new("nonexistent", json!({})), &ctx)
            .await;
        let ToolCallResponse::Failure { ok, error } = response else {
            panic!("expected a failure response");
        };
        assert!(!ok);
        assert_eq!(error.kind, ErrorKind::NotFound);
    }
    assert_eq!(fx.audit.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn sixth_call_in_window_is_rate_limited() {
    let fx = fixture(RateLimitConfig::new(5, Duration::from_secs(10)).unwrap());
    let ctx = trusted("10.0.0.2");

    let calls = (0..6).map(|n| {
        fx.gateway
            .execute(ToolCallRequest::new("lookupUser", json!({"user": n})), &ctx)
    });
    let results = join_all(calls).await;

    let limited: Vec<_> = results
        .iter()
        .filter(|result| matches!(result, Err(InvocationError::RateLimited { .. })))
        .collect();
    assert_eq!(limited.len(), 1);
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 5);

    let other = trusted("10.0.0.3");
    assert!(
        fx.gateway
            .execute(ToolCallRequest::new("lookupUser", json!({"user": 1})), &other)
            .await
            .is_ok()
    );

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(
        fx.gateway
            .execute(ToolCallRequest::new("lookupUser", json!({"user": 9})), &ctx)
            .await
            .is_ok()
    );

    let limited_entries = fx
        .audit
        .entries()
        .await
        .into_iter()
        .filter(|entry| entry.outcome() == AuditOutcome::RateLimited)
        .count();
    assert_eq!(limited_entries, 1);
}

#[tokio::test]
async fn cached_tool_runs_once_per_input() {
    let fx = default_fixture();
    let ctx = trusted("10.0.0.4");
    let request = ToolCallRequest::new("lookupUser", json!({"user": "ada"}));

    let first = fx.gateway.execute(request.clone(), &ctx).await.unwrap();
    let second = fx.gateway.execute(request, &ctx).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.lookups.load(Ordering::SeqCst), 1);

    let entries = fx.audit.entries().await;
    assert_eq!(entries[0].metadata()["cached"], false);
    assert_eq!(entries[1].metadata()["cached"], true);
}

#[tokio::test]
async fn untrusted_callers_get_the_unprivileged_handler() {
    let fx = default_fixture();
    let request = ToolCallRequest::new("lookupUser", json!({"user": "ada"}));
    let ctx = CallerContext::untrusted(CallerId::new("browser-session").unwrap());

    let output = fx.gateway.execute(request.clone(), &ctx).await.unwrap();
    assert_eq!(output["email"], "hidden");
    assert_eq!(fx.lookups.load(Ordering::SeqCst), 0);

    let privileged = fx.gateway.execute(request.clone(), &trusted("10.0.0.4")).await.unwrap();
    assert_eq!(privileged["email"], "u@example.com");

    let again = fx.gateway.execute(request, &ctx).await.unwrap();
    assert_eq!(again["email"], "hidden");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let fx = default_fixture();
    let output = fx
        .gateway
        .execute(ToolCallRequest::new("flaky", json!({})), &trusted("10.0.0.5"))
        .await
        .unwrap();
    assert_eq!(output, json!("recovered"));
    assert_eq!(fx.flaky_calls.load(Ordering::SeqCst), 3);

    let entries = fx.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata()["attempts"], 3);
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_without_leaking_detail() {
    let fx = default_fixture();
    let response = fx
        .gateway
        .handle(
            ExecutionPath::Direct,
            ToolCallRequest::new("slow", json!({})),
            &trusted("10.0.0.6"),
        )
        .await;

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["kind"], "execution_failed");

    let entries = fx.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome(), AuditOutcome::Timeout);
}

#[tokio::test(start_paused = true)]
async fn late_result_after_timeout_is_discarded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = Arc::new(ToolRegistry::new());
    registry.register(
        ToolDescriptor::builder("quote")
            .cached()
            .timeout(Duration::from_secs(1))
            .handler(move |_input: Value, _ctx| {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        return Ok(json!("late"));
                    }
                    Ok(json!({"n": n}))
                }
            })
            .build()
            .unwrap(),
    );
    let (audit_log, audit) = AuditLog::in_memory();
    let gateway = ToolGateway::builder(registry)
        .audit(audit_log)
        .build()
        .unwrap();
    let request = ToolCallRequest::new("quote", json!({"symbol": "ACME"}));

    let err = gateway.execute(request.clone(), &trusted("10.0.0.12")).await.unwrap_err();
    assert!(matches!(err, InvocationError::Timeout { .. }));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(gateway.executor().cache().is_empty());
    assert_eq!(audit.len().await, 1);

    let output = gateway.execute(request, &trusted("10.0.0.12")).await.unwrap();
    assert_eq!(output, json!({"n": 2}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(audit.len().await, 2);
}

#[tokio::test]
async fn invalid_input_reports_fields() {
    let fx = default_fixture();
    let err = fx
        .gateway
        .execute_confirmed(
            ToolCallRequest::new("sendEmail", json!({"to": "a@example.com"})),
            &trusted("10.0.0.7"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let body = serde_json::to_value(err.to_response()).unwrap();
    assert!(body["violations"].as_array().is_some_and(|v| !v.is_empty()));
}

#[tokio::test]
async fn every_attempt_leaves_one_audit_entry() {
    let fx = default_fixture();
    let ctx = trusted("10.0.0.8");

    let _ = fx.gateway.execute(email(), &ctx).await;
    let _ = fx.gateway.execute_confirmed(email(), &ctx).await;
    let _ = fx.gateway.execute(ToolCallRequest::new("nonexistent", json!({})), &ctx).await;
    let _ = fx.gateway.execute_confirmed(ToolCallRequest::new("sendEmail", json!(1)), &ctx).await;

    let entries = fx.audit.for_caller(ctx.caller()).await;
    let outcomes: Vec<_> = entries.iter().map(|entry| entry.outcome()).collect();
    assert_eq!(
        outcomes,
        [
            AuditOutcome::ConfirmationRequired,
            AuditOutcome::Success,
            AuditOutcome::NotFound,
            AuditOutcome::ValidationFailed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn proposal_round_trip() {
    let fx = default_fixture();
    let ctx = trusted("10.0.0.9");

    let proposal = fx.gateway.propose(email(), &ctx).await.unwrap();
    assert_eq!(proposal.state(), ConfirmationState::Proposed);

    let output = fx.gateway.confirm_proposal(proposal.id(), &ctx).await.unwrap();
    assert_eq!(output["status"], "sent");
    assert_eq!(
        fx.gateway.proposal(proposal.id()).map(|p| p.state()),
        Some(ConfirmationState::Executed)
    );
}

#[tokio::test]
async fn discovery_lists_tools_without_handlers() {
    let fx = default_fixture();
    let names: Vec<_> = fx.gateway.discover().into_iter().map(|tool| tool.name).collect();
    assert_eq!(names, ["flaky", "lookupUser", "sendEmail", "slow"]);
}

#[tokio::test]
async fn gateway_from_config() {
    let config = GatewayConfig::from_json_str(
        r#"{"execute_limit": {"max_requests": 1, "window_ms": 60000}, "audit": {"tracing": false}}"#,
    )
    .unwrap();
    let lookups = Arc::new(AtomicUsize::new(0));
    let flaky = Arc::new(AtomicUsize::new(0));
    let gateway = ToolGateway::from_config(registry(&lookups, &flaky), &config)
        .await
        .unwrap();

    let ctx = trusted("10.0.0.10");
    let request = ToolCallRequest::new("lookupUser", json!({"user": "x"}));
    assert!(gateway.execute(request.clone(), &ctx).await.is_ok());
    let err = gateway.execute(request, &ctx).await.unwrap_err();
    assert_eq!(err.status().as_u16(), 429);
}
