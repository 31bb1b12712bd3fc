//! Walks a gateway through direct, confirmed and proposal-based calls.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde_json::{Value, json};
use toolgate::config::GatewayConfig;
use toolgate::kernel::{ToolCallRequest, ToolGateway};
use toolgate::policy::ExecutionPath;
use toolgate::primitives::{CallerContext, CallerId, Secrets};
use toolgate::telemetry::{TelemetryConfig, init_tracing};
use toolgate::tools::{ToolDescriptor, ToolRegistry};
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Run a few calls through a toolgate gateway")]
struct Args {
    /// JSON gateway configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Caller identity used for every call.
    #[arg(long, default_value = "127.0.0.1")]
    caller: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&TelemetryConfig::default());

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;

    let registry = Arc::new(ToolRegistry::new());
    registry.register(send_email()?);
    registry.register(get_weather()?);

    let gateway = ToolGateway::builder(registry)
        .secrets(Secrets::new().with("smtp_password", "demo-only"))
        .apply_config(&config)
        .await?
        .build()?;
    let maintenance = gateway.spawn_maintenance();
    let ctx = CallerContext::trusted(CallerId::new(args.caller)?);

    info!(tools = ?gateway.discover().iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), "registered");

    let email = ToolCallRequest::new(
        "sendEmail",
        json!({"to": "a@example.com", "subject": "Hi", "body": "Hello"}),
    );
    let weather = ToolCallRequest::new("getWeather", json!({"city": "Lisbon"}));

    for (path, request) in [
        (ExecutionPath::Direct, weather.clone()),
        (ExecutionPath::Direct, weather),
        (ExecutionPath::Direct, email.clone()),
        (ExecutionPath::Confirmed, email.clone()),
        (ExecutionPath::Direct, ToolCallRequest::new("nonexistent", json!({}))),
    ] {
        let tool = request.tool.clone();
        let response = gateway.handle(path, request, &ctx).await;
        println!("{} {tool}: {}", path.label(), serde_json::to_string(&response)?);
    }

    let proposal = gateway.propose(email, &ctx).await?;
    println!("proposed {} ({:?})", proposal.id(), proposal.state());
    let output = gateway.confirm_proposal(proposal.id(), &ctx).await?;
    println!("confirmed {}: {output}", proposal.id());

    maintenance.shutdown().await;
    Ok(())
}

fn send_email() -> toolgate::tools::ToolResult<ToolDescriptor> {
    ToolDescriptor::builder("sendEmail")
        .description("Send an email on behalf of the user")
        .tag("side-effect")
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
            let authenticated = ctx.secrets().get("smtp_password").is_some();
            Ok(json!({"status": "sent", "to": input["to"], "authenticated": authenticated}))
        })
        .build()
}

fn get_weather() -> toolgate::tools::ToolResult<ToolDescriptor> {
    ToolDescriptor::builder("getWeather")
        .description("Current weather for a city")
        .cached()
        .input_schema(json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }))
        .handler(|input: Value, _ctx| async move {
            Ok(json!({"city": input["city"], "temperature_c": 21}))
        })
        .build()
}
