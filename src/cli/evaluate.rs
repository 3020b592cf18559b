use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct EvaluateArgs {
    /// Operation id, e.g. Query.getTeachers
    #[arg(long)]
    pub operation: String,
    /// Bearer token of the caller; omitted means anonymous
    #[arg(long)]
    pub token: Option<String>,
    /// Operation arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_evaluate(args: EvaluateArgs, ctx: &CliContext) -> Result<()> {
    let call_args: Value =
        serde_json::from_str(&args.args).context("--args must be a JSON object")?;
    if !call_args.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }

    let service = ctx.service(None)?;
    let request = service.resolve_context(args.token.as_deref());
    let decision = service
        .evaluate(&args.operation, &call_args, request.principal())
        .await;

    if args.json {
        let payload = json!({
            "operation": args.operation,
            "principal": request.principal(),
            "decision": decision,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let caller = request
            .principal()
            .map(|p| format!("{}#{} ({})", p.role(), p.id(), p.username()))
            .unwrap_or_else(|| "anonymous".to_string());
        let verdict = if decision.allowed { "ALLOW" } else { "DENY" };
        println!(
            "{verdict} {} for {caller}: {}",
            args.operation, decision.reason
        );
    }
    Ok(())
}
