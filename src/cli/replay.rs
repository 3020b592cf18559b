use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use authz_engine::{AccountStore, InMemoryAccountStore, PrincipalId, Role};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::fs;
use tracing::info;

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// JSON-lines file, one `{operation, token?, args?}` object per line
    pub file: PathBuf,
    /// YAML account table; without it every token principal counts as active
    #[arg(long, value_name = "FILE")]
    pub accounts: Option<PathBuf>,
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct ReplayRequest {
    operation: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ReplayOutcome {
    line: usize,
    operation: String,
    principal: Option<String>,
    allowed: bool,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountRow>,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    role: Role,
    id: i64,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn cmd_replay(args: ReplayArgs, ctx: &CliContext) -> Result<()> {
    let accounts = match &args.accounts {
        Some(path) => Some(load_accounts(path).await?),
        None => None,
    };
    let service = ctx.service(accounts)?;

    let content = fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut outcomes = Vec::new();
    for (idx, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request: ReplayRequest = serde_json::from_str(line)
            .with_context(|| format!("Invalid request on line {}", idx + 1))?;
        let call_args = request.args.unwrap_or_else(|| json!({}));

        let context = service.resolve_context(request.token.as_deref());
        let decision = service
            .evaluate(&request.operation, &call_args, context.principal())
            .await;
        outcomes.push(ReplayOutcome {
            line: idx + 1,
            principal: context
                .principal()
                .map(|p| format!("{}#{}", p.role(), p.id())),
            operation: request.operation,
            allowed: decision.allowed,
            reason: decision.reason,
        });
    }

    let cache = service.cache_stats();
    let audit = service.audit().stats();
    info!(requests = outcomes.len(), "replay finished");

    if args.json {
        let payload = json!({
            "decisions": outcomes,
            "cache": cache,
            "audit": audit,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for outcome in &outcomes {
            let verdict = if outcome.allowed { "ALLOW" } else { "DENY " };
            println!(
                "{:>4} {verdict} {:<28} {:<14} {}",
                outcome.line,
                outcome.operation,
                outcome.principal.as_deref().unwrap_or("anonymous"),
                outcome.reason
            );
        }
        println!();
        println!(
            "Cache → size={} max={} ttl_ms={}",
            cache.size, cache.max_size, cache.ttl_ms
        );
        println!(
            "Audit → total={} failures={}",
            audit.total, audit.failures
        );
    }
    Ok(())
}

async fn load_accounts(path: &Path) -> Result<Arc<dyn AccountStore>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read accounts file {}", path.display()))?;
    let file: AccountsFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse accounts file {}", path.display()))?;

    let store = InMemoryAccountStore::new();
    for row in file.accounts {
        store.insert(row.role, PrincipalId(row.id), row.active);
    }
    info!(accounts = store.len(), "loaded account table");
    Ok(Arc::new(store))
}
