use anyhow::Result;
use authz_engine::{JwtCodec, PrincipalId, Role, TokenVerifier};
use clap::{Args, Subcommand};
use serde_json::json;

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum TokenCommand {
    /// Sign a token for an account
    Issue(TokenIssueArgs),
    /// Verify a token and print its principal
    Inspect(TokenInspectArgs),
}

#[derive(Args, Clone, Debug)]
pub struct TokenIssueArgs {
    /// Account id within its role's table
    #[arg(long)]
    pub id: i64,
    /// One of root, admin, teacher
    #[arg(long)]
    pub role: Role,
    #[arg(long)]
    pub username: String,
}

#[derive(Args, Clone, Debug)]
pub struct TokenInspectArgs {
    /// Token, with or without the `Bearer ` prefix
    pub token: String,
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_token(args: TokenArgs, ctx: &CliContext) -> Result<()> {
    let codec = ctx.codec()?;
    match args.command {
        TokenCommand::Issue(issue) => {
            if issue.username.trim().is_empty() {
                anyhow::bail!("--username must not be empty");
            }
            let token = codec.issue(PrincipalId(issue.id), issue.role, &issue.username)?;
            println!("{token}");
        }
        TokenCommand::Inspect(inspect) => inspect_token(&codec, &inspect)?,
    }
    Ok(())
}

fn inspect_token(codec: &JwtCodec, args: &TokenInspectArgs) -> Result<()> {
    let raw = args.token.trim();
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw);

    match codec.verify(raw) {
        Ok(claims) => {
            if args.json {
                let payload = json!({
                    "valid": true,
                    "id": claims.id,
                    "role": claims.role,
                    "username": claims.username,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "valid → id={} role={} username={}",
                    claims.id, claims.role, claims.username
                );
            }
        }
        Err(err) => {
            if args.json {
                let payload = json!({ "valid": false, "error": err.to_string() });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("invalid → {err}");
            }
        }
    }
    Ok(())
}
