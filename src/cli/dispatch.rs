use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::evaluate::cmd_evaluate;
use super::gates::cmd_gates;
use super::registry::cmd_registry;
use super::replay::cmd_replay;
use super::token::cmd_token;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Token(args) => cmd_token(args, ctx),
        Commands::Registry(args) => cmd_registry(args, ctx),
        Commands::Gates(args) => cmd_gates(args, ctx),
        Commands::Evaluate(args) => cmd_evaluate(args, ctx).await,
        Commands::Replay(args) => cmd_replay(args, ctx).await,
    }
}
