use anyhow::Result;
use authz_engine::{CompositeMode, Rule};
use clap::{Args, Subcommand};

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct GatesArgs {
    #[command(subcommand)]
    pub command: GatesCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum GatesCommand {
    Show(GatesShowArgs),
}

#[derive(Args, Clone, Debug)]
pub struct GatesShowArgs {
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_gates(args: GatesArgs, ctx: &CliContext) -> Result<()> {
    let map = ctx.gate_map()?;
    match args.command {
        GatesCommand::Show(show) => {
            if show.json {
                println!("{}", serde_json::to_string_pretty(&map.to_file())?);
            } else {
                println!("{} gated operations (unlisted operations are denied)", map.len());
                for (operation, rule) in map.operations() {
                    println!("  {operation:<28} {}", describe(rule));
                }
            }
        }
    }
    Ok(())
}

fn describe(rule: &Rule) -> String {
    match rule {
        Rule::AllowAlways => "allow".to_string(),
        Rule::DenyAlways => "deny".to_string(),
        Rule::Authenticated => "authenticated".to_string(),
        Rule::Permission { name } => format!("permission({name})"),
        Rule::ResourceOwnership {
            id_arg,
            owner_role,
            owner_role_arg,
        } => match (owner_role, owner_role_arg) {
            (Some(role), _) => format!("owns({id_arg} as {role})"),
            (None, Some(arg)) => format!("owns({id_arg} as ${arg})"),
            (None, None) => format!("owns({id_arg})"),
        },
        Rule::Composite { mode, rules } => {
            let joiner = match mode {
                CompositeMode::All => " && ",
                CompositeMode::Any => " || ",
            };
            let parts: Vec<String> = rules.iter().map(describe).collect();
            format!("({})", parts.join(joiner))
        }
    }
}
