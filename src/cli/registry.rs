use std::collections::BTreeMap;

use anyhow::Result;
use authz_engine::Role;
use clap::{Args, Subcommand};

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub command: RegistryCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum RegistryCommand {
    Show(RegistryShowArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RegistryShowArgs {
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_registry(args: RegistryArgs, ctx: &CliContext) -> Result<()> {
    let registry = ctx.registry()?;
    match args.command {
        RegistryCommand::Show(show) => {
            let table: BTreeMap<&str, Vec<&str>> = Role::ALL
                .iter()
                .map(|role| {
                    let permissions = registry
                        .permissions_for(*role)
                        .map(|permission| permission.as_str())
                        .collect();
                    (role.as_str(), permissions)
                })
                .collect();

            if show.json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                for role in Role::ALL {
                    let permissions = table.get(role.as_str()).cloned().unwrap_or_default();
                    println!(
                        "{} (rank {}) → {} permissions",
                        role,
                        role.rank(),
                        permissions.len()
                    );
                    for permission in permissions {
                        println!("  {permission}");
                    }
                }
            }
        }
    }
    Ok(())
}
