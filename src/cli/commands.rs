use clap::Subcommand;

use super::evaluate::EvaluateArgs;
use super::gates::GatesArgs;
use super::registry::RegistryArgs;
use super::replay::ReplayArgs;
use super::token::TokenArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Issue or inspect bearer tokens
    Token(TokenArgs),
    /// Show the role and permission registry
    Registry(RegistryArgs),
    /// Show the operation gate map
    Gates(GatesArgs),
    /// Evaluate one operation against the gate
    Evaluate(EvaluateArgs),
    /// Evaluate a JSON-lines batch of requests against one service instance
    Replay(ReplayArgs),
}
