//! Command handlers.
//!
//! Each handler runs on the calling thread and talks to the gateway through
//! the blocking facade in [`CliContext`].

pub mod parse;
pub mod server;
pub mod tools;
pub mod usage;

use anyhow::Result;
use anywhere_core::domain::ServerConfig;

use crate::bootstrap::CliContext;
use crate::commands::Commands;

/// Route a parsed command to its handler.
pub fn dispatch(ctx: &CliContext, command: Commands) -> Result<()> {
    match command {
        Commands::Server { command } => server::execute(ctx, command),
        Commands::Tools { command } => tools::execute(ctx, command),
        Commands::Usage { command } => usage::execute(ctx, command),
        Commands::Parse { command, kind } => parse::execute(ctx, &command, kind),
    }
}

/// Look a server up by id, then by name.
fn resolve_server(ctx: &CliContext, key: &str) -> Result<ServerConfig> {
    Ok(ctx.gateway().find_server(key)?)
}
