//! Top-level argument parser.

use clap::Parser;

use crate::commands::Commands;

/// Run MCP tool servers in containers and keep their tool catalogs in sync.
#[derive(Parser, Debug)]
#[command(name = "mcp-anywhere")]
#[command(about = "Run MCP tool servers in containers")]
#[command(version)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
