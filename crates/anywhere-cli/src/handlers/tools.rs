//! `tools` command handlers.

use anyhow::Result;
use tracing::info;

use super::resolve_server;
use crate::bootstrap::CliContext;
use crate::commands::ToolsCommand;
use crate::presentation::{print_separator, truncate_string};

pub fn execute(ctx: &CliContext, command: ToolsCommand) -> Result<()> {
    match command {
        ToolsCommand::List { server } => list(ctx, server.as_deref()),
        ToolsCommand::Enable { server, tool } => toggle(ctx, &server, &tool, true),
        ToolsCommand::Disable { server, tool } => toggle(ctx, &server, &tool, false),
    }
}

/// Without a server, only enabled tools of every server are listed.
fn list(ctx: &CliContext, server: Option<&str>) -> Result<()> {
    let server_id = server
        .map(|key| resolve_server(ctx, key).map(|s| s.id))
        .transpose()?;
    let tools = ctx.gateway().list_tools(server_id)?;

    if tools.is_empty() {
        println!("No tools found.");
        println!("Use 'mcp-anywhere server start <server>' to discover tools.");
        return Ok(());
    }

    println!("{:<40} {:<8} Description", "Full name", "Enabled");
    print_separator(100);
    for tool in tools {
        println!(
            "{:<40} {:<8} {}",
            truncate_string(&tool.full_tool_name, 39),
            if tool.is_enabled { "yes" } else { "no" },
            truncate_string(tool.description.lines().next().unwrap_or(""), 50),
        );
    }
    Ok(())
}

fn toggle(ctx: &CliContext, server: &str, tool: &str, enabled: bool) -> Result<()> {
    let server = resolve_server(ctx, server)?;
    let record = ctx.gateway().set_tool_enabled(server.id, tool, enabled)?;
    info!(tool = %record.full_tool_name, enabled, "tool toggled");
    println!(
        "✓ {} {}",
        record.full_tool_name,
        if record.is_enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
