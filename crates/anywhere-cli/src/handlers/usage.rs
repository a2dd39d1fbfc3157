//! `usage` command handlers.

use anyhow::Result;

use super::resolve_server;
use crate::bootstrap::CliContext;
use crate::commands::UsageCommand;
use crate::presentation::{format_timestamp, print_separator, truncate_string};

pub fn execute(ctx: &CliContext, command: UsageCommand) -> Result<()> {
    match command {
        UsageCommand::List { server, limit } => list(ctx, server.as_deref(), limit),
    }
}

fn list(ctx: &CliContext, server: Option<&str>, limit: u32) -> Result<()> {
    let server_id = server
        .map(|key| resolve_server(ctx, key).map(|s| s.id))
        .transpose()?;
    let records = ctx.gateway().recent_usage(server_id, limit)?;

    if records.is_empty() {
        println!("No tool usage recorded.");
        return Ok(());
    }

    println!(
        "{:<20} {:<20} {:<30} {:<8} {:>8}  Client",
        "Time", "Server", "Tool", "Status", "Latency"
    );
    print_separator(100);
    for record in records {
        println!(
            "{:<20} {:<20} {:<30} {:<8} {:>6}ms  {}",
            format_timestamp(&record.timestamp),
            truncate_string(&record.server_name, 19),
            truncate_string(&record.tool_name, 29),
            record.status.as_str(),
            record.latency_ms,
            record.client_name.as_deref().unwrap_or("--"),
        );
        if let Some(err) = &record.error {
            println!("    error: {err}");
        }
    }
    Ok(())
}
