//! `parse` command handler.

use anyhow::Result;
use anywhere_core::command::CommandParser;
use anywhere_core::domain::RuntimeKind;

use crate::bootstrap::CliContext;

/// Print the argv a start command resolves to, one token per line.
pub fn execute(ctx: &CliContext, command: &str, kind: RuntimeKind) -> Result<()> {
    let argv = ctx.gateway().preview_command(command, kind)?;
    println!("Transport: {}", CommandParser::transport_of(argv.as_slice()));
    for (i, token) in argv.iter().enumerate() {
        println!("{i:>3}  {token}");
    }
    Ok(())
}
