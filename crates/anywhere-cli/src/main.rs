//! CLI entry point.
//!
//! The binary stays synchronous: handlers run on this thread and reach the
//! async services through the event loop bridge owned by [`CliContext`].

use std::process::ExitCode;

use anywhere_cli::{Cli, CliContext, CliError, bootstrap, handlers, init_logging};
use anywhere_core::GatewayConfig;
use clap::{CommandFactory, Parser};

fn main() -> ExitCode {
    // A missing .env file is normal.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        // Bare invocation prints help rather than erroring.
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    let ctx = match GatewayConfig::from_env()
        .map_err(CliError::from)
        .and_then(bootstrap)
    {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(err.exit_code());
        }
    };

    let outcome = handlers::dispatch(&ctx, command);
    CliContext::shutdown(ctx);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(CliError::exit_code_of(&err))
        }
    }
}
