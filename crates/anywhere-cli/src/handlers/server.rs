//! `server` command handlers.

use std::path::Path;

use anyhow::Result;
use anywhere_core::domain::{EnvVarDecl, NewServer, SecretFileMount, UpdateServer};
use anywhere_gateway::StartReport;
use tracing::{info, warn};

use super::resolve_server;
use crate::bootstrap::CliContext;
use crate::commands::{AddArgs, ServerCommand, UpdateArgs};
use crate::error::CliError;
use crate::presentation::{display_server_info, print_separator, status_label, truncate_string};

pub fn execute(ctx: &CliContext, command: ServerCommand) -> Result<()> {
    match command {
        ServerCommand::Add(args) => add(ctx, args),
        ServerCommand::List => list(ctx),
        ServerCommand::Show { server, json } => show(ctx, &server, json),
        ServerCommand::Update(args) => update(ctx, args),
        ServerCommand::Remove { server } => remove(ctx, &server),
        ServerCommand::Enable { server } => set_active(ctx, &server, true),
        ServerCommand::Disable { server } => set_active(ctx, &server, false),
        ServerCommand::Start { server } => start(ctx, &server, false),
        ServerCommand::Restart { server } => start(ctx, &server, true),
        ServerCommand::Stop { server } => stop(ctx, &server),
        ServerCommand::StartAll => start_all(ctx),
        ServerCommand::Sync { server } => sync(ctx, &server),
        ServerCommand::Refresh { server } => refresh(ctx, &server),
    }
}

fn add(ctx: &CliContext, args: AddArgs) -> Result<()> {
    let new_server = new_server_from(args)?;
    let server = ctx.gateway().add_server(new_server)?;
    println!("✓ Registered '{}' ({})", server.name, server.id);
    println!("Use 'mcp-anywhere server start {}' to launch it.", server.name);
    Ok(())
}

fn list(ctx: &CliContext) -> Result<()> {
    let servers = ctx.gateway().list_servers()?;
    if servers.is_empty() {
        println!("No servers registered.");
        println!("Use 'mcp-anywhere server add <name> ...' to register one.");
        return Ok(());
    }

    println!("Found {} server(s):\n", servers.len());
    println!(
        "{:<10} {:<24} {:<7} {:<18} Source",
        "ID", "Name", "Kind", "Status"
    );
    print_separator(100);
    for server in servers {
        println!(
            "{:<10} {:<24} {:<7} {:<18} {}",
            server.id,
            truncate_string(&server.name, 23),
            server.runtime_kind,
            status_label(&server),
            truncate_string(&server.source, 40),
        );
    }
    Ok(())
}

fn show(ctx: &CliContext, key: &str, json: bool) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    let info = ctx.gateway().server_info(server.id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        display_server_info(&info);
    }
    Ok(())
}

fn update(ctx: &CliContext, args: UpdateArgs) -> Result<()> {
    let server = resolve_server(ctx, &args.server)?;
    let edit = update_from(args)?;
    let updated = ctx.gateway().update_server(server.id, edit)?;
    println!("✓ Updated '{}' ({})", updated.name, status_label(&updated));
    Ok(())
}

fn remove(ctx: &CliContext, key: &str) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    ctx.gateway().remove_server(server.id.clone())?;
    println!("✓ Removed '{}' ({})", server.name, server.id);
    Ok(())
}

fn set_active(ctx: &CliContext, key: &str, active: bool) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    let server = ctx.gateway().set_active(server.id, active)?;
    println!("✓ '{}' is now {}", server.name, status_label(&server));
    Ok(())
}

fn start(ctx: &CliContext, key: &str, restart: bool) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    println!("Starting '{}'...", server.name);
    let report = if restart {
        ctx.gateway().restart_server(server.id)?
    } else {
        ctx.gateway().start_server(server.id)?
    };
    print_start_report(&report);
    Ok(())
}

fn stop(ctx: &CliContext, key: &str) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    ctx.gateway().stop_server(server.id)?;
    println!("✓ Stopped '{}'", server.name);
    Ok(())
}

/// Reports every server; fails only when every start failed.
fn start_all(ctx: &CliContext) -> Result<()> {
    let results = ctx.gateway().start_all_active()?;
    if results.is_empty() {
        println!("No active servers.");
        return Ok(());
    }

    let total = results.len();
    let mut failed = 0;
    for result in results {
        match result.result {
            Ok(report) => print_start_report(&report),
            Err(err) => {
                failed += 1;
                warn!(server = %result.server_id, op = err.operation(), "start failed");
                println!("✗ '{}' failed during {}: {err}", result.server_name, err.operation());
            }
        }
    }
    println!("\n{} of {total} server(s) started.", total - failed);
    if failed == total {
        anyhow::bail!("no server could be started");
    }
    Ok(())
}

fn sync(ctx: &CliContext, key: &str) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    let outcome = ctx.gateway().sync_tools(server.id)?;
    if outcome.is_noop() {
        println!("✓ '{}' tools are up to date", server.name);
    } else {
        println!(
            "✓ '{}' tools synced: {} added, {} removed",
            server.name, outcome.added, outcome.removed
        );
    }
    Ok(())
}

fn refresh(ctx: &CliContext, key: &str) -> Result<()> {
    let server = resolve_server(ctx, key)?;
    let updated = ctx.gateway().refresh_tool_schemas(server.id)?;
    println!("✓ '{}': refreshed {updated} tool(s)", server.name);
    Ok(())
}

fn print_start_report(report: &StartReport) {
    let how = if report.container.reused {
        "reused"
    } else if report.container.image_prepared {
        "built and started"
    } else {
        "started"
    };
    info!(server = %report.server.id, container = %report.container.handle.name, how, "server up");
    println!(
        "✓ '{}' {how} as {} ({} tool(s) added, {} removed)",
        report.server.name,
        report.container.handle.name,
        report.tools.added,
        report.tools.removed
    );
}

/// Build the registration from `server add` arguments.
pub fn new_server_from(args: AddArgs) -> Result<NewServer, CliError> {
    let mut server = NewServer::new(args.name, args.source, args.kind, args.start_command)
        .with_active(!args.inactive);
    if let Some(install) = args.install_command {
        server = server.with_install(install);
    }
    server.description = args.description;
    for (key, value) in args.env {
        server = server.with_env(EnvVarDecl::new(key, value));
    }
    for (key, value) in args.required_env {
        server = server.with_env(EnvVarDecl::new(key, value).required());
    }
    for (env_var, host_path) in args.secret {
        server = server.with_secret(secret_mount(env_var, host_path)?);
    }
    Ok(server)
}

/// Build the partial edit from `server update` arguments.
///
/// Repeated `--env`/`--secret` flags replace the whole list; omitting them
/// keeps the stored one.
pub fn update_from(args: UpdateArgs) -> Result<UpdateServer, CliError> {
    let install_command = if args.clear_install {
        Some(None)
    } else {
        args.install_command.map(Some)
    };
    let env_variables = (!args.env.is_empty()).then(|| {
        args.env
            .into_iter()
            .map(|(key, value)| EnvVarDecl::new(key, value))
            .collect()
    });
    let secret_files = if args.secret.is_empty() {
        None
    } else {
        Some(
            args.secret
                .into_iter()
                .map(|(env_var, host_path)| secret_mount(env_var, host_path))
                .collect::<Result<Vec<_>, _>>()?,
        )
    };

    Ok(UpdateServer {
        name: args.name,
        description: args.description.map(Some),
        source: args.source,
        runtime_kind: args.kind,
        install_command,
        start_command: args.start_command,
        env_variables,
        secret_files,
        is_active: None,
    })
}

/// The in-container file keeps the host file's name.
fn secret_mount(env_var: String, host_path: String) -> Result<SecretFileMount, CliError> {
    let file_name = Path::new(&host_path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::Arguments(format!("secret path has no file name: {host_path}")))?;
    Ok(SecretFileMount::new(env_var, file_name, host_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Commands, ServerCommand};
    use crate::parser::Cli;
    use clap::Parser;

    fn parse_server(args: &[&str]) -> ServerCommand {
        let mut argv = vec!["mcp-anywhere", "server"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Some(Commands::Server { command }) => command,
            other => panic!("expected server command, got {other:?}"),
        }
    }

    #[test]
    fn add_arguments_become_registration() {
        let ServerCommand::Add(args) = parse_server(&[
            "add",
            "gcp",
            "--source",
            "https://github.com/org/gcp-mcp.git",
            "--kind",
            "uvx",
            "--start",
            "uv run gcp-mcp",
            "--install",
            "uv sync",
            "--required-env",
            "PROJECT=demo",
            "--secret",
            "GOOGLE_APPLICATION_CREDENTIALS=/home/me/keys/sa.json",
            "--inactive",
        ]) else {
            panic!("expected add");
        };

        let server = new_server_from(args).unwrap();
        assert_eq!(server.install_command.as_deref(), Some("uv sync"));
        assert!(!server.is_active);
        assert!(server.env_variables[0].required);
        assert_eq!(server.secret_files[0].file_name, "sa.json");
        assert_eq!(
            server.secret_files[0].container_path(),
            "/run/secrets/sa.json"
        );
    }

    #[test]
    fn secret_without_file_name_is_rejected() {
        let err = secret_mount("KEY".into(), "/".into()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn update_leaves_omitted_fields_alone() {
        let ServerCommand::Update(args) = parse_server(&["update", "github", "--start", "npx -y pkg"])
        else {
            panic!("expected update");
        };
        let edit = update_from(args).unwrap();
        assert_eq!(edit.start_command.as_deref(), Some("npx -y pkg"));
        assert!(edit.name.is_none());
        assert!(edit.install_command.is_none());
        assert!(edit.env_variables.is_none());
        assert!(edit.secret_files.is_none());
    }

    #[test]
    fn update_can_clear_install_and_replace_env() {
        let ServerCommand::Update(args) = parse_server(&[
            "update",
            "github",
            "--clear-install",
            "--env",
            "A=1",
            "--env",
            "B=2",
        ]) else {
            panic!("expected update");
        };
        let edit = update_from(args).unwrap();
        assert_eq!(edit.install_command, Some(None));
        let keys: Vec<_> = edit
            .env_variables
            .unwrap()
            .into_iter()
            .map(|v| v.key)
            .collect();
        assert_eq!(keys, ["A", "B"]);
    }
}
