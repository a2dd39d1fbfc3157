//! Server detail rendering.

use anywhere_core::domain::{BuildStatus, ServerConfig};
use anywhere_gateway::ServerInfo;

use super::tables::{format_optional, format_timestamp, print_separator};

/// Short status column for server tables.
pub fn status_label(server: &ServerConfig) -> String {
    let state = if server.is_active { "active" } else { "inactive" };
    format!("{state}/{}", server.build_status.as_str())
}

/// Print the `server show` summary.
pub fn display_server_info(info: &ServerInfo) {
    let server = &info.server;
    println!("Server: {} ({})", server.name, server.id);
    print_separator(60);
    println!("  Description: {}", format_optional(server.description.as_ref(), "--"));
    println!("  Source:      {}", server.source);
    println!("  Kind:        {}", server.runtime_kind);
    println!(
        "  Install:     {}",
        format_optional(server.install_command.as_ref(), "--")
    );
    println!("  Start:       {}", server.start_command);
    println!("  Status:      {}", status_label(server));
    if server.build_status == BuildStatus::Failed {
        println!(
            "  Last error:  {}",
            format_optional(server.build_error.as_ref(), "--")
        );
    }
    println!("  Added:       {}", format_timestamp(&server.created_at));

    if !server.env_variables.is_empty() {
        println!("\nEnvironment:");
        for var in &server.env_variables {
            let marker = if var.required { " (required)" } else { "" };
            let shown = if var.value.is_empty() { "<unset>" } else { "<set>" };
            println!("  {}={shown}{marker}", var.key);
        }
    }
    if !server.secret_files.is_empty() {
        println!("\nSecret files:");
        for mount in &server.secret_files {
            println!(
                "  {} -> {} ({})",
                mount.env_var,
                mount.container_path(),
                mount.host_path
            );
        }
    }

    println!("\nRun configuration:");
    match (&info.run_config, &info.command_error) {
        (Some(run), _) => {
            println!("  Image:      {}", run.image_tag);
            println!("  Container:  {}", run.container_name);
            println!("  Transport:  {}", run.transport);
            println!("  Argv:       {}", run.argv.join(" "));
        }
        (None, Some(err)) => println!("  invalid start command: {err}"),
        (None, None) => println!("  --"),
    }

    match (&info.container, &info.container_error) {
        (Some(state), _) => println!(
            "\nContainer: {} ({})",
            state.name,
            if state.running { "running" } else { "stopped" }
        ),
        (None, Some(err)) => println!("\nContainer: unavailable ({err})"),
        (None, None) => println!("\nContainer: none"),
    }

    if info.tools.is_empty() {
        println!("\nNo tools discovered.");
        return;
    }
    println!("\nTools ({}):", info.tools.len());
    for tool in &info.tools {
        let flag = if tool.is_enabled { "on " } else { "off" };
        println!("  [{flag}] {}", tool.tool_name);
    }
}
