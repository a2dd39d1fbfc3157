//! Subcommand definitions.

use anywhere_core::domain::RuntimeKind;
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register, edit and run tool servers
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },
    /// Inspect and toggle discovered tools
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },
    /// Show recorded tool invocations
    Usage {
        #[command(subcommand)]
        command: UsageCommand,
    },
    /// Parse a start command and print the container argv
    Parse {
        /// Start command, quoted as a single argument
        command: String,
        /// Runtime kind the command targets
        #[arg(short, long, default_value = "npx")]
        kind: RuntimeKind,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Register a new tool server
    Add(AddArgs),
    /// List registered servers
    List,
    /// Show one server with its run configuration and tools
    Show {
        /// Server id or name
        server: String,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Edit a registered server
    Update(UpdateArgs),
    /// Stop and delete a server with its tools
    Remove {
        /// Server id or name
        server: String,
    },
    /// Mark a server active so `start-all` launches it
    Enable {
        /// Server id or name
        server: String,
    },
    /// Mark a server inactive and stop its container
    Disable {
        /// Server id or name
        server: String,
    },
    /// Build the image, start the container and sync tools
    Start {
        /// Server id or name
        server: String,
    },
    /// Stop a server's container
    Stop {
        /// Server id or name
        server: String,
    },
    /// Replace a server's container and sync tools
    Restart {
        /// Server id or name
        server: String,
    },
    /// Start every active server
    StartAll,
    /// Rediscover tools from a running server
    Sync {
        /// Server id or name
        server: String,
    },
    /// Refresh tool descriptions and schemas without adding or removing tools
    Refresh {
        /// Server id or name
        server: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique server name
    pub name: String,

    /// Package name, git URL or image reference
    #[arg(long)]
    pub source: String,

    /// Runtime kind (npx, uvx, docker)
    #[arg(short, long)]
    pub kind: RuntimeKind,

    /// Command that launches the server inside the container
    #[arg(long = "start")]
    pub start_command: String,

    /// Build step run before the start command
    #[arg(long = "install")]
    pub install_command: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(short, long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Required environment variable as KEY=VALUE (repeatable)
    #[arg(long, value_parser = parse_key_value)]
    pub required_env: Vec<(String, String)>,

    /// Secret file as ENV_VAR=HOST_PATH (repeatable)
    #[arg(long, value_parser = parse_key_value)]
    pub secret: Vec<(String, String)>,

    /// Register without marking the server active
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Server id or name
    pub server: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(short, long)]
    pub kind: Option<RuntimeKind>,

    #[arg(long = "start")]
    pub start_command: Option<String>,

    #[arg(long = "install", conflicts_with = "clear_install")]
    pub install_command: Option<String>,

    /// Remove the install command
    #[arg(long)]
    pub clear_install: bool,

    #[arg(short, long)]
    pub description: Option<String>,

    /// Replace all environment variables with these KEY=VALUE pairs
    #[arg(short, long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Replace all secret files with these ENV_VAR=HOST_PATH pairs
    #[arg(long, value_parser = parse_key_value)]
    pub secret: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommand {
    /// List tools, enabled ones only unless a server is given
    List {
        /// Server id or name
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Enable a tool
    Enable {
        /// Server id or name
        server: String,
        /// Tool name as reported by the server
        tool: String,
    },
    /// Disable a tool
    Disable {
        /// Server id or name
        server: String,
        /// Tool name as reported by the server
        tool: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsageCommand {
    /// List recent tool invocations, newest first
    List {
        /// Server id or name
        #[arg(short, long)]
        server: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

/// Split `KEY=VALUE`; the value may be empty or contain `=`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
