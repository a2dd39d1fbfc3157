//! CLI error type and process exit codes.

use anywhere_core::ports::RepositoryError;
use anywhere_gateway::GatewayError;
use thiserror::Error;

/// Errors that end a CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl CliError {
    /// Exit code following the sysexits convention where one fits.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Gateway(err) => gateway_exit_code(err),
            Self::Arguments(_) => 2,
            Self::Io(_) => 74,
            Self::Config(_) => 78,
            Self::Database(_) => 73,
        }
    }

    /// Exit code for an error returned by a handler.
    pub fn exit_code_of(err: &anyhow::Error) -> u8 {
        if let Some(cli) = err.downcast_ref::<Self>() {
            return cli.exit_code();
        }
        err.downcast_ref::<GatewayError>()
            .map_or(1, gateway_exit_code)
    }
}

const fn gateway_exit_code(err: &GatewayError) -> u8 {
    match err {
        GatewayError::Validation(_) | GatewayError::Command(_) => 65,
        GatewayError::Repository(RepositoryError::NotFound(_)) => 1,
        GatewayError::Repository(_) => 73,
        GatewayError::Container(_) | GatewayError::ToolSync { .. } => 71,
        GatewayError::NotRunning(_) => 69,
        GatewayError::Bridge(_) => 70,
    }
}

impl From<anywhere_core::ConfigError> for CliError {
    fn from(err: anywhere_core::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anywhere_core::paths::PathError> for CliError {
    fn from(err: anywhere_core::paths::PathError) -> Self {
        Self::Config(err.to_string())
    }
}
