//! Gateway configuration.
//!
//! One `GatewayConfig` value is built at process start and handed to every
//! component constructor. Nothing reads the environment after that.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{BUILTIN_COMMAND, CommandParser};
use crate::domain::RuntimeKind;
use crate::paths::{self, PathError};

pub const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DEFAULT_IMAGE_NAMESPACE: &str = "mcp-anywhere";
pub const DEFAULT_CONTAINER_PREFIX: &str = "mcp";
pub const DEFAULT_NODE_IMAGE: &str = "node:20-slim";
pub const DEFAULT_PYTHON_IMAGE: &str = "ghcr.io/astral-sh/uv:python3.12-bookworm-slim";
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 300;

/// Errors in configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} may only contain lowercase letters, digits, '-', '_', '.' and '/'")]
    InvalidName(&'static str),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Process-wide gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    /// Host directory holding secret files mounted into containers.
    pub secrets_dir: PathBuf,
    pub docker_bin: String,
    /// Repository prefix of built images (`<namespace>/<server id>`).
    pub image_namespace: String,
    /// Prefix of container names (`<prefix>-<server id>`).
    pub container_prefix: String,
    pub node_base_image: String,
    pub python_base_image: String,
    /// Names that identify the gateway's own command in start commands.
    pub builtin_commands: Vec<String>,
    pub stop_grace: Duration,
    pub discovery_timeout: Duration,
    /// Default timeout for synchronous calls crossing into the main loop.
    pub bridge_timeout: Duration,
    /// Main loop worker threads; `0` uses the number of CPUs.
    pub worker_threads: usize,
}

impl GatewayConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_path: paths::database_path(&data_dir),
            secrets_dir: paths::secrets_dir(&data_dir),
            data_dir,
            docker_bin: DEFAULT_DOCKER_BIN.to_string(),
            image_namespace: DEFAULT_IMAGE_NAMESPACE.to_string(),
            container_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            node_base_image: DEFAULT_NODE_IMAGE.to_string(),
            python_base_image: DEFAULT_PYTHON_IMAGE.to_string(),
            builtin_commands: vec![BUILTIN_COMMAND.to_string()],
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            discovery_timeout: Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT_SECS),
            bridge_timeout: Duration::from_secs(DEFAULT_BRIDGE_TIMEOUT_SECS),
            worker_threads: 0,
        }
    }

    /// Build from the process environment (`MCP_ANYWHERE_*`).
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = paths::resolve_data_root(lookup(paths::DATA_DIR_ENV).as_deref())?;
        let mut config = Self::with_data_dir(data_dir);

        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("MCP_ANYWHERE_DATABASE_PATH") {
            config.database_path = paths::normalize_user_path(&v)?;
        }
        if let Some(v) = text("MCP_ANYWHERE_SECRETS_DIR") {
            config.secrets_dir = paths::normalize_user_path(&v)?;
        }
        if let Some(v) = text("MCP_ANYWHERE_DOCKER_BIN") {
            config.docker_bin = v;
        }
        if let Some(v) = text("MCP_ANYWHERE_IMAGE_NAMESPACE") {
            config.image_namespace = v;
        }
        if let Some(v) = text("MCP_ANYWHERE_CONTAINER_PREFIX") {
            config.container_prefix = v;
        }
        if let Some(v) = text("MCP_ANYWHERE_NODE_IMAGE") {
            config.node_base_image = v;
        }
        if let Some(v) = text("MCP_ANYWHERE_PYTHON_IMAGE") {
            config.python_base_image = v;
        }
        if let Some(v) = text("MCP_ANYWHERE_BUILTIN_COMMANDS") {
            config.builtin_commands = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = text("MCP_ANYWHERE_STOP_GRACE_SECS") {
            config.stop_grace =
                Duration::from_secs(parse_number("MCP_ANYWHERE_STOP_GRACE_SECS", &v)?);
        }
        if let Some(v) = text("MCP_ANYWHERE_DISCOVERY_TIMEOUT_SECS") {
            config.discovery_timeout =
                Duration::from_secs(parse_number("MCP_ANYWHERE_DISCOVERY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = text("MCP_ANYWHERE_BRIDGE_TIMEOUT_SECS") {
            config.bridge_timeout =
                Duration::from_secs(parse_number("MCP_ANYWHERE_BRIDGE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = text("MCP_ANYWHERE_WORKER_THREADS") {
            let threads = parse_number("MCP_ANYWHERE_WORKER_THREADS", &v)?;
            config.worker_threads = usize::try_from(threads).unwrap_or(usize::MAX);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that constructors cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.docker_bin.trim().is_empty() {
            return Err(ConfigError::Empty("docker_bin"));
        }
        if self.builtin_commands.is_empty() {
            return Err(ConfigError::Empty("builtin_commands"));
        }
        for (key, value) in [
            ("image_namespace", &self.image_namespace),
            ("container_prefix", &self.container_prefix),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Empty(key));
            }
            if !value.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.' | '/')
            }) {
                return Err(ConfigError::InvalidName(key));
            }
        }
        for (key, value) in [
            ("discovery_timeout", self.discovery_timeout),
            ("bridge_timeout", self.bridge_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Zero(key));
            }
        }
        Ok(())
    }

    /// Command parser recognizing the configured builtin command names.
    pub fn command_parser(&self) -> CommandParser {
        CommandParser::new(self.builtin_commands.clone())
    }

    /// Base image used to build servers of `kind`; `None` for prebuilt images.
    pub fn base_image(&self, kind: RuntimeKind) -> Option<&str> {
        match kind {
            RuntimeKind::Npx => Some(&self.node_base_image),
            RuntimeKind::Uvx => Some(&self.python_base_image),
            RuntimeKind::Docker => None,
        }
    }

    /// Create the data and secrets directories.
    pub fn ensure_directories(&self) -> Result<(), PathError> {
        paths::ensure_directory(&self.data_dir)?;
        paths::ensure_directory(&self.secrets_dir)?;
        if let Some(parent) = self.database_path.parent().filter(|p| *p != Path::new("")) {
            paths::ensure_directory(parent)?;
        }
        Ok(())
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_rooted_in_data_dir() {
        let config = GatewayConfig::with_data_dir("/var/lib/mcp");
        assert_eq!(config.database_path, Path::new("/var/lib/mcp/mcp-anywhere.db"));
        assert_eq!(config.secrets_dir, Path::new("/var/lib/mcp/secrets"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("MCP_ANYWHERE_DATA_DIR", "/srv/gw"),
            ("MCP_ANYWHERE_DOCKER_BIN", "podman"),
            ("MCP_ANYWHERE_BUILTIN_COMMANDS", "mcp-anywhere, gw ,"),
            ("MCP_ANYWHERE_DISCOVERY_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, Path::new("/srv/gw"));
        assert_eq!(config.docker_bin, "podman");
        assert_eq!(config.builtin_commands, ["mcp-anywhere", "gw"]);
        assert_eq!(config.discovery_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_values() {
        let err = GatewayConfig::from_lookup(lookup(&[
            ("MCP_ANYWHERE_DATA_DIR", "/srv/gw"),
            ("MCP_ANYWHERE_BRIDGE_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let err = GatewayConfig::from_lookup(lookup(&[
            ("MCP_ANYWHERE_DATA_DIR", "/srv/gw"),
            ("MCP_ANYWHERE_DISCOVERY_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Zero("discovery_timeout")));

        let err = GatewayConfig::from_lookup(lookup(&[
            ("MCP_ANYWHERE_DATA_DIR", "/srv/gw"),
            ("MCP_ANYWHERE_IMAGE_NAMESPACE", "Bad Name"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName("image_namespace")));
    }

    #[test]
    fn base_images_per_kind() {
        let config = GatewayConfig::with_data_dir("/tmp/x");
        assert_eq!(config.base_image(RuntimeKind::Npx), Some(DEFAULT_NODE_IMAGE));
        assert_eq!(config.base_image(RuntimeKind::Docker), None);
    }
}
