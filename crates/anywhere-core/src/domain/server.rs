//! Tool server registration types.
//!
//! A `ServerConfig` is the persisted record an operator manages. Everything
//! the container layer derives from it (image, container, argv) is recomputed
//! on each lifecycle operation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, immutable identifier of a registered tool server.
///
/// Ids are 8 lowercase hex characters. They double as the prefix of every
/// full tool name the server exposes, so they must stay short and safe to
/// embed in container names and image tags.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Length of a generated id.
    pub const LEN: usize = 8;

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..Self::LEN].to_string())
    }

    /// Wrap an id loaded from storage or supplied by a caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Packaging ecosystem used to launch a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Node package launched with `npx` (or `bunx`, `pnpm dlx`).
    Npx,
    /// Python tool launched with `uvx` (or `uv run`, `pipx run`).
    Uvx,
    /// Prebuilt container image run as-is.
    Docker,
}

impl RuntimeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Npx => "npx",
            Self::Uvx => "uvx",
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npx" | "node" | "npm" => Ok(Self::Npx),
            "uvx" | "python" | "uv" => Ok(Self::Uvx),
            "docker" | "image" | "container" => Ok(Self::Docker),
            other => Err(format!("unknown runtime kind: {other}")),
        }
    }
}

/// Lifecycle status of a server's image and container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Never started since registration or last edit.
    #[default]
    Pending,
    /// A start operation is in flight.
    Building,
    /// Image built, container started and tools discovered.
    Built,
    /// The last start attempt failed; see `build_error`.
    Failed,
}

impl BuildStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Built => "built",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored representation, falling back to `Pending`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "building" => Self::Building,
            "built" => Self::Built,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Declared environment variable of a tool server.
///
/// Order is preserved from registration. A `required` variable must carry a
/// non-empty value before the server can be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarDecl {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub required: bool,
}

impl EnvVarDecl {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            required: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A secret file bind-mounted read-only into the server container.
///
/// The container path is exported through `env_var` so the server can find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFileMount {
    /// Environment variable that receives the in-container path.
    pub env_var: String,
    /// File name inside the container secrets directory.
    pub file_name: String,
    /// Absolute path of the file on the host.
    pub host_path: String,
}

impl SecretFileMount {
    /// Directory inside the container that holds mounted secrets.
    pub const CONTAINER_DIR: &'static str = "/run/secrets";

    pub fn new(
        env_var: impl Into<String>,
        file_name: impl Into<String>,
        host_path: impl Into<String>,
    ) -> Self {
        Self {
            env_var: env_var.into(),
            file_name: file_name.into(),
            host_path: host_path.into(),
        }
    }

    /// Path of the mounted file as seen by the server process.
    pub fn container_path(&self) -> String {
        format!("{}/{}", Self::CONTAINER_DIR, self.file_name)
    }
}

/// A registered tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: ServerId,
    /// Operator-facing name, unique across all servers.
    pub name: String,
    pub description: Option<String>,
    /// Package name, git repository URL or image reference depending on `runtime_kind`.
    pub source: String,
    pub runtime_kind: RuntimeKind,
    /// Optional image-build step run once per build hash.
    pub install_command: Option<String>,
    pub start_command: String,
    pub env_variables: Vec<EnvVarDecl>,
    pub secret_files: Vec<SecretFileMount>,
    pub is_active: bool,
    pub build_status: BuildStatus,
    pub build_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerConfig {
    /// The non-empty install command, if any.
    pub fn install_step(&self) -> Option<&str> {
        self.install_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }

    /// Whether `source` points at a git repository rather than a package name.
    pub fn is_git_source(&self) -> bool {
        is_git_url(&self.source)
    }

    /// Whether both records would run the same container.
    pub fn same_runtime(&self, other: &Self) -> bool {
        self.source == other.source
            && self.runtime_kind == other.runtime_kind
            && self.install_command == other.install_command
            && self.start_command == other.start_command
            && self.env_variables == other.env_variables
            && self.secret_files == other.secret_files
    }
}

/// Heuristic used for both validation and image builds.
pub fn is_git_url(source: &str) -> bool {
    let s = source.trim();
    s.starts_with("git@")
        || s.starts_with("git://")
        || s.ends_with(".git")
        || ((s.starts_with("https://") || s.starts_with("http://"))
            && ["github.com/", "gitlab.com/", "bitbucket.org/", "codeberg.org/"]
                .iter()
                .any(|host| s.contains(host)))
}

/// A server to be registered (no id yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub description: Option<String>,
    pub source: String,
    pub runtime_kind: RuntimeKind,
    pub install_command: Option<String>,
    pub start_command: String,
    #[serde(default)]
    pub env_variables: Vec<EnvVarDecl>,
    #[serde(default)]
    pub secret_files: Vec<SecretFileMount>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl NewServer {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        runtime_kind: RuntimeKind,
        start_command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            source: source.into(),
            runtime_kind,
            install_command: None,
            start_command: start_command.into(),
            env_variables: Vec::new(),
            secret_files: Vec::new(),
            is_active: true,
        }
    }

    #[must_use]
    pub fn with_install(mut self, command: impl Into<String>) -> Self {
        self.install_command = Some(command.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, var: EnvVarDecl) -> Self {
        self.env_variables.push(var);
        self
    }

    #[must_use]
    pub fn with_secret(mut self, mount: SecretFileMount) -> Self {
        self.secret_files.push(mount);
        self
    }

    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Materialize the record the repository will persist.
    pub fn into_config(self, id: ServerId, now: DateTime<Utc>) -> ServerConfig {
        ServerConfig {
            id,
            name: self.name,
            description: self.description,
            source: self.source,
            runtime_kind: self.runtime_kind,
            install_command: self.install_command,
            start_command: self.start_command,
            env_variables: self.env_variables,
            secret_files: self.secret_files,
            is_active: self.is_active,
            build_status: BuildStatus::Pending,
            build_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial edit of a registered server. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_kind: Option<RuntimeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_command: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_variables: Option<Vec<EnvVarDecl>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_files: Option<Vec<SecretFileMount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl UpdateServer {
    /// Apply this edit on top of `server`, returning the edited copy.
    ///
    /// Any change to what the container runs resets the build status so the
    /// next start rebuilds instead of reusing a stale image.
    pub fn apply_to(self, server: &ServerConfig) -> ServerConfig {
        let mut next = server.clone();
        if let Some(name) = self.name {
            next.name = name;
        }
        if let Some(description) = self.description {
            next.description = description;
        }
        if let Some(source) = self.source {
            next.source = source;
        }
        if let Some(kind) = self.runtime_kind {
            next.runtime_kind = kind;
        }
        if let Some(install) = self.install_command {
            next.install_command = install;
        }
        if let Some(start) = self.start_command {
            next.start_command = start;
        }
        if let Some(env) = self.env_variables {
            next.env_variables = env;
        }
        if let Some(secrets) = self.secret_files {
            next.secret_files = secrets;
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }

        if !next.same_runtime(server) {
            next.build_status = BuildStatus::Pending;
            next.build_error = None;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServerConfig {
        NewServer::new("fetch", "mcp-server-fetch", RuntimeKind::Uvx, "uvx mcp-server-fetch")
            .into_config(ServerId::new("0a1b2c3d"), Utc::now())
    }

    #[test]
    fn generated_ids_are_short_hex() {
        let id = ServerId::generate();
        assert_eq!(id.as_str().len(), ServerId::LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(ServerId::generate(), id);
    }

    #[test]
    fn runtime_kind_parses_aliases() {
        assert_eq!("NPX".parse::<RuntimeKind>().unwrap(), RuntimeKind::Npx);
        assert_eq!("python".parse::<RuntimeKind>().unwrap(), RuntimeKind::Uvx);
        assert_eq!("image".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert!("cargo".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn git_sources_are_detected() {
        assert!(is_git_url("https://github.com/org/repo"));
        assert!(is_git_url("git@github.com:org/repo.git"));
        assert!(!is_git_url("@playwright/mcp"));
        assert!(!is_git_url("ghcr.io/org/image:latest"));
    }

    #[test]
    fn update_resets_build_status_on_command_change() {
        let mut server = sample();
        server.build_status = BuildStatus::Built;

        let renamed = UpdateServer {
            name: Some("fetcher".into()),
            ..Default::default()
        }
        .apply_to(&server);
        assert_eq!(renamed.build_status, BuildStatus::Built);
        assert_eq!(renamed.id, server.id);

        let recommanded = UpdateServer {
            start_command: Some("uvx mcp-server-fetch --ignore-robots-txt".into()),
            ..Default::default()
        }
        .apply_to(&server);
        assert_eq!(recommanded.build_status, BuildStatus::Pending);
    }

    #[test]
    fn secret_mounts_live_under_run_secrets() {
        let mount = SecretFileMount::new("GOOGLE_CREDS", "creds.json", "/tmp/creds.json");
        assert_eq!(mount.container_path(), "/run/secrets/creds.json");
    }
}
