//! Derived container run configuration.
//!
//! Never persisted. The container layer recomputes it for every start so
//! an edited server can never run with a stale configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// I/O channel between the gateway and a tool server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// JSON-RPC over the container's stdin/stdout.
    #[default]
    Stdio,
    /// Streamable HTTP served from inside the container.
    Http,
}

impl TransportMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host path bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn read_only(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: true,
        }
    }

    /// `-v` argument in `host:container[:ro]` form.
    pub fn to_bind_spec(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host_path, self.container_path)
        } else {
            format!("{}:{}", self.host_path, self.container_path)
        }
    }
}

/// Everything the container runtime needs to start one tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Normalized process argument vector.
    pub argv: Vec<String>,
    /// Environment, sorted by key for stable hashing.
    pub env: BTreeMap<String, String>,
    pub container_name: String,
    pub image_tag: String,
    pub transport: TransportMode,
    pub mounts: Vec<VolumeMount>,
    /// Labels attached to the container.
    pub labels: BTreeMap<String, String>,
    /// Fingerprint of argv, env, image and mounts.
    pub config_hash: String,
}
