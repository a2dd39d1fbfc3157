//! Deterministic names and fingerprints for images and containers.

use std::collections::BTreeMap;

use anywhere_core::domain::{RunConfiguration, RuntimeKind, ServerConfig, TransportMode, VolumeMount};
use sha2::{Digest, Sha256};

/// Label carrying the id of the server a container or image belongs to.
pub const LABEL_SERVER_ID: &str = "mcp-anywhere.server-id";
/// Label marking objects created by the gateway.
pub const LABEL_MANAGED: &str = "mcp-anywhere.managed";
/// Image label holding the build fingerprint.
pub const LABEL_BUILD_HASH: &str = "mcp-anywhere.build-hash";
/// Container label holding the run configuration fingerprint.
pub const LABEL_CONFIG_HASH: &str = "mcp-anywhere.config-hash";

/// Namespace and prefix used to derive image tags and container names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNaming {
    image_namespace: String,
    container_prefix: String,
}

impl ContainerNaming {
    pub fn new(image_namespace: impl Into<String>, container_prefix: impl Into<String>) -> Self {
        Self {
            image_namespace: image_namespace.into(),
            container_prefix: container_prefix.into(),
        }
    }

    /// Image the server's container runs.
    ///
    /// Built images are tagged per server id so edits never change the tag;
    /// direct-container servers run their source image as is.
    pub fn image_tag(&self, server: &ServerConfig) -> String {
        match server.runtime_kind {
            RuntimeKind::Docker => server.source.trim().to_string(),
            RuntimeKind::Npx | RuntimeKind::Uvx => format!(
                "{}/server-{}:latest",
                self.image_namespace,
                sanitize(server.id.as_str())
            ),
        }
    }

    /// Container name, unique per server id.
    pub fn container_name(&self, server: &ServerConfig) -> String {
        format!("{}-{}", self.container_prefix, sanitize(server.id.as_str()))
    }
}

/// Restrict to characters docker accepts in names and tags.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Hash a sequence of fields with a separator no field can contain.
fn fingerprint<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of everything that goes into a built image.
pub fn build_hash(server: &ServerConfig, base_image: Option<&str>) -> String {
    fingerprint([
        server.runtime_kind.as_str(),
        base_image.unwrap_or(""),
        server.source.trim(),
        server.install_step().unwrap_or(""),
    ])
}

/// Fingerprint of everything that affects a running container.
pub fn config_hash(
    argv: &[String],
    env: &BTreeMap<String, String>,
    image_tag: &str,
    mounts: &[VolumeMount],
    transport: TransportMode,
) -> String {
    let argv_len = argv.len().to_string();
    let mut fields: Vec<&str> = vec![image_tag, transport.as_str(), argv_len.as_str()];
    fields.extend(argv.iter().map(String::as_str));
    for (key, value) in env {
        fields.push(key);
        fields.push(value);
    }
    let specs: Vec<String> = mounts.iter().map(VolumeMount::to_bind_spec).collect();
    fields.extend(specs.iter().map(String::as_str));
    fingerprint(fields)
}

/// Recompute the hash of a finished run configuration.
pub fn run_config_hash(run: &RunConfiguration) -> String {
    config_hash(&run.argv, &run.env, &run.image_tag, &run.mounts, run.transport)
}
