//! Environment and volume layout of a server container.

use std::collections::BTreeMap;
use std::path::Path;

use anywhere_core::command::declared_transport;
use anywhere_core::domain::{ServerConfig, VolumeMount};

/// Variable telling a server which transport to speak.
pub const TRANSPORT_ENV: &str = "MCP_TRANSPORT";
/// Value injected when the command declares no transport.
pub const DEFAULT_TRANSPORT_VALUE: &str = "stdio";

/// Container environment for `server` running `argv`.
///
/// Declared variables come first, then the in-container paths of secret
/// files. `MCP_TRANSPORT=stdio` is added when `argv` names no transport and
/// the operator did not set the variable explicitly. Optional variables with
/// an empty value are left out.
pub fn env_layout(server: &ServerConfig, argv: &[String]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    for var in &server.env_variables {
        if var.value.is_empty() && !var.required {
            continue;
        }
        env.insert(var.key.clone(), var.value.clone());
    }

    for mount in &server.secret_files {
        env.insert(mount.env_var.clone(), mount.container_path());
    }

    if declared_transport(argv).is_none() {
        env.entry(TRANSPORT_ENV.to_string())
            .or_insert_with(|| DEFAULT_TRANSPORT_VALUE.to_string());
    }

    env
}

/// Read-only bind mounts for the server's secret files.
///
/// Relative host paths are resolved against `secrets_dir`.
pub fn secret_mounts(server: &ServerConfig, secrets_dir: &Path) -> Vec<VolumeMount> {
    server
        .secret_files
        .iter()
        .map(|mount| {
            let host = Path::new(&mount.host_path);
            let host = if host.is_absolute() {
                host.to_path_buf()
            } else {
                secrets_dir.join(host)
            };
            VolumeMount::read_only(host.to_string_lossy(), mount.container_path())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anywhere_core::domain::{EnvVarDecl, NewServer, RuntimeKind, SecretFileMount, ServerId};
    use chrono::Utc;

    fn server(new: NewServer) -> ServerConfig {
        new.into_config(ServerId::new("0a1b2c3d"), Utc::now())
    }

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn injects_default_transport_when_undeclared() {
        let s = server(NewServer::new("f", "pkg", RuntimeKind::Npx, "npx pkg"));
        let env = env_layout(&s, &argv("npx pkg"));
        assert_eq!(env.get(TRANSPORT_ENV).map(String::as_str), Some("stdio"));
    }

    #[test]
    fn declared_transport_suppresses_injection() {
        let s = server(NewServer::new("f", "mcp-anywhere", RuntimeKind::Uvx, "uvx mcp-anywhere serve http"));
        let env = env_layout(&s, &argv("uvx mcp-anywhere serve http"));
        assert!(!env.contains_key(TRANSPORT_ENV));

        let env = env_layout(&s, &argv("uvx mcp-anywhere serve stdio"));
        assert!(!env.contains_key(TRANSPORT_ENV));
    }

    #[test]
    fn operator_value_wins_over_default() {
        let s = server(
            NewServer::new("f", "pkg", RuntimeKind::Npx, "npx pkg")
                .with_env(EnvVarDecl::new(TRANSPORT_ENV, "sse")),
        );
        let env = env_layout(&s, &argv("npx pkg"));
        assert_eq!(env[TRANSPORT_ENV], "sse");
    }

    #[test]
    fn merges_env_and_secret_paths() {
        let s = server(
            NewServer::new("f", "pkg", RuntimeKind::Npx, "npx pkg")
                .with_env(EnvVarDecl::new("API_KEY", "k"))
                .with_env(EnvVarDecl::new("OPTIONAL", ""))
                .with_secret(SecretFileMount::new("GOOGLE_CREDS", "creds.json", "creds.json")),
        );
        let env = env_layout(&s, &argv("npx pkg"));
        assert_eq!(env["API_KEY"], "k");
        assert_eq!(env["GOOGLE_CREDS"], "/run/secrets/creds.json");
        assert!(!env.contains_key("OPTIONAL"));
    }

    #[test]
    fn secret_mounts_resolve_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let s = server(
            NewServer::new("f", "pkg", RuntimeKind::Npx, "npx pkg")
                .with_secret(SecretFileMount::new("A", "a.json", "a.json"))
                .with_secret(SecretFileMount::new("B", "b.pem", "/etc/b.pem")),
        );
        let mounts = secret_mounts(&s, dir.path());
        assert_eq!(mounts.len(), 2);
        assert_eq!(
            mounts[0].host_path,
            dir.path().join("a.json").to_string_lossy()
        );
        assert_eq!(mounts[0].container_path, "/run/secrets/a.json");
        assert!(mounts[0].read_only);
        assert_eq!(mounts[1].to_bind_spec(), "/etc/b.pem:/run/secrets/b.pem:ro");
    }
}
