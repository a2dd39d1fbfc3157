//! `docker` CLI implementation of the container runtime port.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;

use anywhere_core::domain::RunConfiguration;
use anywhere_core::ports::{
    ContainerHandle, ContainerRuntime, ContainerRuntimeError, ContainerState, ImageBuildSpec,
};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Drives the container engine through its command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// `docker exec -i <container> <argv...>` with piped stdio.
    pub fn exec_command(&self, container: &str, argv: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("exec")
            .arg("-i")
            .arg(container)
            .args(argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(
        &self,
        operation: &'static str,
        args: &[String],
        input: Option<&[u8]>,
    ) -> Result<Output, ContainerRuntimeError> {
        tracing::debug!(
            operation,
            args = ?redacted_args(args),
            "Running container engine command"
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ContainerRuntimeError::Unavailable(format!("'{}' not found in PATH", self.binary))
            } else {
                ContainerRuntimeError::Io(e)
            }
        })?;

        if let Some(bytes) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes).await?;
                stdin.shutdown().await?;
            }
        }

        Ok(child.wait_with_output().await?)
    }

    /// Run and require success.
    async fn run_ok(
        &self,
        operation: &'static str,
        args: &[String],
        input: Option<&[u8]>,
    ) -> Result<Output, ContainerRuntimeError> {
        let output = self.run(operation, args, input).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(failure(operation, &output))
        }
    }
}

fn failure(operation: &'static str, output: &Output) -> ContainerRuntimeError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("Is the docker daemon running")
    {
        return ContainerRuntimeError::Unavailable(stderr);
    }
    ContainerRuntimeError::CommandFailed {
        operation,
        status: output.status.to_string(),
        stderr,
    }
}

fn is_missing(output: &Output) -> bool {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.contains("No such") || stderr.contains("not found")
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// `docker run` arguments for a detached container with stdin kept open.
pub fn docker_run_args(config: &RunConfiguration) -> Vec<String> {
    let mut out = args(["run", "-d", "-i", "--name", config.container_name.as_str()]);
    for (key, value) in &config.labels {
        out.push("--label".into());
        out.push(format!("{key}={value}"));
    }
    for (key, value) in &config.env {
        out.push("-e".into());
        out.push(format!("{key}={value}"));
    }
    for mount in &config.mounts {
        out.push("-v".into());
        out.push(mount.to_bind_spec());
    }
    out.push(config.image_tag.clone());
    out.extend(config.argv.iter().cloned());
    out
}

/// `args` with the value of every `-e KEY=VALUE` replaced, for logging.
pub fn redacted_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut env_value_next = false;
    for arg in args {
        if env_value_next {
            let key = arg.split_once('=').map_or(arg.as_str(), |(key, _)| key);
            out.push(format!("{key}=<redacted>"));
            env_value_next = false;
        } else if let Some(pair) = arg.strip_prefix("--env=") {
            let key = pair.split_once('=').map_or(pair, |(key, _)| key);
            out.push(format!("--env={key}=<redacted>"));
        } else {
            env_value_next = arg == "-e" || arg == "--env";
            out.push(arg.clone());
        }
    }
    out
}

/// `docker build` arguments reading the Dockerfile from stdin without a context.
pub fn docker_build_args(spec: &ImageBuildSpec) -> Vec<String> {
    let mut out = args(["build", "-t", spec.tag.as_str()]);
    for (key, value) in &spec.labels {
        out.push("--label".into());
        out.push(format!("{key}={value}"));
    }
    out.push("-".into());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Inspect output
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectContainer {
    id: String,
    name: String,
    config: InspectConfig,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

fn parse_container_inspect(stdout: &[u8]) -> Result<ContainerState, ContainerRuntimeError> {
    let mut parsed: Vec<InspectContainer> =
        serde_json::from_slice(stdout).map_err(|e| ContainerRuntimeError::Malformed {
            operation: "inspect",
            message: e.to_string(),
        })?;
    let container = parsed.pop().ok_or_else(|| ContainerRuntimeError::Malformed {
        operation: "inspect",
        message: "empty inspect result".to_string(),
    })?;

    Ok(ContainerState {
        id: container.id,
        name: container.name.trim_start_matches('/').to_string(),
        image: container.config.image,
        running: container.state.running,
        labels: container.config.labels.unwrap_or_default(),
    })
}

fn parse_image_labels(stdout: &[u8]) -> Result<BTreeMap<String, String>, ContainerRuntimeError> {
    let labels: Option<BTreeMap<String, String>> =
        serde_json::from_slice(stdout).map_err(|e| ContainerRuntimeError::Malformed {
            operation: "image inspect",
            message: e.to_string(),
        })?;
    Ok(labels.unwrap_or_default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Port implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_labels(
        &self,
        tag: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ContainerRuntimeError> {
        let output = self
            .run(
                "image inspect",
                &args(["image", "inspect", "--format", "{{json .Config.Labels}}", tag]),
                None,
            )
            .await?;

        if !output.status.success() {
            if is_missing(&output) {
                return Ok(None);
            }
            return Err(failure("image inspect", &output));
        }
        parse_image_labels(&output.stdout).map(Some)
    }

    async fn build_image(&self, spec: &ImageBuildSpec) -> Result<(), ContainerRuntimeError> {
        self.run_ok("build", &docker_build_args(spec), Some(spec.dockerfile.as_bytes()))
            .await?;
        Ok(())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), ContainerRuntimeError> {
        self.run_ok("pull", &args(["pull", reference]), None).await?;
        Ok(())
    }

    async fn inspect_container(
        &self,
        name: &str,
    ) -> Result<Option<ContainerState>, ContainerRuntimeError> {
        let output = self
            .run("inspect", &args(["container", "inspect", name]), None)
            .await?;

        if !output.status.success() {
            if is_missing(&output) {
                return Ok(None);
            }
            return Err(failure("inspect", &output));
        }
        parse_container_inspect(&output.stdout).map(Some)
    }

    async fn run_container(
        &self,
        config: &RunConfiguration,
    ) -> Result<ContainerHandle, ContainerRuntimeError> {
        let output = self.run_ok("run", &docker_run_args(config), None).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerRuntimeError::Malformed {
                operation: "run",
                message: "no container id on stdout".to_string(),
            });
        }
        Ok(ContainerHandle {
            id,
            name: config.container_name.clone(),
        })
    }

    async fn stop_container(
        &self,
        name: &str,
        grace: Duration,
    ) -> Result<(), ContainerRuntimeError> {
        let secs = grace.as_secs().to_string();
        let output = self
            .run("stop", &args(["stop", "-t", secs.as_str(), name]), None)
            .await?;
        if output.status.success() || is_missing(&output) {
            Ok(())
        } else {
            Err(failure("stop", &output))
        }
    }

    async fn remove_container(&self, name: &str) -> Result<(), ContainerRuntimeError> {
        let output = self.run("rm", &args(["rm", "-f", name]), None).await?;
        if output.status.success() || is_missing(&output) {
            Ok(())
        } else {
            Err(failure("rm", &output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anywhere_core::domain::{TransportMode, VolumeMount};

    #[test]
    fn redaction_keeps_keys_and_hides_env_values() {
        let mut config = run_config();
        config.env.insert("API_KEY".into(), "sk-live-123".into());
        let logged = redacted_args(&docker_run_args(&config)).join(" ");

        assert!(!logged.contains("sk-live-123"));
        assert!(!logged.contains("A=1 2"));
        assert!(logged.contains("-e API_KEY=<redacted>"));
        assert!(logged.contains("-e A=<redacted>"));
        assert!(logged.contains("--name mcp-0a1b2c3d"));
        assert!(logged.ends_with("mcp-anywhere/server-0a1b2c3d:latest npx pkg"));
    }

    #[test]
    fn redaction_handles_long_form_env_flags() {
        let argv = args(["run", "--env=TOKEN=abc", "--env", "X=y", "img"]);
        assert_eq!(
            redacted_args(&argv),
            ["run", "--env=TOKEN=<redacted>", "--env", "X=<redacted>", "img"]
        );
    }

    fn run_config() -> RunConfiguration {
        RunConfiguration {
            argv: vec!["npx".into(), "pkg".into()],
            env: BTreeMap::from([("A".to_string(), "1 2".to_string())]),
            container_name: "mcp-0a1b2c3d".into(),
            image_tag: "mcp-anywhere/server-0a1b2c3d:latest".into(),
            transport: TransportMode::Stdio,
            mounts: vec![VolumeMount::read_only("/s/c.json", "/run/secrets/c.json")],
            labels: BTreeMap::from([("mcp-anywhere.config-hash".to_string(), "h".to_string())]),
            config_hash: "h".into(),
        }
    }

    #[test]
    fn run_args_place_image_before_argv() {
        let args = docker_run_args(&run_config());
        assert_eq!(
            args,
            [
                "run",
                "-d",
                "-i",
                "--name",
                "mcp-0a1b2c3d",
                "--label",
                "mcp-anywhere.config-hash=h",
                "-e",
                "A=1 2",
                "-v",
                "/s/c.json:/run/secrets/c.json:ro",
                "mcp-anywhere/server-0a1b2c3d:latest",
                "npx",
                "pkg",
            ]
        );
    }

    #[test]
    fn build_args_read_stdin() {
        let spec = ImageBuildSpec {
            tag: "t".into(),
            dockerfile: "FROM x".into(),
            labels: BTreeMap::from([("k".to_string(), "v".to_string())]),
        };
        assert_eq!(docker_build_args(&spec), ["build", "-t", "t", "--label", "k=v", "-"]);
    }

    #[test]
    fn parses_container_inspect() {
        let json = br#"[{
            "Id": "abc123",
            "Name": "/mcp-0a1b2c3d",
            "Config": {"Image": "img", "Labels": {"mcp-anywhere.config-hash": "h"}},
            "State": {"Running": true, "Status": "running"}
        }]"#;
        let state = parse_container_inspect(json).unwrap();
        assert_eq!(state.name, "mcp-0a1b2c3d");
        assert!(state.running);
        assert_eq!(state.labels["mcp-anywhere.config-hash"], "h");
    }

    #[test]
    fn null_labels_are_empty() {
        assert!(parse_image_labels(b"null\n").unwrap().is_empty());
        assert!(matches!(
            parse_image_labels(b"not json"),
            Err(ContainerRuntimeError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let docker = DockerCli::new("definitely-not-a-container-engine-binary");
        let err = docker.image_labels("x").await.unwrap_err();
        assert!(matches!(err, ContainerRuntimeError::Unavailable(_)));
    }
}
