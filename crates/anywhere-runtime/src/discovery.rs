//! Tool discovery over a server's stdio channel.
//!
//! Speaks just enough JSON-RPC 2.0 to run the `initialize`,
//! `notifications/initialized` and `tools/list` handshake.

use std::time::Duration;

use anywhere_core::domain::{DiscoveredTool, RunConfiguration, TransportMode};
use anywhere_core::ports::{DiscoveryError, ToolDiscovery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::docker::DockerCli;

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages followed for one server.
const MAX_PAGES: usize = 64;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct InitializeResult {
    #[serde(default)]
    capabilities: Value,
}

#[derive(Debug, Deserialize)]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<WireTool>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

impl From<WireTool> for DiscoveredTool {
    fn from(tool: WireTool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            schema: tool.input_schema,
        }
    }
}

/// One JSON-RPC conversation over a line-delimited byte stream.
pub struct StdioSession<W, R> {
    writer: W,
    reader: R,
    next_id: u64,
}

impl<W, R> StdioSession<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    pub const fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            next_id: 1,
        }
    }

    async fn send(&mut self, message: &impl Serialize) -> Result<(), DiscoveryError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| DiscoveryError::Protocol(e.to_string()))?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DiscoveryError::Protocol(format!("write failed: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| DiscoveryError::Protocol(format!("flush failed: {e}")))
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, DiscoveryError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        })
        .await?;

        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| DiscoveryError::Protocol(format!("read failed: {e}")))?;
            if read == 0 {
                return Err(DiscoveryError::Protocol(
                    "server closed its output before responding".to_string(),
                ));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Launchers like npx may print banners before the server speaks
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
                tracing::debug!(line = trimmed, "Skipping non-JSON-RPC output");
                continue;
            };
            if response.id.as_ref().and_then(Value::as_u64) != Some(id) {
                continue;
            }

            if let Some(err) = response.error {
                return Err(DiscoveryError::Server {
                    code: err.code,
                    message: err.message,
                });
            }
            return response
                .result
                .ok_or_else(|| DiscoveryError::Protocol(format!("{method}: missing result")));
        }
    }

    async fn notify(&mut self, method: &str) -> Result<(), DiscoveryError> {
        self.send(&json!({ "jsonrpc": "2.0", "method": method }))
            .await
    }

    /// Run the handshake and collect every advertised tool.
    pub async fn list_tools(&mut self) -> Result<Vec<DiscoveredTool>, DiscoveryError> {
        let init = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {
                        "name": "mcp-anywhere",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {},
                })),
            )
            .await?;
        let init: InitializeResult =
            serde_json::from_value(init).map_err(|e| DiscoveryError::Protocol(e.to_string()))?;

        self.notify("notifications/initialized").await?;

        if init.capabilities.get("tools").is_none() {
            return Ok(Vec::new());
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let page = self.request("tools/list", params).await?;
            let page: ToolsPage = serde_json::from_value(page)
                .map_err(|e| DiscoveryError::Protocol(format!("tools/list: {e}")))?;
            tools.extend(page.tools.into_iter().map(DiscoveredTool::from));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(DiscoveryError::Protocol(format!(
            "tools/list did not finish after {MAX_PAGES} pages"
        )))
    }
}

/// Discovery by attaching a second server process inside the running
/// container with `docker exec -i`.
pub struct StdioDiscovery {
    docker: DockerCli,
    timeout: Duration,
}

impl StdioDiscovery {
    pub const fn new(docker: DockerCli, timeout: Duration) -> Self {
        Self { docker, timeout }
    }
}

#[async_trait]
impl ToolDiscovery for StdioDiscovery {
    async fn discover(&self, run: &RunConfiguration) -> Result<Vec<DiscoveredTool>, DiscoveryError> {
        if run.transport != TransportMode::Stdio {
            return Err(DiscoveryError::Unsupported(run.transport));
        }

        let mut child = self
            .docker
            .exec_command(&run.container_name, &run.argv)
            .spawn()
            .map_err(|e| DiscoveryError::Spawn(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DiscoveryError::Spawn("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DiscoveryError::Spawn("stdout not captured".to_string()))?;

        let mut session = StdioSession::new(stdin, BufReader::new(stdout));
        let result = tokio::time::timeout(self.timeout, session.list_tools())
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout));

        drop(session);
        if let Err(e) = child.kill().await {
            tracing::debug!(container = %run.container_name, error = %e, "Discovery process already exited");
        }

        let tools = result??;
        tracing::debug!(
            container = %run.container_name,
            tool_count = tools.len(),
            "Discovered tools"
        );
        Ok(tools)
    }
}
