//! MCP stdio client
//!
//! [`StdioConnector`] launches the server subprocess through rmcp's child
//! process transport, performs the `initialize` handshake and exposes the
//! session as an [`McpSession`]. The subprocess is killed when the session
//! is closed or dropped.

use std::process::Stdio;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParams;
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info, warn};

use super::McpError;
use super::config::McpClientConfig;

/// A tool as reported by `tools/list`.
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One chunk of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentChunk {
    Text { text: String },
    Unknown { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutput {
    pub content: Vec<ContentChunk>,
    pub is_error: bool,
}

impl ToolCallOutput {
    /// Reads a `tools/call` result in its wire form.
    pub fn from_wire(result: &Value) -> Self {
        let content = result
            .get("content")
            .and_then(Value::as_array)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|chunk| match (chunk.get("type").and_then(Value::as_str), chunk.get("text")) {
                        (Some("text"), Some(Value::String(text))) => ContentChunk::Text { text: text.clone() },
                        _ => ContentChunk::Unknown {
                            text: chunk.to_string(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            content,
            is_error: result.get("isError").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    /// Text of every text chunk, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|chunk| match chunk {
                ContentChunk::Text { text } => Some(text.as_str()),
                ContentChunk::Unknown { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl McpTool {
    fn from_wire(tool: &Value) -> Option<Self> {
        Some(Self {
            name: tool.get("name")?.as_str()?.to_string(),
            description: tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        })
    }
}

#[async_trait]
pub trait McpSession: Send {
    async fn list_tools(&mut self) -> Result<Vec<McpTool>, McpError>;

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<ToolCallOutput, McpError>;

    /// Ends the session and terminates the subprocess.
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self, provider: &str, config: &McpClientConfig) -> Result<Box<dyn McpSession>, McpError>;
}

fn is_shutdown_noise(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("eof") || lower.contains("closed")
}

fn drain_stderr(provider: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) if is_shutdown_noise(&line) => {
                    debug!(provider = %provider, line = %line, "MCP server stderr");
                }
                Ok(Some(line)) => {
                    info!(provider = %provider, line = %line, "MCP server stderr");
                }
                Ok(None) => break,
                Err(error) if is_shutdown_noise(&error.to_string()) => {
                    debug!(provider = %provider, %error, "MCP server stderr closed");
                    break;
                }
                Err(error) => {
                    warn!(provider = %provider, %error, "Failed to read MCP server stderr");
                    break;
                }
            }
        }
    });
}

/// Launches MCP servers as local subprocesses speaking JSON-RPC over stdio.
#[derive(Debug, Clone, Default)]
pub struct StdioConnector;

struct StdioSession {
    service: RunningService<RoleClient, ()>,
}

#[async_trait]
impl McpConnector for StdioConnector {
    async fn connect(&self, provider: &str, config: &McpClientConfig) -> Result<Box<dyn McpSession>, McpError> {
        let mut command = Command::new(&config.command);
        command.args(&config.args).envs(&config.envs).kill_on_drop(true);

        let (transport, stderr) = TokioChildProcess::builder(command)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(McpError::Spawn)?;
        if let Some(stderr) = stderr {
            drain_stderr(provider.to_string(), stderr);
        }

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| McpError::Handshake(e.to_string()))?;
        debug!(provider, command = %config.command, "MCP session initialized");
        Ok(Box::new(StdioSession { service }))
    }
}

#[async_trait]
impl McpSession for StdioSession {
    async fn list_tools(&mut self) -> Result<Vec<McpTool>, McpError> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| McpError::Request(e.to_string()))?;
        tools
            .iter()
            .map(|tool| {
                let wire = serde_json::to_value(tool).map_err(|e| McpError::Protocol(e.to_string()))?;
                McpTool::from_wire(&wire).ok_or_else(|| McpError::Protocol("tool without a name".into()))
            })
            .collect()
    }

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<ToolCallOutput, McpError> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: Some(arguments),
                task: None,
            })
            .await
            .map_err(|e| McpError::Request(e.to_string()))?;
        let wire = serde_json::to_value(&result).map_err(|e| McpError::Protocol(e.to_string()))?;
        Ok(ToolCallOutput::from_wire(&wire))
    }

    async fn close(self: Box<Self>) {
        if let Err(error) = self.service.cancel().await {
            debug!(%error, "MCP session shutdown task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_tool_result_chunks() {
        let output = ToolCallOutput::from_wire(&json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "second"},
            ],
            "isError": true,
        }));
        assert!(output.is_error);
        assert_eq!(output.content.len(), 3);
        assert!(matches!(&output.content[1], ContentChunk::Unknown { text } if text.contains("image/png")));
        assert_eq!(output.text(), "first\nsecond");
        assert_eq!(
            serde_json::to_value(&output.content[0]).unwrap(),
            json!({"type": "text", "text": "first"})
        );
    }

    #[test]
    fn missing_content_is_empty_success() {
        let output = ToolCallOutput::from_wire(&json!({}));
        assert!(!output.is_error);
        assert!(output.content.is_empty());
    }

    #[test]
    fn reads_tool_definition() {
        let tool = McpTool::from_wire(&json!({
            "name": "read_file",
            "inputSchema": {"type": "object", "required": ["path"]},
        }))
        .unwrap();
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["required"][0], "path");
        assert!(McpTool::from_wire(&json!({"description": "x"})).is_none());
    }

    #[test]
    fn shutdown_lines_are_recognized() {
        assert!(is_shutdown_noise("Error: EOF while reading"));
        assert!(is_shutdown_noise("stream already closed"));
        assert!(!is_shutdown_noise("listening on stdio"));
    }
}
