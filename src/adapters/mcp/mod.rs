//! # MCP stdio adapters
//!
//! Providers backed by a Model Context Protocol server launched as a local
//! subprocess. Tools are discovered once per adapter with dummy credentials,
//! then every call runs in its own subprocess with the caller's credentials
//! and parameters injected through `env:`/`arg:` target selectors.

pub mod adapter;
pub mod client;
pub mod config;
pub mod mapping;
pub mod schema;
pub mod template;

pub use adapter::McpAdapter;
pub use client::{ContentChunk, McpConnector, McpSession, McpTool, StdioConnector, ToolCallOutput};
pub use config::{McpAdapterConfig, McpClientConfig};
pub use mapping::TargetSelector;
pub use schema::ToolSchema;
pub use template::{MCP_TEMPLATE, McpTemplate};

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to launch MCP server: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("MCP handshake failed: {0}")]
    Handshake(String),
    #[error("MCP request failed: {0}")]
    Request(String),
    #[error("unexpected MCP payload: {0}")]
    Protocol(String),
    #[error("MCP server did not answer within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable connector that records every launch.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;

    #[derive(Default)]
    pub struct FakeState {
        pub launches: Mutex<Vec<McpClientConfig>>,
        pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
        pub list_calls: AtomicUsize,
    }

    #[derive(Default, Clone)]
    pub struct FakeConnector {
        pub tools: Vec<McpTool>,
        pub fail_discovery: bool,
        pub tool_error: bool,
        pub delay: Option<Duration>,
        pub state: Arc<FakeState>,
    }

    impl FakeConnector {
        pub fn with_tools(tools: Vec<McpTool>) -> Self {
            Self {
                tools,
                ..Default::default()
            }
        }

        pub fn launches(&self) -> Vec<McpClientConfig> {
            self.state.launches.lock().unwrap().clone()
        }

        pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
            self.state.calls.lock().unwrap().clone()
        }

        pub fn discoveries(&self) -> usize {
            self.state.list_calls.load(Ordering::SeqCst)
        }
    }

    pub fn tool(name: &str, schema: Value) -> McpTool {
        McpTool {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: schema,
        }
    }

    struct FakeSession {
        connector: FakeConnector,
    }

    #[async_trait]
    impl McpConnector for FakeConnector {
        async fn connect(&self, _provider: &str, config: &McpClientConfig) -> Result<Box<dyn McpSession>, McpError> {
            self.state.launches.lock().unwrap().push(config.clone());
            Ok(Box::new(FakeSession {
                connector: self.clone(),
            }))
        }
    }

    #[async_trait]
    impl McpSession for FakeSession {
        async fn list_tools(&mut self) -> Result<Vec<McpTool>, McpError> {
            self.connector.state.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.connector.delay {
                tokio::time::sleep(delay).await;
            }
            if self.connector.fail_discovery {
                return Err(McpError::Request("server exited".into()));
            }
            Ok(self.connector.tools.clone())
        }

        async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<ToolCallOutput, McpError> {
            self.connector
                .state
                .calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            if let Some(delay) = self.connector.delay {
                tokio::time::sleep(delay).await;
            }
            let text = serde_json::to_string(&arguments).unwrap_or_default();
            Ok(ToolCallOutput {
                content: vec![ContentChunk::Text { text }],
                is_error: self.connector.tool_error,
            })
        }

        async fn close(self: Box<Self>) {}
    }
}
