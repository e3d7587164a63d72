//! Test utilities for database and router testing.
//!
//! This module provides in-memory SQLite databases with migrations applied,
//! provider directory fixtures and a fully wired application whose MCP
//! transport is an in-process echo server.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use gateway::adapters::mcp::{
    ContentChunk, McpClientConfig, McpConnector, McpError, McpSession, McpTool, ToolCallOutput,
};
use gateway::config::AppConfig;
use gateway::server::{Services, bootstrap_providers, build_services_with_connector, create_app};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Map, Value, json};
use uuid::Uuid;

pub const OPERATOR_TOKEN: &str = "test-operator-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Sets up an in-memory SQLite database with all migrations applied and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

pub fn test_config(providers_dir: &Path) -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        crypto_key: Some(vec![42u8; 32]),
        providers_dir: providers_dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn write_json(root: &Path, relative: &str, value: &Value) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("fixture path has a parent")).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

pub fn filesystem_manifest() -> Value {
    json!({
        "identifier": "filesystem",
        "name": "Filesystem",
        "description": "Read local files",
        "auth_type": "none",
        "categories": ["storage"],
        "tags": ["files"],
        "operations": [
            {
                "identifier": "read_file",
                "name": "Read file",
                "description": "Read a file from disk",
                "parameters": [
                    {"name": "path", "type": "string", "description": "File path", "required": true}
                ]
            }
        ],
        "mcp": {"command": "echo-server", "args": ["/tmp"]}
    })
}

pub fn search_manifest() -> Value {
    json!({
        "identifier": "search",
        "name": "Web Search",
        "description": "Search the web",
        "auth_type": "apikey",
        "categories": ["search"],
        "permissions": [
            {"identifier": "search.query", "name": "Query", "description": "Run searches", "oauth_scopes": []}
        ],
        "mcp": {
            "command": "echo-server",
            "credential_mappings": {"apikey": "env:SEARCH_API_KEY"}
        }
    })
}

pub fn legacy_manifest() -> Value {
    json!({
        "identifier": "legacy",
        "name": "Legacy Tools",
        "description": "Retired provider",
        "auth_type": "none",
        "status": "deprecated",
        "categories": ["storage"],
        "operations": [
            {"identifier": "read_file", "name": "Read file", "description": "Old reader", "parameters": []}
        ],
        "mcp": {"command": "echo-server"}
    })
}

/// Writes the standard provider fixtures under `root`.
pub fn write_fixture_providers(root: &Path) {
    write_json(root, "filesystem/manifest.json", &filesystem_manifest());
    write_json(
        root,
        "filesystem/i18n/zh-CN.json",
        &json!({
            "name": "文件系统",
            "description": "读取本地文件",
            "operations": [{"identifier": "read_file", "name": "读取文件", "description": "从磁盘读取文件"}]
        }),
    );
    write_json(root, "search/manifest.json", &search_manifest());
    write_json(root, "legacy/manifest.json", &legacy_manifest());
}

#[derive(Default)]
pub struct EchoState {
    pub launches: Mutex<Vec<McpClientConfig>>,
    pub calls: AtomicUsize,
}

/// MCP transport answering every call with the JSON of its arguments.
///
/// A call whose arguments contain `"fail": true` is reported as a tool
/// error.
#[derive(Clone, Default)]
pub struct EchoConnector {
    pub state: Arc<EchoState>,
}

impl EchoConnector {
    pub fn launches(&self) -> Vec<McpClientConfig> {
        self.state.launches.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

struct EchoSession {
    state: Arc<EchoState>,
}

fn echo_tools() -> Vec<McpTool> {
    vec![
        McpTool {
            name: "read_file".to_string(),
            description: "Read a file from disk".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "fail": {"type": "boolean"}},
                "required": ["path"]
            }),
        },
        McpTool {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string", "description": "Search terms"}},
                "required": ["query"]
            }),
        },
    ]
}

#[async_trait]
impl McpConnector for EchoConnector {
    async fn connect(
        &self,
        _provider: &str,
        config: &McpClientConfig,
    ) -> Result<Box<dyn McpSession>, McpError> {
        self.state.launches.lock().unwrap().push(config.clone());
        Ok(Box::new(EchoSession {
            state: self.state.clone(),
        }))
    }
}

#[async_trait]
impl McpSession for EchoSession {
    async fn list_tools(&mut self) -> Result<Vec<McpTool>, McpError> {
        Ok(echo_tools())
    }

    async fn call_tool(
        &mut self,
        _name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallOutput, McpError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let is_error = arguments.get("fail").and_then(Value::as_bool).unwrap_or(false);
        let text = if is_error {
            "file not found".to_string()
        } else {
            Value::Object(arguments).to_string()
        };
        Ok(ToolCallOutput {
            content: vec![ContentChunk::Text { text }],
            is_error,
        })
    }

    async fn close(self: Box<Self>) {}
}

pub struct TestApp {
    pub router: Router,
    pub services: Services,
    pub connector: EchoConnector,
    pub user: Uuid,
}

/// Wires the whole gateway over a fresh database and seeds the providers
/// found under `providers_dir`.
pub async fn spawn_app(providers_dir: &Path) -> Result<TestApp> {
    let db = setup_test_db().await?;
    let connector = EchoConnector::default();
    let services = build_services_with_connector(
        test_config(providers_dir),
        db,
        Arc::new(connector.clone()),
    )?;
    bootstrap_providers(&services).await?;
    Ok(TestApp {
        router: create_app(services.state.clone()),
        services,
        connector,
        user: Uuid::new_v4(),
    })
}

pub fn authed(method: &str, uri: &str, user: Uuid, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {OPERATOR_TOKEN}"))
        .header("X-User-Id", user.to_string());
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
