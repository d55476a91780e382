//! Model Context Protocol (MCP) transport implementation.
//!
//! [`McpService`] implements `rmcp::ServerHandler` over a [`LocalRuntime`]:
//! every registered tool is advertised with a JSON Schema built from its
//! compiled input schema, and calls return structured content of the form
//! `{"result": [records]}`.
//!
//! # Error mapping
//!
//! - unknown tool → `resource_not_found`
//! - coercion or validation failure → `invalid_params`
//! - pipeline failure or unsupported output → tool-level error result

use std::{borrow::Cow, sync::Arc};

use pipeserve_core::Tool as PipelineTool;
use rmcp::{
    ErrorData, RoleServer,
    handler::server::ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject,
        ListToolsResult, PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    transport::streamable_http_server::{
        StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
    },
};
use serde_json::{Value, json};

use crate::runtime::{CallError, LocalRuntime};

/// MCP server exposing a runtime's tools.
///
/// # Example
///
/// ```no_run
/// use pipeserve_runtime::{RuntimeBuilder, transports::mcp::McpService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = RuntimeBuilder::new()
///     .with_pipeline("pipelines.toml")
///     .build_local()
///     .await?;
///
/// let router: axum::Router = axum::Router::new()
///     .nest_service("/mcp", McpService::new(runtime).streamable_http_service());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct McpService {
    runtime: LocalRuntime,
    info: ServerInfo,
}

impl McpService {
    /// Creates a service with default server info.
    #[must_use]
    pub fn new(runtime: LocalRuntime) -> Self {
        Self::with_info(runtime, default_server_info())
    }

    /// Creates a service with custom server info.
    #[must_use]
    pub fn with_info(runtime: LocalRuntime, info: ServerInfo) -> Self {
        Self { runtime, info }
    }

    #[must_use]
    pub fn runtime(&self) -> &LocalRuntime {
        &self.runtime
    }

    #[must_use]
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Creates a stateless streamable HTTP service, mountable in an axum
    /// router.
    #[must_use]
    pub fn streamable_http_service(&self) -> StreamableHttpService<Self, LocalSessionManager> {
        self.streamable_http_service_with_config(StreamableHttpServerConfig {
            stateful_mode: false,
            ..Default::default()
        })
    }

    /// Creates a streamable HTTP service with custom configuration.
    #[must_use]
    pub fn streamable_http_service_with_config(
        &self,
        config: StreamableHttpServerConfig,
    ) -> StreamableHttpService<Self, LocalSessionManager> {
        let service = self.clone();
        StreamableHttpService::new(move || Ok(service.clone()), Arc::default(), config)
    }
}

impl ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        self.info.clone()
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        let registry = Arc::clone(self.runtime.registry());
        async move {
            let tools = registry.tools().map(|tool| tool_to_mcp(tool)).collect();
            Ok(ListToolsResult::with_all_items(tools))
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        let runtime = self.runtime.clone();
        async move {
            let args = request.arguments.unwrap_or_default();
            match runtime.call_tool(&request.name, args).await {
                Ok(records) => Ok(CallToolResult::structured(json!({ "result": records }))),
                Err(err) => call_error_to_result(&err),
            }
        }
    }
}

fn default_server_info() -> ServerInfo {
    ServerInfo {
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        },
        instructions: Some(
            "Each tool runs one retrieval pipeline and returns its result records.".to_string(),
        ),
        ..Default::default()
    }
}

/// Maps a runtime failure onto an MCP error or a tool-level error result.
fn call_error_to_result(err: &CallError) -> Result<CallToolResult, ErrorData> {
    match err {
        CallError::NotFound(_) => Err(ErrorData::resource_not_found(err.to_string(), None)),
        e if e.is_caller_error() => Err(ErrorData::invalid_params(err.to_string(), None)),
        _ => Ok(CallToolResult::error(vec![Content::text(err.to_string())])),
    }
}

fn tool_to_mcp(tool: &PipelineTool) -> Tool {
    let output_schema = tool.output_schema().map(|schema| {
        let mut items = schema.to_json_schema();
        // Records may carry columns beyond the inferred ones.
        if let Value::Object(map) = &mut items {
            map.remove("required");
            map.remove("additionalProperties");
        }
        Arc::new(schema_to_object(json!({
            "type": "object",
            "properties": {
                "result": { "type": "array", "items": items }
            },
            "required": ["result"]
        })))
    });

    Tool {
        name: Cow::Owned(tool.name().to_string()),
        title: tool.task().map(|task| format!("{} ({task})", tool.name())),
        description: Some(Cow::Owned(tool.description().to_string())),
        input_schema: Arc::new(schema_to_object(tool.input_json_schema())),
        output_schema,
        annotations: None,
        icons: None,
    }
}

fn schema_to_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::default(),
    }
}
