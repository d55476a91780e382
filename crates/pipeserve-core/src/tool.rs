//! Tool registry: the directory of synthesized tools.
//!
//! The registry maps sanitized tool names to [`Tool`]s. It performs no
//! invocation logic of its own; transports look a tool up and call its
//! [`Adapter`].
//!
//! # Thread Safety
//!
//! ## Registration Phase
//!
//! [`ToolRegistry::register`] takes `&mut self`. Register every tool before
//! wrapping the registry in [`Arc`] for concurrent access.
//!
//! ## Serving Phase
//!
//! Once wrapped in [`Arc`]:
//! - [`ToolRegistry::lookup`], [`ToolRegistry::get`] and
//!   [`ToolRegistry::list`] can be called concurrently
//! - Tools are wrapped in [`Arc`] and shared across tasks
//! - The in-flight request counter uses atomic operations
//!
//! Reloading a catalog builds a new registry rather than mutating the
//! current one.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::{
    adapter::{Adapter, synthesize},
    catalog::{Catalog, PipelineDescriptor},
    schema::{CompiledSchema, TypeTag, sanitize_tool_name},
};

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// No tool is registered under the given name.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// A default tool was requested from an empty registry.
    #[error("no tools registered")]
    Empty,
}

/// A registered tool: one synthesized adapter plus its metadata.
#[derive(Debug)]
pub struct Tool {
    name: String,
    description: String,
    task: Option<String>,
    input_schema: CompiledSchema,
    output_schema: Option<CompiledSchema>,
    adapter: Arc<Adapter>,
}

impl Tool {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Task kind of the underlying pipeline, if it came from a catalog.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    #[must_use]
    pub fn input_schema(&self) -> &CompiledSchema {
        &self.input_schema
    }

    #[must_use]
    pub fn output_schema(&self) -> Option<&CompiledSchema> {
        self.output_schema.as_ref()
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    /// Discovery view of this tool.
    #[must_use]
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            task: self.task.clone(),
            input_schema: self.input_schema.type_map(),
            output_schema: self.output_schema.as_ref().map(CompiledSchema::type_map),
        }
    }

    /// JSON Schema of the arguments, for protocols that advertise one.
    #[must_use]
    pub fn input_json_schema(&self) -> JsonValue {
        self.input_schema.to_json_schema()
    }
}

/// Name, description and parameter types of a tool, as advertised to
/// callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub input_schema: IndexMap<String, TypeTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<IndexMap<String, TypeTag>>,
}

/// Central directory of tools, keyed by sanitized name.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use pipeserve_core::{CatalogLoader, ToolRegistry};
///
/// let descriptor = CatalogLoader::default().load_inline("pipeline = echo()")?;
/// let mut registry = ToolRegistry::new();
/// registry.register_descriptor(descriptor);
/// let registry = Arc::new(registry);
///
/// let tool = registry.lookup("search")?;
/// let records = tool.adapter().call(serde_json::from_str(r#"{"query": "goldfish"}"#)?)?;
/// assert_eq!(records[0]["query"], "goldfish");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<Tool>>,
    /// Counter for tracking in-flight requests
    inflight: AtomicU64,
}

/// RAII guard for tracking in-flight tool requests.
///
/// Creating the guard increments the registry's in-flight counter; dropping
/// it decrements the counter, including on error or panic paths.
#[must_use = "if unused, the in-flight request will be immediately ended"]
pub struct InflightRequestGuard<'a> {
    registry: &'a ToolRegistry,
}

impl Drop for InflightRequestGuard<'_> {
    fn drop(&mut self) {
        self.registry.end_request();
    }
}

/// Owned form of [`InflightRequestGuard`] that can move into another task.
#[must_use = "if unused, the in-flight request will be immediately ended"]
#[derive(Debug)]
pub struct OwnedInflightRequestGuard {
    registry: Arc<ToolRegistry>,
}

impl Drop for OwnedInflightRequestGuard {
    fn drop(&mut self) {
        self.registry.end_request();
    }
}

impl ToolRegistry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
            inflight: AtomicU64::new(0),
        }
    }

    /// Builds a registry holding one tool per catalog entry.
    #[must_use]
    pub fn from_catalog(catalog: Catalog) -> Self {
        let mut registry = Self::new();
        for descriptor in catalog {
            registry.register_descriptor(descriptor);
        }
        registry
    }

    /// Registers `adapter` under the sanitized form of `name`.
    ///
    /// Re-registering a name replaces the previous tool. Returns the tool as
    /// stored.
    pub fn register(
        &mut self,
        name: &str,
        adapter: Adapter,
        description: impl Into<String>,
        input_schema: CompiledSchema,
    ) -> Arc<Tool> {
        self.insert(Tool {
            name: sanitize_tool_name(name),
            description: description.into(),
            task: None,
            input_schema,
            output_schema: None,
            adapter: Arc::new(adapter),
        })
    }

    /// Synthesizes and registers the tool for one pipeline descriptor.
    pub fn register_descriptor(&mut self, descriptor: PipelineDescriptor) -> Arc<Tool> {
        let PipelineDescriptor {
            name,
            task,
            pipeline,
            description,
            input_schema,
            output_schema,
        } = descriptor;

        let adapter = synthesize(pipeline, input_schema.clone());
        self.insert(Tool {
            name: sanitize_tool_name(&name),
            description,
            task: Some(task),
            input_schema,
            output_schema,
            adapter: Arc::new(adapter),
        })
    }

    fn insert(&mut self, tool: Tool) -> Arc<Tool> {
        let tool = Arc::new(tool);
        let replaced = self
            .tools
            .insert(tool.name.clone(), Arc::clone(&tool))
            .is_some();
        info!(
            tool = %tool.name,
            parameters = ?tool.input_schema.idents().collect::<Vec<_>>(),
            replaced,
            "Registered tool"
        );
        tool
    }

    /// Looks a tool up by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no tool has that name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Tool>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// The first registered tool, used when a request names none.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Empty`] if nothing is registered.
    pub fn first(&self) -> Result<Arc<Tool>, RegistryError> {
        self.tools.values().next().cloned().ok_or(RegistryError::Empty)
    }

    /// Gets a tool by name, or `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    /// Iterates over the registered tools in registration order.
    pub fn tools(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.values()
    }

    /// Discovery listing of every tool, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools.values().map(|tool| tool.info()).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Increments the in-flight request counter.
    ///
    /// Prefer [`Self::start_request_guard`].
    pub fn start_request(&self) {
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Creates a guard that tracks an in-flight request.
    #[must_use = "dropping the guard immediately will end the request"]
    pub fn start_request_guard(&self) -> InflightRequestGuard<'_> {
        self.start_request();
        InflightRequestGuard { registry: self }
    }

    /// Like [`Self::start_request_guard`], but the guard owns a handle to
    /// the registry.
    #[must_use = "dropping the guard immediately will end the request"]
    pub fn start_owned_request_guard(self: &Arc<Self>) -> OwnedInflightRequestGuard {
        self.start_request();
        OwnedInflightRequestGuard {
            registry: Arc::clone(self),
        }
    }

    /// Decrements the in-flight request counter, saturating at zero.
    pub fn end_request(&self) {
        let _ = self
            .inflight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(1))
            });
    }

    /// Returns the current number of in-flight requests.
    #[must_use]
    pub fn inflight_count(&self) -> u64 {
        self.inflight.load(Ordering::Relaxed)
    }

    /// Waits for all in-flight requests to complete.
    ///
    /// Polls the counter every 10ms until it reaches zero.
    pub async fn drain(&self) {
        while self.inflight_count() > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
