//! Core types for serving retrieval pipelines as schema-validated tools.
//!
//! This crate turns a declarative catalog of pipelines into a registry of
//! uniformly callable tools. Transports (REST, MCP) live in
//! `pipeserve-runtime`; this crate has no network surface of its own apart
//! from the `remote` pipeline builder.
//!
//! # Key Components
//!
//! - **Schema Compiler**: [`compile`] turns a mapping or descriptor list into
//!   a [`CompiledSchema`]
//! - **Catalog Loader**: [`CatalogLoader`] evaluates construction expressions
//!   against a [`BuilderTable`] and infers missing schemas
//! - **Tool Synthesizer**: [`synthesize`] wraps a [`Pipeline`] in an
//!   [`Adapter`] that coerces, validates, invokes and normalizes
//! - **Tool Registry**: [`ToolRegistry`] is the directory transports use for
//!   discovery and lookup
//!
//! # Example
//!
//! ```
//! use pipeserve_core::{CatalogLoader, CatalogManifest, ToolRegistry};
//!
//! let manifest = CatalogManifest::from_toml(r#"
//! [[pipelines]]
//! name = "scored"
//! pipeline = "pipeline = echo(columns = ['query']) >> constant(column = 'score', value = 1.0)"
//! "#)?;
//! let catalog = CatalogLoader::default().load_manifest(&manifest);
//! let registry = ToolRegistry::from_catalog(catalog);
//!
//! let tool = registry.lookup("scored")?;
//! let records = tool.adapter().call(serde_json::from_str(r#"{"query": "goldfish"}"#)?)?;
//! assert_eq!(records[0]["score"], 1.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Thread Safety
//!
//! Catalog loading is synchronous and happens once, before any tool is
//! reachable. After that the registry is read-only and shared behind `Arc`;
//! adapters carry no mutable state. Concurrent calls to one tool are safe
//! exactly when the wrapped pipeline tolerates concurrent calls.

mod adapter;
mod builders;
mod catalog;
pub mod config;
mod expr;
mod frame;
mod manifest;
mod pipeline;
mod schema;
mod tool;

/// Default task kind of a pipeline.
pub const DEFAULT_TASK: &str = "search";

/// Schema compilation and name sanitization.
pub use schema::{
    CompiledSchema, Field, SchemaError, TypeTag, compile, sanitize_identifier, sanitize_tool_name,
};

/// Tabular frames exchanged with pipelines.
pub use frame::{Frame, RaggedRow, Record};

/// The pipeline contract and composition.
pub use pipeline::{
    ColumnInfo, Compose, FnPipeline, Pipeline, PipelineError, PipelineOutput, column_info,
};

/// Named pipeline constructors.
pub use builders::{BuildError, BuilderArgs, BuilderFn, BuilderTable};

/// Construction expression evaluation.
pub use expr::{Bindings, ExprError, Expr, Program, Statement, evaluate, parse};

/// Catalog documents and loading.
pub use catalog::{
    Catalog, CatalogError, CatalogLoader, CatalogSource, LoadedCatalog, PipelineDescriptor,
    default_input_schema, describe,
};
pub use manifest::{CatalogManifest, ManifestError, PipelineEntry, normalize_task};

/// Tool synthesis.
pub use adapter::{Adapter, FieldDiagnostic, InvocationError, coerce, normalize_output, synthesize};

/// Tool registry.
pub use tool::{
    InflightRequestGuard, OwnedInflightRequestGuard, RegistryError, Tool, ToolInfo, ToolRegistry,
};

pub use config::{AiConfig, ConfigError, ServerConfig};
