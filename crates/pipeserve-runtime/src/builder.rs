//! Builder for constructing pipeserve runtime instances.
//!
//! [`RuntimeBuilder`] resolves where the catalog comes from, loads it with a
//! [`CatalogLoader`], and fills a fresh [`ToolRegistry`]. Catalog entries
//! that fail to load are logged and skipped; only a missing or unreadable
//! source aborts the build.
//!
//! # Usage
//!
//! ```no_run
//! use pipeserve_runtime::RuntimeBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Multi-pipeline mode from a catalog document
//! let runtime = RuntimeBuilder::new()
//!     .with_pipeline("pipelines.toml")
//!     .build_local()
//!     .await?;
//!
//! // Single-pipeline mode from an inline expression
//! let single = RuntimeBuilder::new()
//!     .with_pipeline("pipeline = echo()")
//!     .with_task("rerank")
//!     .build_local()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use pipeserve_core::{
    BuilderTable, CatalogError, CatalogLoader, CatalogSource, LoadedCatalog, ServerConfig,
    ToolRegistry,
};
use tracing::info;

use crate::runtime::LocalRuntime;

/// Errors that can occur during runtime construction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuntimeBuildError {
    /// The catalog source was missing or could not be loaded.
    #[error("failed to load catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// The blocking load task panicked or was cancelled.
    #[error("catalog loading task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Fluent builder for [`LocalRuntime`] instances.
///
/// # Default Configuration
///
/// - Pipeline: none (building fails until one is set)
/// - Builders: [`BuilderTable::with_builtins`]
/// - Task / name: single-pipeline defaults (`search`, name = task)
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    pipeline: Option<String>,
    task: Option<String>,
    name: Option<String>,
    builders: Option<BuilderTable>,
}

impl RuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from resolved server settings.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            task: config.task.clone(),
            name: config.name.clone(),
            builders: None,
        }
    }

    /// Sets the catalog path or inline construction expression.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// Sets the task kind used in single-pipeline mode.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Sets the tool name used in single-pipeline mode.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the builder table construction expressions resolve against.
    #[must_use]
    pub fn with_builders(mut self, builders: BuilderTable) -> Self {
        self.builders = Some(builders);
        self
    }

    /// Loads the catalog and returns a runtime serving it.
    ///
    /// Loading runs on the blocking pool since builders may do I/O.
    ///
    /// # Errors
    ///
    /// - [`RuntimeBuildError::Catalog`] if no pipeline is configured, the
    ///   catalog document cannot be read, or the inline expression fails
    /// - [`RuntimeBuildError::Join`] if the loading task panics
    pub async fn build_local(self) -> Result<LocalRuntime, RuntimeBuildError> {
        let registry = tokio::task::spawn_blocking(move || self.load_registry()).await??;
        Ok(LocalRuntime::new(Arc::new(registry)))
    }

    /// Loads the catalog synchronously into a registry.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeBuildError::Catalog`] under the same conditions as
    /// [`Self::build_local`].
    pub fn load_registry(self) -> Result<ToolRegistry, RuntimeBuildError> {
        let source = CatalogSource::from_setting(self.pipeline.as_deref())?;

        let builders = self.builders.unwrap_or_else(BuilderTable::with_builtins);
        let mut loader = CatalogLoader::new(builders);
        if let Some(task) = self.task {
            loader = loader.with_task(task);
        }
        if let Some(name) = self.name {
            loader = loader.with_name(name);
        }

        let catalog = match loader.load(&source)? {
            LoadedCatalog::Catalog(catalog) => {
                info!(pipelines = catalog.len(), "Loaded pipeline catalog");
                catalog
            }
            single @ LoadedCatalog::Single(_) => single.into_catalog(),
        };

        let registry = ToolRegistry::from_catalog(catalog);
        info!(tool_count = registry.len(), "Tool registry initialized");
        Ok(registry)
    }
}
