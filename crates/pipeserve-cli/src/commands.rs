//! CLI command implementations for `pipeserve`.
//!
//! - **`serve`**: REST transport, with the MCP endpoint mounted on the same
//!   listener
//! - **`mcp`**: MCP transport only, over streamable HTTP or stdio
//! - **`list`**: Load the catalog and print the tools it produces
//! - **`describe`**: Print one tool's description and schemas
//! - **`call`**: Invoke one tool in-process and print its records
//!
//! Each command module exports an `*Args` struct and an async `run` function
//! taking the args and the resolved [`ServerConfig`].

use anyhow::{Context, Result};
use pipeserve_core::ServerConfig;
use pipeserve_runtime::{LocalRuntime, RuntimeBuilder};

pub mod call;
pub mod describe;
pub mod list;
pub mod mcp;
pub mod serve;

/// Loads the configured catalog into a runtime.
pub(crate) async fn build_runtime(config: &ServerConfig) -> Result<LocalRuntime> {
    RuntimeBuilder::from_config(config)
        .build_local()
        .await
        .context("failed to load pipelines")
}

/// Normalizes an HTTP mount path to start with `/`, defaulting to `/mcp`.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        "/mcp".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
