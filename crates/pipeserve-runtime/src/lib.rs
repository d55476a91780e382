//! Runtime and transports for pipeserve.
//!
//! [`RuntimeBuilder`] loads a catalog into a [`LocalRuntime`]; the
//! [`transports`] module exposes that runtime over REST and, with the `mcp`
//! feature, the Model Context Protocol. An optional [`Assistant`] answers
//! free-text requests by letting a hosted model call the MCP tools.
//!
//! ```no_run
//! use pipeserve_runtime::{RuntimeBuilder, transports::http};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = RuntimeBuilder::new()
//!     .with_pipeline("catalog.toml")
//!     .build_local()
//!     .await?;
//!
//! let router = http::router(runtime, false);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

mod assistant;
mod builder;
mod runtime;
pub mod transports;

pub use assistant::{Assistant, AssistantError, AssistantReply, MCP_SERVER_LABEL, ToolUse};
pub use builder::{RuntimeBuildError, RuntimeBuilder};
pub use runtime::{CallError, LocalRuntime};
