//! Transport layer implementations for serving tools over different protocols.
//!
//! Each transport wraps a [`LocalRuntime`](crate::runtime::LocalRuntime) and
//! maps its call outcomes onto protocol conventions.
//!
//! # Available Transports
//!
//! - `http` - REST endpoints (axum) for health, discovery and invocation
//! - `mcp` - Model Context Protocol over streamable HTTP or stdio
//!   (feature-gated, requires `mcp` feature)
//!
//! Both transports report errors the same way: an unknown tool is a
//! not-found error, coercion and validation failures are caller errors, and
//! everything else is a server-side failure.

/// REST transport implementation using axum.
pub mod http;

/// Model Context Protocol (MCP) transport implementation.
///
/// Provides `McpService`, an `rmcp` server handler that advertises every
/// registered tool. Requires the `mcp` feature.
#[cfg(feature = "mcp")]
pub mod mcp;
