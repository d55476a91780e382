//! MCP server command implementation.
//!
//! Runs an MCP server exposing every pipeline in the catalog as a tool:
//!
//! - **HTTP mode**: stateless streamable HTTP endpoint on a configurable
//!   address and path
//! - **stdio mode**: standard input/output, for clients that spawn the
//!   server as a subprocess

use std::future::Future;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use pipeserve_core::ServerConfig;
use pipeserve_runtime::{LocalRuntime, transports::mcp::McpService};
use rmcp::{service::ServiceExt, transport::stdio};
use tokio::signal;
use tracing::info;

/// Command-line arguments for the MCP server subcommand.
#[derive(Args)]
pub struct McpArgs {
    /// Address to bind (defaults to `PIPESERVE_MCP_HOST:PIPESERVE_MCP_PORT`).
    #[arg(short = 'a', long)]
    pub addr: Option<String>,

    /// HTTP path for the MCP endpoint (defaults to `/mcp`).
    #[arg(long)]
    pub path: Option<String>,

    /// Run in stdio mode instead of HTTP mode.
    #[arg(long, default_value_t = false)]
    pub stdio: bool,
}

pub async fn run(args: &McpArgs, config: &ServerConfig) -> Result<()> {
    let shutdown = async {
        let _ = signal::ctrl_c().await;
        info!("Received shutdown signal");
    };
    run_with_shutdown(args, config, shutdown).await
}

async fn run_with_shutdown<F>(args: &McpArgs, config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = super::build_runtime(config).await?;

    if args.stdio {
        return run_stdio(runtime).await;
    }

    println!("{} Starting MCP server...", style("→").cyan());
    println!(
        "{} Loaded {} pipeline(s)",
        style("✓").green().bold(),
        runtime.registry().len()
    );

    let addr = args
        .addr
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.mcp.host, config.mcp.port));
    let path = super::normalize_path(args.path.as_deref().unwrap_or(&config.mcp.path));

    let service = McpService::new(runtime.clone()).streamable_http_service();
    let router = axum::Router::new().nest_service(path.as_str(), service);
    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("failed to bind MCP server on {addr}"))?;
    let bound = listener.local_addr().context("failed to read bound address")?;

    info!(address = %bound, path = %path, "Starting MCP server");
    println!(
        "{} MCP server running on http://{}{}",
        style("✓").green().bold(),
        bound,
        path
    );
    println!("Press Ctrl+C to stop\n");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("mcp server error")?;

    info!("Draining inflight requests");
    runtime.drain().await;

    info!("MCP server stopped");
    Ok(())
}

/// Serves MCP over stdin/stdout until the client disconnects or Ctrl+C.
///
/// Status messages go to stderr; stdout carries protocol frames only.
async fn run_stdio(runtime: LocalRuntime) -> Result<()> {
    eprintln!("{} Starting MCP stdio server...", style("→").cyan());
    eprintln!(
        "{} Loaded {} pipeline(s)",
        style("✓").green().bold(),
        runtime.registry().len()
    );

    let running = McpService::new(runtime.clone())
        .serve(stdio())
        .await
        .context("failed to start MCP stdio server")?;

    eprintln!("{} MCP stdio server running", style("✓").green().bold());

    let cancel = running.cancellation_token();
    let mut waiting = Box::pin(running.waiting());

    tokio::select! {
        result = &mut waiting => {
            result.context("mcp stdio server exited")?;
        }
        _ = signal::ctrl_c() => {
            cancel.cancel();
            let _ = waiting.await;
        }
    }

    info!("Draining inflight requests");
    runtime.drain().await;
    info!("MCP stdio server stopped");
    Ok(())
}
