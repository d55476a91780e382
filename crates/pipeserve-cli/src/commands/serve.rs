//! `pipeserve serve` command implementation.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use pipeserve_core::ServerConfig;
use pipeserve_runtime::{
    Assistant,
    transports::{http, mcp::McpService},
};
use tokio::signal;
use tracing::info;

/// Arguments for the `serve` command.
#[derive(Args)]
pub struct ServeArgs {
    /// Host to bind (defaults to `PIPESERVE_HOST`, then `0.0.0.0`).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to serve on (defaults to `PIPESERVE_PORT`, then 8000).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Do not mount the MCP endpoint.
    #[arg(long, default_value_t = false)]
    pub no_mcp: bool,
}

pub async fn run(args: &ServeArgs, config: &ServerConfig) -> Result<()> {
    let shutdown = async {
        let _ = signal::ctrl_c().await;
        info!("Received shutdown signal");
    };
    run_with_shutdown(args, config, shutdown).await
}

async fn run_with_shutdown<F>(args: &ServeArgs, config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    println!("{} Starting pipeline server...", style("→").cyan());

    let runtime = super::build_runtime(config).await?;
    println!(
        "{} Loaded {} pipeline(s)",
        style("✓").green().bold(),
        runtime.registry().len()
    );

    let mcp_enabled = config.mcp.enabled && !args.no_mcp;
    let assistant = Assistant::from_config(&config.ai);
    match &assistant {
        Some(assistant) => info!(model = assistant.model(), "AI endpoint enabled"),
        None => info!("AI endpoint disabled; set OPENAI_API_KEY and PIPESERVE_MCP_URL to enable"),
    }
    let mut router = http::router_with(
        runtime.clone(),
        http::RouterOptions {
            mcp_enabled,
            assistant,
        },
    );
    let mcp_path = super::normalize_path(&config.mcp.path);
    if mcp_enabled {
        let service = McpService::new(runtime.clone()).streamable_http_service();
        router = router.nest_service(mcp_path.as_str(), service);
    }

    let host = args.host.as_deref().unwrap_or(&config.host);
    let port = args.port.unwrap_or(config.port);
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind server on {host}:{port}"))?;
    let addr = listener.local_addr().context("failed to read bound address")?;

    info!(address = %addr, mcp_enabled, "Starting REST server");
    println!(
        "{} Server running on http://{}",
        style("✓").green().bold(),
        addr
    );
    if mcp_enabled {
        println!("  MCP endpoint: http://{addr}{mcp_path}");
    }
    println!("Press Ctrl+C to stop\n");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    info!("Draining inflight requests");
    runtime.drain().await;

    info!("Pipeline server stopped");
    Ok(())
}
