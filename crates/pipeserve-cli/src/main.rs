//! Command-line server for retrieval pipeline catalogs.
//!
//! Usage:
//! ```bash
//! pipeserve --pipeline catalog.toml serve   # REST + MCP on one port
//! pipeserve --pipeline catalog.toml mcp     # MCP only (HTTP or --stdio)
//! pipeserve list                            # List tools from PIPESERVE_PIPELINE
//! pipeserve describe <tool>                 # Show one tool's schema
//! pipeserve call <tool> <json | @file>      # Invoke a tool locally
//! ```

use std::{fs::OpenOptions, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pipeserve_core::{ServerConfig, config::LogConfig};
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "pipeserve", author, version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every subcommand. Each one overrides the matching
/// `PIPESERVE_*` variable and config file setting.
#[derive(Debug, Args)]
struct GlobalArgs {
    /// Path to a `pipeserve.toml` config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog document path, or an inline construction expression.
    #[arg(long, global = true)]
    pipeline: Option<String>,

    /// Task kind in single-pipeline mode (defaults to `search`).
    #[arg(long, global = true)]
    task: Option<String>,

    /// Tool name in single-pipeline mode (defaults to the task).
    #[arg(long, global = true)]
    name: Option<String>,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve pipelines over REST, with MCP mounted alongside
    Serve(commands::serve::ServeArgs),

    /// Serve pipelines over MCP only
    Mcp(commands::mcp::McpArgs),

    /// List the tools a catalog produces
    List(commands::list::ListArgs),

    /// Describe a specific tool
    Describe(commands::describe::DescribeArgs),

    /// Call a tool locally
    Call(commands::call::CallArgs),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serve(_) => f.debug_tuple("Serve").finish(),
            Self::Mcp(_) => f.debug_tuple("Mcp").finish(),
            Self::List(_) => f.debug_tuple("List").finish(),
            Self::Describe(_) => f.debug_tuple("Describe").finish(),
            Self::Call(_) => f.debug_tuple("Call").finish(),
        }
    }
}

impl GlobalArgs {
    /// Resolves file and environment settings, then applies flags on top.
    fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = ServerConfig::load(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                config.apply_env(|key| std::env::var(key).ok());
                config
            }
            None => ServerConfig::resolve().context("failed to resolve configuration")?,
        };

        if let Some(pipeline) = &self.pipeline {
            config.pipeline = Some(pipeline.clone());
        }
        if let Some(task) = &self.task {
            config.task = Some(task.clone());
        }
        if let Some(name) = &self.name {
            config.name = Some(name.clone());
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
        Ok(config)
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free
/// for command output and the MCP stdio transport.
fn init_tracing(log: &LogConfig, format: LogFormat) -> Result<()> {
    let default_directive: Directive = log
        .level
        .parse()
        .with_context(|| format!("invalid log level: {}", log.level))?;
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env_lossy();

    let writer = match &log.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::io::stderr.and(Arc::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log.file.is_none());
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.global.resolve_config()?;
    init_tracing(&config.log, cli.global.log_format)?;

    match &cli.command {
        Command::Serve(args) => commands::serve::run(args, &config).await,
        Command::Mcp(args) => commands::mcp::run(args, &config).await,
        Command::List(args) => commands::list::run(args, &config).await,
        Command::Describe(args) => commands::describe::run(args, &config).await,
        Command::Call(args) => commands::call::run(args, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    fn parse(argv: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(argv.iter().copied())
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let err = parse(&["pipeserve"]).expect_err("expected clap parse error");
        assert!(
            matches!(
                err.kind(),
                ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand | ErrorKind::MissingSubcommand
            ),
            "unexpected error kind: {:?}",
            err.kind()
        );
    }

    #[test]
    fn test_cli_rejects_unknown_subcommand() {
        let err = parse(&["pipeserve", "not-a-command"]).expect_err("expected clap parse error");
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() -> Result<(), clap::Error> {
        let cli = parse(&[
            "pipeserve",
            "list",
            "--pipeline",
            "pipeline = echo()",
            "--task",
            "rerank",
            "--name",
            "bm25",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])?;

        assert_eq!(cli.global.pipeline.as_deref(), Some("pipeline = echo()"));
        assert_eq!(cli.global.task.as_deref(), Some("rerank"));
        assert_eq!(cli.global.name.as_deref(), Some("bm25"));
        assert_eq!(cli.global.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.global.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::List(_)));
        Ok(())
    }

    #[test]
    fn test_cli_log_format_defaults_to_text() -> Result<(), clap::Error> {
        let cli = parse(&["pipeserve", "serve"])?;
        assert_eq!(cli.global.log_format, LogFormat::Text);
        assert!(cli.global.pipeline.is_none());
        Ok(())
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        let err = parse(&["pipeserve", "--log-format", "xml", "list"])
            .expect_err("expected clap parse error");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_cli_call_requires_input_argument() {
        let err = parse(&["pipeserve", "call", "bm25"]).expect_err("expected clap parse error");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_describe_requires_tool_argument() {
        let err = parse(&["pipeserve", "describe"]).expect_err("expected clap parse error");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_resolve_config_flags_override_config_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("pipeserve.toml");
        std::fs::write(
            &path,
            "pipeline = \"pipeline = echo()\"\ntask = \"qa\"\n\n[log]\nlevel = \"warn\"\n",
        )?;
        let config_arg = path.to_string_lossy().into_owned();

        let cli = parse(&[
            "pipeserve",
            "--config",
            &config_arg,
            "--task",
            "rerank",
            "--log-level",
            "debug",
            "list",
        ])?;
        let config = cli.global.resolve_config()?;

        assert_eq!(config.pipeline.as_deref(), Some("pipeline = echo()"));
        assert_eq!(config.task.as_deref(), Some("rerank"));
        assert_eq!(config.log.level, "debug");
        Ok(())
    }
}
