//! List the tools a catalog produces.
//!
//! Loads the configured catalog in-process and prints the resulting tools as
//! a table or as JSON.

use anyhow::Result;
use clap::{Args, ValueEnum};
use console::style;
use pipeserve_core::{ServerConfig, ToolInfo};

/// Truncates a description to at most 40 characters, ending in `...` when
/// shortened.
fn truncate_description(description: &str) -> String {
    const MAX_DESCRIPTION_CHARS: usize = 40;
    const ELLIPSIS: &str = "...";
    const TRUNCATED_CHARS: usize = MAX_DESCRIPTION_CHARS - ELLIPSIS.len();

    let mut chars = description.chars();
    let head: String = chars.by_ref().take(MAX_DESCRIPTION_CHARS).collect();

    if chars.next().is_none() {
        return head;
    }

    let prefix: String = head.chars().take(TRUNCATED_CHARS).collect();
    format!("{prefix}{ELLIPSIS}")
}

/// Comma-separated `name: type` pairs of a tool's parameters.
fn format_parameters(info: &ToolInfo) -> String {
    info.input_schema
        .iter()
        .map(|(name, tag)| format!("{name}: {tag}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Command-line arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Output format: `table` for humans, `json` for scripts.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Loads the catalog and prints its tools.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded or JSON serialization
/// fails.
pub async fn run(args: &ListArgs, config: &ServerConfig) -> Result<()> {
    let runtime = super::build_runtime(config).await?;
    let tools = runtime.list_tools();

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
    } else if !tools.is_empty() {
        println!(
            "{:<24} {:<10} {:<40} {}",
            style("NAME").bold(),
            style("TASK").bold(),
            style("DESCRIPTION").bold(),
            style("PARAMETERS").bold()
        );
        println!("{}", "-".repeat(100));

        for tool in &tools {
            let task = tool.task.as_deref().unwrap_or("-");
            let description = truncate_description(&tool.description);
            let parameters = format_parameters(tool);
            println!("{:<24} {task:<10} {description:<40} {parameters}", tool.name);
        }

        println!(
            "\n{} {} tool(s) available",
            style("✓").green(),
            tools.len()
        );
    } else {
        println!("No tools found");
    }

    Ok(())
}
