//! Prints one tool's description and schemas.

use anyhow::Result;
use clap::Args;
use console::style;
use pipeserve_core::ServerConfig;

#[derive(Args)]
pub struct DescribeArgs {
    /// Tool name to describe (e.g., "msmarco-search").
    pub tool: String,
}

pub async fn run(args: &DescribeArgs, config: &ServerConfig) -> Result<()> {
    let runtime = super::build_runtime(config).await?;

    let Some(tool) = runtime.registry().get(&args.tool) else {
        let known: Vec<_> = runtime.registry().tools().map(|t| t.name()).collect();
        anyhow::bail!(
            "tool not found: {} (available: {})",
            args.tool,
            known.join(", ")
        );
    };

    println!("{}", style("Tool Details").bold().underlined());
    println!();
    println!("{}: {}", style("Name").cyan(), tool.name());
    if let Some(task) = tool.task() {
        println!("{}: {}", style("Task").cyan(), task);
    }
    println!("{}: {}", style("Description").cyan(), tool.description());
    println!(
        "{}: {}",
        style("Pipeline").cyan(),
        tool.adapter().pipeline().describe()
    );

    println!();
    println!("{}", style("Input Schema").bold().underlined());
    println!("{}", serde_json::to_string_pretty(&tool.input_json_schema())?);

    println!();
    println!("{}", style("Output Schema").bold().underlined());
    match tool.output_schema() {
        Some(schema) => println!("{}", serde_json::to_string_pretty(&schema.to_json_schema())?),
        None => println!("{}", style("(not inferred)").dim()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_describe_unknown_tool_lists_available() {
        let config = ServerConfig {
            pipeline: Some("pipeline = echo()".to_string()),
            name: Some("bm25".to_string()),
            ..ServerConfig::default()
        };
        let args = DescribeArgs {
            tool: "nope".to_string(),
        };

        let err = run(&args, &config).await.expect_err("unknown tool");
        assert_eq!(err.to_string(), "tool not found: nope (available: bm25)");
    }

    #[tokio::test]
    async fn test_describe_known_tool() {
        let config = ServerConfig {
            pipeline: Some("pipeline = echo()".to_string()),
            ..ServerConfig::default()
        };
        let args = DescribeArgs {
            tool: "search".to_string(),
        };

        run(&args, &config).await.expect("describe should succeed");
    }
}
