//! `pipeserve call` command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use pipeserve_core::{Record, ServerConfig};

/// Arguments for the `call` command.
#[derive(Args)]
pub struct CallArgs {
    /// Tool name to call (e.g., "msmarco-search").
    pub tool: String,

    /// Input JSON object (inline or @file.json).
    pub input: String,
}

pub async fn run(args: &CallArgs, config: &ServerConfig) -> Result<()> {
    let input = read_input(&args.input)?;

    println!(
        "{} Calling tool: {}",
        style("→").cyan(),
        style(&args.tool).bold()
    );

    let runtime = super::build_runtime(config).await?;
    let records = runtime
        .call_tool(&args.tool, input)
        .await
        .with_context(|| format!("failed to call {}", args.tool))?;

    println!(
        "{} {} record(s):",
        style("✓").green().bold(),
        records.len()
    );
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Parses the input argument, reading it from a file when prefixed with `@`.
fn read_input(input: &str) -> Result<Record> {
    let input_json = match input.strip_prefix('@') {
        Some(path) => {
            let path = PathBuf::from(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read input file: {}", path.display()))?
        }
        None => input.to_string(),
    };

    let value: serde_json::Value =
        serde_json::from_str(&input_json).context("invalid input JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("input must be a JSON object"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_read_input_inline() {
        let record = read_input(r#"{"query": "cats"}"#).expect("inline JSON");
        assert_eq!(record.get("query"), Some(&json!("cats")));
    }

    #[test]
    fn test_read_input_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"query": "dogs", "k": 3}}"#).expect("write input");

        let arg = format!("@{}", file.path().display());
        let record = read_input(&arg).expect("file JSON");
        assert_eq!(record.get("k"), Some(&json!(3)));
    }

    #[test]
    fn test_read_input_rejects_non_object() {
        let err = read_input("[1, 2]").expect_err("array input");
        assert_eq!(err.to_string(), "input must be a JSON object");
    }

    #[test]
    fn test_read_input_missing_file() {
        let err = read_input("@/definitely/not/here.json").expect_err("missing file");
        assert!(err.to_string().starts_with("failed to read input file"));
    }

    #[tokio::test]
    async fn test_call_runs_pipeline() {
        let config = ServerConfig {
            pipeline: Some(
                "pipeline = echo(columns = ['query']) >> constant(column = 'score', value = 1)"
                    .to_string(),
            ),
            ..ServerConfig::default()
        };
        let args = CallArgs {
            tool: "search".to_string(),
            input: r#"{"query": "cats"}"#.to_string(),
        };

        run(&args, &config).await.expect("call should succeed");
    }

    #[tokio::test]
    async fn test_call_surfaces_validation_errors() {
        let config = ServerConfig {
            pipeline: Some("pipeline = echo()".to_string()),
            ..ServerConfig::default()
        };
        let args = CallArgs {
            tool: "search".to_string(),
            input: r#"{"wrong": 1}"#.to_string(),
        };

        let err = run(&args, &config).await.expect_err("bad arguments");
        assert!(format!("{err:#}").contains("unexpected argument"));
    }
}
