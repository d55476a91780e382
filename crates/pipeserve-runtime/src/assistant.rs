//! Natural-language front end for the served tools.
//!
//! An [`Assistant`] forwards a user request to an OpenAI-compatible
//! Responses API together with a hosted MCP tool that points back at this
//! server. The model picks and calls the pipelines itself; the reply carries
//! the model's text and every MCP call it made.

use std::fmt;

use async_openai::{Client, config::OpenAIConfig, error::OpenAIError};
use pipeserve_core::AiConfig;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::{info, instrument};

/// Label the model provider shows for this server's MCP tools.
pub const MCP_SERVER_LABEL: &str = "pipeserve";

const MCP_SERVER_DESCRIPTION: &str =
    "An MCP server that exposes multiple information retrieval pipelines";

const INSTRUCTIONS: &str = "\
You have access to MCP tools, each an information retrieval pipeline.
Pick the most appropriate tool for the user's request and call it.
Return exactly what the tool outputs, without summarizing or explaining it.
Do not mention which tool you used.
If no tool is suitable, reply with one short sentence saying why.";

/// Errors returned by [`Assistant::ask`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AssistantError {
    /// The model provider rejected the request or could not be reached.
    #[error("model request failed: {0}")]
    Request(#[from] OpenAIError),
}

/// One MCP tool call made while answering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUse {
    pub name: String,
    /// Raw tool output as reported by the provider.
    pub output: JsonValue,
}

/// Model reply to a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub output: String,
    pub tools_used: Vec<ToolUse>,
}

/// Client for the `/ai` endpoint.
///
/// Cheap to clone; clones share one HTTP client.
#[derive(Clone)]
pub struct Assistant {
    client: Client<OpenAIConfig>,
    model: String,
    mcp_url: String,
}

impl fmt::Debug for Assistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assistant")
            .field("model", &self.model)
            .field("mcp_url", &self.mcp_url)
            .finish_non_exhaustive()
    }
}

impl Assistant {
    /// Creates an assistant that calls `model` and hands it `mcp_url`.
    ///
    /// `base_url` overrides the provider's API base, e.g. for a proxy.
    #[must_use]
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        model: impl Into<String>,
        mcp_url: impl Into<String>,
    ) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
            mcp_url: mcp_url.into(),
        }
    }

    /// Builds an assistant from settings, or `None` when the API key or the
    /// MCP URL is missing.
    #[must_use]
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref()?;
        let mcp_url = config.mcp_url.as_deref()?;
        Some(Self::new(
            api_key,
            config.base_url.as_deref(),
            &config.model,
            mcp_url,
        ))
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `input` to the model with this server's MCP tools attached.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Request`] if the provider call fails.
    #[instrument(skip(self, input), fields(model = %self.model))]
    pub async fn ask(&self, input: &str) -> Result<AssistantReply, AssistantError> {
        let request = json!({
            "model": self.model,
            "tools": [{
                "type": "mcp",
                "server_label": MCP_SERVER_LABEL,
                "server_description": MCP_SERVER_DESCRIPTION,
                "server_url": self.mcp_url,
                "require_approval": "never",
            }],
            "input": [
                {"role": "system", "content": INSTRUCTIONS},
                {"role": "user", "content": input},
            ],
        });

        let response: JsonValue = self.client.responses().create_byot(request).await?;
        let reply = reply_from_response(&response);
        info!(tools_used = reply.tools_used.len(), "Assistant replied");
        Ok(reply)
    }
}

/// Collects the output text and MCP calls from a Responses API payload.
fn reply_from_response(response: &JsonValue) -> AssistantReply {
    let items = response["output"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut output = String::new();
    let mut tools_used = Vec::new();
    for item in items {
        match item["type"].as_str() {
            Some("message") => {
                let parts = item["content"].as_array().map(Vec::as_slice).unwrap_or_default();
                for part in parts {
                    if part["type"] == "output_text"
                        && let Some(text) = part["text"].as_str()
                    {
                        output.push_str(text);
                    }
                }
            }
            Some("mcp_call") => tools_used.push(ToolUse {
                name: item["name"].as_str().unwrap_or_default().to_string(),
                output: item["output"].clone(),
            }),
            _ => {}
        }
    }

    AssistantReply { output, tools_used }
}
