//! Server configuration.
//!
//! # Resolution Order
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. `pipeserve.toml`, found by [`ServerConfig::find_file`]
//! 3. `PIPESERVE_*` environment variables ([`ServerConfig::apply_env`])
//! 4. Command-line flags (applied by the CLI)
//!
//! # Config File Discovery
//!
//! 1. `PIPESERVE_CONFIG` (explicit path)
//! 2. Current directory
//! 3. Parent directories (walk up to filesystem root)
//! 4. XDG config directory (`~/.config/pipeserve/pipeserve.toml`)
//!
//! # Example
//!
//! ```toml
//! pipeline = "catalog.toml"
//! host = "127.0.0.1"
//! port = 8080
//!
//! [mcp]
//! port = 8081
//!
//! [log]
//! level = "debug"
//! file = "/var/log/pipeserve.log"
//!
//! [ai]
//! model = "gpt-4.1-mini"
//! mcp_url = "https://search.example.com/mcp"
//! ```
//!
//! The `[ai]` section also honours the conventional `OPENAI_API_KEY`,
//! `OPENAI_BASE_URL` and `OPENAI_MODEL` variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "pipeserve.toml";

/// Environment variables read by [`ServerConfig::apply_env`].
pub mod env {
    /// Explicit config file path.
    pub const CONFIG: &str = "PIPESERVE_CONFIG";
    /// Catalog path or inline construction expression.
    pub const PIPELINE: &str = "PIPESERVE_PIPELINE";
    /// Task kind in single-pipeline mode.
    pub const PIPELINE_TASK: &str = "PIPESERVE_PIPELINE_TASK";
    /// Tool name in single-pipeline mode.
    pub const PIPELINE_NAME: &str = "PIPESERVE_PIPELINE_NAME";
    pub const HOST: &str = "PIPESERVE_HOST";
    pub const PORT: &str = "PIPESERVE_PORT";
    pub const MCP_HOST: &str = "PIPESERVE_MCP_HOST";
    pub const MCP_PORT: &str = "PIPESERVE_MCP_PORT";
    pub const LOG_LEVEL: &str = "PIPESERVE_LOG_LEVEL";
    pub const LOG_FILE: &str = "PIPESERVE_LOG_FILE";
    /// Public URL of the MCP endpoint handed to the assistant.
    pub const MCP_URL: &str = "PIPESERVE_MCP_URL";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
    pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Default bind host for both transports.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port for both transports.
pub const DEFAULT_PORT: u16 = 8000;
/// Model used by the `/ai` endpoint when none is configured.
pub const DEFAULT_AI_MODEL: &str = "gpt-4.1-mini";

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Catalog path or inline construction expression.
    pub pipeline: Option<String>,
    /// Task kind in single-pipeline mode.
    pub task: Option<String>,
    /// Tool name in single-pipeline mode.
    pub name: Option<String>,
    /// REST bind host.
    pub host: String,
    /// REST bind port.
    pub port: u16,
    pub mcp: McpConfig,
    pub log: LogConfig,
    pub ai: AiConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pipeline: None,
            task: None,
            name: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mcp: McpConfig::default(),
            log: LogConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

/// MCP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Mount path of the streamable HTTP endpoint.
    pub path: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: "/mcp".to_string(),
        }
    }
}

/// Logging settings consumed by the process entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default level directive when `RUST_LOG` is unset.
    pub level: String,
    /// Optional file that receives a copy of every log line.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Settings for the `/ai` endpoint.
///
/// The endpoint is only mounted when both an API key and an MCP URL are
/// known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AiConfig {
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// OpenAI-compatible API base, e.g. a local proxy.
    pub base_url: Option<String>,
    /// URL the model provider uses to reach this server's MCP endpoint.
    pub mcp_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_AI_MODEL.to_string(),
            api_key: None,
            base_url: None,
            mcp_url: None,
        }
    }
}

impl AiConfig {
    /// Returns `true` when the assistant has what it needs to run.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.mcp_url.is_some()
    }
}

impl ServerConfig {
    /// Resolves configuration from the config file and process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered config file cannot be read or parsed.
    pub fn resolve() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve_with(&start, lookup)
    }

    /// Like [`ServerConfig::resolve`], with an explicit start directory and
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered config file cannot be read or parsed.
    pub fn resolve_with<F>(start: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match Self::find_file(start, &lookup) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env(lookup);
        Ok(config)
    }

    /// Locates a config file.
    ///
    /// An explicit `PIPESERVE_CONFIG` that does not exist is ignored.
    pub fn find_file<F>(start: &Path, lookup: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(env::CONFIG).map(PathBuf::from)
            && path.is_file()
        {
            return Some(path);
        }

        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        dirs::config_dir()
            .map(|dir| dir.join("pipeserve").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file())
    }

    /// Loads a config file.
    ///
    /// A relative `pipeline` that names a file next to the config file is
    /// made absolute.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let (Some(pipeline), Some(base)) = (&config.pipeline, path.parent()) {
            let relative = Path::new(pipeline.trim());
            let candidate = base.join(relative);
            if relative.is_relative() && candidate.is_file() {
                config.pipeline = Some(candidate.to_string_lossy().into_owned());
            }
        }
        Ok(config)
    }

    /// Overlays `PIPESERVE_*` variables read through `lookup`.
    ///
    /// Blank values are ignored. An unparsable port falls back to
    /// [`DEFAULT_PORT`] with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(pipeline) = get(env::PIPELINE) {
            self.pipeline = Some(pipeline);
        }
        if let Some(task) = get(env::PIPELINE_TASK) {
            self.task = Some(task);
        }
        if let Some(name) = get(env::PIPELINE_NAME) {
            self.name = Some(name);
        }
        if let Some(host) = get(env::HOST) {
            self.host = host;
        }
        if let Some(port) = get(env::PORT) {
            self.port = parse_port(env::PORT, &port);
        }
        if let Some(host) = get(env::MCP_HOST) {
            self.mcp.host = host;
        }
        if let Some(port) = get(env::MCP_PORT) {
            self.mcp.port = parse_port(env::MCP_PORT, &port);
        }
        if let Some(level) = get(env::LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(file) = get(env::LOG_FILE) {
            self.log.file = Some(PathBuf::from(file));
        }
        if let Some(url) = get(env::MCP_URL) {
            self.ai.mcp_url = Some(url);
        }
        if let Some(key) = get(env::OPENAI_API_KEY) {
            self.ai.api_key = Some(key);
        }
        if let Some(url) = get(env::OPENAI_BASE_URL) {
            self.ai.base_url = Some(url);
        }
        if let Some(model) = get(env::OPENAI_MODEL) {
            self.ai.model = model;
        }
    }
}

fn parse_port(key: &str, value: &str) -> u16 {
    value.trim().parse().unwrap_or_else(|_| {
        warn!(
            variable = key,
            value,
            fallback = DEFAULT_PORT,
            "Invalid port; using default"
        );
        DEFAULT_PORT
    })
}
