//! Catalog document parsing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Errors that can occur when reading a catalog document.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// Failed to read the document.
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a TOML document.
    #[error("failed to parse catalog: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failed to parse a JSON document.
    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse a YAML document.
    #[error("failed to parse catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Catalog document listing the pipelines to serve.
///
/// Documents are TOML, JSON when the file name ends in `.json`, or YAML for
/// `.yaml` and `.yml`. The list may be called `pipelines` or `functions`.
///
/// # Example
///
/// ```toml
/// [[pipelines]]
/// name = "msmarco-search"
/// task = "search"
/// description = "BM25 over MS MARCO"
/// pipeline = "pipeline = remote(url = 'http://bm25:8000', inputs = ['qid', 'query'])"
/// properties = [{ phrase = "query", type = "string" }]
/// ```
///
/// Entries are kept as raw JSON until [`CatalogManifest::entries`] so that
/// one malformed entry cannot prevent the rest of the document from loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogManifest {
    #[serde(default, alias = "functions")]
    pub pipelines: Vec<JsonValue>,
}

/// One pipeline entry of a catalog document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineEntry {
    pub name: Option<String>,
    /// Task kind, `search` when absent.
    pub task: Option<String>,
    pub description: Option<String>,
    /// Construction expression.
    pub pipeline: Option<String>,
    /// Input schema override, a mapping or a list of field descriptors.
    pub properties: Option<JsonValue>,
    /// Output schema override, same shapes as `properties`.
    pub outputs: Option<JsonValue>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for PipelineEntry {
    fn default() -> Self {
        Self {
            name: None,
            task: None,
            description: None,
            pipeline: None,
            properties: None,
            outputs: None,
            enabled: true,
        }
    }
}

impl PipelineEntry {
    /// Lower-cased task kind, defaulting to `search`.
    #[must_use]
    pub fn task(&self) -> String {
        normalize_task(self.task.as_deref())
    }
}

/// Trims and lower-cases a task kind; blank or absent becomes `search`.
#[must_use]
pub fn normalize_task(task: Option<&str>) -> String {
    task.map(str::trim)
        .filter(|task| !task.is_empty())
        .unwrap_or(crate::DEFAULT_TASK)
        .to_lowercase()
}

impl CatalogManifest {
    /// Loads a catalog document from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => Self::from_json(&content),
            Some("yaml" | "yml") => Self::from_yaml(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Toml`] on invalid TOML.
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Json`] on invalid JSON.
    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parses a YAML document. A blank document has no entries.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Yaml`] on invalid YAML.
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Decodes each entry, in document order.
    ///
    /// Decoding failures are returned per entry rather than failing the whole
    /// document.
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = (usize, Result<PipelineEntry, serde_json::Error>)> + '_ {
        self.pipelines
            .iter()
            .enumerate()
            .map(|(index, raw)| (index, PipelineEntry::deserialize(raw)))
    }
}
