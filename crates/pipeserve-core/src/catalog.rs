//! Catalog loading: from a document or inline expression to pipeline
//! descriptors.
//!
//! # Load modes
//!
//! A [`CatalogSource`] is either a path to a catalog document (multi-pipeline
//! mode) or an inline construction expression (single-pipeline mode).
//!
//! In multi-pipeline mode, malformed entries are skipped with a warning and
//! the remaining entries still load. An entry is skipped when it:
//!
//! - cannot be decoded, or is disabled
//! - has no name or no construction expression
//! - fails to evaluate, or binds neither `pipeline` nor `p`
//! - declares a schema that does not compile
//! - reuses the name of an earlier entry, or sanitizes to the same tool name
//!   (the first one wins)
//!
//! In single-pipeline mode every one of these is fatal.
//!
//! # Schema inference
//!
//! When an entry declares no input schema, the pipeline's required input
//! columns become string fields annotated with known column metadata. When
//! the pipeline cannot say what it requires, the schema is a single `query`
//! string. A declared or inferred empty schema is kept as is.
//! Output schemas are inferred from the pipeline's output columns; failure
//! to infer them only drops the output schema.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{error, info, warn};

use crate::{
    builders::BuilderTable,
    expr::{self, Bindings, ExprError},
    manifest::{CatalogManifest, ManifestError, PipelineEntry, normalize_task},
    pipeline::{Pipeline, column_info},
    schema::{self, CompiledSchema, SchemaError, sanitize_tool_name},
};

/// Errors that prevent a catalog from being built at all.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// No usable pipeline source, or the expression bound no pipeline.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The catalog document could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The inline expression failed to evaluate.
    #[error("failed to build pipeline '{name}': {source}")]
    Expression {
        name: String,
        #[source]
        source: ExprError,
    },

    /// A declared schema failed to compile.
    #[error("invalid schema for pipeline '{name}': {source}")]
    Schema {
        name: String,
        #[source]
        source: SchemaError,
    },
}

/// A loaded pipeline and its compiled contract. Immutable once built.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub name: String,
    pub task: String,
    pub pipeline: Arc<dyn Pipeline>,
    pub description: String,
    pub input_schema: CompiledSchema,
    pub output_schema: Option<CompiledSchema>,
}

/// Pipeline descriptors keyed by name, in load order.
///
/// No two entries share a tool name once sanitized.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: IndexMap<String, PipelineDescriptor>,
    tool_names: HashSet<String>,
}

impl Catalog {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PipelineDescriptor> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineDescriptor> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `descriptor` unless its name, or the tool name it sanitizes
    /// to, is taken. Returns `false` if it was rejected.
    fn insert_first(&mut self, descriptor: PipelineDescriptor) -> bool {
        if self.entries.contains_key(&descriptor.name)
            || !self.tool_names.insert(sanitize_tool_name(&descriptor.name))
        {
            return false;
        }
        self.entries.insert(descriptor.name.clone(), descriptor);
        true
    }
}

impl IntoIterator for Catalog {
    type Item = PipelineDescriptor;
    type IntoIter = indexmap::map::IntoValues<String, PipelineDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Where the catalog comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// Path to a catalog document.
    Document(PathBuf),
    /// Inline construction expression.
    Inline(String),
}

impl CatalogSource {
    /// Interprets a configured value: an existing file is a document,
    /// anything else is an inline expression.
    #[must_use]
    pub fn detect(setting: &str) -> Self {
        let path = Path::new(setting.trim());
        if path.is_file() {
            Self::Document(path.to_path_buf())
        } else {
            Self::Inline(setting.to_string())
        }
    }

    /// Like [`CatalogSource::detect`], failing when nothing is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Configuration`] if `setting` is absent or
    /// blank.
    pub fn from_setting(setting: Option<&str>) -> Result<Self, CatalogError> {
        match setting.map(str::trim) {
            Some(value) if !value.is_empty() => Ok(Self::detect(value)),
            _ => Err(CatalogError::Configuration(
                "no pipeline configured; set PIPESERVE_PIPELINE or pass --pipeline".to_string(),
            )),
        }
    }
}

/// Result of loading a [`CatalogSource`].
#[derive(Debug, Clone)]
pub enum LoadedCatalog {
    /// Multi-pipeline mode.
    Catalog(Catalog),
    /// Single-pipeline mode.
    Single(PipelineDescriptor),
}

impl LoadedCatalog {
    /// Flattens either mode into a catalog.
    #[must_use]
    pub fn into_catalog(self) -> Catalog {
        match self {
            Self::Catalog(catalog) => catalog,
            Self::Single(descriptor) => {
                let mut catalog = Catalog::default();
                catalog.insert_first(descriptor);
                catalog
            }
        }
    }
}

/// Builds catalogs using a table of pipeline constructors.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    builders: BuilderTable,
    single_task: Option<String>,
    single_name: Option<String>,
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self::new(BuilderTable::with_builtins())
    }
}

impl CatalogLoader {
    #[must_use]
    pub fn new(builders: BuilderTable) -> Self {
        Self {
            builders,
            single_task: None,
            single_name: None,
        }
    }

    /// Task kind used in single-pipeline mode.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.single_task = Some(task.into());
        self
    }

    /// Pipeline name used in single-pipeline mode. Defaults to the task.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.single_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn builders(&self) -> &BuilderTable {
        &self.builders
    }

    /// Loads `source` in the mode it selects.
    ///
    /// # Errors
    ///
    /// See [`CatalogLoader::load_document`] and [`CatalogLoader::load_inline`].
    pub fn load(&self, source: &CatalogSource) -> Result<LoadedCatalog, CatalogError> {
        match source {
            CatalogSource::Document(path) => self.load_document(path).map(LoadedCatalog::Catalog),
            CatalogSource::Inline(expression) => {
                self.load_inline(expression).map(LoadedCatalog::Single)
            }
        }
    }

    /// Loads a catalog document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Manifest`] only if the document itself cannot
    /// be read or parsed. Bad entries are skipped.
    pub fn load_document(&self, path: &Path) -> Result<Catalog, CatalogError> {
        info!(path = %path.display(), "Loading pipeline catalog");
        let manifest = CatalogManifest::load(path)?;
        Ok(self.load_manifest(&manifest))
    }

    /// Builds a catalog from an already parsed document, skipping bad
    /// entries with a warning.
    pub fn load_manifest(&self, manifest: &CatalogManifest) -> Catalog {
        let mut catalog = Catalog::default();

        for (index, decoded) in manifest.entries() {
            let entry = match decoded {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed catalog entry");
                    continue;
                }
            };
            let Some(descriptor) = self.load_entry(index, &entry) else {
                continue;
            };

            let name = descriptor.name.clone();
            let task = descriptor.task.clone();
            if catalog.insert_first(descriptor) {
                info!(pipeline = %name, task = %task, "Loaded pipeline");
            } else {
                warn!(
                    index,
                    pipeline = %name,
                    tool = %sanitize_tool_name(&name),
                    "Skipping catalog entry with duplicate name"
                );
            }
        }

        info!(count = catalog.len(), "Pipeline catalog loaded");
        catalog
    }

    fn load_entry(&self, index: usize, entry: &PipelineEntry) -> Option<PipelineDescriptor> {
        let name = entry.name.as_deref().map(str::trim).unwrap_or_default();
        let expression = entry.pipeline.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() || expression.is_empty() {
            warn!(index, "Skipping catalog entry with missing name or pipeline");
            return None;
        }
        if !entry.enabled {
            info!(index, pipeline = %name, "Skipping disabled catalog entry");
            return None;
        }

        let bindings = match expr::evaluate(expression, &self.builders) {
            Ok(bindings) => bindings,
            Err(e) => {
                error!(pipeline = %name, error = %e, "Failed to evaluate pipeline expression");
                return None;
            }
        };
        let Some(pipeline) = bindings.pipeline() else {
            warn!(
                pipeline = %name,
                expected = ?Bindings::RESULT_NAMES,
                "Skipping catalog entry whose expression binds no pipeline"
            );
            return None;
        };

        match describe(
            name,
            &entry.task(),
            pipeline,
            entry.description.as_deref(),
            entry.properties.as_ref(),
            entry.outputs.as_ref(),
        ) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(pipeline = %name, error = %e, "Skipping catalog entry with invalid schema");
                None
            }
        }
    }

    /// Builds the single pipeline described by an inline expression.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Expression`] if evaluation fails
    /// - [`CatalogError::Configuration`] if neither `pipeline` nor `p` is
    ///   bound
    pub fn load_inline(&self, expression: &str) -> Result<PipelineDescriptor, CatalogError> {
        let task = normalize_task(self.single_task.as_deref());
        let name = self
            .single_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(task.as_str())
            .to_string();

        let bindings = expr::evaluate(expression, &self.builders).map_err(|source| {
            error!(pipeline = %name, error = %source, "Failed to evaluate pipeline expression");
            CatalogError::Expression {
                name: name.clone(),
                source,
            }
        })?;
        let pipeline = bindings.pipeline().ok_or_else(|| {
            CatalogError::Configuration(format!(
                "pipeline expression binds neither `pipeline` nor `p` (bound: {})",
                bindings.names().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let descriptor = describe(&name, &task, pipeline, None, None, None)
            .map_err(|source| CatalogError::Schema {
                name: name.clone(),
                source,
            })?;
        info!(pipeline = %name, task = %task, "Loaded single pipeline");
        Ok(descriptor)
    }
}

/// Builds a descriptor, compiling declared schemas and inferring missing
/// ones.
///
/// # Errors
///
/// Returns [`SchemaError`] if a declared schema does not compile.
pub fn describe(
    name: &str,
    task: &str,
    pipeline: Arc<dyn Pipeline>,
    description: Option<&str>,
    properties: Option<&JsonValue>,
    outputs: Option<&JsonValue>,
) -> Result<PipelineDescriptor, SchemaError> {
    let input_schema = match properties {
        Some(definition) => schema::compile(definition)?,
        None => match pipeline.input_columns() {
            Some(columns) => schema::compile(&column_fields(&columns))?,
            None => default_input_schema(),
        },
    };

    let output_schema = match outputs {
        Some(definition) => Some(schema::compile(definition)?),
        None => infer_outputs(name, pipeline.as_ref(), &input_schema),
    };

    let description = description
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map_or_else(|| format!("Pipeline {name}"), ToString::to_string);

    Ok(PipelineDescriptor {
        name: name.to_string(),
        task: task.to_string(),
        pipeline,
        description,
        input_schema,
        output_schema,
    })
}

/// The schema used when nothing else is known: one `query` string.
#[must_use]
pub fn default_input_schema() -> CompiledSchema {
    schema::compile(&column_fields(&["query".to_string()])).unwrap_or_default()
}

fn infer_outputs(
    name: &str,
    pipeline: &dyn Pipeline,
    input_schema: &CompiledSchema,
) -> Option<CompiledSchema> {
    let inputs = pipeline.input_columns().unwrap_or_else(|| {
        input_schema
            .original_names()
            .map(ToString::to_string)
            .collect()
    });

    let inferred = pipeline
        .output_columns(&inputs)
        .map_err(|e| e.to_string())
        .and_then(|columns| schema::compile(&column_fields(&columns)).map_err(|e| e.to_string()));
    match inferred {
        Ok(schema) => Some(schema),
        Err(e) => {
            warn!(pipeline = %name, error = %e, "Could not infer output schema; omitting it");
            None
        }
    }
}

/// Field descriptors for `columns`, annotated with known column metadata.
fn column_fields(columns: &[String]) -> JsonValue {
    JsonValue::Array(
        columns
            .iter()
            .map(|column| {
                let mut field = Map::new();
                field.insert("phrase".to_string(), json!(column));
                match column_info(column) {
                    Some(info) => {
                        field.insert("type".to_string(), json!(info.tag.as_str()));
                        field.insert("description".to_string(), json!(info.description));
                    }
                    None => {
                        field.insert("type".to_string(), json!("string"));
                    }
                }
                JsonValue::Object(field)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        sync::Mutex,
    };

    use super::*;
    use crate::{
        frame::Frame,
        pipeline::{FnPipeline, PipelineOutput},
        schema::TypeTag,
    };

    fn manifest(toml: &str) -> CatalogManifest {
        CatalogManifest::from_toml(toml).unwrap()
    }

    /// Log sink shared between a test and its scoped subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn warnings(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .filter(|line| line.contains("WARN"))
                .map(ToString::to_string)
                .collect()
        }
    }

    /// Loads `toml` with a subscriber that records every event.
    fn load_with_logs(toml: &str) -> (Catalog, CapturedLogs) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let catalog = tracing::subscriber::with_default(subscriber, || {
            CatalogLoader::default().load_manifest(&manifest(toml))
        });
        (catalog, logs)
    }

    fn identity() -> Arc<dyn Pipeline> {
        Arc::new(FnPipeline::new("identity", |frame: Frame| {
            Ok(PipelineOutput::Frame(frame))
        }))
    }

    #[test]
    fn test_entry_missing_name_is_skipped_with_warning() {
        let (catalog, logs) = load_with_logs(
            r#"
[[pipelines]]
name = "good"
pipeline = "pipeline = echo()"

[[pipelines]]
pipeline = "pipeline = echo()"
"#,
        );

        assert_eq!(catalog.names().collect::<Vec<_>>(), ["good"]);
        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("Skipping catalog entry with missing name or pipeline"));
        assert!(warnings[0].contains("index=1"));
    }

    #[test]
    fn test_malformed_entry_is_skipped_with_warning() {
        let (catalog, logs) = load_with_logs(
            r#"
[[pipelines]]
name = "typo"
pipline = "pipeline = echo()"

[[pipelines]]
name = "good"
pipeline = "pipeline = echo()"
"#,
        );

        assert_eq!(catalog.names().collect::<Vec<_>>(), ["good"]);
        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("Skipping malformed catalog entry"));
    }

    #[test]
    fn test_bad_entries_do_not_abort_the_load() {
        let catalog = CatalogLoader::default().load_manifest(&manifest(
            r#"
[[pipelines]]
name = "no-expression"

[[pipelines]]
name = "syntax"
pipeline = "pipeline = echo("

[[pipelines]]
name = "unbound"
pipeline = "retriever = echo()"

[[pipelines]]
name = "bad-schema"
pipeline = "pipeline = echo()"
properties = "query"

[[pipelines]]
name = "collision"
pipeline = "pipeline = echo()"
properties = { "a-b" = "string", "a b" = "string" }

[[pipelines]]
name = "disabled"
pipeline = "pipeline = echo()"
enabled = false

[[pipelines]]
name = "ok"
pipeline = "p = echo()"
"#,
        ));

        assert_eq!(catalog.names().collect::<Vec<_>>(), ["ok"]);
    }

    #[test]
    fn test_duplicate_names_keep_the_first_entry() {
        let (catalog, logs) = load_with_logs(
            r#"
[[pipelines]]
name = "dup"
task = "search"
pipeline = "pipeline = echo()"

[[pipelines]]
name = "dup"
task = "rerank"
pipeline = "pipeline = echo()"
"#,
        );

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("dup").unwrap().task, "search");
        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("Skipping catalog entry with duplicate name"));
    }

    #[test]
    fn test_names_colliding_after_sanitization_keep_the_first_entry() {
        let (catalog, logs) = load_with_logs(
            r#"
[[pipelines]]
name = "a b"
task = "first"
pipeline = "pipeline = echo()"

[[pipelines]]
name = "a_b"
task = "second"
pipeline = "pipeline = echo()"
"#,
        );

        assert_eq!(catalog.names().collect::<Vec<_>>(), ["a b"]);
        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("Skipping catalog entry with duplicate name"));
        assert!(warnings[0].contains("tool=a_b"));
    }

    #[test]
    fn test_declared_properties_are_used_verbatim() {
        let catalog = CatalogLoader::default().load_manifest(&manifest(
            r#"
[[pipelines]]
name = "qa"
task = "QA"
description = "Answer questions"
pipeline = "pipeline = echo(columns = ['question'])"
properties = [{ phrase = "question", type = "string" }, { phrase = "k", type = "int" }]
"#,
        ));

        let descriptor = catalog.get("qa").unwrap();
        assert_eq!(descriptor.task, "qa");
        assert_eq!(descriptor.description, "Answer questions");
        assert_eq!(
            descriptor.input_schema.idents().collect::<Vec<_>>(),
            ["question", "k"]
        );
    }

    #[test]
    fn test_input_schema_inferred_from_pipeline_columns() {
        let catalog = CatalogLoader::default().load_manifest(&manifest(
            r#"
[[pipelines]]
name = "rerank"
pipeline = "pipeline = echo(columns = ['qid', 'query', 'docno', 'score'])"
"#,
        ));

        let descriptor = catalog.get("rerank").unwrap();
        let types: Vec<_> = descriptor
            .input_schema
            .fields()
            .iter()
            .map(|f| (f.ident.as_str(), f.tag))
            .collect();
        assert_eq!(
            types,
            [
                ("qid", TypeTag::String),
                ("query", TypeTag::String),
                ("docno", TypeTag::String),
                ("score", TypeTag::Float),
            ]
        );
        assert_eq!(
            descriptor.input_schema.fields()[0].description(),
            Some("Unique identifier of the query")
        );
        assert_eq!(descriptor.description, "Pipeline rerank");
    }

    #[test]
    fn test_default_query_schema_when_nothing_is_declared() {
        let catalog = CatalogLoader::default().load_manifest(&manifest(
            r#"
[[pipelines]]
name = "opaque"
pipeline = "pipeline = echo()"
"#,
        ));

        assert_eq!(
            catalog.get("opaque").unwrap().input_schema,
            default_input_schema()
        );
        assert_eq!(
            default_input_schema().idents().collect::<Vec<_>>(),
            ["query"]
        );
    }

    #[test]
    fn test_empty_schemas_give_zero_parameter_tools() {
        let catalog = CatalogLoader::default().load_manifest(&manifest(
            r#"
[[pipelines]]
name = "empty-list"
pipeline = "pipeline = echo()"
properties = []

[[pipelines]]
name = "empty-table"
pipeline = "pipeline = echo()"
properties = {}

[[pipelines]]
name = "needs-nothing"
pipeline = "pipeline = constant(column = 'score', value = 1.0)"
"#,
        ));

        assert_eq!(catalog.len(), 3);
        for descriptor in catalog.iter() {
            assert!(descriptor.input_schema.is_empty(), "{}", descriptor.name);
        }
        let outputs = catalog.get("needs-nothing").unwrap().output_schema.as_ref().unwrap();
        assert_eq!(outputs.idents().collect::<Vec<_>>(), ["score"]);
    }

    #[test]
    fn test_output_schema_inferred_through_composition() {
        let catalog = CatalogLoader::default().load_manifest(&manifest(
            r#"
[[pipelines]]
name = "scored"
pipeline = "pipeline = echo(columns = ['query']) >> constant(column = 'score', value = 0.0)"
"#,
        ));

        let outputs = catalog.get("scored").unwrap().output_schema.as_ref().unwrap();
        assert_eq!(outputs.type_map().get("score"), Some(&TypeTag::Float));
        assert_eq!(outputs.idents().collect::<Vec<_>>(), ["query", "score"]);
    }

    #[test]
    fn test_output_inference_failure_is_not_fatal() {
        let descriptor = describe("opaque", "search", identity(), None, None, None).unwrap();
        assert!(descriptor.output_schema.is_none());
        assert_eq!(descriptor.input_schema, default_input_schema());
    }

    #[test]
    fn test_declared_output_schema_must_compile() {
        let err = describe(
            "bad",
            "search",
            identity(),
            None,
            None,
            Some(&json!(3)),
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::Shape { found: "number" });
    }

    #[test]
    fn test_single_mode_defaults_task_and_name() {
        let descriptor = CatalogLoader::default()
            .load_inline("pipeline = echo()")
            .unwrap();
        assert_eq!(descriptor.task, "search");
        assert_eq!(descriptor.name, "search");
        assert_eq!(descriptor.description, "Pipeline search");
    }

    #[test]
    fn test_single_mode_honours_task_and_name_overrides() {
        let descriptor = CatalogLoader::default()
            .with_task("Rerank")
            .with_name("monot5")
            .load_inline("p = echo(columns = ['query', 'text'])")
            .unwrap();
        assert_eq!(descriptor.task, "rerank");
        assert_eq!(descriptor.name, "monot5");
        assert_eq!(descriptor.input_schema.len(), 2);
    }

    #[test]
    fn test_single_mode_without_binding_is_configuration_error() {
        let err = CatalogLoader::default()
            .load_inline("retriever = echo()")
            .unwrap_err();
        assert!(matches!(err, CatalogError::Configuration(ref msg) if msg.contains("retriever")));
    }

    #[test]
    fn test_single_mode_expression_error_is_fatal() {
        let err = CatalogLoader::default()
            .load_inline("pipeline = nope()")
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Expression {
                source: ExprError::UnknownBuilder(_),
                ..
            }
        ));
    }

    #[test]
    fn test_missing_source_is_configuration_error() {
        assert!(matches!(
            CatalogSource::from_setting(None),
            Err(CatalogError::Configuration(_))
        ));
        assert!(matches!(
            CatalogSource::from_setting(Some("   ")),
            Err(CatalogError::Configuration(_))
        ));
    }

    #[test]
    fn test_source_detection_distinguishes_files_from_expressions() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[[pipelines]]\nname = \"a\"\npipeline = \"p = echo()\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert_eq!(
            CatalogSource::from_setting(Some(&path)).unwrap(),
            CatalogSource::Document(file.path().to_path_buf())
        );
        assert_eq!(
            CatalogSource::detect("pipeline = echo()"),
            CatalogSource::Inline("pipeline = echo()".to_string())
        );

        let loaded = CatalogLoader::default()
            .load(&CatalogSource::detect(&path))
            .unwrap();
        assert!(matches!(loaded, LoadedCatalog::Catalog(ref c) if c.len() == 1));
    }

    #[test]
    fn test_single_pipeline_flattens_into_catalog() {
        let loaded = CatalogLoader::default()
            .load(&CatalogSource::Inline("pipeline = echo()".to_string()))
            .unwrap();
        let catalog = loaded.into_catalog();
        assert_eq!(catalog.names().collect::<Vec<_>>(), ["search"]);
    }

    #[test]
    fn test_unreadable_document_is_manifest_error() {
        let err = CatalogLoader::default()
            .load_document(Path::new("/no/such/catalog.toml"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Manifest(ManifestError::Io(_))));
    }
}
