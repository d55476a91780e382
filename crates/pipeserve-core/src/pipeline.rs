//! The pipeline contract consumed by the catalog and the tool synthesizer.
//!
//! A pipeline is an opaque transform from a [`Frame`] to a frame, a record,
//! a list of records or any JSON value. Pipelines may additionally describe
//! the columns they need and produce, which the catalog uses to infer
//! schemas that were not declared.
//!
//! # Thread Safety
//!
//! Tools invoke the same pipeline from many tasks at once. Implementations
//! must be `Send + Sync` and must tolerate concurrent calls to
//! [`Pipeline::transform`]; no lock is held around an invocation.

use std::{fmt, sync::Arc};

use serde_json::Value as JsonValue;

use crate::{
    frame::{Frame, Record},
    schema::{TypeTag, json_kind},
};

/// Errors raised by pipelines at run time or during introspection.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The input frame lacks columns the pipeline needs.
    #[error("{pipeline} requires missing columns: {}", columns.join(", "))]
    MissingColumns {
        /// Description of the failing pipeline stage.
        pipeline: String,
        /// Columns that were required but absent.
        columns: Vec<String>,
    },

    /// The pipeline cannot report its output columns.
    #[error("{pipeline} does not declare its output columns")]
    OutputsUnknown {
        /// Description of the pipeline.
        pipeline: String,
    },

    /// A composed stage produced a value the next stage cannot consume.
    #[error("stage {stage} produced {found}, which cannot feed the next stage")]
    IncompatibleStage {
        /// Description of the producing stage.
        stage: String,
        /// JSON kind of the produced value.
        found: &'static str,
    },

    /// A remote pipeline call failed.
    #[error("remote pipeline at {url} failed: {message}")]
    Remote {
        /// Endpoint that was called.
        url: String,
        /// Transport or decoding failure.
        message: String,
    },

    /// Any other failure reported by a pipeline implementation.
    #[error("{0}")]
    Execution(String),
}

/// Value returned by [`Pipeline::transform`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
    /// Tabular result.
    Frame(Frame),
    /// A single mapping.
    Record(Record),
    /// A sequence of mappings.
    Records(Vec<Record>),
    /// Untyped JSON, typically from a remote or foreign pipeline.
    Value(JsonValue),
}

impl PipelineOutput {
    /// Converts the output into a frame so it can feed another stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IncompatibleStage`] if the output is a JSON
    /// value that is neither an object nor a list of objects.
    pub fn into_frame(self, stage: &str) -> Result<Frame, PipelineError> {
        match self {
            Self::Frame(frame) => Ok(frame),
            Self::Record(record) => Ok(Frame::from_records(&[record])),
            Self::Records(records) => Ok(Frame::from_records(&records)),
            Self::Value(JsonValue::Object(record)) => Ok(Frame::from_records(&[record])),
            Self::Value(JsonValue::Array(items)) => {
                let mut records = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        JsonValue::Object(record) => records.push(record),
                        other => {
                            return Err(PipelineError::IncompatibleStage {
                                stage: stage.to_string(),
                                found: json_kind(&other),
                            });
                        }
                    }
                }
                Ok(Frame::from_records(&records))
            }
            Self::Value(other) => Err(PipelineError::IncompatibleStage {
                stage: stage.to_string(),
                found: json_kind(&other),
            }),
        }
    }
}

impl From<Frame> for PipelineOutput {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

impl From<Record> for PipelineOutput {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Vec<Record>> for PipelineOutput {
    fn from(records: Vec<Record>) -> Self {
        Self::Records(records)
    }
}

/// A callable transform over tabular rows.
pub trait Pipeline: Send + Sync {
    /// Runs the pipeline over `input`.
    ///
    /// # Errors
    ///
    /// Implementation specific; see [`PipelineError`].
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError>;

    /// Columns the input must contain, if the pipeline declares them.
    fn input_columns(&self) -> Option<Vec<String>> {
        None
    }

    /// Columns produced when the input has `input` columns.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OutputsUnknown`] unless overridden.
    fn output_columns(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        let _ = input;
        Err(PipelineError::OutputsUnknown {
            pipeline: self.describe(),
        })
    }

    /// Short human-readable description, used in logs and errors.
    fn describe(&self) -> String;
}

impl fmt::Debug for dyn Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pipeline").field(&self.describe()).finish()
    }
}

/// Sequential composition: each stage's output feeds the next stage.
pub struct Compose {
    stages: Vec<Arc<dyn Pipeline>>,
}

impl Compose {
    /// Composes `stages` left to right.
    ///
    /// A single stage is returned unchanged instead of being wrapped.
    #[must_use]
    pub fn chain(mut stages: Vec<Arc<dyn Pipeline>>) -> Arc<dyn Pipeline> {
        if stages.len() == 1
            && let Some(only) = stages.pop()
        {
            return only;
        }
        Arc::new(Self { stages })
    }

    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Pipeline>] {
        &self.stages
    }
}

impl Pipeline for Compose {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        let mut output = PipelineOutput::Frame(input);
        let mut previous = String::from("input");
        for stage in &self.stages {
            let frame = output.into_frame(&previous)?;
            output = stage.transform(frame)?;
            previous = stage.describe();
        }
        Ok(output)
    }

    /// The first stage's requirements, plus any column a later stage needs
    /// that no earlier stage produces. Unknown when the first stage is.
    fn input_columns(&self) -> Option<Vec<String>> {
        let (first, rest) = self.stages.split_first()?;
        let mut required = first.input_columns()?;
        let Ok(mut available) = first.output_columns(&required) else {
            return Some(required);
        };

        for stage in rest {
            for column in stage.input_columns().unwrap_or_default() {
                if !available.contains(&column) {
                    if !required.contains(&column) {
                        required.push(column.clone());
                    }
                    available.push(column);
                }
            }
            match stage.output_columns(&available) {
                Ok(columns) => available = columns,
                Err(_) => break,
            }
        }
        Some(required)
    }

    fn output_columns(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        let mut columns = input.to_vec();
        for stage in &self.stages {
            columns = stage.output_columns(&columns)?;
        }
        Ok(columns)
    }

    fn describe(&self) -> String {
        self.stages
            .iter()
            .map(|stage| stage.describe())
            .collect::<Vec<_>>()
            .join(" >> ")
    }
}

type TransformFn = dyn Fn(Frame) -> Result<PipelineOutput, PipelineError> + Send + Sync;

/// Adapts a closure into a [`Pipeline`].
///
/// ```
/// use pipeserve_core::{FnPipeline, Pipeline, PipelineOutput};
///
/// let identity = FnPipeline::new("identity", |frame| Ok(PipelineOutput::Frame(frame)))
///     .with_inputs(["query"]);
/// assert_eq!(identity.input_columns(), Some(vec!["query".to_string()]));
/// ```
pub struct FnPipeline {
    name: String,
    inputs: Option<Vec<String>>,
    outputs: Option<Vec<String>>,
    transform: Box<TransformFn>,
}

impl FnPipeline {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Frame) -> Result<PipelineOutput, PipelineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs: None,
            outputs: None,
            transform: Box::new(transform),
        }
    }

    /// Declares the required input columns.
    #[must_use]
    pub fn with_inputs<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Declares the output columns, independent of the input.
    #[must_use]
    pub fn with_outputs<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

impl Pipeline for FnPipeline {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        (self.transform)(input)
    }

    fn input_columns(&self) -> Option<Vec<String>> {
        self.inputs.clone()
    }

    fn output_columns(&self, _input: &[String]) -> Result<Vec<String>, PipelineError> {
        self.outputs
            .clone()
            .ok_or_else(|| PipelineError::OutputsUnknown {
                pipeline: self.describe(),
            })
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Metadata for a well-known retrieval column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: &'static str,
    pub tag: TypeTag,
    pub description: &'static str,
}

const KNOWN_COLUMNS: &[ColumnInfo] = &[
    ColumnInfo {
        name: "qid",
        tag: TypeTag::String,
        description: "Unique identifier of the query",
    },
    ColumnInfo {
        name: "query",
        tag: TypeTag::String,
        description: "Text of the query",
    },
    ColumnInfo {
        name: "docno",
        tag: TypeTag::String,
        description: "Unique identifier of the document",
    },
    ColumnInfo {
        name: "docid",
        tag: TypeTag::Int,
        description: "Internal numeric identifier of the document",
    },
    ColumnInfo {
        name: "text",
        tag: TypeTag::String,
        description: "Text of the document",
    },
    ColumnInfo {
        name: "title",
        tag: TypeTag::String,
        description: "Title of the document",
    },
    ColumnInfo {
        name: "score",
        tag: TypeTag::Float,
        description: "Relevance score of the document for the query",
    },
    ColumnInfo {
        name: "rank",
        tag: TypeTag::Int,
        description: "Position of the document in the ranking, starting at 0",
    },
    ColumnInfo {
        name: "qanswer",
        tag: TypeTag::String,
        description: "Generated answer to the query",
    },
    ColumnInfo {
        name: "querygen",
        tag: TypeTag::String,
        description: "Generated context passed to an answer generator",
    },
];

/// Looks up metadata for a well-known column.
#[must_use]
pub fn column_info(name: &str) -> Option<&'static ColumnInfo> {
    KNOWN_COLUMNS.iter().find(|info| info.name == name)
}
