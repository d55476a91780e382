//! Named pipeline constructors.
//!
//! Construction expressions never run arbitrary code: every call in an
//! expression resolves to a constructor registered in a [`BuilderTable`].
//! Hosts embedding pipeserve register their own pipelines here; the
//! built-in constructors cover column plumbing and calling a pipeline served
//! by another process.
//!
//! | Builder    | Arguments                        | Effect |
//! |------------|----------------------------------|--------|
//! | `echo`     | `columns=[..]` (optional)        | returns the input unchanged |
//! | `select`   | `columns=[..]`                   | keeps only the named columns |
//! | `rename`   | `from=.., to=..`                 | renames one column |
//! | `constant` | `column=.., value=..`            | sets a column on every row |
//! | `remote`   | `url=.., inputs=[..], outputs=[..]` | POSTs rows to `<url>/transform` |

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, OnceLock},
};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    frame::Frame,
    pipeline::{Pipeline, PipelineError, PipelineOutput},
    schema::json_kind,
};

/// Errors raised by a constructor.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    /// A required argument was not supplied.
    #[error("{builder}() missing required argument '{argument}'")]
    MissingArgument {
        builder: &'static str,
        argument: &'static str,
    },

    /// An argument has the wrong kind of value.
    #[error("{builder}() argument '{argument}' must be {expected}, got {found}")]
    InvalidArgument {
        builder: &'static str,
        argument: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// A keyword argument the constructor does not accept.
    #[error("{builder}() got an unexpected argument '{argument}'")]
    UnexpectedArgument {
        builder: &'static str,
        argument: String,
    },

    /// Free-form failure from a host-registered constructor.
    #[error("{0}")]
    Other(String),
}

/// Arguments of one constructor call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuilderArgs {
    pub positional: Vec<JsonValue>,
    pub named: IndexMap<String, JsonValue>,
}

impl BuilderArgs {
    /// Argument supplied by keyword `name` or at `position`.
    #[must_use]
    pub fn get(&self, name: &str, position: usize) -> Option<&JsonValue> {
        self.named
            .get(name)
            .or_else(|| self.positional.get(position))
    }

    /// Fails if a keyword outside `accepted` was supplied.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnexpectedArgument`] for the first unknown
    /// keyword.
    pub fn expect_only(&self, builder: &'static str, accepted: &[&str]) -> Result<(), BuildError> {
        match self
            .named
            .keys()
            .find(|key| !accepted.contains(&key.as_str()))
        {
            Some(argument) => Err(BuildError::UnexpectedArgument {
                builder,
                argument: argument.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Required string argument.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the argument is missing or not a string.
    pub fn string(
        &self,
        builder: &'static str,
        name: &'static str,
        position: usize,
    ) -> Result<String, BuildError> {
        match self.get(name, position) {
            Some(JsonValue::String(value)) => Ok(value.clone()),
            Some(other) => Err(BuildError::InvalidArgument {
                builder,
                argument: name,
                expected: "a string",
                found: json_kind(other),
            }),
            None => Err(BuildError::MissingArgument {
                builder,
                argument: name,
            }),
        }
    }

    /// Optional list-of-strings argument. A bare string is a one-element
    /// list.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidArgument`] on any other shape.
    pub fn string_list(
        &self,
        builder: &'static str,
        name: &'static str,
        position: usize,
    ) -> Result<Option<Vec<String>>, BuildError> {
        let invalid = |found| BuildError::InvalidArgument {
            builder,
            argument: name,
            expected: "a list of strings",
            found,
        };
        match self.get(name, position) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(single)) => Ok(Some(vec![single.clone()])),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(ToString::to_string)
                        .ok_or_else(|| invalid(json_kind(item)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(invalid(json_kind(other))),
        }
    }
}

/// Signature of a registered constructor.
pub type BuilderFn = dyn Fn(&BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> + Send + Sync;

/// Capability table of named pipeline constructors.
#[derive(Clone, Default)]
pub struct BuilderTable {
    builders: BTreeMap<String, Arc<BuilderFn>>,
}

impl fmt::Debug for BuilderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderTable")
            .field("builders", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BuilderTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding the built-in constructors.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register("echo", build_echo);
        table.register("select", build_select);
        table.register("rename", build_rename);
        table.register("constant", build_constant);
        table.register("remote", build_remote);
        table
    }

    /// Registers `builder` under `name`, replacing any previous entry.
    ///
    /// Names may be dotted (`bm25.retrieve`) to mirror library namespaces.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn(&BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Arc::new(builder));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<BuilderFn>> {
        self.builders.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }
}

fn missing_columns(
    pipeline: &dyn Pipeline,
    frame: &Frame,
    required: &[String],
) -> Result<(), PipelineError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !frame.has_column(column))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingColumns {
            pipeline: pipeline.describe(),
            columns: missing,
        })
    }
}

struct Echo {
    columns: Option<Vec<String>>,
}

impl Pipeline for Echo {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        if let Some(columns) = &self.columns {
            missing_columns(self, &input, columns)?;
        }
        Ok(PipelineOutput::Frame(input))
    }

    fn input_columns(&self) -> Option<Vec<String>> {
        self.columns.clone()
    }

    fn output_columns(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        Ok(input.to_vec())
    }

    fn describe(&self) -> String {
        "echo()".to_string()
    }
}

fn build_echo(args: &BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> {
    args.expect_only("echo", &["columns"])?;
    Ok(Arc::new(Echo {
        columns: args.string_list("echo", "columns", 0)?,
    }))
}

struct Select {
    columns: Vec<String>,
}

impl Pipeline for Select {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        missing_columns(self, &input, &self.columns)?;
        input
            .select(&self.columns)
            .map(PipelineOutput::Frame)
            .map_err(|column| PipelineError::MissingColumns {
                pipeline: self.describe(),
                columns: vec![column],
            })
    }

    fn input_columns(&self) -> Option<Vec<String>> {
        Some(self.columns.clone())
    }

    fn output_columns(&self, _input: &[String]) -> Result<Vec<String>, PipelineError> {
        Ok(self.columns.clone())
    }

    fn describe(&self) -> String {
        format!("select({})", self.columns.join(", "))
    }
}

fn build_select(args: &BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> {
    args.expect_only("select", &["columns"])?;
    let columns = args
        .string_list("select", "columns", 0)?
        .ok_or(BuildError::MissingArgument {
            builder: "select",
            argument: "columns",
        })?;
    Ok(Arc::new(Select { columns }))
}

struct Rename {
    from: String,
    to: String,
}

impl Pipeline for Rename {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        input
            .rename(&self.from, &self.to)
            .map(PipelineOutput::Frame)
            .ok_or_else(|| PipelineError::MissingColumns {
                pipeline: self.describe(),
                columns: vec![self.from.clone()],
            })
    }

    fn input_columns(&self) -> Option<Vec<String>> {
        Some(vec![self.from.clone()])
    }

    fn output_columns(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        let mut columns: Vec<String> = input
            .iter()
            .filter(|column| **column != self.to)
            .cloned()
            .collect();
        match columns.iter_mut().find(|column| **column == self.from) {
            Some(column) => column.clone_from(&self.to),
            None => columns.push(self.to.clone()),
        }
        Ok(columns)
    }

    fn describe(&self) -> String {
        format!("rename({} -> {})", self.from, self.to)
    }
}

fn build_rename(args: &BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> {
    args.expect_only("rename", &["from", "to"])?;
    Ok(Arc::new(Rename {
        from: args.string("rename", "from", 0)?,
        to: args.string("rename", "to", 1)?,
    }))
}

struct Constant {
    column: String,
    value: JsonValue,
}

impl Pipeline for Constant {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        Ok(PipelineOutput::Frame(
            input.with_column(&self.column, &self.value),
        ))
    }

    fn input_columns(&self) -> Option<Vec<String>> {
        Some(Vec::new())
    }

    fn output_columns(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        let mut columns = input.to_vec();
        if !columns.contains(&self.column) {
            columns.push(self.column.clone());
        }
        Ok(columns)
    }

    fn describe(&self) -> String {
        format!("constant({} = {})", self.column, self.value)
    }
}

fn build_constant(args: &BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> {
    args.expect_only("constant", &["column", "value"])?;
    let value = args
        .get("value", 1)
        .cloned()
        .ok_or(BuildError::MissingArgument {
            builder: "constant",
            argument: "value",
        })?;
    Ok(Arc::new(Constant {
        column: args.string("constant", "column", 0)?,
        value,
    }))
}

/// Reply of a pipeline server's `/transform` endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteReply {
    Timed {
        #[serde(default)]
        took: Option<JsonValue>,
        results: JsonValue,
    },
    Failed {
        error: String,
    },
    Bare(JsonValue),
}

/// Pipeline served by another process over HTTP.
///
/// Rows are POSTed as a JSON array of records to `<url>/transform`. The
/// reply is either `{"took": .., "results": [..]}` or a bare JSON value.
struct Remote {
    endpoint: String,
    inputs: Option<Vec<String>>,
    outputs: Option<Vec<String>>,
    client: OnceLock<reqwest::blocking::Client>,
}

impl Remote {
    fn failure(&self, message: impl fmt::Display) -> PipelineError {
        PipelineError::Remote {
            url: self.endpoint.clone(),
            message: message.to_string(),
        }
    }
}

impl Pipeline for Remote {
    fn transform(&self, input: Frame) -> Result<PipelineOutput, PipelineError> {
        if let Some(inputs) = &self.inputs {
            missing_columns(self, &input, inputs)?;
        }
        let client = self.client.get_or_init(reqwest::blocking::Client::new);
        let records = input.into_records();

        debug!(endpoint = %self.endpoint, rows = records.len(), "Calling remote pipeline");
        let response = client
            .post(&self.endpoint)
            .json(&records)
            .send()
            .map_err(|e| self.failure(e))?;
        let status = response.status();
        let reply: RemoteReply = response.json().map_err(|e| self.failure(e))?;

        match reply {
            RemoteReply::Failed { error } => Err(self.failure(format!("{status}: {error}"))),
            _ if !status.is_success() => Err(self.failure(status)),
            RemoteReply::Timed { took, results } => {
                debug!(endpoint = %self.endpoint, took = ?took, "Remote pipeline replied");
                Ok(PipelineOutput::Value(results))
            }
            RemoteReply::Bare(value) => Ok(PipelineOutput::Value(value)),
        }
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
        format!("remote({})", self.endpoint)
    }
}

fn build_remote(args: &BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> {
    args.expect_only("remote", &["url", "inputs", "outputs"])?;
    let url = args.string("remote", "url", 0)?;
    Ok(Arc::new(Remote {
        endpoint: format!("{}/transform", url.trim_end_matches('/')),
        inputs: args.string_list("remote", "inputs", 1)?,
        outputs: args.string_list("remote", "outputs", 2)?,
        client: OnceLock::new(),
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    use super::*;

    fn named(pairs: &[(&str, JsonValue)]) -> BuilderArgs {
        BuilderArgs {
            positional: Vec::new(),
            named: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }

    fn build(name: &str, args: &BuilderArgs) -> Result<Arc<dyn Pipeline>, BuildError> {
        let table = BuilderTable::with_builtins();
        let builder = table.get(name).expect("builtin registered");
        builder(args)
    }

    fn frame_of(output: PipelineOutput) -> Frame {
        output.into_frame("test").expect("frame-shaped output")
    }

    #[test]
    fn test_builtins_are_registered() {
        let table = BuilderTable::with_builtins();
        let names: Vec<_> = table.names().collect();
        assert_eq!(names, ["constant", "echo", "remote", "rename", "select"]);
    }

    #[test]
    fn test_register_overrides_existing_builder() {
        let mut table = BuilderTable::with_builtins();
        table.register("echo", |_| Err(BuildError::Other("disabled".to_string())));
        let err = table.get("echo").unwrap()(&BuilderArgs::default()).unwrap_err();
        assert_eq!(err, BuildError::Other("disabled".to_string()));
    }

    #[test]
    fn test_echo_checks_declared_columns() {
        let echo = build("echo", &named(&[("columns", json!(["query"]))])).unwrap();
        assert_eq!(echo.input_columns(), Some(vec!["query".to_string()]));

        let frame = Frame::single_row([("query", json!("goldfish"))]);
        assert_eq!(frame_of(echo.transform(frame.clone()).unwrap()), frame);

        let err = echo.transform(Frame::single_row([("qid", json!("1"))])).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumns { columns, .. } if columns == ["query"]));
    }

    #[test]
    fn test_select_accepts_positional_columns() {
        let args = BuilderArgs {
            positional: vec![json!(["b"])],
            named: IndexMap::new(),
        };
        let select = build("select", &args).unwrap();
        let out = frame_of(
            select
                .transform(Frame::single_row([("a", json!(1)), ("b", json!(2))]))
                .unwrap(),
        );
        assert_eq!(out.columns(), ["b"]);
        assert_eq!(select.output_columns(&[]).unwrap(), ["b"]);
    }

    #[test]
    fn test_select_requires_columns() {
        assert_eq!(
            build("select", &BuilderArgs::default()).err(),
            Some(BuildError::MissingArgument {
                builder: "select",
                argument: "columns"
            })
        );
    }

    #[test]
    fn test_rename_updates_frame_and_declared_outputs() {
        let rename = build(
            "rename",
            &named(&[("from", json!("text")), ("to", json!("body"))]),
        )
        .unwrap();

        let out = frame_of(
            rename
                .transform(Frame::single_row([("docno", json!("d1")), ("text", json!("t"))]))
                .unwrap(),
        );
        assert_eq!(out.columns(), ["docno", "body"]);
        assert_eq!(
            rename
                .output_columns(&["docno".to_string(), "text".to_string()])
                .unwrap(),
            ["docno", "body"]
        );
    }

    #[test]
    fn test_composed_builtins_report_every_required_column() {
        let bindings = crate::expr::evaluate(
            "pipeline = rename(from = 'query', to = 'q') >> select(columns = ['q', 'docno'])",
            &BuilderTable::with_builtins(),
        )
        .unwrap();
        let pipeline = bindings.pipeline().unwrap();
        assert_eq!(
            pipeline.input_columns(),
            Some(vec!["query".to_string(), "docno".to_string()])
        );
    }

    #[test]
    fn test_constant_needs_no_inputs() {
        let constant = build(
            "constant",
            &named(&[("column", json!("score")), ("value", json!(1.5))]),
        )
        .unwrap();
        assert_eq!(constant.input_columns(), Some(Vec::new()));
        assert_eq!(
            constant.output_columns(&["query".to_string()]).unwrap(),
            ["query", "score"]
        );
    }

    #[test]
    fn test_unexpected_keyword_is_rejected() {
        let err = build("echo", &named(&[("colums", json!(["q"]))])).err();
        assert_eq!(
            err,
            Some(BuildError::UnexpectedArgument {
                builder: "echo",
                argument: "colums".to_string()
            })
        );
    }

    #[test]
    fn test_wrong_argument_kind_is_reported() {
        let err = build("rename", &named(&[("from", json!(1)), ("to", json!("x"))])).err();
        assert_eq!(
            err,
            Some(BuildError::InvalidArgument {
                builder: "rename",
                argument: "from",
                expected: "a string",
                found: "number"
            })
        );
    }

    #[tokio::test]
    async fn test_remote_posts_records_and_reads_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transform"))
            .and(body_json(json!([{"qid": "1", "query": "goldfish"}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 0,
                "results": [{"qid": "1", "docno": "d7", "score": 3.5}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = build(
            "remote",
            &named(&[
                ("url", json!(format!("{}/", server.uri()))),
                ("inputs", json!(["qid", "query"])),
                ("outputs", json!(["qid", "docno", "score"])),
            ]),
        )
        .unwrap();
        assert_eq!(
            remote.output_columns(&[]).unwrap(),
            ["qid", "docno", "score"]
        );

        let output = tokio::task::spawn_blocking(move || {
            remote.transform(Frame::single_row([
                ("qid", json!("1")),
                ("query", json!("goldfish")),
            ]))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(
            output,
            PipelineOutput::Value(json!([{"qid": "1", "docno": "d7", "score": 3.5}]))
        );
    }

    #[tokio::test]
    async fn test_remote_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transform"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "index missing"})),
            )
            .mount(&server)
            .await;

        let remote = build("remote", &named(&[("url", json!(server.uri()))])).unwrap();
        let err = tokio::task::spawn_blocking(move || {
            remote.transform(Frame::single_row([("query", json!("q"))]))
        })
        .await
        .unwrap()
        .unwrap_err();

        let PipelineError::Remote { message, .. } = err else {
            panic!("expected remote error, got {err:?}");
        };
        assert!(message.contains("index missing"), "message: {message}");
    }
}
