//! Tool synthesis: wrapping a pipeline in a schema-validated callable.
//!
//! An [`Adapter`] is the uniform invocation path for every tool. It takes
//! arguments keyed by sanitized field name and:
//!
//! 1. coerces each supplied argument to its field's [`TypeTag`]
//! 2. validates the argument set as a whole (unknown and missing fields)
//! 3. builds a one-row [`Frame`] whose columns are the *original* field names
//! 4. invokes the pipeline exactly once
//! 5. normalizes the result to a list of records
//!
//! Adapters hold no mutable state, so one adapter may serve any number of
//! concurrent calls as long as the wrapped pipeline tolerates it.

use std::{fmt, sync::Arc};

use serde::Serialize;
use serde_json::{Number, Value as JsonValue};
use tracing::{debug, instrument};

use crate::{
    frame::{Frame, Record},
    pipeline::{Pipeline, PipelineError, PipelineOutput},
    schema::{CompiledSchema, Field, TypeTag, json_kind},
};

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiagnostic {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors raised by a tool invocation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvocationError {
    /// An argument could not be converted to its field's type.
    #[error("cannot cast '{field}'={value} to {expected}")]
    Coercion {
        field: String,
        /// The supplied value, as JSON text.
        value: String,
        expected: TypeTag,
    },

    /// The argument set does not satisfy the schema.
    #[error("invalid arguments: {}", join_diagnostics(.0))]
    Validation(Vec<FieldDiagnostic>),

    /// The pipeline returned something that is not a table or records.
    #[error("pipeline returned unsupported output shape: {found}")]
    UnsupportedOutputShape { found: &'static str },

    /// The pipeline itself failed.
    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
}

impl InvocationError {
    /// Returns `true` for errors caused by the caller's arguments.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Coercion { .. } | Self::Validation(_))
    }
}

fn join_diagnostics(diagnostics: &[FieldDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Schema-validated callable wrapping one pipeline.
#[derive(Clone)]
pub struct Adapter {
    pipeline: Arc<dyn Pipeline>,
    schema: Arc<CompiledSchema>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("pipeline", &self.pipeline.describe())
            .field("parameters", &self.parameters().collect::<Vec<_>>())
            .finish()
    }
}

/// Wraps `pipeline` in an adapter whose parameters are the fields of
/// `schema`, in schema order.
#[must_use]
pub fn synthesize(pipeline: Arc<dyn Pipeline>, schema: CompiledSchema) -> Adapter {
    Adapter {
        pipeline,
        schema: Arc::new(schema),
    }
}

impl Adapter {
    /// Formal parameter names, in schema order.
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.schema.idents()
    }

    #[must_use]
    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<dyn Pipeline> {
        &self.pipeline
    }

    /// Invokes the pipeline with arguments keyed by parameter name.
    ///
    /// # Errors
    ///
    /// - [`InvocationError::Coercion`] if an argument cannot be cast
    /// - [`InvocationError::Validation`] for unknown or missing arguments
    /// - [`InvocationError::Pipeline`] if the pipeline fails
    /// - [`InvocationError::UnsupportedOutputShape`] for unusable results
    #[instrument(skip_all, fields(pipeline = %self.pipeline.describe()))]
    pub fn call(&self, mut args: Record) -> Result<Vec<Record>, InvocationError> {
        for field in self.schema.fields() {
            if let Some(value) = args.get_mut(&field.ident) {
                *value = coerce(field, value)?;
            }
        }
        self.validate(&args)?;

        let row = self.schema.fields().iter().map(|field| {
            let value = args.remove(&field.ident).unwrap_or(JsonValue::Null);
            (field.original.clone(), value)
        });
        let input = Frame::single_row(row);

        debug!(columns = ?input.columns(), "Invoking pipeline");
        let output = self.pipeline.transform(input)?;
        normalize_output(output)
    }

    /// Invokes the pipeline with arguments given in parameter order.
    ///
    /// # Errors
    ///
    /// Same as [`Adapter::call`]; extra positional values are a validation
    /// error.
    pub fn call_positional(&self, values: Vec<JsonValue>) -> Result<Vec<Record>, InvocationError> {
        let args = self.bind_positional(values)?;
        self.call(args)
    }

    /// Maps positional values onto parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Validation`] if more values than parameters
    /// are supplied.
    pub fn bind_positional(&self, values: Vec<JsonValue>) -> Result<Record, InvocationError> {
        let arity = self.schema.len();
        if values.len() > arity {
            return Err(InvocationError::Validation(vec![FieldDiagnostic {
                field: "*".to_string(),
                message: format!("takes {arity} arguments but {} were given", values.len()),
            }]));
        }
        Ok(self
            .parameters()
            .map(ToString::to_string)
            .zip(values)
            .collect())
    }

    fn validate(&self, args: &Record) -> Result<(), InvocationError> {
        let mut diagnostics = Vec::new();

        for key in args.keys() {
            if self.schema.get(key).is_none() {
                diagnostics.push(FieldDiagnostic {
                    field: key.clone(),
                    message: "unexpected argument".to_string(),
                });
            }
        }
        for field in self.schema.fields() {
            match args.get(&field.ident) {
                None => diagnostics.push(FieldDiagnostic {
                    field: field.ident.clone(),
                    message: "missing required argument".to_string(),
                }),
                Some(value) if !field.tag.matches(value) => diagnostics.push(FieldDiagnostic {
                    field: field.ident.clone(),
                    message: format!("expected {}, got {}", field.tag, json_kind(value)),
                }),
                Some(_) => {}
            }
        }

        if diagnostics.is_empty() {
            Ok(())
        } else {
            Err(InvocationError::Validation(diagnostics))
        }
    }
}

/// Casts `value` to `field`'s type, passing matching values through.
///
/// # Errors
///
/// Returns [`InvocationError::Coercion`] naming the field, the value and the
/// expected type when no cast applies.
pub fn coerce(field: &Field, value: &JsonValue) -> Result<JsonValue, InvocationError> {
    if field.tag.matches(value) {
        return Ok(value.clone());
    }
    cast(field.tag, value).ok_or_else(|| InvocationError::Coercion {
        field: field.ident.clone(),
        value: value.to_string(),
        expected: field.tag,
    })
}

fn cast(tag: TypeTag, value: &JsonValue) -> Option<JsonValue> {
    if value.is_null() {
        return None;
    }
    match (tag, value) {
        (TypeTag::String, JsonValue::String(_)) => Some(value.clone()),
        (TypeTag::String, JsonValue::Number(n)) => Some(JsonValue::String(n.to_string())),
        (TypeTag::String, JsonValue::Bool(b)) => Some(JsonValue::String(b.to_string())),
        (TypeTag::String, _) => Some(JsonValue::String(value.to_string())),

        (TypeTag::Int, JsonValue::Number(n)) => n.as_f64().and_then(float_to_int),
        (TypeTag::Int, JsonValue::String(s)) => {
            s.trim().parse::<i64>().ok().map(JsonValue::from)
        }
        (TypeTag::Int, JsonValue::Bool(b)) => Some(JsonValue::from(i64::from(*b))),

        (TypeTag::Float, JsonValue::Number(n)) => n.as_f64().and_then(finite_float),
        (TypeTag::Float, JsonValue::String(s)) => {
            s.trim().parse::<f64>().ok().and_then(finite_float)
        }
        (TypeTag::Float, JsonValue::Bool(b)) => finite_float(f64::from(u8::from(*b))),

        (TypeTag::Bool, JsonValue::Number(n)) => n.as_f64().map(|f| JsonValue::Bool(f != 0.0)),
        (TypeTag::Bool, JsonValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Some(JsonValue::Bool(true)),
            "false" | "0" | "no" | "n" | "off" => Some(JsonValue::Bool(false)),
            _ => None,
        },

        (TypeTag::List, JsonValue::String(s)) => serde_json::from_str::<JsonValue>(s)
            .ok()
            .filter(JsonValue::is_array),
        (TypeTag::Dict, JsonValue::String(s)) => serde_json::from_str::<JsonValue>(s)
            .ok()
            .filter(JsonValue::is_object),

        _ => None,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "range is checked before the cast"
)]
fn float_to_int(f: f64) -> Option<JsonValue> {
    const LIMIT: f64 = 9_223_372_036_854_775_807.0;
    let truncated = f.trunc();
    if truncated.is_finite() && truncated.abs() < LIMIT {
        Some(JsonValue::from(truncated as i64))
    } else {
        None
    }
}

fn finite_float(f: f64) -> Option<JsonValue> {
    Number::from_f64(f).map(JsonValue::Number)
}

/// Normalizes a pipeline result to a list of records.
///
/// Tables become one record per row, a single mapping becomes a one-element
/// list, and a list of mappings passes through.
///
/// # Errors
///
/// Returns [`InvocationError::UnsupportedOutputShape`] for scalars and for
/// lists containing non-mappings.
pub fn normalize_output(output: PipelineOutput) -> Result<Vec<Record>, InvocationError> {
    match output {
        PipelineOutput::Frame(frame) => Ok(frame.into_records()),
        PipelineOutput::Record(record) => Ok(vec![record]),
        PipelineOutput::Records(records) => Ok(records),
        PipelineOutput::Value(JsonValue::Object(record)) => Ok(vec![record]),
        PipelineOutput::Value(JsonValue::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(record) => Ok(record),
                other => Err(InvocationError::UnsupportedOutputShape {
                    found: list_kind(&other),
                }),
            })
            .collect(),
        PipelineOutput::Value(other) => Err(InvocationError::UnsupportedOutputShape {
            found: json_kind(&other),
        }),
    }
}

fn list_kind(item: &JsonValue) -> &'static str {
    match item {
        JsonValue::Null => "list containing null",
        JsonValue::Bool(_) => "list containing bool",
        JsonValue::Number(_) => "list containing number",
        JsonValue::String(_) => "list containing string",
        JsonValue::Array(_) => "list containing list",
        JsonValue::Object(_) => "list",
    }
}
