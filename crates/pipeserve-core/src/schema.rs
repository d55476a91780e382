//! Schema compilation for pipeline inputs and outputs.
//!
//! Catalog entries describe the fields a pipeline consumes or produces in one
//! of two shapes:
//!
//! - a mapping of field name to type (`{ query = "string", k = "int" }`)
//! - an ordered list of field descriptors
//!   (`[{ phrase = "query", type = "string" }, ...]`)
//!
//! Both shapes compile to the same [`CompiledSchema`]: an ordered table of
//! `(identifier, original name, type)` rows. Identifiers are sanitized so they
//! can be used as parameter names on the wire, while the original names are
//! kept for building the pipeline's tabular input.
//!
//! Every compiled field is required. Unknown type names never fail; they
//! resolve to [`TypeTag::String`].

use std::{collections::HashMap, fmt};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Errors produced while compiling a schema definition.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    /// The definition is neither a mapping nor a sequence.
    #[error("schema must be a mapping or a list of field descriptors, got {found}")]
    Shape {
        /// JSON kind of the rejected value.
        found: &'static str,
    },

    /// A list entry is not a field descriptor object.
    #[error("schema entry {index} must be a mapping, got {found}")]
    InvalidEntry {
        /// Position of the entry in the list.
        index: usize,
        /// JSON kind of the rejected entry.
        found: &'static str,
    },

    /// Two fields sanitize to the same identifier.
    #[error("fields '{first}' and '{second}' both map to parameter '{ident}'")]
    DuplicateField {
        /// The colliding identifier.
        ident: String,
        /// Original name of the field that claimed the identifier first.
        first: String,
        /// Original name of the field that collided.
        second: String,
    },
}

/// Primitive value kinds used for coercion and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    #[default]
    String,
    Int,
    Float,
    Bool,
    List,
    Dict,
}

impl TypeTag {
    /// Every tag, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::String,
        Self::Int,
        Self::Float,
        Self::Bool,
        Self::List,
        Self::Dict,
    ];

    /// Canonical lower-case name of the tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
        }
    }

    /// Resolves a textual type name, case-insensitively.
    ///
    /// Accepts the canonical tag names plus their common native spellings
    /// (`str`, `integer`, `number`, `boolean`, `array`, `object`, ...).
    /// Anything else resolves to [`TypeTag::String`].
    #[must_use]
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "i64" => Self::Int,
            "float" | "number" | "double" | "f64" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "list" | "array" => Self::List,
            "dict" | "object" | "map" => Self::Dict,
            _ => Self::String,
        }
    }

    /// Resolves the `type` declaration of a schema entry.
    ///
    /// Non-string declarations (numbers, nulls, nested objects without a
    /// `type` key) fall back to [`TypeTag::String`].
    #[must_use]
    pub fn from_declared(value: Option<&JsonValue>) -> Self {
        match value {
            Some(JsonValue::String(name)) => Self::resolve(name),
            Some(JsonValue::Object(map)) => Self::from_declared(map.get("type")),
            _ => Self::String,
        }
    }

    /// JSON Schema `type` keyword for this tag.
    #[must_use]
    pub fn json_schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::List => "array",
            Self::Dict => "object",
        }
    }

    /// Returns `true` if `value` already has this tag's runtime type.
    #[must_use]
    pub fn matches(self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64(),
            Self::Float => value.is_f64(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compiled field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Sanitized identifier, used as the parameter name.
    pub ident: String,
    /// Name as declared, used as the column name in the pipeline input.
    pub original: String,
    /// Resolved value kind.
    #[serde(rename = "type")]
    pub tag: TypeTag,
    /// Remaining descriptor keys (column metadata such as `description`).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, JsonValue>,
}

impl Field {
    /// Human-readable description taken from the column metadata.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.metadata.get("description").and_then(JsonValue::as_str)
    }
}

/// Ordered, validated field table produced by [`compile`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompiledSchema {
    fields: Vec<Field>,
}

impl CompiledSchema {
    /// Builds a schema from `(name, type)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] if two names sanitize to the
    /// same identifier.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, TypeTag)>,
        S: Into<String>,
    {
        let mut builder = SchemaBuilder::default();
        for (index, (name, tag)) in pairs.into_iter().enumerate() {
            builder.push(index, name.into(), tag, Map::new())?;
        }
        Ok(builder.finish())
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by its sanitized identifier.
    #[must_use]
    pub fn get(&self, ident: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.ident == ident)
    }

    /// Sanitized identifiers in declaration order.
    pub fn idents(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.ident.as_str())
    }

    /// Original column names in declaration order.
    pub fn original_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.original.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Identifier to type-name pairs, the discovery view of the schema.
    #[must_use]
    pub fn type_map(&self) -> IndexMap<String, TypeTag> {
        self.fields
            .iter()
            .map(|field| (field.ident.clone(), field.tag))
            .collect()
    }

    /// Renders the schema as a JSON Schema object with every field required.
    #[must_use]
    pub fn to_json_schema(&self) -> JsonValue {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = Map::new();
            property.insert(
                "type".to_string(),
                JsonValue::String(field.tag.json_schema_type().to_string()),
            );
            if field.original != field.ident {
                property.insert(
                    "title".to_string(),
                    JsonValue::String(field.original.clone()),
                );
            }
            if let Some(description) = field.description() {
                property.insert(
                    "description".to_string(),
                    JsonValue::String(description.to_string()),
                );
            }
            properties.insert(field.ident.clone(), JsonValue::Object(property));
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.idents().collect::<Vec<_>>(),
            "additionalProperties": false,
        })
    }
}

/// Compiles a schema definition into an ordered field table.
///
/// `definition` may be a mapping of field name to type, or a list of descriptor
/// objects. Descriptors name their field with `phrase`, `name` or `field`
/// (first non-empty wins), falling back to `field_<index>`. `null` list
/// entries are ignored.
///
/// Compilation is deterministic: the same definition always produces the
/// same table.
///
/// # Errors
///
/// - [`SchemaError::Shape`] if `definition` is neither a mapping nor a list
/// - [`SchemaError::InvalidEntry`] if a list entry is not an object
/// - [`SchemaError::DuplicateField`] if two fields sanitize to one identifier
pub fn compile(definition: &JsonValue) -> Result<CompiledSchema, SchemaError> {
    let mut builder = SchemaBuilder::default();

    match definition {
        JsonValue::Object(map) => {
            for (index, (name, declared)) in map.iter().enumerate() {
                let metadata = match declared {
                    JsonValue::Object(extra) => descriptor_metadata(extra),
                    _ => Map::new(),
                };
                builder.push(
                    index,
                    name.clone(),
                    TypeTag::from_declared(Some(declared)),
                    metadata,
                )?;
            }
        }
        JsonValue::Array(entries) => {
            let entries = entries.iter().filter(|entry| !entry.is_null());
            for (index, entry) in entries.enumerate() {
                let JsonValue::Object(descriptor) = entry else {
                    return Err(SchemaError::InvalidEntry {
                        index,
                        found: json_kind(entry),
                    });
                };
                let name = descriptor_name(descriptor).map_or_else(
                    || positional_name(index),
                    ToString::to_string,
                );
                builder.push(
                    index,
                    name,
                    TypeTag::from_declared(descriptor.get("type")),
                    descriptor_metadata(descriptor),
                )?;
            }
        }
        other => {
            return Err(SchemaError::Shape {
                found: json_kind(other),
            });
        }
    }

    Ok(builder.finish())
}

/// Converts an arbitrary display name into a parameter identifier.
///
/// Characters other than letters, digits and `_` become `_`; leading digits
/// and surrounding underscores are stripped. An empty result yields
/// `fallback`. The function is idempotent.
#[must_use]
pub fn sanitize_identifier(raw: &str, fallback: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let trimmed = replaced
        .trim_start_matches(|c: char| c == '_' || c.is_numeric())
        .trim_end_matches('_');

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Converts a pipeline name into a tool name.
///
/// Tool names keep letters, digits, `_`, `-` and `.`; every other character
/// becomes `_`. Surrounding separators are stripped and an empty result
/// becomes `pipeline`.
#[must_use]
pub fn sanitize_tool_name(raw: &str) -> String {
    let replaced: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| matches!(c, '_' | '-' | '.'));
    if trimmed.is_empty() {
        "pipeline".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Positional fallback name for the field at `index`.
fn positional_name(index: usize) -> String {
    format!("field_{index}")
}

fn descriptor_name(descriptor: &Map<String, JsonValue>) -> Option<&str> {
    ["phrase", "name", "field"]
        .iter()
        .filter_map(|key| descriptor.get(*key).and_then(JsonValue::as_str))
        .find(|name| !name.is_empty())
}

fn descriptor_metadata(descriptor: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    descriptor
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "phrase" | "name" | "field" | "type"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "mapping",
    }
}

#[derive(Default)]
struct SchemaBuilder {
    fields: Vec<Field>,
    seen: HashMap<String, usize>,
}

impl SchemaBuilder {
    fn push(
        &mut self,
        index: usize,
        original: String,
        tag: TypeTag,
        metadata: Map<String, JsonValue>,
    ) -> Result<(), SchemaError> {
        let ident = sanitize_identifier(&original, &positional_name(index));
        if let Some(&existing) = self.seen.get(&ident) {
            return Err(SchemaError::DuplicateField {
                ident,
                first: self.fields[existing].original.clone(),
                second: original,
            });
        }
        self.seen.insert(ident.clone(), self.fields.len());
        self.fields.push(Field {
            ident,
            original,
            tag,
            metadata,
        });
        Ok(())
    }

    fn finish(self) -> CompiledSchema {
        CompiledSchema {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_compile_mapping_preserves_declaration_order() {
        let schema = compile(&json!({"query": "string", "k": "int", "alpha": "float"}))
            .expect("mapping should compile");

        let rows: Vec<_> = schema
            .fields()
            .iter()
            .map(|f| (f.ident.as_str(), f.tag))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("query", TypeTag::String),
                ("k", TypeTag::Int),
                ("alpha", TypeTag::Float)
            ]
        );
    }

    #[test]
    fn test_compile_list_uses_phrase_then_name_then_field() {
        let schema = compile(&json!([
            {"phrase": "query", "name": "ignored", "type": "string"},
            {"name": "qid"},
            {"field": "docno", "type": "STRING"},
            {"type": "int"}
        ]))
        .expect("list should compile");

        let idents: Vec<_> = schema.idents().collect();
        assert_eq!(idents, vec!["query", "qid", "docno", "field_3"]);
        assert_eq!(schema.fields()[3].tag, TypeTag::Int);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let definition = json!([{"phrase": "my query!", "type": "bool"}, {"phrase": "2nd"}]);
        let first = compile(&definition).unwrap();
        for _ in 0..10 {
            assert_eq!(compile(&definition).unwrap(), first);
        }
    }

    #[test]
    fn test_compile_rejects_scalar_shapes() {
        assert_eq!(
            compile(&json!("query")),
            Err(SchemaError::Shape { found: "string" })
        );
        assert_eq!(
            compile(&json!(42)),
            Err(SchemaError::Shape { found: "number" })
        );
    }

    #[test]
    fn test_compile_rejects_non_mapping_list_entries() {
        let err = compile(&json!([{"phrase": "query"}, "qid"])).unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidEntry {
                index: 1,
                found: "string"
            }
        );
    }

    #[test]
    fn test_compile_skips_null_entries() {
        let schema = compile(&json!([null, {"phrase": "query"}])).unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.fields()[0].ident, "query");
    }

    #[test]
    fn test_compile_fails_fast_on_sanitized_collision() {
        let err = compile(&json!({"doc-no": "string", "doc no": "string"})).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                ident: "doc_no".to_string(),
                first: "doc-no".to_string(),
                second: "doc no".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_type_names_downgrade_to_string() {
        let schema = compile(&json!({"a": "tensor", "b": 7, "c": null})).unwrap();
        assert!(schema.fields().iter().all(|f| f.tag == TypeTag::String));
    }

    #[test]
    fn test_type_resolution_is_case_insensitive() {
        assert_eq!(TypeTag::resolve("INT"), TypeTag::Int);
        assert_eq!(TypeTag::resolve("Float"), TypeTag::Float);
        assert_eq!(TypeTag::resolve(" bool "), TypeTag::Bool);
        assert_eq!(TypeTag::resolve("List"), TypeTag::List);
        assert_eq!(TypeTag::resolve("DICT"), TypeTag::Dict);
        assert_eq!(TypeTag::resolve("str"), TypeTag::String);
    }

    #[test]
    fn test_metadata_keeps_descriptor_extras() {
        let schema = compile(&json!([
            {"phrase": "qid", "type": "string", "description": "query id", "min_length": 1}
        ]))
        .unwrap();
        let field = &schema.fields()[0];
        assert_eq!(field.description(), Some("query id"));
        assert_eq!(field.metadata.len(), 2);
        assert!(!field.metadata.contains_key("phrase"));
    }

    #[test]
    fn test_sanitize_identifier_cases() {
        assert_eq!(sanitize_identifier("query", "field"), "query");
        assert_eq!(sanitize_identifier("my query", "field"), "my_query");
        assert_eq!(sanitize_identifier("_private_", "field"), "private");
        assert_eq!(sanitize_identifier("123abc", "field"), "abc");
        assert_eq!(sanitize_identifier("1_x", "field"), "x");
        assert_eq!(sanitize_identifier("!!!", "field_2"), "field_2");
        assert_eq!(sanitize_identifier("", "field_0"), "field_0");
    }

    #[test]
    fn test_sanitize_identifier_is_idempotent() {
        for raw in ["my query", "__x__", "9lives", "a-b.c", "", "ünï cödé", "x__y"] {
            let once = sanitize_identifier(raw, "field_0");
            assert_eq!(sanitize_identifier(&once, "field_0"), once, "input {raw:?}");
        }
    }

    #[test]
    fn test_sanitize_tool_name_keeps_dashes_and_dots() {
        assert_eq!(sanitize_tool_name("MSMARCO-search"), "MSMARCO-search");
        assert_eq!(sanitize_tool_name("rag wiki/qa"), "rag_wiki_qa");
        assert_eq!(sanitize_tool_name("  "), "pipeline");
    }

    #[test]
    fn test_json_schema_marks_every_field_required() {
        let schema = compile(&json!([
            {"phrase": "query", "type": "string"},
            {"phrase": "top k", "type": "int", "description": "cutoff"}
        ]))
        .unwrap();

        let rendered = schema.to_json_schema();
        assert_eq!(rendered["required"], json!(["query", "top_k"]));
        assert_eq!(rendered["properties"]["top_k"]["type"], "integer");
        assert_eq!(rendered["properties"]["top_k"]["title"], "top k");
        assert_eq!(rendered["properties"]["top_k"]["description"], "cutoff");
        assert_eq!(rendered["additionalProperties"], false);
    }

    #[test]
    fn test_from_pairs_matches_compiled_mapping() {
        let from_pairs =
            CompiledSchema::from_pairs([("query", TypeTag::String), ("k", TypeTag::Int)]).unwrap();
        let compiled = compile(&json!({"query": "string", "k": "int"})).unwrap();
        assert_eq!(from_pairs, compiled);
    }

    #[test]
    fn test_type_matches_runtime_values() {
        assert!(TypeTag::Int.matches(&json!(5)));
        assert!(!TypeTag::Int.matches(&json!(5.5)));
        assert!(TypeTag::Int.matches(&json!(i64::MAX)));
        assert!(!TypeTag::Int.matches(&json!(u64::MAX)));
        assert!(TypeTag::Float.matches(&json!(5.5)));
        assert!(!TypeTag::Float.matches(&json!(5)));
        assert!(TypeTag::List.matches(&json!([])));
        assert!(TypeTag::Dict.matches(&json!({})));
    }
}
