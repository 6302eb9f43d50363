//! Declarative input shapes for tools and the validator that interprets them.

use serde_json::{json, Map, Value as J};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Number,
    /// Number with no fractional part.
    Integer,
    String,
    Boolean,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    Array(Box<Schema>),
    Object { fields: Vec<Field> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self { name: name.into(), schema, required: true }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self { name: name.into(), schema, required: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input at `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl Schema {
    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema::Object { fields: fields.into_iter().collect() }
    }

    /// JSON Schema rendering advertised as `inputSchema` by `tools/list`.
    pub fn to_json_schema(&self) -> J {
        match self {
            Schema::Number => json!({ "type": "number" }),
            Schema::Integer => json!({ "type": "integer" }),
            Schema::String => json!({ "type": "string" }),
            Schema::Boolean => json!({ "type": "boolean" }),
            Schema::Enum(values) => json!({ "type": "string", "enum": values }),
            Schema::Array(items) => json!({ "type": "array", "items": items.to_json_schema() }),
            Schema::Object { fields } => {
                let mut props = Map::new();
                for f in fields {
                    props.insert(f.name.clone(), f.schema.to_json_schema());
                }
                let required: Vec<&str> =
                    fields.iter().filter(|f| f.required).map(|f| f.name.as_str()).collect();
                json!({
                    "type": "object",
                    "properties": props,
                    "required": required,
                    "additionalProperties": false
                })
            }
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Schema::Number => "number",
            Schema::Integer => "integer",
            Schema::String | Schema::Enum(_) => "string",
            Schema::Boolean => "boolean",
            Schema::Array(_) => "array",
            Schema::Object { .. } => "object",
        }
    }
}

/// Check `raw` against `schema`, returning the narrowed value.
///
/// Pure: never coerces across types (`"4"` is not a number) and drops object
/// members the schema does not declare. An absent/`null` top-level input is
/// read as `{}` for object schemas so tools without required fields can be
/// called with no params.
pub fn validate(schema: &Schema, raw: &J) -> Result<J, ValidationError> {
    match (schema, raw) {
        (Schema::Object { .. }, J::Null) => check(schema, &J::Object(Map::new()), "$"),
        _ => check(schema, raw, "$"),
    }
}

fn check(schema: &Schema, raw: &J, path: &str) -> Result<J, ValidationError> {
    let mismatch = || ValidationError {
        field: path.to_string(),
        reason: format!("expected {}, got {}", schema.type_name(), describe(raw)),
    };

    match schema {
        Schema::Number => raw.as_f64().map(|_| raw.clone()).ok_or_else(mismatch),
        Schema::Integer => match raw {
            J::Number(n) if n.is_i64() || n.is_u64() => Ok(raw.clone()),
            J::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(raw.clone()),
                _ => Err(ValidationError {
                    field: path.to_string(),
                    reason: format!("expected integer, got {n}"),
                }),
            },
            _ => Err(mismatch()),
        },
        Schema::String => raw.as_str().map(|_| raw.clone()).ok_or_else(mismatch),
        Schema::Boolean => raw.as_bool().map(|_| raw.clone()).ok_or_else(mismatch),
        Schema::Enum(allowed) => {
            let s = raw.as_str().ok_or_else(mismatch)?;
            if allowed.iter().any(|a| a == s) {
                Ok(raw.clone())
            } else {
                Err(ValidationError {
                    field: path.to_string(),
                    reason: format!("`{s}` is not one of [{}]", allowed.join(", ")),
                })
            }
        }
        Schema::Array(items) => {
            let arr = raw.as_array().ok_or_else(mismatch)?;
            arr.iter()
                .enumerate()
                .map(|(i, v)| check(items, v, &format!("{}[{i}]", display_path(path))))
                .collect::<Result<Vec<_>, _>>()
                .map(J::Array)
        }
        Schema::Object { fields } => {
            let obj = raw.as_object().ok_or_else(mismatch)?;
            let mut out = Map::new();
            for f in fields {
                let child = child_path(path, &f.name);
                match obj.get(&f.name) {
                    Some(v) => {
                        out.insert(f.name.clone(), check(&f.schema, v, &child)?);
                    }
                    None if f.required => {
                        return Err(ValidationError {
                            field: child,
                            reason: "required field is missing".into(),
                        });
                    }
                    None => {}
                }
            }
            Ok(J::Object(out))
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "$" {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn display_path(path: &str) -> &str {
    if path == "$" { "" } else { path }
}

fn describe(v: &J) -> &'static str {
    match v {
        J::Null => "null",
        J::Bool(_) => "boolean",
        J::Number(_) => "number",
        J::String(_) => "string",
        J::Array(_) => "array",
        J::Object(_) => "object",
    }
}
