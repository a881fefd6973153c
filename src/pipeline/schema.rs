//! Field-typed structured-output contracts.
//!
//! An [`OutputSchema`] lists the fields a reply must carry and their JSON
//! kind. It is sent to the provider (as a JSON Schema) and then used to
//! validate whatever comes back before any typed record is built, so a
//! reply missing a field is rejected as a whole instead of producing a
//! partially populated record.

use crate::error::PassportError;
use crate::pipeline::postprocess::extract_json_object;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// JSON kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Boolean,
    Number,
    Integer,
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Number => value.is_number(),
            // Models sometimes write `120.0` for an integer field.
            FieldKind::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
        }
    }
}

/// One required field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
        }
    }
}

/// A named set of required fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    /// The schema as a JSON Schema object (all fields required, no extras).
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.to_string(),
                    json!({ "type": f.kind.json_type(), "description": f.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|f| f.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Check that `value` is an object carrying every field with its kind.
    pub fn validate(&self, value: &Value) -> Result<(), PassportError> {
        let obj = value
            .as_object()
            .ok_or_else(|| self.mismatch(format!("expected a JSON object, got {value}")))?;

        let mut missing = Vec::new();
        for field in &self.fields {
            match obj.get(field.name) {
                None | Some(Value::Null) => missing.push(field.name),
                Some(v) if !field.kind.accepts(v) => {
                    return Err(self.mismatch(format!(
                        "field '{}' should be a {}, got {v}",
                        field.name,
                        field.kind.json_type()
                    )));
                }
                Some(_) => {}
            }
        }
        if !missing.is_empty() {
            return Err(self.mismatch(format!("missing field(s): {}", missing.join(", "))));
        }
        Ok(())
    }

    /// Extract, parse and validate a raw provider reply.
    pub fn parse_reply(&self, reply: &str) -> Result<Value, PassportError> {
        let json_text = extract_json_object(reply)
            .ok_or_else(|| self.mismatch(format!("no JSON object in reply: {}", preview(reply))))?;
        let mut value: Value = serde_json::from_str(json_text)
            .map_err(|e| self.mismatch(format!("invalid JSON: {e}")))?;
        self.validate(&value)?;
        self.normalize_integers(&mut value);
        Ok(value)
    }

    /// Rewrite `120.0` as `120` in integer fields so typed decoding succeeds.
    fn normalize_integers(&self, value: &mut Value) {
        let Some(obj) = value.as_object_mut() else {
            return;
        };
        for field in self.fields.iter().filter(|f| f.kind == FieldKind::Integer) {
            if let Some(v) = obj.get_mut(field.name) {
                if v.is_f64() {
                    if let Some(f) = v.as_f64() {
                        *v = Value::from(f as i64);
                    }
                }
            }
        }
    }

    /// Deserialize an already validated value into `T`.
    pub fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, PassportError> {
        serde_json::from_value(value).map_err(|e| self.mismatch(e.to_string()))
    }

    fn mismatch(&self, detail: String) -> PassportError {
        PassportError::SchemaValidation {
            schema: self.name.to_string(),
            detail,
        }
    }
}

/// A typed record that can be requested as structured output.
pub trait StructuredOutput: DeserializeOwned {
    fn schema() -> OutputSchema;
}

fn preview(s: &str) -> String {
    const MAX: usize = 80;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> OutputSchema {
        OutputSchema::new(
            "probe",
            vec![
                FieldSpec::new("name", FieldKind::String, "a name"),
                FieldSpec::new("ok", FieldKind::Boolean, "a flag"),
                FieldSpec::new("score", FieldKind::Number, "a score"),
                FieldSpec::new("px", FieldKind::Integer, "a pixel"),
            ],
        )
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let s = schema().to_json_schema();
        assert_eq!(s["required"], json!(["name", "ok", "score", "px"]));
        assert_eq!(s["properties"]["ok"]["type"], "boolean");
        assert_eq!(s["additionalProperties"], false);
    }

    #[test]
    fn accepts_complete_reply() {
        let v = schema()
            .parse_reply(r#"{"name":"A","ok":true,"score":0.5,"px":12}"#)
            .unwrap();
        assert_eq!(v["px"], 12);
    }

    #[test]
    fn accepts_fenced_reply() {
        let reply = "```json\n{\"name\":\"A\",\"ok\":false,\"score\":1,\"px\":3.0}\n```";
        let v = schema().parse_reply(reply).unwrap();
        assert_eq!(v["px"], json!(3));
        assert!(v["px"].is_i64());
    }

    #[test]
    fn rejects_missing_and_null_fields() {
        let err = schema()
            .parse_reply(r#"{"name":"A","ok":true,"score":null}"#)
            .unwrap_err();
        match err {
            PassportError::SchemaValidation { schema, detail } => {
                assert_eq!(schema, "probe");
                assert!(detail.contains("score"), "{detail}");
                assert!(detail.contains("px"), "{detail}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_kind() {
        let err = schema()
            .parse_reply(r#"{"name":"A","ok":"yes","score":1,"px":1}"#)
            .unwrap_err();
        assert!(matches!(err, PassportError::SchemaValidation { .. }));
        let err = schema()
            .parse_reply(r#"{"name":"A","ok":true,"score":1,"px":1.5}"#)
            .unwrap_err();
        assert!(matches!(err, PassportError::SchemaValidation { .. }));
    }

    #[test]
    fn rejects_non_json() {
        let err = schema().parse_reply("I cannot help with that.").unwrap_err();
        assert!(matches!(err, PassportError::SchemaValidation { .. }));
    }
}
