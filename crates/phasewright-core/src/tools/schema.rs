//! Input schemas and argument validation.
//!
//! A [`ToolSchema`] is the object subset of JSON Schema that model backends
//! understand: named properties with a primitive type, plus a `required`
//! list. Validation turns a raw JSON value into [`ValidatedArgs`], the only
//! shape handlers ever see.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON type of a single schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl PropertyType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }

    /// Whether `value` satisfies this type. Integers satisfy `number`.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Null => value.is_null(),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PropertySchema {
    kind: PropertyType,
    description: Option<String>,
}

/// Object-shaped input schema for a tool.
///
/// Serializes to and from standard JSON Schema so it can be handed to any
/// provider unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ToolSchema {
    properties: BTreeMap<String, PropertySchema>,
    required: Vec<String>,
}

/// Why a payload failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    NotAnObject { actual: &'static str },
    MissingField { field: String },
    TypeMismatch {
        field: String,
        expected: PropertyType,
        actual: &'static str,
    },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::NotAnObject { actual } => {
                write!(f, "arguments must be an object, got {actual}")
            }
            SchemaViolation::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            SchemaViolation::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "field '{field}' must be {expected}, got {actual}"),
        }
    }
}

impl ToolSchema {
    /// An object schema with no properties.
    pub fn object() -> Self {
        Self::default()
    }

    /// Add a required property (builder pattern).
    pub fn required(mut self, name: &str, kind: PropertyType, description: &str) -> Self {
        self.insert(name, kind, description);
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add an optional property (builder pattern).
    pub fn optional(mut self, name: &str, kind: PropertyType, description: &str) -> Self {
        self.insert(name, kind, description);
        self
    }

    fn insert(&mut self, name: &str, kind: PropertyType, description: &str) {
        let description = (!description.is_empty()).then(|| description.to_string());
        self.properties
            .insert(name.to_string(), PropertySchema { kind, description });
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    pub fn property_type(&self, name: &str) -> Option<PropertyType> {
        self.properties.get(name).map(|p| p.kind)
    }

    /// Parse a JSON Schema object.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "schema must be a JSON object".to_string())?;

        if let Some(t) = obj.get("type") {
            if t.as_str() != Some("object") {
                return Err(format!("schema type must be \"object\", got {t}"));
            }
        }

        let mut schema = ToolSchema::object();
        if let Some(props) = obj.get("properties") {
            let props = props
                .as_object()
                .ok_or_else(|| "\"properties\" must be an object".to_string())?;
            for (name, prop) in props {
                let type_name = prop
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("property '{name}' has no string \"type\""))?;
                let kind = PropertyType::parse(type_name).ok_or_else(|| {
                    format!("property '{name}' has unsupported type '{type_name}'")
                })?;
                let description = prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                schema.insert(name, kind, description);
            }
        }

        if let Some(required) = obj.get("required") {
            let required = required
                .as_array()
                .ok_or_else(|| "\"required\" must be an array".to_string())?;
            for field in required {
                let field = field
                    .as_str()
                    .ok_or_else(|| "\"required\" entries must be strings".to_string())?;
                if !schema.properties.contains_key(field) {
                    return Err(format!("required field '{field}' is not a declared property"));
                }
                if !schema.required.iter().any(|r| r == field) {
                    schema.required.push(field.to_string());
                }
            }
        }

        Ok(schema)
    }

    /// Render as JSON Schema.
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, prop)| {
                let mut entry = json!({ "type": prop.kind.as_str() });
                if let Some(desc) = &prop.description {
                    entry["description"] = Value::String(desc.clone());
                }
                (name.clone(), entry)
            })
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    /// Check `payload` against this schema.
    ///
    /// Undeclared extra fields are passed through untouched.
    pub fn validate(&self, payload: &Value) -> Result<Map<String, Value>, SchemaViolation> {
        let obj = match payload {
            Value::Object(map) => map.clone(),
            // Backends occasionally send `null` for a tool with no inputs.
            Value::Null if self.required.is_empty() => Map::new(),
            other => {
                return Err(SchemaViolation::NotAnObject {
                    actual: json_type_name(other),
                })
            }
        };

        for field in &self.required {
            if !obj.contains_key(field) {
                return Err(SchemaViolation::MissingField {
                    field: field.clone(),
                });
            }
        }

        for (name, value) in &obj {
            if let Some(prop) = self.properties.get(name) {
                if !prop.kind.accepts(value) {
                    return Err(SchemaViolation::TypeMismatch {
                        field: name.clone(),
                        expected: prop.kind,
                        actual: json_type_name(value),
                    });
                }
            }
        }

        Ok(obj)
    }
}

impl TryFrom<Value> for ToolSchema {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ToolSchema::from_json(&value)
    }
}

impl From<ToolSchema> for Value {
    fn from(schema: ToolSchema) -> Self {
        schema.to_json()
    }
}

/// Arguments that passed schema validation for a specific tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArgs {
    tool_name: String,
    values: Map<String, Value>,
}

impl ValidatedArgs {
    pub(crate) fn new(tool_name: &str, values: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            values,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn str(&self, key: &str) -> anyhow::Result<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("argument '{key}' is not a string"))
    }

    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn i64(&self, key: &str) -> anyhow::Result<i64> {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("argument '{key}' is not an integer"))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn array(&self, key: &str) -> anyhow::Result<&Vec<Value>> {
        self.values
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("argument '{key}' is not an array"))
    }

    /// Deserialize into the tool's own typed argument record.
    pub fn deserialize<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .with_context(|| format!("arguments do not fit tool '{}'", self.tool_name))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}
