//! Tool parameter schemas and argument validation.
//!
//! Plugins declare parameters in one of two shapes: a compact list of
//! parameter specs, or a full JSON-Schema object. The registry keeps the
//! shape as a tagged variant and validation dispatches on it. Arguments that
//! fail validation never reach a handler.

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// One parameter in the compact list form.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub param_type: Option<String>,
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default, rename = "minLength")]
    pub min_length: Option<usize>,
    #[serde(default, rename = "maxLength")]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ParamSpec {
    pub fn required(name: &str, description: &str, param_type: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
            param_type: Some(param_type.to_string()),
            enum_values: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    pub fn optional(name: &str, description: &str, param_type: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, description, param_type)
        }
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| json!(v)).collect());
        self
    }
}

/// Parameter declaration for a tool, in either accepted shape.
#[derive(Debug, Clone)]
pub enum ParameterSchema {
    Compact(Vec<ParamSpec>),
    JsonSchema(Value),
}

impl ParameterSchema {
    pub fn empty() -> Self {
        ParameterSchema::Compact(Vec::new())
    }

    /// Interpret a rendezvous-file `parameters` value: an array is the
    /// compact list, an object is JSON-Schema, anything else means no
    /// declared parameters. Malformed compact entries are skipped.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(entries)) => {
                let specs = entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect();
                ParameterSchema::Compact(specs)
            }
            Some(Value::Object(_)) => ParameterSchema::JsonSchema(value.unwrap().clone()),
            _ => ParameterSchema::empty(),
        }
    }

    /// Render as a JSON-Schema object for `tools/list`.
    pub fn to_input_schema(&self) -> Value {
        match self {
            ParameterSchema::JsonSchema(schema) => schema.clone(),
            ParameterSchema::Compact(specs) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for spec in specs {
                    let mut prop = Map::new();
                    prop.insert(
                        "type".to_string(),
                        json!(spec.param_type.as_deref().unwrap_or("string")),
                    );
                    if !spec.description.is_empty() {
                        prop.insert("description".to_string(), json!(spec.description));
                    }
                    if let Some(values) = &spec.enum_values {
                        prop.insert("enum".to_string(), json!(values));
                    }
                    if let Some(min) = spec.minimum {
                        prop.insert("minimum".to_string(), json!(min));
                    }
                    if let Some(max) = spec.maximum {
                        prop.insert("maximum".to_string(), json!(max));
                    }
                    if let Some(len) = spec.min_length {
                        prop.insert("minLength".to_string(), json!(len));
                    }
                    if let Some(len) = spec.max_length {
                        prop.insert("maxLength".to_string(), json!(len));
                    }
                    if let Some(pattern) = &spec.pattern {
                        prop.insert("pattern".to_string(), json!(pattern));
                    }
                    properties.insert(spec.name.clone(), Value::Object(prop));
                    if spec.required {
                        required.push(json!(spec.name));
                    }
                }
                let mut schema = Map::new();
                schema.insert("type".to_string(), json!("object"));
                schema.insert("properties".to_string(), Value::Object(properties));
                if !required.is_empty() {
                    schema.insert("required".to_string(), Value::Array(required));
                }
                Value::Object(schema)
            }
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        // Unchecked types pass through.
        _ => true,
    }
}

fn check_enum(allowed: &[Value], value: &Value) -> Result<(), String> {
    if allowed.iter().any(|candidate| candidate == value) {
        Ok(())
    } else {
        Err(format!("value {} is not one of the allowed values", value))
    }
}

fn validate_compact(specs: &[ParamSpec], args: &Map<String, Value>) -> Result<(), String> {
    for spec in specs {
        let value = match args.get(&spec.name) {
            Some(value) => value,
            None => {
                if spec.required {
                    return Err(format!("missing required parameter '{}'", spec.name));
                }
                continue;
            }
        };

        if let Some(expected) = &spec.param_type {
            if !type_matches(expected, value) {
                return Err(format!(
                    "parameter '{}' should be of type {}",
                    spec.name, expected
                ));
            }
        }
        if let Some(allowed) = &spec.enum_values {
            check_enum(allowed, value).map_err(|e| format!("parameter '{}': {}", spec.name, e))?;
        }
        if let Some(number) = value.as_f64() {
            if let Some(min) = spec.minimum {
                if number < min {
                    return Err(format!("parameter '{}' is below minimum {}", spec.name, min));
                }
            }
            if let Some(max) = spec.maximum {
                if number > max {
                    return Err(format!("parameter '{}' is above maximum {}", spec.name, max));
                }
            }
        }
        if let Some(text) = value.as_str() {
            if let Some(min) = spec.min_length {
                if text.chars().count() < min {
                    return Err(format!("parameter '{}' is shorter than {}", spec.name, min));
                }
            }
            if let Some(max) = spec.max_length {
                if text.chars().count() > max {
                    return Err(format!("parameter '{}' is longer than {}", spec.name, max));
                }
            }
        }
    }
    Ok(())
}

fn validate_json_schema(schema: &Value, args: &Map<String, Value>) -> Result<(), String> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(name) {
                return Err(format!("missing required parameter '{}'", name));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            let value = match args.get(name) {
                Some(value) => value,
                None => continue,
            };
            if let Some(expected) = property.get("type").and_then(Value::as_str) {
                if !type_matches(expected, value) {
                    return Err(format!("parameter '{}' should be of type {}", name, expected));
                }
            }
            if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
                check_enum(allowed, value).map_err(|e| format!("parameter '{}': {}", name, e))?;
            }
        }
    }

    Ok(())
}

/// Validate `args` against a parameter schema.
///
/// Returns a human-readable reason on failure. A non-object argument value
/// is treated as an empty argument map.
pub fn validate_arguments(schema: &ParameterSchema, args: &Value) -> Result<(), String> {
    let empty = Map::new();
    let args = args.as_object().unwrap_or(&empty);
    match schema {
        ParameterSchema::Compact(specs) => validate_compact(specs, args),
        ParameterSchema::JsonSchema(schema) => validate_json_schema(schema, args),
    }
}
