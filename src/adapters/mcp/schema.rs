//! Runtime view of a tool's `input_schema` (the `type`, `properties` and
//! `required` subset of JSON Schema) with a small validator.

use serde_json::{Map, Value};

use crate::catalog::{Parameter, ParameterType};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    parameters: Vec<Parameter>,
}

fn parameter_type(schema: &Value) -> ParameterType {
    let declared = match schema.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    };
    match declared {
        Some("integer") => ParameterType::Integer,
        Some("number") => ParameterType::Number,
        Some("boolean") => ParameterType::Boolean,
        Some("object") => ParameterType::Object,
        Some("array") => ParameterType::Array,
        _ => ParameterType::String,
    }
}

fn matches_type(param_type: ParameterType, value: &Value) -> bool {
    match param_type {
        ParameterType::String => value.is_string(),
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Number => value.is_number(),
        ParameterType::Boolean => value.is_boolean(),
        ParameterType::Object => value.is_object(),
        ParameterType::Array => value.is_array(),
    }
}

impl ToolSchema {
    pub fn from_input_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut parameters: Vec<Parameter> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, property)| Parameter {
                        name: name.clone(),
                        param_type: parameter_type(property),
                        description: property
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        required: required.contains(&name.as_str()),
                        enum_values: property.get("enum").and_then(Value::as_array).cloned(),
                        default: property.get("default").cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Required names without a property entry still have to be present.
        for name in required {
            if !parameters.iter().any(|p| p.name == name) {
                parameters.push(Parameter {
                    name: name.to_string(),
                    param_type: ParameterType::String,
                    description: String::new(),
                    required: true,
                    enum_values: None,
                    default: None,
                });
            }
        }

        Self { parameters }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn declares(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .filter(|p| arguments.get(&p.name).is_none_or(Value::is_null))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), String> {
        let missing = self.missing_required(arguments);
        if !missing.is_empty() {
            return Err(format!("missing required parameters: {}", missing.join(", ")));
        }

        for parameter in &self.parameters {
            let Some(value) = arguments.get(&parameter.name).filter(|v| !v.is_null()) else {
                continue;
            };
            if !matches_type(parameter.param_type, value) {
                return Err(format!(
                    "parameter '{}' must be of type {}",
                    parameter.name,
                    parameter.param_type.as_str()
                ));
            }
            if let Some(allowed) = &parameter.enum_values
                && !allowed.contains(value)
            {
                return Err(format!("parameter '{}' is not one of the allowed values", parameter.name));
            }
        }
        Ok(())
    }
}
