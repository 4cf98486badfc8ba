//! Tool descriptors and boundary validation of call arguments.

use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Type tag for a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Enum(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
}

impl ParamSpec {
    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn enumeration(name: &str, description: &str, values: &[&str]) -> Self {
        let values = values.iter().map(|v| v.to_string()).collect();
        Self::new(name, ParamKind::Enum(values), description)
    }

    fn new(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        match &self.kind {
            ParamKind::String => json!({ "type": "string", "description": self.description }),
            ParamKind::Integer => json!({ "type": "integer", "description": self.description }),
            ParamKind::Boolean => json!({ "type": "boolean", "description": self.description }),
            ParamKind::Enum(values) => json!({
                "type": "string",
                "description": self.description,
                "enum": values,
            }),
        }
    }

    fn check(&self, value: &Value) -> Result<(), ToolError> {
        let ok = match &self.kind {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Enum(values) => value
                .as_str()
                .map(|s| values.iter().any(|v| v == s))
                .unwrap_or(false),
        };
        if ok {
            return Ok(());
        }
        let expected = match &self.kind {
            ParamKind::String => "a string".to_string(),
            ParamKind::Integer => "an integer".to_string(),
            ParamKind::Boolean => "a boolean".to_string(),
            ParamKind::Enum(values) => format!("one of {}", values.join(", ")),
        };
        Err(ToolError::InvalidArguments(format!(
            "parameter '{}' must be {}",
            self.name, expected
        )))
    }
}

/// Static description of a registered tool. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub required: Vec<String>,
    pub read_only: bool,
    pub category: Option<String>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
            required: Vec::new(),
            read_only: false,
            category: None,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn required(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// JSON-schema rendering used for discovery.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.to_json()))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    /// Check arguments against the declared parameters before they reach a
    /// handler. `null` counts as an empty argument object; `null` values count
    /// as absent. Undeclared keys are ignored.
    pub fn validate_args(&self, args: &Value) -> Result<(), ToolError> {
        let empty = Map::new();
        let obj = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(ToolError::InvalidArguments(
                    "arguments must be a JSON object".to_string(),
                ))
            }
        };

        for name in &self.required {
            if obj.get(name).map_or(true, Value::is_null) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required parameter '{}'",
                    name
                )));
            }
        }

        for spec in &self.params {
            match obj.get(&spec.name) {
                None | Some(Value::Null) => {}
                Some(value) => spec.check(value)?,
            }
        }
        Ok(())
    }
}
