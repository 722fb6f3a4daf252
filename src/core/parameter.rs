//! Parameter system for operator and engine configuration
//!
//! Operators describe their tunables (join columns, buffer budget) as
//! [`Parameter`] definitions, and the engine configuration validates its own
//! settings against the same definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique parameter identifier
    pub id: String,
    /// Human-readable parameter name
    pub name: String,
    /// Parameter type
    pub param_type: ParameterType,
    /// Parameter description
    pub description: String,
    /// Default value
    pub default_value: ParameterValue,
    /// Whether this parameter is required
    pub required: bool,
    /// Optional constraints
    pub constraints: Option<ParameterConstraints>,
}

impl Parameter {
    /// Required column-name parameter
    pub fn column(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            param_type: ParameterType::String,
            description: description.to_string(),
            default_value: ParameterValue::Null,
            required: true,
            constraints: Some(ParameterConstraints::new().with_length_range(Some(1), None)),
        }
    }

    /// Integer parameter with an inclusive range
    pub fn integer(id: &str, name: &str, description: &str, default: i64, min: i64, max: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            param_type: ParameterType::Integer,
            description: description.to_string(),
            default_value: ParameterValue::Integer(default),
            required: false,
            constraints: Some(
                ParameterConstraints::new()
                    .with_min(min as f64)
                    .with_max(max as f64),
            ),
        }
    }

    /// String parameter restricted to a fixed set of values
    pub fn choice(id: &str, name: &str, description: &str, default: &str, allowed: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            param_type: ParameterType::Enum,
            description: description.to_string(),
            default_value: ParameterValue::from(default),
            required: false,
            constraints: Some(ParameterConstraints::new().with_allowed_values(
                allowed.iter().map(|v| ParameterValue::from(*v)).collect(),
            )),
        }
    }

    /// Validate one value against this definition
    pub fn validate(&self, value: &ParameterValue) -> ValidationResult {
        if value.is_null() {
            return if self.required {
                ValidationResult::error(format!("{} is required", self.id))
            } else {
                ValidationResult::ok()
            };
        }

        let type_ok = match self.param_type {
            ParameterType::String | ParameterType::Enum => value.as_string().is_some(),
            ParameterType::Integer => value.as_integer().is_some(),
            ParameterType::Boolean => value.as_bool().is_some(),
        };
        if !type_ok {
            return ValidationResult::error(format!(
                "{} expects a {:?} value",
                self.id, self.param_type
            ));
        }

        match &self.constraints {
            Some(constraints) => constraints.check(&self.id, value),
            None => ValidationResult::ok(),
        }
    }
}

/// Validate a set of supplied values against their definitions.
///
/// Unknown keys produce warnings; missing required parameters are errors.
pub fn validate_all(
    definitions: &[Parameter],
    values: &HashMap<String, ParameterValue>,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for def in definitions {
        let value = values.get(&def.id).unwrap_or(&ParameterValue::Null);
        result = result.merge(def.validate(value));
    }
    for key in values.keys() {
        if !definitions.iter().any(|d| &d.id == key) {
            result = result.with_warning(format!("unknown parameter {}", key));
        }
    }
    result
}

/// Parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
    Enum,
}

/// Parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    String(String),
    Null,
}

impl ParameterValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParameterValue::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            ParameterValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integers, or numbers without a fractional part
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(i) => Some(*i),
            ParameterValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        ParameterValue::String(s)
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::String(s.to_string())
    }
}

impl From<i64> for ParameterValue {
    fn from(i: i64) -> Self {
        ParameterValue::Integer(i)
    }
}

impl From<usize> for ParameterValue {
    fn from(i: usize) -> Self {
        ParameterValue::Integer(i as i64)
    }
}

impl From<bool> for ParameterValue {
    fn from(b: bool) -> Self {
        ParameterValue::Boolean(b)
    }
}

/// Parameter constraints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterConstraints {
    /// Minimum value (for numbers)
    pub min: Option<f64>,
    /// Maximum value (for numbers)
    pub max: Option<f64>,
    /// Allowed values (for enums)
    pub allowed_values: Option<Vec<ParameterValue>>,
    /// Minimum length (for strings)
    pub min_length: Option<usize>,
    /// Maximum length (for strings)
    pub max_length: Option<usize>,
}

impl ParameterConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<ParameterValue>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub fn with_length_range(mut self, min_length: Option<usize>, max_length: Option<usize>) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    fn check(&self, id: &str, value: &ParameterValue) -> ValidationResult {
        let mut errors = Vec::new();

        if let Some(n) = value.as_number() {
            if let Some(min) = self.min {
                if n < min {
                    errors.push(format!("{} must be at least {}", id, min));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    errors.push(format!("{} must be at most {}", id, max));
                }
            }
        }

        if let Some(s) = value.as_string() {
            if let Some(min_length) = self.min_length {
                if s.len() < min_length {
                    errors.push(format!("{} must not be empty", id));
                }
            }
            if let Some(max_length) = self.max_length {
                if s.len() > max_length {
                    errors.push(format!("{} is longer than {} bytes", id, max_length));
                }
            }
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(value) {
                errors.push(format!("{} has unsupported value {:?}", id, value));
            }
        }

        if errors.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::errors(errors)
        }
    }
}

/// Validation result
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether validation passed
    pub valid: bool,
    /// Error messages
    pub errors: Vec<String>,
    /// Warning messages
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![msg.into()],
            warnings: Vec::new(),
        }
    }

    pub fn errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, msg: impl Into<String>) -> Self {
        self.warnings.push(msg.into());
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(mut self, other: ValidationResult) -> Self {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_range() {
        let param = Parameter::integer("buffer_pages", "Buffer Pages", "budget", 8, 3, 1024);
        assert!(param.validate(&ParameterValue::from(3i64)).valid);
        assert!(!param.validate(&ParameterValue::from(2i64)).valid);
        assert!(!param.validate(&ParameterValue::from("eight")).valid);
    }

    #[test]
    fn test_required_column() {
        let param = Parameter::column("left_column", "Left Column", "join key");
        assert!(!param.validate(&ParameterValue::Null).valid);
        assert!(!param.validate(&ParameterValue::from("")).valid);
        assert!(param.validate(&ParameterValue::from("id")).valid);
    }

    #[test]
    fn test_choice() {
        let param = Parameter::choice("strategy", "Strategy", "join", "sort_merge", &["sort_merge", "grace_hash"]);
        assert!(param.validate(&ParameterValue::from("grace_hash")).valid);
        assert!(param.validate(&ParameterValue::from("hash")).has_errors());
    }

    #[test]
    fn test_validate_all_reports_unknown_keys() {
        let defs = vec![Parameter::column("left_column", "Left Column", "join key")];
        let mut values = HashMap::new();
        values.insert("left_column".to_string(), ParameterValue::from("id"));
        values.insert("colour".to_string(), ParameterValue::from("red"));

        let result = validate_all(&defs, &values);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_untagged_deserialization() {
        let v: ParameterValue = serde_json::from_str("4096").unwrap();
        assert_eq!(v.as_integer(), Some(4096));
        let v: ParameterValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(v.as_string(), Some("x"));
    }
}
