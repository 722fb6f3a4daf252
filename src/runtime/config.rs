//! Engine configuration
//!
//! Loaded from JSON text or a JSON file; every field is optional and falls
//! back to its default. Values are checked against the same [`Parameter`]
//! definitions that describe them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::categories::storage::DEFAULT_PAGE_SIZE;
use crate::core::operator::{ExecError, ExecResult};
use crate::core::parameter::{validate_all, Parameter, ParameterValue, ValidationResult};
use crate::core::registry::JoinStrategy;

pub const MIN_PAGE_SIZE: usize = 128;
pub const MAX_PAGE_SIZE: usize = 65536;
pub const DEFAULT_BUFFER_PAGES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes per page of every relation the session creates
    pub page_size: usize,
    /// Buffer budget `B` handed to joins built without an explicit one.
    /// Values below 3 are accepted; joins then produce nothing.
    pub buffer_pages: usize,
    pub default_join: JoinStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pages: DEFAULT_BUFFER_PAGES,
            default_join: JoinStrategy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> ExecResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> ExecResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Parameter definitions describing each setting
    pub fn parameters() -> Vec<Parameter> {
        let strategies: Vec<&str> = JoinStrategy::ALL.iter().map(|s| s.as_str()).collect();
        vec![
            Parameter::integer(
                "page_size",
                "Page Size",
                "Bytes per page",
                DEFAULT_PAGE_SIZE as i64,
                MIN_PAGE_SIZE as i64,
                MAX_PAGE_SIZE as i64,
            ),
            Parameter::integer(
                "buffer_pages",
                "Buffer Pages",
                "Default buffer budget for joins",
                DEFAULT_BUFFER_PAGES as i64,
                0,
                1 << 20,
            ),
            Parameter::choice(
                "default_join",
                "Default Join",
                "Join strategy used when none is named",
                JoinStrategy::default().as_str(),
                &strategies,
            ),
        ]
    }

    /// Check every setting against [`EngineConfig::parameters`]
    pub fn validate(&self) -> ValidationResult {
        let values = HashMap::from([
            ("page_size".to_string(), ParameterValue::from(self.page_size)),
            ("buffer_pages".to_string(), ParameterValue::from(self.buffer_pages)),
            ("default_join".to_string(), ParameterValue::from(self.default_join.as_str())),
        ]);
        let mut result = validate_all(&Self::parameters(), &values);
        if self.buffer_pages < 3 {
            result = result.with_warning(format!(
                "buffer_pages {} is below 3; joins will produce no output",
                self.buffer_pages
            ));
        }
        result
    }

    fn validated(self) -> ExecResult<Self> {
        let result = self.validate();
        if result.has_errors() {
            return Err(ExecError::Configuration(result.errors.join("; ")));
        }
        for warning in &result.warnings {
            tracing::warn!("{}", warning);
        }
        Ok(self)
    }
}
