//! Per-tool JSON Schema validation
//!
//! Schemas are compiled once at tool registration; the hot path only walks
//! the compiled validator. Failures aggregate into a single message with
//! `$`-rooted field paths.

use jsonschema::Validator;
use serde_json::Value;

use crate::error::{DataMcpError, Result, ValidationError};

/// A compiled Draft-07 schema for one tool's input
pub struct SchemaValidator {
    validator: Validator,
}

impl SchemaValidator {
    /// Compile a schema document. Fails on malformed schemas.
    pub fn compile(tool: &str, schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            DataMcpError::Validation(ValidationError::InvalidSchema {
                tool: tool.to_string(),
                message: e.to_string(),
            })
        })?;
        Ok(Self { validator })
    }

    /// Validate arguments against the compiled schema.
    ///
    /// Returns `Ok(())` or a single aggregated `Input validation failed: ...`
    /// error listing every constraint failure as `<path>: <reason>`.
    pub fn validate(&self, args: &Value) -> Result<()> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(args)
            .map(|error| format!("{}: {}", dollar_path(&error.instance_path.to_string()), error))
            .collect();

        if messages.is_empty() {
            return Ok(());
        }

        Err(DataMcpError::Validation(ValidationError::SchemaViolation {
            messages: messages.join(", "),
        }))
    }
}

/// Render a JSON Pointer (`/queries/0/query`) as a `$`-rooted path
/// (`$.queries.0.query`). The root pointer renders as `$`.
fn dollar_path(pointer: &str) -> String {
    if pointer.is_empty() {
        "$".to_string()
    } else {
        format!("${}", pointer.replace('/', "."))
    }
}
