//! Tool dispatch pipeline
//!
//! Every registered tool is wrapped in the same pipeline: schema validation,
//! timing, structured logging, and conversion of handler failures into error
//! envelopes. Handlers signal failure by returning `Err`; they never build
//! error envelopes themselves apart from domain-specific messages.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::Result;
use crate::mcp::schema::SchemaValidator;
use crate::mcp::types::{CallToolResult, ToolDescriptor};

/// The inner callable of a tool
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<CallToolResult>> + Send + Sync>;

/// A tool as declared by a module: name, description, input schema, handler.
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }
}

/// Adapt an async closure into a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<CallToolResult>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// A tool wrapped with its compiled schema, ready for dispatch
pub struct RegisteredTool {
    name: String,
    description: String,
    input_schema: Value,
    validator: SchemaValidator,
    handler: ToolHandler,
}

impl RegisteredTool {
    /// Wrap a tool spec, compiling its schema. Fails on malformed schemas.
    pub fn wrap(spec: ToolSpec) -> Result<Self> {
        let validator = SchemaValidator::compile(&spec.name, &spec.input_schema)?;
        Ok(Self {
            name: spec.name,
            description: spec.description,
            input_schema: spec.input_schema,
            validator,
            handler: spec.handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor advertised by `tools/list`
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    /// Run the dispatch pipeline for one invocation.
    ///
    /// Validation failures and handler errors both surface as error
    /// envelopes; nothing escapes this method.
    pub async fn dispatch(&self, args: Value) -> CallToolResult {
        let start = Instant::now();

        if let Err(err) = self.validator.validate(&args) {
            debug!(tool = %self.name, error = %err, "Tool input rejected");
            return CallToolResult::error(err.to_string());
        }

        match (self.handler)(args).await {
            Ok(result) => {
                debug!(
                    tool = %self.name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    success = true,
                    "Tool executed"
                );
                result
            }
            Err(err) => {
                error!(
                    tool = %self.name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %err,
                    "Tool execution failed"
                );
                CallToolResult::error(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn echo_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {"message": {"type": "string", "minLength": 1}},
            "required": ["message"]
        })
    }

    #[tokio::test]
    async fn test_success_passes_envelope_through() {
        let spec = ToolSpec::new(
            "echo",
            "Echo a message",
            echo_schema(),
            handler(|args| async move {
                Ok(CallToolResult::text(args["message"].as_str().unwrap().to_string()))
            }),
        );
        let tool = RegisteredTool::wrap(spec).unwrap();
        let result = tool.dispatch(json!({"message": "hi"})).await;
        assert!(!result.is_error);
        assert_eq!(result.first_text(), "hi");
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let spec = ToolSpec::new(
            "echo",
            "Echo a message",
            echo_schema(),
            handler(move |_| {
                let flag = Arc::clone(&flag);
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(CallToolResult::text("unreachable"))
                }
            }),
        );
        let tool = RegisteredTool::wrap(spec).unwrap();
        let result = tool.dispatch(json!({"message": ""})).await;
        assert!(result.is_error);
        assert!(result.first_text().starts_with("Error: Input validation failed:"));
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_envelope() {
        let spec = ToolSpec::new(
            "echo",
            "Echo a message",
            echo_schema(),
            handler(|_| async move { Err(DomainError::EmptyQuery.into()) }),
        );
        let tool = RegisteredTool::wrap(spec).unwrap();
        let result = tool.dispatch(json!({"message": "hi"})).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), "Error: Query cannot be null or empty");
    }
}
