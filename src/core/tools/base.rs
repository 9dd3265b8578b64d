//! Tool definitions, calls, results, and the handler trait.

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors a tool handler can return.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Arguments did not match what the tool accepts
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed
    #[error("{0}")]
    ExecutionFailed(String),
}

/// Name, description, and argument schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id; the result must carry the same id.
    pub call_id: String,
    pub name: String,
    /// Raw JSON arguments as received.
    pub arguments: String,
}

impl ToolCall {
    /// Parse the raw arguments. Empty input is treated as `{}`.
    pub fn parsed_arguments(&self) -> Result<Value, ToolError> {
        if self.arguments.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&self.arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
    }
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    /// JSON payload sent back to the model.
    pub output: Value,
}

impl ToolResult {
    /// Wrap a handler's return value.
    ///
    /// Objects are passed through, with `"success": true` added when the
    /// handler did not set it; a handler reporting `"success": false` yields
    /// a failed result. Other values are wrapped as `{"success": true, "result": ...}`.
    pub fn from_output(call_id: impl Into<String>, output: Value) -> Self {
        let output = match output {
            Value::Object(mut map) => {
                map.entry("success").or_insert(Value::Bool(true));
                Value::Object(map)
            }
            other => json!({ "success": true, "result": other }),
        };
        let success = output
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Self {
            call_id: call_id.into(),
            success,
            output,
        }
    }

    /// A failed result carrying `message`.
    pub fn failure(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: json!({ "success": false, "error": message.into() }),
        }
    }

    /// The payload as the JSON string the wire expects.
    pub fn output_json(&self) -> String {
        self.output.to_string()
    }

    /// Failure text, from `error` or else `message`.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        self.output
            .get("error")
            .or_else(|| self.output.get("message"))
            .and_then(Value::as_str)
    }
}

/// Executes a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// A [`ToolHandler`] backed by an async closure.
pub struct FnTool<F>(F);

impl<F> FnTool<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.0)(arguments).await
    }
}

/// Deserialize handler arguments into a typed struct.
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
