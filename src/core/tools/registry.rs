//! Typed tool registry with failure isolation.
//!
//! Tools are registered once, before a session starts, and looked up by name
//! at dispatch time. Dispatch never fails: a missing tool, malformed
//! arguments, a handler error, or a handler panic all come back as a failed
//! [`ToolResult`] so the session can answer the model and keep going.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::base::{ToolCall, ToolDefinition, ToolHandler, ToolResult};

/// Errors raised while registering tools.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool name must not be empty")]
    EmptyName,

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool '{0}' has a parameter schema that is not a JSON object")]
    InvalidSchema(String),
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Collects tools before freezing them into a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique and schemas must be JSON objects.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<&mut Self, RegistryError> {
        if definition.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if !definition.parameters.is_object() {
            return Err(RegistryError::InvalidSchema(definition.name));
        }
        if self
            .tools
            .iter()
            .any(|tool| tool.definition.name == definition.name)
        {
            return Err(RegistryError::DuplicateTool(definition.name));
        }
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
        Ok(self)
    }

    /// Register several tools at once.
    pub fn register_all<I>(&mut self, tools: I) -> Result<&mut Self, RegistryError>
    where
        I: IntoIterator<Item = (ToolDefinition, Arc<dyn ToolHandler>)>,
    {
        for (definition, handler) in tools {
            self.register(definition, handler)?;
        }
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        let order = self
            .tools
            .iter()
            .map(|tool| tool.definition.name.clone())
            .collect();
        let tools = self
            .tools
            .into_iter()
            .map(|tool| (tool.definition.name.clone(), tool))
            .collect();
        ToolRegistry { tools, order }
    }
}

/// Immutable name → handler map used for the lifetime of a session.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// A registry with no tools.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run `call` and produce exactly one result for it.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.call_id, "Unknown tool requested");
            return ToolResult::failure(&call.call_id, format!("unknown tool: {}", call.name));
        };

        let arguments = match call.parsed_arguments() {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.call_id, "Rejected tool arguments: {}", e);
                return ToolResult::failure(&call.call_id, e.to_string());
            }
        };

        debug!(tool = %call.name, call_id = %call.call_id, "Executing tool");
        let handler = tool.handler.clone();
        let invocation = AssertUnwindSafe(async move { handler.call(arguments).await });

        match invocation.catch_unwind().await {
            Ok(Ok(output)) => ToolResult::from_output(&call.call_id, output),
            Ok(Err(e)) => {
                warn!(tool = %call.name, call_id = %call.call_id, "Tool failed: {}", e);
                ToolResult::failure(&call.call_id, e.to_string())
            }
            Err(panic) => {
                let message = extract_panic_message(&panic);
                error!(tool = %call.name, call_id = %call.call_id, message = %message, "Tool panicked");
                ToolResult::failure(
                    &call.call_id,
                    format!("tool '{}' panicked: {}", call.name, message),
                )
            }
        }
    }
}

fn extract_panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
