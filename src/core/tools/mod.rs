//! Tool dispatch: the operations the model may invoke during a conversation.

mod base;
mod document;
mod registry;

pub use base::{
    FnTool, ToolCall, ToolDefinition, ToolError, ToolHandler, ToolResult, parse_arguments,
};
pub use document::{SharedDocument, document_tools};
pub use registry::{RegistryError, ToolRegistry, ToolRegistryBuilder};
