//! Tools that let the model read and edit a shared text document.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::base::{ToolDefinition, ToolError, ToolHandler, parse_arguments};

/// A text document shared between the session's tools and the caller.
#[derive(Debug, Clone, Default)]
pub struct SharedDocument {
    content: Arc<RwLock<String>>,
}

impl SharedDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Arc::new(RwLock::new(content.into())),
        }
    }

    /// A copy of the current content.
    pub fn content(&self) -> String {
        self.content.read().clone()
    }

    pub fn set_content(&self, content: impl Into<String>) {
        *self.content.write() = content.into();
    }

    /// Append `text` as a new paragraph.
    pub fn append_paragraph(&self, text: &str) {
        let mut content = self.content.write();
        content.push_str("\n\n");
        content.push_str(text);
    }

    /// Replace the first occurrence of `search`. Returns false when absent.
    ///
    /// An empty `search` matches nothing, so the document is left unchanged
    /// and the call reports "not found". Plain substring replacement would
    /// instead insert `replace` at the start of the document.
    pub fn replace_first(&self, search: &str, replace: &str) -> bool {
        let mut content = self.content.write();
        if search.is_empty() {
            return false;
        }
        match content.find(search) {
            Some(position) => {
                content.replace_range(position..position + search.len(), replace);
                true
            }
            None => false,
        }
    }
}

#[derive(Deserialize)]
struct UpdateArgs {
    content: String,
}

#[derive(Deserialize)]
struct InsertArgs {
    text: String,
}

#[derive(Deserialize)]
struct ReplaceArgs {
    search: String,
    replace: String,
}

struct UpdateDocumentContent(SharedDocument);

#[async_trait]
impl ToolHandler for UpdateDocumentContent {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: UpdateArgs = parse_arguments(arguments)?;
        info!(length = args.content.chars().count(), "Replacing document content");
        self.0.set_content(args.content);
        Ok(json!({ "success": true, "message": "document updated" }))
    }
}

struct InsertText(SharedDocument);

#[async_trait]
impl ToolHandler for InsertText {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: InsertArgs = parse_arguments(arguments)?;
        self.0.append_paragraph(&args.text);
        Ok(json!({ "success": true, "message": "text inserted" }))
    }
}

struct ReplaceText(SharedDocument);

#[async_trait]
impl ToolHandler for ReplaceText {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ReplaceArgs = parse_arguments(arguments)?;
        if self.0.replace_first(&args.search, &args.replace) {
            Ok(json!({ "success": true, "message": "text replaced" }))
        } else {
            Ok(json!({ "success": false, "message": "text not found in document" }))
        }
    }
}

struct GetDocumentContent(SharedDocument);

#[async_trait]
impl ToolHandler for GetDocumentContent {
    async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
        let content = self.0.content();
        Ok(json!({
            "success": true,
            "length": content.chars().count(),
            "content": content,
            "message": "content retrieved",
        }))
    }
}

/// The four document tools, bound to `document`.
pub fn document_tools(document: &SharedDocument) -> Vec<(ToolDefinition, Arc<dyn ToolHandler>)> {
    vec![
        (
            ToolDefinition::new(
                "update_document_content",
                "Replace the entire content of the current document",
                json!({
                    "type": "object",
                    "properties": {
                        "content": {
                            "type": "string",
                            "description": "The complete new content of the document"
                        }
                    },
                    "required": ["content"]
                }),
            ),
            Arc::new(UpdateDocumentContent(document.clone())) as Arc<dyn ToolHandler>,
        ),
        (
            ToolDefinition::new(
                "insert_text",
                "Insert text at the end of the current document",
                json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "The text to insert"
                        }
                    },
                    "required": ["text"]
                }),
            ),
            Arc::new(InsertText(document.clone())) as Arc<dyn ToolHandler>,
        ),
        (
            ToolDefinition::new(
                "replace_text",
                "Replace part of the text in the document",
                json!({
                    "type": "object",
                    "properties": {
                        "search": {
                            "type": "string",
                            "description": "The text to search for"
                        },
                        "replace": {
                            "type": "string",
                            "description": "The replacement text"
                        }
                    },
                    "required": ["search", "replace"]
                }),
            ),
            Arc::new(ReplaceText(document.clone())) as Arc<dyn ToolHandler>,
        ),
        (
            ToolDefinition::new(
                "get_document_content",
                "Read the current content of the document",
                json!({ "type": "object", "properties": {} }),
            ),
            Arc::new(GetDocumentContent(document.clone())) as Arc<dyn ToolHandler>,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::{ToolCall, ToolRegistry};

    fn registry_for(document: &SharedDocument) -> ToolRegistry {
        let mut builder = ToolRegistry::builder();
        builder.register_all(document_tools(document)).unwrap();
        builder.build()
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            call_id: format!("call_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_document_content() {
        let document = SharedDocument::new("Héllo");
        let registry = registry_for(&document);

        let result = registry
            .dispatch(&ToolCall {
                call_id: "c".into(),
                name: "get_document_content".into(),
                arguments: String::new(),
            })
            .await;
        assert!(result.success);
        assert_eq!(result.output["content"], "Héllo");
        assert_eq!(result.output["length"], 5);
    }

    #[tokio::test]
    async fn test_update_and_insert() {
        let document = SharedDocument::new("old");
        let registry = registry_for(&document);

        let result = registry
            .dispatch(&call("update_document_content", json!({"content": "Title"})))
            .await;
        assert!(result.success);
        registry
            .dispatch(&call("insert_text", json!({"text": "Body"})))
            .await;
        assert_eq!(document.content(), "Title\n\nBody");
    }

    #[tokio::test]
    async fn test_replace_first_occurrence_only() {
        let document = SharedDocument::new("a b a");
        let registry = registry_for(&document);

        let result = registry
            .dispatch(&call("replace_text", json!({"search": "a", "replace": "z"})))
            .await;
        assert!(result.success);
        assert_eq!(document.content(), "z b a");
    }

    #[tokio::test]
    async fn test_replace_empty_search_changes_nothing() {
        let document = SharedDocument::new("abc");
        assert!(!document.replace_first("", "x"));

        let registry = registry_for(&document);
        let result = registry
            .dispatch(&call("replace_text", json!({"search": "", "replace": "x"})))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_message(), Some("text not found in document"));
        assert_eq!(document.content(), "abc");
    }

    #[tokio::test]
    async fn test_replace_missing_text_fails() {
        let document = SharedDocument::new("abc");
        let registry = registry_for(&document);

        let result = registry
            .dispatch(&call("replace_text", json!({"search": "xyz", "replace": "q"})))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_message(), Some("text not found in document"));
        assert_eq!(document.content(), "abc");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let document = SharedDocument::new("abc");
        let registry = registry_for(&document);

        let result = registry.dispatch(&call("insert_text", json!({}))).await;
        assert!(!result.success);
        assert_eq!(document.content(), "abc");
    }
}
