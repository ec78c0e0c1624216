use crate::api::ToolDeclaration;
use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type ToolFn =
    Box<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Tools the agent may call, in declaration order.
///
/// Order matters because the declarations are sent to the agent as-is.
pub struct ToolRegistry {
    tools: Vec<(ToolDeclaration, ToolFn)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry { tools: Vec::new() }
    }

    /// Register a handler. A second registration under the same name replaces
    /// the first in place.
    pub fn register<F, Fut>(&mut self, declaration: ToolDeclaration, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let wrapped: ToolFn = Box::new(move |args| Box::pin(handler(args)));
        match self
            .tools
            .iter_mut()
            .find(|(existing, _)| existing.name == declaration.name)
        {
            Some(slot) => *slot = (declaration, wrapped),
            None => self.tools.push((declaration, wrapped)),
        }
    }

    pub fn get_declaration(&self, name: &str) -> Option<&ToolDeclaration> {
        self.tools
            .iter()
            .find(|(decl, _)| decl.name == name)
            .map(|(decl, _)| decl)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|(decl, _)| decl.clone()).collect()
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Value> {
        match self.tools.iter().find(|(decl, _)| decl.name == name) {
            Some((_, handler)) => handler(args).await,
            None => Err(anyhow::anyhow!("Tool '{}' not found", name)),
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.get_declaration(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct NoteInput {
        topic: String,
        score: Option<u8>,
    }

    async fn note_tool(args: Value) -> Result<Value> {
        let input: NoteInput = serde_json::from_value(args)?;
        Ok(serde_json::json!({
            "noted": input.topic,
            "score": input.score.unwrap_or(0),
        }))
    }

    async fn failing_tool(_args: Value) -> Result<Value> {
        Err(anyhow::anyhow!("scoring backend offline"))
    }

    fn note_declaration() -> ToolDeclaration {
        ToolDeclaration::with_schema::<NoteInput>("record_note", "Record a note about an answer")
    }

    #[tokio::test]
    async fn test_registry_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDeclaration::no_args("first", "1"), failing_tool);
        registry.register(note_declaration(), note_tool);

        let names: Vec<_> = registry.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["first", "record_note"]);
        assert!(registry.has_tool("record_note"));
        assert!(!registry.has_tool("nonexistent_tool"));
    }

    #[tokio::test]
    async fn test_reregister_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(note_declaration(), failing_tool);
        registry.register(ToolDeclaration::no_args("other", "x"), failing_tool);
        registry.register(note_declaration(), note_tool);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.declarations()[0].name, "record_note");
        let result = registry
            .call("record_note", serde_json::json!({"topic": "rust"}))
            .await
            .unwrap();
        assert_eq!(result["noted"], "rust");
    }

    #[tokio::test]
    async fn test_call_passes_args() {
        let mut registry = ToolRegistry::new();
        registry.register(note_declaration(), note_tool);

        let result = registry
            .call("record_note", serde_json::json!({"topic": "ownership", "score": 4}))
            .await
            .unwrap();
        assert_eq!(result["score"], 4);
    }

    #[tokio::test]
    async fn test_bad_args_error() {
        let mut registry = ToolRegistry::new();
        registry.register(note_declaration(), note_tool);

        let result = registry.call("record_note", serde_json::json!({"score": 1})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool_error() {
        let registry = ToolRegistry::new();
        let err = registry.call("missing", Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
