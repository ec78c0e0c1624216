use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the agent answers with.
#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

/// A function the agent may call mid-conversation.
///
/// `parameters` is a JSON schema in the subset Gemini accepts; `None` means
/// the function takes no arguments.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDeclaration {
    pub fn no_args(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters: None,
        }
    }

    /// Derive the parameter schema from a Rust type.
    pub fn with_schema<T: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let schema = schemars::schema_for!(T);
        let raw = serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null);
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters: Some(crate::providers::gemini::sanitize_schema(raw)),
        }
    }
}

/// A one-shot text generation request.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub system_instruction: Option<String>,
    pub prompt: String,
    /// Ask the provider to answer with `application/json`.
    pub json_response: bool,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn expect_json(mut self) -> Self {
        self.json_response = true;
        self
    }
}
