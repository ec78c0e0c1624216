//! Gemini wire types shared by the REST and live endpoints.

use crate::ChatRequest;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub(crate) mime_type: String,
    /// base64
    pub(crate) data: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) inline_data: Option<InlineData>,
}

impl Part {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) parts: Vec<Part>,
}

impl Content {
    pub(crate) fn user_text(text: impl Into<String>) -> Self {
        Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    pub(crate) fn system(text: impl Into<String>) -> Self {
        Content {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) response_mime_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) generation_config: Option<GenerationConfig>,
}

impl From<&ChatRequest> for GenerateContentRequest {
    fn from(request: &ChatRequest) -> Self {
        GenerateContentRequest {
            contents: vec![Content::user_text(request.prompt.clone())],
            system_instruction: request.system_instruction.clone().map(Content::system),
            generation_config: request.json_response.then(|| GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
            }),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub(crate) content: Content,

    #[serde(flatten)]
    pub(crate) extra: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,

    #[serde(flatten)]
    pub(crate) extra: Option<serde_json::Value>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any.
    pub(crate) fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        Some(
            candidate
                .content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join(""),
        )
    }
}

/// JSON Schema keys that Gemini rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$anchor",
    "$dynamicRef",
    "$dynamicAnchor",
    "$vocabulary",
    "$comment",
    "title",
];

/// Reduce a JSON Schema to what Gemini function declarations accept.
///
/// Unsupported keys are removed and `$ref`s are replaced by the definition
/// they point to.
pub fn sanitize_schema(schema: serde_json::Value) -> serde_json::Value {
    let defs = schema
        .as_object()
        .and_then(|obj| obj.get("$defs").or_else(|| obj.get("definitions")))
        .and_then(|d| d.as_object())
        .cloned();

    sanitize_recursive(schema, defs.as_ref())
}

fn sanitize_recursive(
    schema: serde_json::Value,
    defs: Option<&serde_json::Map<String, serde_json::Value>>,
) -> serde_json::Value {
    let obj = match schema {
        serde_json::Value::Object(obj) => obj,
        other => return other,
    };

    if let Some(ref_str) = obj.get("$ref").and_then(|r| r.as_str()) {
        let target = ref_str
            .strip_prefix("#/$defs/")
            .or_else(|| ref_str.strip_prefix("#/definitions/"))
            .and_then(|name| defs.and_then(|d| d.get(name)));
        return match target {
            Some(definition) => sanitize_recursive(definition.clone(), defs),
            None => serde_json::json!({}),
        };
    }

    let mut result = serde_json::Map::new();
    for (key, value) in obj {
        if UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str())
            || key == "$defs"
            || key == "definitions"
        {
            continue;
        }

        let sanitized = match value {
            serde_json::Value::Object(_) => sanitize_recursive(value, defs),
            serde_json::Value::Array(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(|item| {
                        if item.is_object() {
                            sanitize_recursive(item, defs)
                        } else {
                            item
                        }
                    })
                    .collect(),
            ),
            other => other,
        };
        result.insert(key, sanitized);
    }

    serde_json::Value::Object(result)
}
