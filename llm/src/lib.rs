//! Provider plumbing for clofii
//!
//! This crate provides:
//! - **REST**: `ChatModel` for one-shot text generation (question generation)
//! - **Live**: the `LiveSession` streaming contract and its event/message enums
//! - **Gemini**: `GeminiChatModel` and the `GeminiLiveClient` WebSocket transport
//! - **Tools**: `ToolDeclaration` and an ordered `ToolRegistry` of async handlers
use async_trait::async_trait;
use std::sync::Arc;

pub mod api;
mod client;
pub mod error;
pub mod live;
pub mod providers;
pub mod tools;
pub mod traffic_log;

pub use api::{ChatRequest, Modality, ToolDeclaration};
pub use error::ProviderError;
pub use live::{
    EventFanout, LiveError, LiveEvent, LiveEventKind, LiveMessage, LiveSession, SessionConfig,
    SessionConfigBuilder,
};
pub use providers::gemini::{GeminiChatModel, GeminiLiveClient, LiveClientOptions};
pub use tools::ToolRegistry;

/// A model that turns a single request into a single text response.
///
/// Errors are `anyhow::Error` wrapping a [`ProviderError`]; callers that need to
/// react to rate limiting downcast with `e.downcast_ref::<ProviderError>()`.
#[async_trait]
pub trait ChatModel {
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<String>;
}

#[async_trait]
impl ChatModel for Arc<dyn ChatModel + Send + Sync> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<String> {
        (**self).chat(request).await
    }
}
