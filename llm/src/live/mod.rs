//! The streaming session contract.
//!
//! A `LiveSession` owns one bidirectional connection to a conversational
//! agent. Outbound traffic goes through [`LiveSession::send`]; inbound traffic
//! is fanned out as [`LiveEvent`]s to every receiver handed out by
//! [`LiveSession::subscribe`], in the order the agent produced it.

use crate::api::{Modality, ToolDeclaration};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Classification of a non-fatal inbound `Error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEventKind {
    /// The server announced it will close the connection soon.
    GoAway,
    /// A frame could not be understood.
    Protocol,
    /// The server reported an error in-band.
    Server,
}

/// Inbound event, delivered in receive order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// PCM16LE agent speech
    AudioChunk { data: Vec<u8>, sample_rate: u32 },
    TextDelta { text: String },
    ToolCall {
        name: String,
        args: serde_json::Value,
        call_id: String,
    },
    TurnComplete,
    /// The candidate barged in; queued agent audio is stale.
    Interrupted,
    Error { kind: LiveEventKind, message: String },
    /// The connection ended without a local `disconnect`.
    Closed { code: Option<u16> },
}

/// Outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    MediaChunk { mime_type: String, data: Vec<u8> },
    ToolResponse {
        call_id: String,
        name: String,
        result: serde_json::Value,
    },
    ClientContent { text: String, turn_complete: bool },
}

impl LiveMessage {
    pub fn is_media(&self) -> bool {
        matches!(self, LiveMessage::MediaChunk { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LiveError {
    #[error("a connection is already open")]
    AlreadyConnected,
    #[error("the agent rejected the credentials: {0}")]
    AuthRejected(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("not connected")]
    NotConnected,
    #[error("outbound queue is full")]
    Backpressure,
    #[error("could not encode message: {0}")]
    Protocol(String),
}

/// Everything the agent needs to start a session. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    model: String,
    response_modalities: Vec<Modality>,
    voice_name: String,
    system_instruction: String,
    tools: Vec<ToolDeclaration>,
    video_input: bool,
}

impl SessionConfig {
    pub fn builder(model: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: SessionConfig {
                model: model.into(),
                response_modalities: vec![Modality::Audio],
                voice_name: String::new(),
                system_instruction: String::new(),
                tools: Vec::new(),
                video_input: false,
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn response_modalities(&self) -> &[Modality] {
        &self.response_modalities
    }

    pub fn voice_name(&self) -> &str {
        &self.voice_name
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn video_input(&self) -> bool {
        self.video_input
    }
}

pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn response_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.config.response_modalities = modalities;
        self
    }

    pub fn voice_name(mut self, voice: impl Into<String>) -> Self {
        self.config.voice_name = voice.into();
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.system_instruction = instruction.into();
        self
    }

    /// Append a tool. A declaration whose name is already present is ignored.
    pub fn tool(mut self, declaration: ToolDeclaration) -> Self {
        if !self.config.has_tool(&declaration.name) {
            self.config.tools.push(declaration);
        }
        self
    }

    pub fn video_input(mut self, enabled: bool) -> Self {
        self.config.video_input = enabled;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// One bidirectional connection to a conversational agent.
#[async_trait]
pub trait LiveSession: Send {
    /// Register a listener. Each event reaches every listener exactly once.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LiveEvent>;

    /// Open the connection and complete the setup handshake.
    ///
    /// Dropping the returned future before it resolves abandons the
    /// handshake without leaving a connection behind.
    async fn connect(&mut self, config: &SessionConfig) -> Result<(), LiveError>;

    /// Queue a message without waiting for the transport.
    fn send(&self, message: LiveMessage) -> Result<(), LiveError>;

    /// Close the connection if open. Calling it again is a no-op.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Delivers each event to every registered listener.
///
/// Listeners whose receiver was dropped are pruned on the next emit.
#[derive(Clone, Default)]
pub struct EventFanout {
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<LiveEvent>>>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LiveEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn emit(&self, event: LiveEvent) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
