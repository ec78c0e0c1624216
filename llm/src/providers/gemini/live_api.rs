//! BidiGenerateContent frames.
//!
//! Every client frame is a single-key object (`setup`, `realtimeInput`,
//! `toolResponse`, `clientContent`); server frames carry one of
//! `setupComplete`, `serverContent`, `toolCall` or `goAway`.

use super::api::{Content, InlineData};
use crate::api::{Modality, ToolDeclaration};
use crate::live::{LiveEvent, LiveEventKind, LiveMessage, SessionConfig};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// Sample rate assumed when the server omits `rate=` from the MIME type.
pub(crate) const DEFAULT_OUTPUT_RATE: u32 = 24_000;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum ClientFrame {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
    ClientContent(ClientContent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Setup {
    model: String,
    generation_config: LiveGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<LiveTool>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveGenerationConfig {
    response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveTool {
    function_declarations: Vec<ToolDeclaration>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RealtimeInput {
    media_chunks: Vec<InlineData>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

#[derive(Clone, Debug, Serialize)]
struct FunctionResponse {
    id: String,
    name: String,
    response: serde_json::Value,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClientContent {
    turns: Vec<Content>,
    turn_complete: bool,
}

impl From<&SessionConfig> for ClientFrame {
    fn from(config: &SessionConfig) -> Self {
        let speech_config = (!config.voice_name().is_empty()).then(|| SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: config.voice_name().to_string(),
                },
            },
        });
        let tools = if config.tools().is_empty() {
            Vec::new()
        } else {
            vec![LiveTool {
                function_declarations: config.tools().to_vec(),
            }]
        };

        ClientFrame::Setup(Setup {
            model: config.model().to_string(),
            generation_config: LiveGenerationConfig {
                response_modalities: config.response_modalities().to_vec(),
                speech_config,
            },
            system_instruction: (!config.system_instruction().is_empty())
                .then(|| Content::system(config.system_instruction())),
            tools,
        })
    }
}

impl From<&LiveMessage> for ClientFrame {
    fn from(message: &LiveMessage) -> Self {
        match message {
            LiveMessage::MediaChunk { mime_type, data } => {
                ClientFrame::RealtimeInput(RealtimeInput {
                    media_chunks: vec![InlineData {
                        mime_type: mime_type.clone(),
                        data: BASE64.encode(data),
                    }],
                })
            }
            LiveMessage::ToolResponse {
                call_id,
                name,
                result,
            } => ClientFrame::ToolResponse(ToolResponse {
                function_responses: vec![FunctionResponse {
                    id: call_id.clone(),
                    name: name.clone(),
                    response: result.clone(),
                }],
            }),
            LiveMessage::ClientContent {
                text,
                turn_complete,
            } => ClientFrame::ClientContent(ClientContent {
                turns: vec![Content::user_text(text.clone())],
                turn_complete: *turn_complete,
            }),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) setup_complete: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) tool_call: Option<ServerToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) go_away: Option<GoAway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<ServerError>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) model_turn: Option<Content>,
    #[serde(default)]
    pub(crate) turn_complete: bool,
    #[serde(default)]
    pub(crate) interrupted: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerToolCall {
    #[serde(default)]
    pub(crate) function_calls: Vec<FunctionCall>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct FunctionCall {
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: serde_json::Value,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoAway {
    #[serde(default)]
    pub(crate) time_left: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct ServerError {
    #[serde(default)]
    pub(crate) message: String,
}

impl ServerFrame {
    pub(crate) fn parse(raw: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(raw).map_err(|e| e.to_string())
    }

    pub(crate) fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Anything besides audio is worth a traffic log line.
    pub(crate) fn is_loggable(&self) -> bool {
        self.tool_call.is_some() || self.go_away.is_some() || self.error.is_some()
    }

    /// Demultiplex into events in the order they appear in the frame.
    pub(crate) fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();

        if let Some(content) = self.server_content {
            for part in content.model_turn.map(|t| t.parts).unwrap_or_default() {
                if let Some(inline) = part.inline_data {
                    events.push(decode_audio(inline));
                }
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        events.push(LiveEvent::TextDelta { text });
                    }
                }
            }
            if content.interrupted {
                events.push(LiveEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(LiveEvent::TurnComplete);
            }
        }

        if let Some(tool_call) = self.tool_call {
            for (index, call) in tool_call.function_calls.into_iter().enumerate() {
                events.push(LiveEvent::ToolCall {
                    call_id: call.id.unwrap_or_else(|| format!("{}-{}", call.name, index)),
                    name: call.name,
                    args: call.args,
                });
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(LiveEvent::Error {
                kind: LiveEventKind::GoAway,
                message: format!(
                    "server closing soon (time left: {})",
                    go_away.time_left.as_deref().unwrap_or("unknown")
                ),
            });
        }

        if let Some(error) = self.error {
            events.push(LiveEvent::Error {
                kind: LiveEventKind::Server,
                message: error.message,
            });
        }

        events
    }
}

fn decode_audio(inline: InlineData) -> LiveEvent {
    if !inline.mime_type.starts_with("audio/") {
        return LiveEvent::Error {
            kind: LiveEventKind::Protocol,
            message: format!("unexpected inline media type {}", inline.mime_type),
        };
    }
    match BASE64.decode(inline.data.as_bytes()) {
        Ok(data) => LiveEvent::AudioChunk {
            data,
            sample_rate: sample_rate_from_mime(&inline.mime_type),
        },
        Err(e) => LiveEvent::Error {
            kind: LiveEventKind::Protocol,
            message: format!("audio payload is not base64: {}", e),
        },
    }
}

/// `audio/pcm;rate=16000` -> 16000
pub(crate) fn sample_rate_from_mime(mime: &str) -> u32 {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
        .unwrap_or(DEFAULT_OUTPUT_RATE)
}
