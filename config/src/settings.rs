//! Application settings management

use crate::{crypto, PathManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Provider key under which the Gemini API key is stored.
pub const GEMINI_PROVIDER: &str = "gemini";

/// Which interviewer script the live agent is seeded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstructionStyleSetting {
    /// Walk through the generated questions, with follow-ups.
    #[default]
    Structured,
    /// Rapport-first conversation that covers the questions loosely.
    Conversational,
}

/// Application settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model used for the live interview session
    pub live_model: String,
    /// Model used to generate interview questions
    pub question_model: String,
    /// Prebuilt voice the agent speaks with
    pub voice_name: String,
    pub instruction_style: InstructionStyleSetting,
    /// Number of questions requested from the generator
    pub question_count: usize,
    /// Forward camera frames to the agent
    pub video_input: bool,
    /// Capacity of the drop-oldest media queue in front of the transport
    pub media_queue_capacity: usize,
    /// Capacity of the client's outbound channel
    pub outbound_buffer: usize,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    /// How long farewell audio may keep playing after the agent concludes
    pub conclude_grace_ms: u64,
    /// Base URL for REST calls (question generation)
    pub rest_base_url: String,
    /// Base URL for the live WebSocket endpoint
    pub live_base_url: String,
    /// Encrypted API keys (provider name -> sealed key)
    pub api_keys: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            live_model: "models/gemini-2.0-flash-exp".to_string(),
            question_model: "models/gemini-2.0-flash-exp".to_string(),
            voice_name: "Aoede".to_string(),
            instruction_style: InstructionStyleSetting::default(),
            question_count: 10,
            video_input: false,
            media_queue_capacity: 8,
            outbound_buffer: 32,
            connect_timeout_ms: 15_000,
            disconnect_timeout_ms: 3_000,
            conclude_grace_ms: 2_500,
            rest_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            live_base_url: "wss://generativelanguage.googleapis.com".to_string(),
            api_keys: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the settings file, or return defaults if not found
    pub fn load() -> Self {
        match PathManager::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A missing or malformed file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring malformed settings at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to the settings file
    pub fn save(&self) -> Result<(), String> {
        let path = PathManager::settings_path().ok_or("Could not determine settings path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
    }

    /// Get a decrypted API key for a provider.
    /// Returns None if not set or decryption fails.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        let sealed = self.api_keys.get(provider)?;
        match crypto::open(sealed) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("Stored {} API key is unusable: {}", provider, e);
                None
            }
        }
    }

    /// Set an API key for a provider (encrypts before storing).
    pub fn set_api_key(&mut self, provider: &str, api_key: &str) -> Result<(), String> {
        let sealed = crypto::seal(api_key).map_err(|e| e.to_string())?;
        self.api_keys.insert(provider.to_string(), sealed);
        Ok(())
    }

    pub fn remove_api_key(&mut self, provider: &str) {
        self.api_keys.remove(provider);
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn conclude_grace(&self) -> Duration {
        Duration::from_millis(self.conclude_grace_ms)
    }
}
