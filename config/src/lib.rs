//! Paths, settings and environment loading for clofii.

pub mod crypto;
pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::{InstructionStyleSetting, Settings, GEMINI_PROVIDER};

/// Environment variable consulted before the settings file for the Gemini key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Load environment variables from .env files.
/// ./.env is loaded before ~/.env; variables already set are never
/// overwritten, so project values win over home values.
/// Call this before parsing CLI args so `env = ...` clap attributes see them.
pub fn load_env_file() {
    dotenv::dotenv().ok();
    if let Some(home) = dirs::home_dir() {
        dotenv::from_path(home.join(".env")).ok();
    }
}

/// Resolve the Gemini API key: environment first, then the encrypted settings entry.
pub fn resolve_api_key(settings: &Settings) -> Option<String> {
    match std::env::var(GEMINI_API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Some(key.trim().to_string()),
        _ => settings.get_api_key(GEMINI_PROVIDER),
    }
}
