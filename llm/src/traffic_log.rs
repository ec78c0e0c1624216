//! Traffic logging for provider calls
//!
//! Appends non-media wire traffic (setup frames, tool calls, tool responses,
//! REST requests) to clofii.log. Content is truncated so resumes and answers
//! do not end up in logs verbatim. Audio and video chunks are never logged.

use config::PathManager;
use std::io::Write;

/// Maximum characters to log for content (to protect privacy)
const MAX_CONTENT_LOG_CHARS: usize = 200;

/// Truncate a string for logging, adding ellipsis if truncated
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars total)", truncated, char_count)
    }
}

fn summarize(payload: &impl serde::Serialize) -> String {
    let json =
        serde_json::to_string(payload).unwrap_or_else(|_| "<serialization error>".to_string());
    truncate_for_log(&json, MAX_CONTENT_LOG_CHARS)
}

/// A REST request (question generation)
pub fn log_request(model: &str, request: &impl serde::Serialize) {
    log_traffic("REST", "REQUEST", &format!("[{}] {}", model, summarize(request)));
}

pub fn log_response(model: &str, response: &impl serde::Serialize) {
    log_traffic("REST", "RESPONSE", &format!("[{}] {}", model, summarize(response)));
}

pub fn log_error(model: &str, error: &str) {
    log_traffic("REST", "ERROR", &format!("[{}] {}", model, error));
}

/// An outbound live frame (setup, tool response, client text)
pub fn log_live_outbound(model: &str, frame: &impl serde::Serialize) {
    log_traffic("LIVE", "SEND", &format!("[{}] {}", model, summarize(frame)));
}

/// An inbound live frame that is not audio
pub fn log_live_inbound(model: &str, frame: &impl serde::Serialize) {
    log_traffic("LIVE", "RECV", &format!("[{}] {}", model, summarize(frame)));
}

fn log_traffic(channel: &str, event_type: &str, message: &str) {
    if let Some(log_path) = PathManager::log_file_path() {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let _ = writeln!(
                file,
                "[{}] [TRAFFIC] [{}] [{}] {}",
                timestamp, channel, event_type, message
            );
        }
    }
}
