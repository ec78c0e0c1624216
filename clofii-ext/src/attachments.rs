use crate::{ExtractionError, extract_text};
use base64::Engine;

/// A file relayed by a front-end: declared type plus base64 content.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// MIME type or original file name
    pub declared: String,
    pub data: String,
}

impl Attachment {
    pub fn new(declared: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            declared: declared.into(),
            data: data.into(),
        }
    }
}

pub fn extract_attachment(attachment: &Attachment) -> Result<String, ExtractionError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(attachment.data.trim())
        .map_err(|e| ExtractionError::Corrupt {
            format: "attachment",
            reason: format!("invalid base64: {}", e),
        })?;
    extract_text(&bytes, &attachment.declared)
}
