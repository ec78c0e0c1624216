//! Document text extraction for clofii - resumes and job descriptions.
//!
//! Callers hand over raw bytes plus a declared MIME type or file name and get
//! plain text back; nothing downstream ever sees file bytes.

pub mod attachments;
pub mod docx;
pub mod pdf;

pub use attachments::{Attachment, extract_attachment};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported file type '{0}'; upload a PDF, Word (.docx) or text file")]
    UnsupportedFormat(String),
    #[error("no text could be extracted from the {0}")]
    EmptyExtraction(&'static str),
    #[error("the {format} could not be read: {reason}")]
    Corrupt {
        format: &'static str,
        reason: String,
    },
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    /// Classify a MIME type (`application/pdf`) or file name (`resume.docx`).
    pub fn detect(declared: &str) -> Option<Self> {
        let declared = declared.trim().to_lowercase();
        let mime = declared.split(';').next().unwrap_or("").trim();

        if mime == "application/pdf" || declared.ends_with(".pdf") {
            Some(DocumentFormat::Pdf)
        } else if mime == DOCX_MIME || declared.ends_with(".docx") {
            Some(DocumentFormat::Docx)
        } else if mime.starts_with("text/")
            || [".txt", ".md", ".markdown"]
                .iter()
                .any(|ext| declared.ends_with(ext))
        {
            Some(DocumentFormat::PlainText)
        } else {
            None
        }
    }

    fn label(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "Word document",
            DocumentFormat::PlainText => "text file",
        }
    }
}

/// Extract plain text from `bytes`, whose type is given by `declared`.
pub fn extract_text(bytes: &[u8], declared: &str) -> Result<String, ExtractionError> {
    let format = DocumentFormat::detect(declared)
        .ok_or_else(|| ExtractionError::UnsupportedFormat(declared.to_string()))?;

    let text = match format {
        DocumentFormat::Pdf => pdf::extract_pdf_text(bytes)?,
        DocumentFormat::Docx => docx::extract_docx_text(bytes)?,
        DocumentFormat::PlainText => decode_text(bytes),
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(ExtractionError::EmptyExtraction(format.label()));
    }
    debug!("Extracted {} chars from {}", text.len(), format.label());
    Ok(text.to_string())
}

/// UTF-8 with an optional BOM; invalid sequences are replaced.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_mime_and_name() {
        assert_eq!(DocumentFormat::detect("application/pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::detect("Resume.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::detect(DOCX_MIME), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::detect("cv.docx"), Some(DocumentFormat::Docx));
        assert_eq!(
            DocumentFormat::detect("text/plain; charset=utf-8"),
            Some(DocumentFormat::PlainText)
        );
        assert_eq!(DocumentFormat::detect("job.md"), Some(DocumentFormat::PlainText));
        assert_eq!(DocumentFormat::detect("application/msword"), None);
        assert_eq!(DocumentFormat::detect("photo.png"), None);
    }

    #[test]
    fn test_plain_text_strips_bom_and_whitespace() {
        let bytes = b"\xEF\xBB\xBF  Senior engineer\n";
        assert_eq!(extract_text(bytes, "text/plain").unwrap(), "Senior engineer");
    }

    #[test]
    fn test_unsupported_format() {
        assert_eq!(
            extract_text(b"GIF89a", "image/gif"),
            Err(ExtractionError::UnsupportedFormat("image/gif".into()))
        );
    }

    #[test]
    fn test_blank_text_is_empty_extraction() {
        assert_eq!(
            extract_text(b" \n\t ", "notes.txt"),
            Err(ExtractionError::EmptyExtraction("text file"))
        );
    }

    #[test]
    fn test_garbage_pdf_is_corrupt() {
        let err = extract_text(b"definitely not a pdf", "resume.pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt { format: "PDF", .. }));
    }
}
