//! PDF text extraction

use crate::ExtractionError;
use tracing::warn;

/// Extract the text layer of a PDF. Scanned PDFs without one yield an empty
/// string, which the caller reports as an empty extraction.
pub fn extract_pdf_text(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => Ok(normalize(&text)),
        Err(e) => {
            warn!("PDF text extraction failed: {}", e);
            Err(ExtractionError::Corrupt {
                format: "PDF",
                reason: e.to_string(),
            })
        }
    }
}

/// Trim each line and collapse runs of blank lines left by page breaks.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
