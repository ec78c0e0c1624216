//! Word (.docx) text extraction
//!
//! A .docx file is a zip archive; the body text lives in `word/document.xml`
//! as `<w:t>` runs grouped into `<w:p>` paragraphs.

use crate::ExtractionError;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};

const DOCUMENT_PART: &str = "word/document.xml";

fn corrupt(reason: impl ToString) -> ExtractionError {
    ExtractionError::Corrupt {
        format: "Word document",
        reason: reason.to_string(),
    }
}

pub fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| corrupt(format!("{}: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(corrupt)?;
    document_text(&xml)
}

/// Paragraphs become lines; tabs and breaks are kept.
fn document_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => out.push_str(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) if in_text => {
                if let Some(c) = resolve_entity(&String::from_utf8_lossy(&e)) {
                    out.push(c);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// The predefined XML entities and numeric character references.
fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}
