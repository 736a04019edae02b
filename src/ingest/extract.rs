//! Text extraction for the supported document formats.
//!
//! The ingestion boundary accepts {pdf, txt, docx, md, csv}; anything
//! else is ignored upstream. Extraction failures are per-document and
//! reported as errors for the caller to log and skip.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Extensions the ingestion boundary accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "txt", "docx", "md", "csv"];

const MAX_DOCX_XML_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("file is not valid UTF-8")]
    Encoding,
}

pub fn is_supported(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

/// Extracts plain text from a file by extension. PDF text keeps its
/// form-feed page breaks so the chunker can attribute page numbers.
pub fn extract_text(path: &Path, ext: &str) -> Result<String, ExtractError> {
    match ext {
        "pdf" => extract_pdf(path),
        "docx" => extract_docx(path),
        // txt/md/csv are UTF-8 text as far as ingestion is concerned.
        _ => read_utf8(path),
    }
}

fn read_utf8(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| ExtractError::Encoding)
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        entry
            .take(MAX_DOCX_XML_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
    }
    if doc_xml.len() as u64 >= MAX_DOCX_XML_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_body_text(&doc_xml)
}

/// Pulls `w:t` runs out of the document body, one line per paragraph.
fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::Text(e)) if in_text_run => {
                out.push_str(e.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
