//! PDF text extraction

use sha2::{Digest, Sha256};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, Result};

/// Replace typographic characters PDF fonts commonly emit with ASCII
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace(['\u{2010}', '\u{2011}', '\u{2013}'], "-")
        .replace('\u{2014}', "--")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain text extracted from a PDF
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Extracted text, pages in document order
    pub content: String,
    /// Total pages
    pub total_pages: Option<u32>,
    /// SHA-256 of the PDF bytes
    pub content_hash: String,
}

/// PDF text extractor
pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract plain text from PDF bytes.
    ///
    /// Uses `pdf-extract` first and falls back to page-by-page `lopdf`
    /// extraction when it fails or yields nothing.
    pub fn extract(filename: &str, data: &[u8]) -> Result<ExtractedText> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(filename, format!("Failed to load PDF: {}", e)))?;

        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(Error::extraction(filename, "PDF is encrypted"));
        }

        let pages = doc.get_pages();
        let total_pages = Some(pages.len() as u32);

        let primary = match Self::extract_with_pdf_extract(data) {
            Ok(text) => cleanup_pdf_text(&text),
            Err(message) => {
                tracing::warn!("pdf-extract failed for {}: {}, trying fallback", filename, message);
                String::new()
            }
        };

        let content = if primary.is_empty() {
            let mut all_text = Vec::with_capacity(pages.len());
            // BTreeMap keys iterate in page order
            for page_number in pages.keys() {
                match doc.extract_text(&[*page_number]) {
                    Ok(text) => all_text.push(text),
                    Err(e) => tracing::debug!("Could not extract page {}: {}", page_number, e),
                }
            }
            cleanup_pdf_text(&all_text.join("\n"))
        } else {
            primary
        };

        if content.is_empty() {
            return Err(Error::extraction(
                filename,
                "No text content could be extracted from PDF (image-based or empty)",
            ));
        }

        Ok(ExtractedText {
            content,
            total_pages,
            content_hash: hex::encode(Sha256::digest(data)),
        })
    }

    /// pdf-extract panics on some malformed font tables
    fn extract_with_pdf_extract(data: &[u8]) -> std::result::Result<String, String> {
        match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("extractor panicked".to_string()),
        }
    }
}
