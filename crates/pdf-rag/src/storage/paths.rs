//! Mapping from document names to store directories

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 128;

/// Derive the store name for a document.
///
/// A trailing `.pdf` (any case) is stripped, then every character outside
/// `[A-Za-z0-9._-]` becomes `_` so the name is always a single path segment.
pub fn document_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let stem = match trimmed.len().checked_sub(4) {
        Some(cut) if trimmed.is_char_boundary(cut) && trimmed[cut..].eq_ignore_ascii_case(".pdf") => {
            &trimmed[..cut]
        }
        _ => trimmed,
    };

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Leading dots would hide the store from listings (and allow "..")
    let name: String = sanitized.trim_start_matches('.').chars().take(MAX_NAME_LEN).collect();

    if name.is_empty() || name.chars().all(|c| c == '_') {
        return Err(Error::InvalidDocumentName {
            name: raw.to_string(),
        });
    }

    Ok(name)
}

/// Store directory for an already sanitized name
pub fn store_location(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

/// Store directory for a raw document name
pub fn location_for(root: &Path, raw: &str) -> Result<PathBuf> {
    Ok(store_location(root, &document_name(raw)?))
}
