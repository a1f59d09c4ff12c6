use std::path::Path;

use folio_core::Result;

use super::split_blocks;

/// Plain text with blank-line separated paragraphs; invalid UTF-8 is replaced.
pub(super) fn extract(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    Ok(split_blocks(&text))
}
