use std::path::Path;

use folio_core::Result;

use super::{malformed, split_blocks};

/// Text layer of a PDF, split into paragraphs on blank lines and page breaks.
pub(super) fn extract(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    let text = pdf_extract::extract_text_from_mem(&bytes).map_err(malformed)?;
    Ok(split_blocks(&text))
}
