//! Permissive `.docx` reader for containers whose XML does not parse.
//!
//! Paragraphs and text runs are located with regular expressions over the raw
//! `word/document.xml` bytes, so unbalanced or truncated markup still yields
//! whatever text is recognizable.
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use folio_core::Result;

use super::{decode_entities, open_zip, require_member, PARAGRAPH_BREAK};

fn paragraph_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<w:p(?:\s[^>]*[^/])?>(.*?)</w:p>").unwrap_or_else(|e| panic!("paragraph pattern: {e}"))
    })
}

fn text_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*[^/])?>(.*?)</w:t>").unwrap_or_else(|e| panic!("text pattern: {e}"))
    })
}

pub(super) fn extract(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_zip(path)?;
    let xml = require_member(&mut archive, "word/document.xml")?;
    Ok(paragraphs(&String::from_utf8_lossy(&xml)))
}

fn paragraphs(xml: &str) -> Vec<String> {
    paragraph_pattern()
        .captures_iter(xml)
        .filter_map(|p| {
            let body = p.get(1)?.as_str();
            let text: String = text_pattern()
                .captures_iter(body)
                .filter_map(|t| t.get(1))
                .map(|t| decode_entities(t.as_str()))
                .collect();
            (!text.is_empty()).then(|| text + PARAGRAPH_BREAK)
        })
        .collect()
}
