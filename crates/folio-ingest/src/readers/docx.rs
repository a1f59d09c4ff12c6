//! `.docx` reader: a strict walk over `word/document.xml`.
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use folio_core::{Error, Result};

use super::{malformed, open_zip, require_member, PARAGRAPH_BREAK};

const DOCUMENT: &str = "word/document.xml";

pub(super) fn extract(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_zip(path)?;
    let xml = require_member(&mut archive, DOCUMENT)?;
    let xml = std::str::from_utf8(&xml).map_err(malformed)?;
    paragraphs(xml)
}

/// Text of every `w:p`, concatenating its `w:t` runs. Tabs and breaks inside a
/// paragraph are kept as whitespace; empty paragraphs are dropped.
fn paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = Vec::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::MalformedDocument(format!("{DOCUMENT}: {e} at byte {}", reader.buffer_position())))?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::Start(e) if e.name().as_ref() == b"w:p" => paragraph.clear(),
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => paragraph.push('\t'),
                b"w:br" | b"w:cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape().map_err(malformed)?),
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if !paragraph.trim().is_empty() {
                        paragraph.push_str(PARAGRAPH_BREAK);
                        out.push(std::mem::take(&mut paragraph));
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::fixtures::write_zip;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>Глава</w:t></w:r><w:r><w:t xml:space="preserve"> первая</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Tom &amp; Jerry</w:t><w:tab/><w:t>end</w:t></w:r></w:p>
<w:p><w:r><w:t>   </w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn runs_join_into_paragraphs() {
        let paragraphs = paragraphs(BODY).unwrap();
        assert_eq!(paragraphs, vec!["Глава первая\n\n", "Tom & Jerry\tend\n\n"]);
    }

    #[test]
    fn mismatched_tags_are_malformed() {
        let broken = "<w:document><w:body><w:p><w:r><w:t>text</w:r></w:p></w:body></w:document>";
        assert!(matches!(paragraphs(broken), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn reads_from_zip_container() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("book.docx");
        write_zip(&path, &[("[Content_Types].xml", "<Types/>"), (DOCUMENT, BODY)]);
        assert_eq!(extract(&path).unwrap().len(), 2);
    }

    #[test]
    fn missing_document_part_is_malformed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.docx");
        write_zip(&path, &[("[Content_Types].xml", "<Types/>")]);
        assert!(matches!(extract(&path), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn non_zip_file_is_malformed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fake.docx");
        std::fs::write(&path, "not a zip").unwrap();
        assert!(matches!(extract(&path), Err(Error::MalformedDocument(_))));
    }
}
