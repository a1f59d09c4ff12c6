//! Document-format readers.
//!
//! Each reader decodes a whole container into raw paragraphs (markup removed,
//! every paragraph terminated by a blank line) and hands them to the engine as
//! a [`VecReader`]. Decoding runs on the blocking pool.
mod broken_docx;
mod docx;
mod epub;
mod pdf;
mod text;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::warn;

use folio_core::metadata::split_extension;
use folio_core::traits::VecReader;
use folio_core::{Error, Result};

pub(crate) const PARAGRAPH_BREAK: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Docx,
    Pdf,
    Epub,
    Txt,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_extension(&split_extension(name).1)
    }

    /// Book container formats accepted by every run mode. Plain text is only
    /// picked up when walking a directory.
    pub fn is_container(self) -> bool {
        !matches!(self, Self::Txt)
    }
}

/// Per-format switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Retry unparseable `.docx` files with the permissive regex reader.
    pub broken_docx_mode: bool,
    pub pdf_mode: bool,
    pub epub_mode: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { broken_docx_mode: false, pdf_mode: true, epub_mode: true }
    }
}

impl From<&folio_core::config::Settings> for ReaderOptions {
    fn from(settings: &folio_core::config::Settings) -> Self {
        Self {
            broken_docx_mode: settings.broken_docx_mode,
            pdf_mode: settings.pdf_mode,
            epub_mode: settings.epub_mode,
        }
    }
}

/// Decode `path` (named `name` for diagnostics) into a paragraph reader.
pub async fn open_reader(path: &Path, name: &str, format: DocumentFormat, options: ReaderOptions) -> Result<VecReader> {
    let path = path.to_path_buf();
    let name = name.to_string();
    let paragraphs = tokio::task::spawn_blocking(move || extract(&path, &name, format, options))
        .await
        .map_err(|e| Error::Operation(format!("reader task failed: {e}")))??;
    Ok(VecReader::new(paragraphs))
}

/// Blocking body of [`open_reader`].
pub fn extract(path: &Path, name: &str, format: DocumentFormat, options: ReaderOptions) -> Result<Vec<String>> {
    match format {
        DocumentFormat::Docx => match docx::extract(path) {
            Err(Error::MalformedDocument(reason)) if options.broken_docx_mode => {
                warn!(file = name, %reason, "docx did not parse, retrying with the permissive reader");
                broken_docx::extract(path)
                    .map_err(|e| Error::MalformedDocument(format!("{name}: permissive reader failed too: {e}")))
            }
            other => other.map_err(|e| annotate(name, e)),
        },
        DocumentFormat::Pdf if !options.pdf_mode => {
            Err(Error::UnsupportedFormat(format!("{name}: PDF processing is disabled")))
        }
        DocumentFormat::Pdf => pdf::extract(path).map_err(|e| annotate(name, e)),
        DocumentFormat::Epub if !options.epub_mode => {
            Err(Error::UnsupportedFormat(format!("{name}: EPUB processing is disabled")))
        }
        DocumentFormat::Epub => epub::extract(path).map_err(|e| annotate(name, e)),
        DocumentFormat::Txt => text::extract(path).map_err(|e| annotate(name, e)),
    }
}

fn annotate(name: &str, err: Error) -> Error {
    match err {
        Error::MalformedDocument(reason) => Error::MalformedDocument(format!("{name}: {reason}")),
        other => other,
    }
}

/// Split text on blank lines and form feeds into trimmed paragraphs ending in
/// a paragraph break. Line breaks inside a paragraph become spaces.
pub(crate) fn split_blocks(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut flush = |current: &mut String| {
        if !current.is_empty() {
            current.push_str(PARAGRAPH_BREAK);
            paragraphs.push(std::mem::take(current));
        }
    };
    for page in text.split('\x0C') {
        for line in page.lines() {
            let line = line.trim();
            if line.is_empty() {
                flush(&mut current);
                continue;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line);
        }
        flush(&mut current);
    }
    paragraphs
}

fn malformed(err: impl std::fmt::Display) -> Error {
    Error::MalformedDocument(err.to_string())
}

type Zip = zip::ZipArchive<File>;

fn open_zip(path: &Path) -> Result<Zip> {
    zip::ZipArchive::new(File::open(path)?).map_err(malformed)
}

/// Bytes of the archive member `name`, matching `\`-separated names too.
fn read_member(archive: &mut Zip, name: &str) -> Result<Option<Vec<u8>>> {
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(malformed)?;
        if file.name().replace('\\', "/") == name {
            let mut bytes = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
            file.read_to_end(&mut bytes)?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

fn require_member(archive: &mut Zip, name: &str) -> Result<Vec<u8>> {
    read_member(archive, name)?.ok_or_else(|| Error::MalformedDocument(format!("{name} not found in archive")))
}

/// Join a relative archive reference onto the directory of `base`.
fn resolve_member(base: &str, href: &str) -> String {
    let mut parts: Vec<&str> = base.split('/').collect();
    parts.pop();
    for segment in href.split('#').next().unwrap_or("").split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.retain(|p| !p.is_empty());
    parts.join("/")
}

/// Minimal XML entity decoding for text pulled out with regexes.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;
    use std::path::Path;

    use zip::write::SimpleFileOptions;

    pub fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_follow_extension_case_insensitively() {
        assert_eq!(DocumentFormat::from_name("Book.DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_name("a.b.epub"), Some(DocumentFormat::Epub));
        assert_eq!(DocumentFormat::from_name("notes.txt"), Some(DocumentFormat::Txt));
        assert_eq!(DocumentFormat::from_name("image.png"), None);
        assert_eq!(DocumentFormat::from_name(".gitignore"), None);
        assert!(!DocumentFormat::Txt.is_container());
        assert!(DocumentFormat::Pdf.is_container());
    }

    #[test]
    fn blocks_split_on_blank_lines_and_form_feeds() {
        let text = "First line\nstill first\n\n\nSecond\x0CThird page\n  \n";
        assert_eq!(
            split_blocks(text),
            vec!["First line still first\n\n", "Second\n\n", "Third page\n\n"]
        );
        assert!(split_blocks(" \n\n ").is_empty());
        assert_eq!(split_blocks("end of page\x0C\x0Cnext\r\nline"), vec!["end of page\n\n", "next line\n\n"]);
    }

    #[test]
    fn members_resolve_relative_to_base() {
        assert_eq!(resolve_member("OEBPS/content.opf", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_member("OEBPS/content.opf", "../ch2.xhtml#top"), "ch2.xhtml");
        assert_eq!(resolve_member("content.opf", "ch3.xhtml"), "ch3.xhtml");
    }

    #[test]
    fn entities_decode_once() {
        assert_eq!(decode_entities("a &amp;lt; b &lt; c"), "a &lt; b < c");
    }

    #[test]
    fn disabled_formats_are_unsupported() {
        let options = ReaderOptions { pdf_mode: false, epub_mode: false, ..ReaderOptions::default() };
        let pdf = extract(Path::new("/nonexistent.pdf"), "x.pdf", DocumentFormat::Pdf, options);
        assert!(matches!(pdf, Err(Error::UnsupportedFormat(_))));
        let epub = extract(Path::new("/nonexistent.epub"), "x.epub", DocumentFormat::Epub, options);
        assert!(matches!(epub, Err(Error::UnsupportedFormat(_))));
    }
}
