//! `.epub` reader: container → OPF package → spine documents in reading order.
use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

use folio_core::{Error, Result};

use super::{malformed, open_zip, read_member, require_member, resolve_member, PARAGRAPH_BREAK};

const CONTAINER: &str = "META-INF/container.xml";

/// Elements whose text forms one paragraph.
const BLOCKS: &[&[u8]] = &[
    b"p", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"li", b"blockquote", b"pre", b"dt", b"dd",
];

pub(super) fn extract(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_zip(path)?;

    let container = require_member(&mut archive, CONTAINER)?;
    let package_path = rootfile(&String::from_utf8_lossy(&container))?;
    let package = require_member(&mut archive, &package_path)?;
    let spine = spine_documents(&String::from_utf8_lossy(&package))?;

    let mut out = Vec::new();
    for href in spine {
        let member = resolve_member(&package_path, &href);
        match read_member(&mut archive, &member)? {
            Some(xhtml) => out.extend(block_text(&String::from_utf8_lossy(&xhtml))),
            None => tracing::warn!(member = %member, "spine item missing from epub"),
        }
    }
    Ok(out)
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `full-path` of the first `rootfile` in `META-INF/container.xml`.
fn rootfile(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(Error::MalformedDocument(format!("{CONTAINER} names no rootfile")))
}

/// Hrefs of the spine items, in reading order.
fn spine_documents(opf: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(opf);
    let mut manifest: HashMap<String, String> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute(&e, b"id"), attribute(&e, b"href")) {
                        manifest.insert(id, href);
                    }
                }
                b"itemref" => order.extend(attribute(&e, b"idref")),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    if order.is_empty() {
        return Err(Error::MalformedDocument("package has an empty spine".into()));
    }
    Ok(order.into_iter().filter_map(|id| manifest.get(&id).cloned()).collect())
}

fn decode(t: &BytesText<'_>) -> String {
    t.unescape_with(|entity| match entity {
        "nbsp" => Some("\u{a0}"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "hellip" => Some("…"),
        "laquo" => Some("«"),
        "raquo" => Some("»"),
        "shy" => Some(""),
        _ => None,
    })
    .map(|s| s.into_owned())
    .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned())
}

/// Text of block-level elements. Nested blocks fold into their outermost one;
/// markup errors end the document early rather than failing it.
fn block_text(xhtml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xhtml);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut paragraph = String::new();
    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "stopping at malformed xhtml");
                break;
            }
        };
        match event {
            Event::Start(e) if BLOCKS.contains(&e.local_name().as_ref()) => depth += 1,
            Event::Empty(e) if depth > 0 && e.local_name().as_ref() == b"br" => paragraph.push(' '),
            Event::Text(t) if depth > 0 => paragraph.push_str(&decode(&t)),
            Event::CData(t) if depth > 0 => paragraph.push_str(&String::from_utf8_lossy(&t)),
            Event::End(e) if depth > 0 && BLOCKS.contains(&e.local_name().as_ref()) => {
                depth -= 1;
                if depth == 0 {
                    let text = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !text.is_empty() {
                        out.push(text + PARAGRAPH_BREAK);
                    }
                    paragraph.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    out
}
