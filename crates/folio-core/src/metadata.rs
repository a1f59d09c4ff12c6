//! Filename → bibliographic record.
//!
//! File names follow `<genre>_<author> — <title>`; the author segment may be
//! empty. Anything else becomes a title-only record whose genre is taken from
//! the containing folder.
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::lookup::LookupTables;
use crate::types::BibliographicRecord;

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([^_]+)_([^—]*) — (.+)$").unwrap_or_else(|e| panic!("filename pattern: {e}"))
    })
}

/// Split `name` into stem and lowercase extension (without the dot).
pub fn split_extension(name: &str) -> (&str, String) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], name[pos + 1..].to_lowercase()),
        _ => (name, String::new()),
    }
}

/// Best-effort record for `source_name` found in folder `folder`.
///
/// Never fails; callers that need a title must check `title.is_empty()`.
pub fn extract_record(source_name: &str, folder: &str, tables: &LookupTables) -> BibliographicRecord {
    let (stem, _) = split_extension(source_name);
    let folder = tables.folder(folder).to_string();

    let (genre, author, title) = match filename_pattern().captures(stem) {
        Some(caps) => {
            let raw_genre = caps.get(1).map_or("", |m| m.as_str());
            let genre = tables
                .genre(raw_genre)
                .map_or_else(|| raw_genre.trim().to_string(), str::to_string);
            let author = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            let title = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
            (genre, author, title)
        }
        None => (String::new(), String::new(), stem.trim().to_string()),
    };

    let genre = if genre.is_empty() { folder.clone() } else { genre };

    BibliographicRecord {
        source_id: Uuid::new_v4(),
        source_name: source_name.to_string(),
        genre,
        author,
        title,
        folder,
    }
}

/// Name of the directory directly containing `path`, or an empty string.
pub fn folder_of(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
