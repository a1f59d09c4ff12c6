//! Domain types shared by the reassembly engine, the ingestion pipeline and
//! the storage sink.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bibliographic metadata derived once per source file from its name.
///
/// - `source_id`: fresh identifier assigned when the file is picked up
/// - `source_name`: original file name, extension included
/// - `genre`/`author`/`title`: parsed from `<genre>_<author> — <title>`
/// - `folder`: containing folder after folder-name mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    pub source_id: Uuid,
    pub source_name: String,
    pub genre: String,
    pub author: String,
    pub title: String,
    pub folder: String,
}

/// One emitted, size-bounded unit of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: Uuid,
    pub source_name: String,
    pub genre: String,
    pub author: String,
    pub book_title: String,
    pub content: String,
    /// 1-based, contiguous within a document.
    pub sequence_index: u64,
    pub char_count: u64,
    pub word_count: u64,
    pub language: String,
    pub ocr_quality: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorEntry {
    pub name: String,
    pub entry_type: String,
    pub role: String,
    pub description: String,
    pub avatar_file: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AuthorEntry {
    pub fn from_record(record: &BibliographicRecord) -> Self {
        let now = Utc::now().timestamp();
        Self {
            name: record.author.clone(),
            entry_type: BOOK_ENTRY.to_string(),
            role: String::new(),
            description: String::new(),
            avatar_file: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub entry_type: String,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CategoryEntry {
    pub fn from_record(record: &BibliographicRecord) -> Self {
        let now = Utc::now().timestamp();
        Self {
            name: record.genre.clone(),
            entry_type: BOOK_ENTRY.to_string(),
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEntry {
    pub title: String,
    pub entry_type: String,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TitleEntry {
    pub fn from_record(record: &BibliographicRecord) -> Self {
        let now = Utc::now().timestamp();
        Self {
            title: record.title.clone(),
            entry_type: BOOK_ENTRY.to_string(),
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

const BOOK_ENTRY: &str = "book";

/// The record shapes a storage sink accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Chunk,
    Author,
    Category,
    Title,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [Self::Chunk, Self::Author, Self::Category, Self::Title];

    /// Name of the backing table for this kind.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Chunk => "chunks",
            Self::Author => "authors",
            Self::Category => "categories",
            Self::Title => "titles",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// An ordered group of same-kind records handed to the sink in one bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Chunks(Vec<Chunk>),
    Authors(Vec<AuthorEntry>),
    Categories(Vec<CategoryEntry>),
    Titles(Vec<TitleEntry>),
}

impl Batch {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Chunks(_) => RecordKind::Chunk,
            Self::Authors(_) => RecordKind::Author,
            Self::Categories(_) => RecordKind::Category,
            Self::Titles(_) => RecordKind::Title,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Chunks(v) => v.len(),
            Self::Authors(v) => v.len(),
            Self::Categories(v) => v.len(),
            Self::Titles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Size targets for the reassembly engine, in Unicode codepoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkLimits {
    pub min: usize,
    pub optimal: usize,
    pub max: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self { min: 300, optimal: 1800, max: 3500 }
    }
}

impl ChunkLimits {
    pub fn new(min: usize, optimal: usize, max: usize) -> crate::Result<Self> {
        let limits = Self { min, optimal, max };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.min >= self.optimal || self.optimal >= self.max {
            return Err(crate::Error::InvalidConfig(format!(
                "chunk limits must satisfy min < optimal < max (got {}/{}/{})",
                self.min, self.optimal, self.max
            )));
        }
        Ok(())
    }

    /// Upper edge of the "keep growing" band.
    pub(crate) fn optimal_band(&self) -> f64 {
        self.optimal as f64 * 1.05
    }
}

/// How base64-looking artifacts are removed from emitted chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripMode {
    #[default]
    Off,
    Single,
    Recursive,
}
