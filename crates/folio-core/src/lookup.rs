//! Genre and folder lookup tables.
//!
//! Both tables are plain string→string maps supplied fully materialized to the
//! metadata extractor. A missing entry is never an error.
use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    genres: HashMap<String, String>,
    folders: HashMap<String, String>,
}

impl LookupTables {
    pub fn new(genres: HashMap<String, String>, folders: HashMap<String, String>) -> Self {
        Self { genres, folders }
    }

    /// Load the genre CSV and folder YAML. Unreadable files are logged and
    /// treated as empty tables.
    pub fn load(genres_csv: Option<&Path>, folders_yaml: Option<&Path>) -> Self {
        let genres = genres_csv
            .map(|path| {
                load_genres_csv(path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "could not read genres map");
                    HashMap::new()
                })
            })
            .unwrap_or_default();
        let folders = folders_yaml
            .map(|path| {
                load_folders_yaml(path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "could not read folders map");
                    HashMap::new()
                })
            })
            .unwrap_or_default();
        Self { genres, folders }
    }

    /// Canonical genre for `raw`: exact key first, then the trimmed key.
    pub fn genre(&self, raw: &str) -> Option<&str> {
        self.genres
            .get(raw)
            .or_else(|| self.genres.get(raw.trim()))
            .map(String::as_str)
    }

    /// Canonical folder name, falling back to `raw` itself.
    pub fn folder<'a>(&'a self, raw: &'a str) -> &'a str {
        self.folders.get(raw).map_or(raw, String::as_str)
    }

    pub fn genre_count(&self) -> usize {
        self.genres.len()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }
}

/// Two-column `original,mapped` CSV. Rows with another arity are skipped.
pub fn load_genres_csv(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut map = HashMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), line = line + 1, error = %e, "skipping malformed genre row");
                continue;
            }
        };
        if record.len() != 2 {
            warn!(path = %path.display(), line = line + 1, "expected 2 columns in genre row");
            continue;
        }
        map.insert(record[0].trim().to_string(), record[1].trim().to_string());
    }
    Ok(map)
}

/// Flat YAML mapping of folder name to canonical folder name.
pub fn load_folders_yaml(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let map: HashMap<String, String> = serde_yaml::from_str(&content)?;
    Ok(map)
}
