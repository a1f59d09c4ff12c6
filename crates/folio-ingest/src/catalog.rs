//! Per-run bookkeeping: records by path, duplicate titles and the
//! author/category/title registries.
//!
//! Three locks guard three independent maps. Each is held only for an
//! in-memory update and never while another one is held.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use folio_core::{AuthorEntry, Batch, BibliographicRecord, CategoryEntry, TitleEntry};

/// All paths that resolved to one normalized title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    /// Title as first seen.
    pub title: String,
    pub paths: Vec<String>,
}

/// What [`Catalog::process`] found out about a file's title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleCheck {
    Unique,
    /// The title was already seen; `first` is the earliest path that carried it.
    Duplicate { first: String },
}

#[derive(Default)]
struct Entries {
    by_path: HashMap<String, BibliographicRecord>,
    /// Normalized title → (first path, title as written there).
    first_by_title: HashMap<String, (String, String)>,
}

#[derive(Default)]
struct Registries {
    authors: HashMap<String, AuthorEntry>,
    categories: HashMap<String, CategoryEntry>,
    titles: HashMap<String, TitleEntry>,
}

#[derive(Default)]
pub struct Catalog {
    duplicates: Mutex<BTreeMap<String, DuplicateSet>>,
    entries: Mutex<Entries>,
    registries: Mutex<Registries>,
}

/// Lowercased title with surrounding whitespace trimmed and inner runs collapsed.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned map still holds consistent entries: every update is a single insert or push.
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `record` under `path` and check its title for duplicates.
    ///
    /// The first collision on a title promotes the earlier path together with
    /// this one into a shared [`DuplicateSet`]; later collisions append.
    pub fn process(&self, path: &str, record: &BibliographicRecord) -> TitleCheck {
        let key = normalize_title(&record.title);

        {
            let mut duplicates = lock(&self.duplicates);
            if let Some(set) = duplicates.get_mut(&key) {
                let first = set.paths.first().cloned().unwrap_or_default();
                if !set.paths.iter().any(|p| p == path) {
                    set.paths.push(path.to_string());
                }
                drop(duplicates);
                lock(&self.entries).by_path.insert(path.to_string(), record.clone());
                return TitleCheck::Duplicate { first };
            }
        }

        let previous = {
            let mut entries = lock(&self.entries);
            entries.by_path.insert(path.to_string(), record.clone());
            match entries.first_by_title.get(&key) {
                Some((first, title)) if first != path => Some((first.clone(), title.clone())),
                Some(_) => None,
                None => {
                    let first = (path.to_string(), record.title.trim().to_string());
                    entries.first_by_title.insert(key.clone(), first);
                    None
                }
            }
        };

        let Some((first, title)) = previous else {
            return TitleCheck::Unique;
        };

        let mut duplicates = lock(&self.duplicates);
        let set = duplicates.entry(key).or_insert_with(|| DuplicateSet { title, paths: Vec::new() });
        for p in [first.as_str(), path] {
            if !set.paths.iter().any(|existing| existing == p) {
                set.paths.push(p.to_string());
            }
        }
        let first = set.paths.first().cloned().unwrap_or(first);
        TitleCheck::Duplicate { first }
    }

    /// Register the record's author, genre and title. An existing entry with
    /// the same name is kept as is; empty names are ignored.
    pub fn register(&self, record: &BibliographicRecord) {
        let mut registries = lock(&self.registries);
        if !record.author.is_empty() {
            registries
                .authors
                .entry(record.author.clone())
                .or_insert_with(|| AuthorEntry::from_record(record));
        }
        if !record.genre.is_empty() {
            registries
                .categories
                .entry(record.genre.clone())
                .or_insert_with(|| CategoryEntry::from_record(record));
        }
        if !record.title.is_empty() {
            registries
                .titles
                .entry(record.title.clone())
                .or_insert_with(|| TitleEntry::from_record(record));
        }
    }

    /// Insert `entry` unless an author with that name is already registered.
    /// Returns whether it was inserted.
    pub fn register_author(&self, entry: AuthorEntry) -> bool {
        let mut registries = lock(&self.registries);
        if registries.authors.contains_key(&entry.name) {
            return false;
        }
        registries.authors.insert(entry.name.clone(), entry);
        true
    }

    pub fn author(&self, name: &str) -> Option<AuthorEntry> {
        lock(&self.registries).authors.get(name).cloned()
    }

    pub fn record(&self, path: &str) -> Option<BibliographicRecord> {
        lock(&self.entries).by_path.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duplicate sets ordered by normalized title.
    pub fn duplicates(&self) -> Vec<DuplicateSet> {
        lock(&self.duplicates).values().cloned().collect()
    }

    /// Registry contents as sink batches, each sorted by name. Empty
    /// registries are left out.
    pub fn registry_batches(&self) -> Vec<Batch> {
        let (mut authors, mut categories, mut titles) = {
            let registries = lock(&self.registries);
            (
                registries.authors.values().cloned().collect::<Vec<_>>(),
                registries.categories.values().cloned().collect::<Vec<_>>(),
                registries.titles.values().cloned().collect::<Vec<_>>(),
            )
        };
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        titles.sort_by(|a, b| a.title.cmp(&b.title));

        [Batch::Authors(authors), Batch::Categories(categories), Batch::Titles(titles)]
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect()
    }
}
