//! Duplicates report and run summary.
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::catalog::DuplicateSet;

const HEADER: &str = "Duplicate Titles Report";

/// Render the plain-text duplicates report, sections sorted by title.
pub fn render_duplicates(sets: &[DuplicateSet]) -> String {
    let mut sorted: Vec<&DuplicateSet> = sets.iter().collect();
    sorted.sort_by(|a, b| a.title.cmp(&b.title));

    let mut out = format!("{HEADER}\n{}\n\n", "=".repeat(HEADER.len()));
    for set in sorted {
        out.push_str(&format!("Title: {}\n", set.title));
        out.push_str(&format!("Found in {} files:\n", set.paths.len()));
        for path in &set.paths {
            out.push_str(&format!(" - {path}\n"));
        }
        out.push('\n');
    }
    out
}

/// Write the report to `path`. Nothing is written when `sets` is empty;
/// returns whether a file was produced.
pub fn write_duplicates_report(path: &Path, sets: &[DuplicateSet]) -> std::io::Result<bool> {
    if sets.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(render_duplicates(sets).as_bytes())?;
    Ok(true)
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub chunks: u64,
    pub duplicate_titles: usize,
    pub duplicate_files: usize,
    /// Registry kinds whose final write failed.
    pub registry_failures: Vec<String>,
    /// Why a tar scan ended before the end of the archive.
    pub aborted: Option<String>,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunSummary {
    pub fn files(&self) -> usize {
        self.processed + self.skipped + self.failed + self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files:            {}", self.files())?;
        writeln!(f, "  processed:      {}", self.processed)?;
        writeln!(f, "  skipped:        {}", self.skipped)?;
        writeln!(f, "  failed:         {}", self.failed)?;
        writeln!(f, "  cancelled:      {}", self.cancelled)?;
        writeln!(f, "Chunks written:   {}", self.chunks)?;
        writeln!(f, "Duplicate titles: {} ({} files)", self.duplicate_titles, self.duplicate_files)?;
        if let Some(reason) = &self.aborted {
            writeln!(f, "Scan aborted:     {reason}")?;
        }
        if !self.registry_failures.is_empty() {
            writeln!(f, "Registry writes failed: {}", self.registry_failures.join(", "))?;
        }
        write!(f, "Elapsed:          {:.2}s", self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(title: &str, paths: &[&str]) -> DuplicateSet {
        DuplicateSet { title: title.into(), paths: paths.iter().map(|p| p.to_string()).collect() }
    }

    #[test]
    fn report_layout() {
        let text = render_duplicates(&[set("Ocean", &["a/Ocean.docx", "b/Ocean.pdf"]), set("Forest", &["c", "d"])]);
        assert_eq!(
            text,
            "Duplicate Titles Report\n=======================\n\n\
             Title: Forest\nFound in 2 files:\n - c\n - d\n\n\
             Title: Ocean\nFound in 2 files:\n - a/Ocean.docx\n - b/Ocean.pdf\n\n"
        );
    }

    #[test]
    fn no_duplicates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dups.txt");
        assert!(!write_duplicates_report(&path, &[]).unwrap());
        assert!(!path.exists());
        assert!(write_duplicates_report(&path, &[set("X", &["1", "2"])]).unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().starts_with(HEADER));
    }

    #[test]
    fn summary_totals() {
        let summary = RunSummary { processed: 3, skipped: 1, failed: 2, cancelled: 4, ..RunSummary::default() };
        assert_eq!(summary.files(), 10);
        assert!(summary.to_string().contains("failed:         2"));
    }
}
