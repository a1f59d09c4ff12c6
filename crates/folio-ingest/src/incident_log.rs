//! Append-only `[ERROR]`/`[WARN]` event file, mirrored to `tracing`.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing::{error, warn};

pub struct IncidentLog {
    file: Option<Mutex<File>>,
}

impl IncidentLog {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Some(Mutex::new(file)) })
    }

    /// Log to `tracing` only.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn error(&self, message: &str) {
        error!("{message}");
        self.append("ERROR", message);
    }

    pub fn warn(&self, message: &str) {
        warn!("{message}");
        self.append("WARN", message);
    }

    fn append(&self, tag: &str, message: &str) {
        let Some(file) = &self.file else { return };
        let mut file = file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = writeln!(file, "[{tag}] {message}") {
            error!(error = %e, "could not append to incident log");
        }
    }
}
