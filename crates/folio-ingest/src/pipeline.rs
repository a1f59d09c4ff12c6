//! Run modes: full parse of a directory tree, full parse of a tar stream and
//! the metadata-only catalog run.
//!
//! Directory and metadata runs keep going past per-file failures. A tar run
//! stops reading the archive at the first failed file; files already handed
//! to a worker are allowed to finish.
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tempfile::TempPath;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use folio_core::config::Settings;
use folio_core::metadata::{extract_record, folder_of};
use folio_core::sink::{ChunkBatcher, RetryingSink};
use folio_core::{Assembler, CancelToken, LookupTables, StorageSink};

use crate::catalog::{Catalog, TitleCheck};
use crate::incident_log::IncidentLog;
use crate::pool::WorkerPool;
use crate::readers::{open_reader, DocumentFormat, ReaderOptions};
use crate::report::RunSummary;

/// Names never picked up by a directory walk.
pub const EXCLUDED_FILES: &[&str] = &[".gitignore", ".DS_Store", "Thumbs.db"];

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Processed { chunks: u64 },
    Skipped(String),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub name: String,
    pub outcome: FileOutcome,
}

/// Hook for progress display.
pub trait ProgressObserver: Send + Sync {
    /// `count` more files were queued.
    fn on_discovered(&self, _count: usize) {}

    fn on_file(&self, report: &FileReport);
}

/// A tar member copied to disk, deleted when dropped.
struct SpooledEntry {
    name: String,
    folder: String,
    path: TempPath,
}

pub struct Pipeline {
    assembler: Assembler,
    batch_size: usize,
    concurrency: usize,
    options: ReaderOptions,
    tables: LookupTables,
    sink: RetryingSink<dyn StorageSink>,
    catalog: Catalog,
    incidents: IncidentLog,
    observer: Option<Arc<dyn ProgressObserver>>,
    spool_dir: Option<PathBuf>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(settings: &Settings, tables: LookupTables, sink: Arc<dyn StorageSink>, cancel: CancelToken) -> Self {
        Self {
            assembler: Assembler::new(settings.chunk, settings.filters.base64),
            batch_size: settings.batch_size,
            concurrency: settings.concurrency,
            options: ReaderOptions::from(settings),
            tables,
            sink: RetryingSink::new(sink, settings.storage.retry_policy()),
            catalog: Catalog::new(),
            incidents: IncidentLog::disabled(),
            observer: None,
            spool_dir: None,
            cancel,
        }
    }

    pub fn with_incident_log(mut self, incidents: IncidentLog) -> Self {
        self.incidents = incidents;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Directory for spooled tar members; the system temp dir otherwise.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parse every file under `root` into chunks.
    pub async fn run_directory(self: &Arc<Self>, root: &Path) -> Result<RunSummary> {
        let started = Instant::now();
        let files = discover(root)?;
        info!(root = %root.display(), files = files.len(), "starting directory run");
        self.notify_discovered(files.len());

        let (reports, unstarted) = self
            .dispatch(files, |pipeline, path| async move {
                let name = file_name(&path);
                let outcome = pipeline.parse_file(&path, &name, &folder_of(&path)).await;
                pipeline.report(name, outcome)
            })
            .await;

        let mut summary = tally(&reports);
        summary.cancelled += unstarted;
        Ok(self.finish(summary, started).await)
    }

    /// Catalog every file under `root` without reading its contents.
    pub async fn run_metadata(self: &Arc<Self>, root: &Path) -> Result<RunSummary> {
        let started = Instant::now();
        let files = discover(root)?;
        info!(root = %root.display(), files = files.len(), "starting metadata run");
        self.notify_discovered(files.len());

        let (reports, unstarted) = self
            .dispatch(files, |pipeline, path| async move {
                let outcome = pipeline.catalog_file(&path);
                pipeline.report(file_name(&path), outcome)
            })
            .await;

        let mut summary = tally(&reports);
        summary.cancelled += unstarted;
        Ok(self.finish(summary, started).await)
    }

    /// Parse the supported members of a tar stream into chunks.
    pub async fn run_archive<R>(self: &Arc<Self>, stream: R) -> Result<RunSummary>
    where
        R: Read + Send + 'static,
    {
        let started = Instant::now();
        // Raised by the first failed file or by a run-wide cancel.
        let scan_stop = CancelToken::new();
        let forward = {
            let (cancel, stop) = (self.cancel.clone(), scan_stop.clone());
            tokio::spawn(async move {
                cancel.cancelled().await;
                stop.cancel();
            })
        };

        let (tx, mut rx) = mpsc::channel::<SpooledEntry>(self.concurrency.max(1));
        let producer = {
            let stop = scan_stop.clone();
            let spool_dir = self.spool_dir.clone();
            tokio::task::spawn_blocking(move || spool_entries(stream, &tx, &stop, spool_dir.as_deref()))
        };

        let mut pool = WorkerPool::new(self.concurrency, scan_stop.clone());
        let mut unstarted = 0usize;
        while let Some(entry) = rx.recv().await {
            self.notify_discovered(1);
            let pipeline = Arc::clone(self);
            let stop = scan_stop.clone();
            let name = entry.name.clone();
            let task = async move {
                let outcome = pipeline.parse_file(&entry.path, &entry.name, &entry.folder).await;
                if matches!(outcome, FileOutcome::Failed(_)) {
                    stop.cancel();
                }
                drop(entry);
                pipeline.report(name, outcome)
            };
            if !pool.submit(task).await {
                unstarted += 1;
            }
        }

        let reports = pool.join().await;
        forward.abort();

        let mut summary = tally(&reports);
        summary.cancelled += unstarted;
        match producer.await.context("tar reader task failed")? {
            Ok(skipped) => summary.skipped += skipped,
            Err(e) => {
                self.incidents.error(&format!("reading tar stream: {e}"));
                summary.aborted = Some(format!("tar stream unreadable: {e}"));
            }
        }
        if summary.aborted.is_none() && scan_stop.is_cancelled() && !self.cancel.is_cancelled() {
            summary.aborted = Some("archive scan stopped after the first failed file".to_string());
        }
        Ok(self.finish(summary, started).await)
    }

    /// Write the author, category and title registries to the sink.
    ///
    /// Returns the kinds whose write failed; failures are logged, not raised.
    pub async fn flush_registries(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for batch in self.catalog.registry_batches() {
            let kind = batch.kind();
            match self.sink.write(&batch, &self.cancel).await {
                Ok(()) => info!(%kind, records = batch.len(), "registry written"),
                Err(e) => {
                    self.incidents.error(&format!("writing {kind} registry: {e}"));
                    failed.push(kind.to_string());
                }
            }
        }
        failed
    }

    async fn dispatch<F, Fut>(self: &Arc<Self>, files: Vec<PathBuf>, work: F) -> (Vec<FileReport>, usize)
    where
        F: Fn(Arc<Self>, PathBuf) -> Fut,
        Fut: std::future::Future<Output = FileReport> + Send + 'static,
    {
        let total = files.len();
        let mut pool = WorkerPool::new(self.concurrency, self.cancel.clone());
        for path in files {
            if !pool.submit(work(Arc::clone(self), path)).await {
                break;
            }
        }
        let unstarted = total - pool.started();
        if unstarted > 0 {
            warn!(unstarted, "run cancelled before every file was started");
        }
        (pool.join().await, unstarted)
    }

    async fn parse_file(&self, path: &Path, name: &str, folder: &str) -> FileOutcome {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }
        let Some(format) = DocumentFormat::from_name(name) else {
            self.incidents.error(&format!("{name}: unsupported file extension"));
            return FileOutcome::Failed("unsupported file extension".to_string());
        };

        let record = extract_record(name, folder, &self.tables);
        self.catalog.register(&record);

        match self.ingest(path, name, format, &record).await {
            Ok(chunks) => {
                debug!(file = name, chunks, "document processed");
                FileOutcome::Processed { chunks }
            }
            Err(e) if e.is_cancelled() => {
                debug!(file = name, "document cancelled");
                FileOutcome::Cancelled
            }
            Err(e) => {
                self.incidents.error(&format!("{name}: {e}"));
                FileOutcome::Failed(e.to_string())
            }
        }
    }

    async fn ingest(
        &self,
        path: &Path,
        name: &str,
        format: DocumentFormat,
        record: &folio_core::BibliographicRecord,
    ) -> folio_core::Result<u64> {
        let mut reader = open_reader(path, name, format, self.options).await?;
        let mut batcher = ChunkBatcher::new(&self.sink, &self.cancel, self.batch_size);
        self.assembler.assemble(record, &mut reader, &mut batcher, &self.cancel).await
    }

    fn catalog_file(&self, path: &Path) -> FileOutcome {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }
        let name = file_name(path);
        if !DocumentFormat::from_name(&name).is_some_and(DocumentFormat::is_container) {
            debug!(file = %name, "not a book container, skipping");
            return FileOutcome::Skipped("unsupported file extension".to_string());
        }

        let record = extract_record(&name, &folder_of(path), &self.tables);
        if record.title.is_empty() {
            self.incidents.error(&format!("invalid filename format: {name}"));
            return FileOutcome::Failed("invalid filename format".to_string());
        }

        let key = path.to_string_lossy();
        if let TitleCheck::Duplicate { first } = self.catalog.process(&key, &record) {
            self.incidents.warn(&format!("duplicate title '{}': {key} (first seen at {first})", record.title));
        }
        self.catalog.register(&record);
        FileOutcome::Processed { chunks: 0 }
    }

    fn report(&self, name: String, outcome: FileOutcome) -> FileReport {
        let report = FileReport { name, outcome };
        if let Some(observer) = &self.observer {
            observer.on_file(&report);
        }
        report
    }

    fn notify_discovered(&self, count: usize) {
        if let Some(observer) = &self.observer {
            observer.on_discovered(count);
        }
    }

    async fn finish(&self, mut summary: RunSummary, started: Instant) -> RunSummary {
        let duplicates = self.catalog.duplicates();
        summary.duplicate_titles = duplicates.len();
        summary.duplicate_files = duplicates.iter().map(|d| d.paths.len()).sum();
        if self.cancel.is_cancelled() {
            info!("run cancelled, registries not written");
        } else {
            summary.registry_failures = self.flush_registries().await;
        }
        summary.elapsed = started.elapsed();
        info!(
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            chunks = summary.chunks,
            "run finished"
        );
        summary
    }
}

/// Regular files under `root`, sorted, minus [`EXCLUDED_FILES`].
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if EXCLUDED_FILES.contains(&name.as_ref()) {
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn tally(reports: &[FileReport]) -> RunSummary {
    let mut summary = RunSummary::default();
    for report in reports {
        match &report.outcome {
            FileOutcome::Processed { chunks } => {
                summary.processed += 1;
                summary.chunks += chunks;
            }
            FileOutcome::Skipped(_) => summary.skipped += 1,
            FileOutcome::Failed(_) => summary.failed += 1,
            FileOutcome::Cancelled => summary.cancelled += 1,
        }
    }
    summary
}

/// Copy each supported regular-file member to a temp file and queue it.
/// Returns the number of members skipped for their extension.
fn spool_entries<R: Read>(
    stream: R,
    tx: &mpsc::Sender<SpooledEntry>,
    stop: &CancelToken,
    spool_dir: Option<&Path>,
) -> std::io::Result<usize> {
    let mut archive = tar::Archive::new(stream);
    let mut skipped = 0usize;
    for entry in archive.entries()? {
        if stop.is_cancelled() {
            debug!("archive scan stopped");
            break;
        }
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path()?.into_owned();
        let name = file_name(&member);
        if !DocumentFormat::from_name(&name).is_some_and(DocumentFormat::is_container) {
            debug!(member = %member.display(), "skipping unsupported tar member");
            skipped += 1;
            continue;
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("doc_").suffix(".tmp");
        let mut spooled = match spool_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        std::io::copy(&mut entry, &mut spooled)?;
        spooled.flush()?;

        let entry = SpooledEntry { name, folder: folder_of(&member), path: spooled.into_temp_path() };
        if tx.blocking_send(entry).is_err() {
            break;
        }
    }
    Ok(skipped)
}
