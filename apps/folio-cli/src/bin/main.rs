//! `folio`: ingest a book corpus into the local index and query it.
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use folio_core::config::{Config, Settings};
use folio_core::{CancelToken, LookupTables, RecordKind};
use folio_ingest::{write_duplicates_report, FileOutcome, FileReport, IncidentLog, Pipeline, ProgressObserver, RunSummary};
use folio_text::{search_names, ChunkSearcher, TantivyStore};

#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Book corpus ingester")]
struct Cli {
    /// Base configuration file; `config.<env>.toml` next to it is merged on top.
    #[arg(long, env = "FOLIO_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Print the run summary as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Hide the progress bar.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse every document under a directory into the index.
    Parse {
        /// Defaults to `volume` from the configuration.
        dir: Option<PathBuf>,
    },
    /// Parse the documents of a tar archive; `-` reads it from stdin.
    ParseTar { archive: PathBuf },
    /// Catalog file names only: duplicate titles and registries.
    Metadata { dir: Option<PathBuf> },
    /// Full-text search over indexed chunks, or substring search over a registry.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Search registry names instead of chunk text.
        #[arg(long, value_enum)]
        registry: Option<Registry>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Registry {
    Authors,
    Categories,
    Titles,
}

impl From<Registry> for RecordKind {
    fn from(registry: Registry) -> Self {
        match registry {
            Registry::Authors => RecordKind::Author,
            Registry::Categories => RecordKind::Category,
            Registry::Titles => RecordKind::Title,
        }
    }
}

enum Source {
    Directory(PathBuf),
    Archive(PathBuf),
    Catalog(PathBuf),
}

struct Progress {
    bar: ProgressBar,
}

impl Progress {
    fn new(visible: bool) -> Self {
        let bar = if visible { ProgressBar::new(0) } else { ProgressBar::hidden() };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressObserver for Progress {
    fn on_discovered(&self, count: usize) {
        self.bar.inc_length(count as u64);
    }

    fn on_file(&self, report: &FileReport) {
        self.bar.inc(1);
        if let FileOutcome::Failed(reason) = &report.outcome {
            self.bar.println(format!("failed: {} ({reason})", report.name));
        }
        self.bar.set_message(report.name.clone());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Config::load_from(&cli.config)
        .and_then(|config| config.settings())
        .with_context(|| format!("loading {}", cli.config.display()))?
        .resolve_paths(&std::env::current_dir()?);

    let source = match cli.command {
        Command::Search { query, limit, registry } => return search(&settings, &query, limit, registry),
        Command::Parse { dir } => Source::Directory(dir.unwrap_or_else(|| settings.volume.clone())),
        Command::ParseTar { archive } => Source::Archive(archive),
        Command::Metadata { dir } => Source::Catalog(dir.unwrap_or_else(|| settings.volume.clone())),
    };
    let summary = ingest(&settings, source, !cli.quiet).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    if let Some(reason) = &summary.aborted {
        anyhow::bail!("archive run aborted: {reason}");
    }
    Ok(())
}

async fn ingest(settings: &Settings, source: Source, show_progress: bool) -> Result<RunSummary> {
    let tables = LookupTables::load(settings.genres_map.as_deref(), settings.folders_map.as_deref());
    info!(genres = tables.genre_count(), folders = tables.folder_count(), "lookup tables loaded");

    let store = Arc::new(TantivyStore::new(&settings.index_dir, settings.storage.writer_heap_bytes));
    let incidents = IncidentLog::open(&settings.log_file)
        .with_context(|| format!("opening {}", settings.log_file.display()))?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight work");
                cancel.cancel();
            }
        });
    }

    let progress = Arc::new(Progress::new(show_progress));
    let pipeline = Arc::new(
        Pipeline::new(settings, tables, store, cancel)
            .with_incident_log(incidents)
            .with_observer(progress.clone()),
    );

    let summary = match source {
        Source::Directory(dir) => pipeline.run_directory(&dir).await?,
        Source::Catalog(dir) => pipeline.run_metadata(&dir).await?,
        Source::Archive(path) if path == Path::new("-") => pipeline.run_archive(std::io::stdin()).await?,
        Source::Archive(path) => {
            let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            pipeline.run_archive(file).await?
        }
    };
    progress.bar.finish_and_clear();

    let duplicates = pipeline.catalog().duplicates();
    match write_duplicates_report(&settings.duplicates_report, &duplicates) {
        Ok(true) => info!(path = %settings.duplicates_report.display(), titles = duplicates.len(), "duplicates report written"),
        Ok(false) => {}
        Err(e) => warn!(path = %settings.duplicates_report.display(), error = %e, "could not write duplicates report"),
    }
    Ok(summary)
}

fn search(settings: &Settings, query: &str, limit: usize, registry: Option<Registry>) -> Result<()> {
    if let Some(registry) = registry {
        for name in search_names(&settings.index_dir, registry.into(), query, limit)? {
            println!("{name}");
        }
        return Ok(());
    }

    let searcher = ChunkSearcher::open(&settings.index_dir)?;
    let hits = searcher.search(query, limit)?;
    println!("{} hits among {} chunks", hits.len(), searcher.num_chunks());
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. [{:.3}] {} / {} ({}) #{}",
            rank + 1,
            hit.score,
            hit.book_title,
            if hit.author.is_empty() { "unknown author" } else { hit.author.as_str() },
            hit.genre,
            hit.sequence_index
        );
        println!("    {}", hit.snippet.replace('\n', " "));
    }
    Ok(())
}
