//! Ingestion side of folio: document readers, the bounded worker pool, the
//! directory/tar/metadata run modes and their bookkeeping.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod catalog;
pub mod incident_log;
pub mod pipeline;
pub mod pool;
pub mod readers;
pub mod report;

pub use catalog::{normalize_title, Catalog, DuplicateSet, TitleCheck};
pub use incident_log::IncidentLog;
pub use pipeline::{discover, FileOutcome, FileReport, Pipeline, ProgressObserver};
pub use pool::WorkerPool;
pub use readers::{open_reader, DocumentFormat, ReaderOptions};
pub use report::{render_duplicates, write_duplicates_report, RunSummary};
