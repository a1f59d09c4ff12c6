//! Core of the folio corpus ingester.
//!
//! Domain types, the Figment-backed configuration, the metadata extractor,
//! the paragraph reassembly engine and the storage-sink contract with its
//! retry wrapper. Format readers, the worker pool and the index backend live
//! in sibling crates.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod assembler;
pub mod cancel;
pub mod config;
pub mod error;
pub mod lookup;
pub mod metadata;
pub mod sink;
pub mod traits;
pub mod types;

pub use assembler::{Assembler, ChunkEmitter};
pub use cancel::CancelToken;
pub use error::{Error, Result, StorageError};
pub use lookup::LookupTables;
pub use traits::{ParagraphReader, StorageSink};
pub use types::{
    AuthorEntry, Batch, BibliographicRecord, CategoryEntry, Chunk, ChunkLimits, RecordKind, StripMode,
    TitleEntry,
};
