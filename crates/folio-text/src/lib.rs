//! folio-text
//!
//! Tantivy-backed storage sink for chunks and registries, plus read-side
//! search over the tables it writes.
pub mod schema;
pub mod search;
pub mod store;

pub use search::{search_names, ChunkHit, ChunkSearcher};
pub use store::TantivyStore;
