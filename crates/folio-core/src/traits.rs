use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::{Result, StorageError};
use crate::types::Batch;

/// Lazy, finite, non-restartable stream of raw paragraphs in document order.
///
/// `Ok(None)` marks end-of-stream. Text is already free of container markup.
#[async_trait]
pub trait ParagraphReader: Send {
    async fn read(&mut self) -> Result<Option<String>>;
}

/// Bulk-write destination for batches of records.
///
/// Idempotency of a single call is the sink's responsibility.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn write(&self, batch: &Batch, cancel: &CancelToken) -> std::result::Result<(), StorageError>;
}

/// In-memory reader over a list of paragraphs.
pub struct VecReader {
    paragraphs: std::vec::IntoIter<String>,
}

impl VecReader {
    pub fn new<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paragraphs: Vec<String> = paragraphs.into_iter().map(Into::into).collect();
        Self { paragraphs: paragraphs.into_iter() }
    }
}

#[async_trait]
impl ParagraphReader for VecReader {
    async fn read(&mut self) -> Result<Option<String>> {
        Ok(self.paragraphs.next())
    }
}
