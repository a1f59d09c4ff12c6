//! Retry wrapper around a [`StorageSink`] and the chunk batcher that feeds it.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::assembler::ChunkEmitter;
use crate::cancel::CancelToken;
use crate::error::{Result, StorageError};
use crate::traits::StorageSink;
use crate::types::{Batch, Chunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1000, delay: Duration::from_millis(100) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }
}

/// Retries failed bulk writes with a fixed delay, up to a bounded number of
/// attempts, and reports exhaustion as [`StorageError::RetriesExhausted`].
pub struct RetryingSink<S: ?Sized> {
    inner: Arc<S>,
    policy: RetryPolicy,
}

impl<S: ?Sized> Clone for RetryingSink<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), policy: self.policy }
    }
}

impl<S: StorageSink + ?Sized> RetryingSink<S> {
    pub fn new(inner: Arc<S>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: StorageSink + ?Sized> StorageSink for RetryingSink<S> {
    async fn write(&self, batch: &Batch, cancel: &CancelToken) -> std::result::Result<(), StorageError> {
        let kind = batch.kind();
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            attempt += 1;
            let err = match self.inner.write(batch, cancel).await {
                Ok(()) => {
                    debug!(%kind, records = batch.len(), attempt, "batch written");
                    return Ok(());
                }
                Err(StorageError::Cancelled) => return Err(StorageError::Cancelled),
                Err(e) => e,
            };

            if attempt >= self.policy.max_attempts {
                warn!(%kind, attempts = attempt, error = %err, "giving up on batch");
                return Err(StorageError::RetriesExhausted {
                    kind,
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            warn!(%kind, attempt, error = %err, "bulk write failed, retrying");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(StorageError::Cancelled),
                () = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }
}

/// Accumulates chunks and hands a batch to the sink every `batch_size` chunks.
///
/// The remainder is written by [`ChunkEmitter::finish`].
pub struct ChunkBatcher<'a> {
    sink: &'a dyn StorageSink,
    cancel: &'a CancelToken,
    batch_size: usize,
    pending: Vec<Chunk>,
    written: u64,
}

impl<'a> ChunkBatcher<'a> {
    pub fn new(sink: &'a dyn StorageSink, cancel: &'a CancelToken, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            cancel,
            batch_size,
            pending: Vec::with_capacity(batch_size.min(4096)),
            written: 0,
        }
    }

    /// Chunks durably handed to the sink so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = Batch::Chunks(std::mem::take(&mut self.pending));
        self.sink.write(&batch, self.cancel).await?;
        self.written += batch.len() as u64;
        Ok(())
    }
}

#[async_trait]
impl<'a> ChunkEmitter for ChunkBatcher<'a> {
    async fn emit(&mut self, chunk: Chunk) -> Result<()> {
        self.pending.push(chunk);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.flush().await
    }
}
