//! Paragraph reassembly engine.
//!
//! Consumes a document's raw paragraph stream and re-chunks it into pieces
//! bounded by [`ChunkLimits`]: small paragraphs are merged until they reach
//! the `min..=optimal` band, paragraphs longer than `max` are split at sentence
//! boundaries. All lengths are Unicode codepoints.
mod buffer;
pub mod enrich;
pub mod split;
pub mod strip;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::traits::ParagraphReader;
use crate::types::{BibliographicRecord, Chunk, ChunkLimits, StripMode};

use buffer::Buffer;
use split::{normalize_ellipsis, split_overflow};

/// Receives chunks in increasing sequence order.
#[async_trait]
pub trait ChunkEmitter: Send {
    async fn emit(&mut self, chunk: Chunk) -> Result<()>;

    /// Called once after the last chunk of a document.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ChunkEmitter for Vec<Chunk> {
    async fn emit(&mut self, chunk: Chunk) -> Result<()> {
        self.push(chunk);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Assembler {
    limits: ChunkLimits,
    strip: StripMode,
}

impl Assembler {
    pub fn new(limits: ChunkLimits, strip: StripMode) -> Self {
        Self { limits, strip }
    }

    /// Drive `reader` to end-of-stream, emitting chunks for `record`.
    ///
    /// Returns the number of chunks emitted. Cancellation is observed before
    /// every iteration and while waiting on the reader.
    pub async fn assemble<R, E>(
        &self,
        record: &BibliographicRecord,
        reader: &mut R,
        emitter: &mut E,
        cancel: &CancelToken,
    ) -> Result<u64>
    where
        R: ParagraphReader + ?Sized,
        E: ChunkEmitter + ?Sized,
    {
        let ChunkLimits { min, optimal, max } = self.limits;
        let band = self.limits.optimal_band();

        // Chunk under construction.
        let mut current = Buffer::default();
        // Last paragraph read, not yet merged; never longer than `max`.
        let mut pending = Buffer::default();
        // Paragraph longer than `max` at read time, awaiting sentence splitting.
        let mut overflow = Buffer::default();
        // Transient merge point for an overflow remainder that fits whole.
        let mut carry = Buffer::default();

        let mut sequence = 0u64;

        loop {
            cancel.check()?;

            if overflow.is_empty() && pending.is_empty() {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    next = reader.read() => next?,
                };
                let Some(raw) = next else { break };
                if raw.is_empty() {
                    continue;
                }
                let text = normalize_ellipsis(&raw);
                if text.chars().count() > max {
                    overflow.push_str(&text);
                } else {
                    pending.push_str(&text);
                }
            }

            if !overflow.is_empty() && overflow.len() < max {
                carry.append(&mut overflow);
                merge_carry(&mut carry, &mut current, max);
            }

            if overflow.len() >= max {
                split_overflow(&mut overflow, &mut current, optimal);
            }

            let concat = current.len() + pending.len();
            let splitting = !overflow.is_empty();

            if concat < min && !splitting {
                current.append(&mut pending);
                continue;
            }
            if concat >= min && concat as f64 <= band && !splitting {
                current.append(&mut pending);
                continue;
            }
            if concat > optimal && concat <= max {
                current.append(&mut pending);
            }

            self.emit(record, &mut current, &mut sequence, emitter).await?;
        }

        self.emit(record, &mut current, &mut sequence, emitter).await?;
        emitter.finish().await?;

        debug!(source = %record.source_name, chunks = sequence, "document assembled");
        Ok(sequence)
    }

    async fn emit<E>(
        &self,
        record: &BibliographicRecord,
        current: &mut Buffer,
        sequence: &mut u64,
        emitter: &mut E,
    ) -> Result<()>
    where
        E: ChunkEmitter + ?Sized,
    {
        let raw = current.take();
        let stripped = strip::strip_base64(&raw, self.strip);
        let content = stripped.trim();
        if content.is_empty() {
            return Ok(());
        }
        *sequence += 1;
        emitter.emit(build_chunk(record, content.to_string(), *sequence)).await
    }
}

fn merge_carry(carry: &mut Buffer, current: &mut Buffer, max: usize) {
    assert!(
        carry.len() < max,
        "carry-over buffer holds {} codepoints at merge time (max {max}); chunk accounting is broken",
        carry.len()
    );
    current.append(carry);
}

/// Build a chunk for `record` with derived counts, language and OCR quality.
pub fn build_chunk(record: &BibliographicRecord, content: String, sequence_index: u64) -> Chunk {
    let now = Utc::now().timestamp();
    Chunk {
        source_id: record.source_id,
        source_name: record.source_name.clone(),
        genre: record.genre.clone(),
        author: record.author.clone(),
        book_title: record.title.clone(),
        char_count: enrich::char_count(&content),
        word_count: enrich::word_count(&content),
        language: enrich::detect_language(&content),
        ocr_quality: enrich::ocr_quality(&content),
        content,
        sequence_index,
        created_at: now,
        updated_at: now,
    }
}
