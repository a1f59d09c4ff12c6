use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use folio_core::metadata::extract_record;
use folio_core::sink::{ChunkBatcher, RetryPolicy, RetryingSink};
use folio_core::traits::VecReader;
use folio_core::{
    Assembler, Batch, BibliographicRecord, CancelToken, Chunk, ChunkLimits, Error, LookupTables,
    ParagraphReader, StorageError, StorageSink, StripMode,
};

fn record() -> BibliographicRecord {
    extract_record("Проза_Пушкин — Капитанская дочка.docx", "Книги", &LookupTables::default())
}

fn paragraph(len: usize) -> String {
    "x".repeat(len)
}

/// Sentence of exactly `len` codepoints ending with a period.
fn sentence(i: usize, len: usize) -> String {
    let head = format!("S{i}w");
    format!("{head}{}.", "a".repeat(len - head.chars().count() - 1))
}

async fn run(limits: ChunkLimits, paragraphs: Vec<String>) -> Vec<Chunk> {
    let mut reader = VecReader::new(paragraphs);
    let mut out = Vec::new();
    Assembler::new(limits, StripMode::Off)
        .assemble(&record(), &mut reader, &mut out, &CancelToken::new())
        .await
        .expect("assemble");
    out
}

#[tokio::test]
async fn small_paragraphs_merge_until_threshold() {
    let chunks = run(ChunkLimits::default(), (0..5).map(|_| paragraph(100)).collect()).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].char_count, 500);
    assert_eq!(chunks[0].sequence_index, 1);
}

#[tokio::test]
async fn merged_chunk_is_emitted_once_past_optimal() {
    // 10 x 200 = 2000 > 1800 * 1.05 = 1890 once the tenth arrives.
    let chunks = run(ChunkLimits::default(), (0..12).map(|_| paragraph(200)).collect()).await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].char_count, 2000);
    assert_eq!(chunks[1].char_count, 400);
}

#[tokio::test]
async fn paragraph_that_would_exceed_max_waits_for_next_chunk() {
    let limits = ChunkLimits::new(10, 100, 200).unwrap();
    let chunks = run(limits, vec![paragraph(90), paragraph(150)]).await;
    let sizes: Vec<u64> = chunks.iter().map(|c| c.char_count).collect();
    assert_eq!(sizes, vec![90, 150]);
}

#[tokio::test]
async fn oversized_paragraph_splits_on_sentences_without_loss() {
    let sentences: Vec<String> = (0..50).map(|i| sentence(i, 99)).collect();
    let original = sentences.join(" ");
    assert_eq!(original.chars().count(), 50 * 99 + 49);

    let chunks = run(ChunkLimits::default(), vec![original.clone()]).await;
    assert!(chunks.len() >= 2, "got {} chunks", chunks.len());
    for chunk in &chunks {
        assert!(chunk.char_count <= 3500, "chunk of {} codepoints", chunk.char_count);
        assert!(chunk.content.ends_with('.'), "chunk must end on a sentence boundary");
    }

    let rejoined = chunks
        .iter()
        .map(|c| c.content.replace("\n\n", " "))
        .collect::<Vec<_>>()
        .join(" ");
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    assert_eq!(normalize(&rejoined), normalize(&original));
}

#[tokio::test]
async fn indivisible_sentence_passes_through_whole() {
    let limits = ChunkLimits::new(10, 100, 200).unwrap();
    let long = "word ".repeat(80);
    let chunks = run(limits, vec![long.clone()]).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, long.trim());
}

#[tokio::test]
async fn sequence_indices_are_contiguous_from_one() {
    let limits = ChunkLimits::new(20, 120, 250).unwrap();
    let mut paragraphs = Vec::new();
    for i in 0..40 {
        match i % 4 {
            0 => paragraphs.push(paragraph(15)),
            1 => paragraphs.push((0..8).map(|j| sentence(j, 60)).collect::<Vec<_>>().join(" ")),
            2 => paragraphs.push(String::new()),
            _ => paragraphs.push(paragraph(130)),
        }
    }
    let chunks = run(limits, paragraphs).await;
    assert!(!chunks.is_empty());
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_index, i as u64 + 1);
        assert!(!chunk.content.is_empty());
    }
}

#[tokio::test]
async fn ellipses_are_normalized() {
    let chunks = run(ChunkLimits::default(), vec!["Wait... what. . . ok".to_string()]).await;
    assert_eq!(chunks[0].content, "Wait… what… ok");
}

#[tokio::test]
async fn chunks_carry_record_and_enrichment() {
    let text = "Мой дядя самых честных правил, когда не в шутку занемог, он уважать себя заставил.";
    let chunks = run(ChunkLimits::default(), vec![text.to_string()]).await;
    let chunk = &chunks[0];
    assert_eq!(chunk.genre, "Проза");
    assert_eq!(chunk.author, "Пушкин");
    assert_eq!(chunk.book_title, "Капитанская дочка");
    assert_eq!(chunk.language, "ru");
    assert_eq!(chunk.word_count, 14);
    assert!((chunk.ocr_quality - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn stripped_chunks_are_stable_under_restripping() {
    let blob = "QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVphYmNkZWZnaGlqa2xtbm9w";
    let text = format!("Before the picture {blob}== after it.");
    let mut reader = VecReader::new(vec![text]);
    let mut out = Vec::new();
    Assembler::new(ChunkLimits::default(), StripMode::Recursive)
        .assemble(&record(), &mut reader, &mut out, &CancelToken::new())
        .await
        .unwrap();
    let content = &out[0].content;
    assert!(!content.contains(blob));
    assert_eq!(folio_core::assembler::strip::strip_base64(content, StripMode::Recursive), content.as_str());
}

#[tokio::test]
async fn chunk_that_strips_to_nothing_is_not_emitted() {
    let blob = "QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVphYmNkZWZnaGlqa2xtbm9w";
    let mut reader = VecReader::new(vec![blob.to_string()]);
    let mut out = Vec::new();
    let emitted = Assembler::new(ChunkLimits::default(), StripMode::Single)
        .assemble(&record(), &mut reader, &mut out, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(emitted, 0);
    assert!(out.is_empty());
}

/// Yields paragraphs forever, cancelling the token after `cancel_after` reads.
struct EndlessReader {
    reads: usize,
    cancel_after: usize,
    cancel: CancelToken,
}

#[async_trait]
impl ParagraphReader for EndlessReader {
    async fn read(&mut self) -> folio_core::Result<Option<String>> {
        self.reads += 1;
        if self.reads == self.cancel_after {
            self.cancel.cancel();
        }
        Ok(Some(paragraph(100)))
    }
}

#[tokio::test]
async fn cancellation_stops_assembly_with_cancelled_outcome() {
    let cancel = CancelToken::new();
    let mut reader = EndlessReader { reads: 0, cancel_after: 7, cancel: cancel.clone() };
    let mut out = Vec::new();
    let err = Assembler::default()
        .assemble(&record(), &mut reader, &mut out, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(reader.reads, 7);
}

/// Fails the first `failures` calls, then records every chunk it is given.
struct FlakySink {
    failures: usize,
    calls: AtomicUsize,
    stored: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageSink for FlakySink {
    async fn write(&self, batch: &Batch, _: &CancelToken) -> Result<(), StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StorageError::backend(batch.kind(), "connection refused"));
        }
        if let Batch::Chunks(chunks) = batch {
            self.stored.lock().unwrap().extend(chunks.iter().map(|c| c.content.clone()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn retry_calls_exactly_k_plus_one_times_without_duplicates() {
    const K: usize = 4;
    let inner = Arc::new(FlakySink { failures: K, calls: AtomicUsize::new(0), stored: Mutex::new(Vec::new()) });
    let sink = RetryingSink::new(inner.clone(), RetryPolicy::new(10, Duration::from_millis(1)));
    let cancel = CancelToken::new();

    let limits = ChunkLimits::new(10, 100, 200).unwrap();
    let paragraphs: Vec<String> = (0..3).map(|i| format!("{}{i}", "p".repeat(149))).collect();
    let mut reader = VecReader::new(paragraphs);
    let mut batcher = ChunkBatcher::new(&sink, &cancel, 100);
    let emitted = Assembler::new(limits, StripMode::Off)
        .assemble(&record(), &mut reader, &mut batcher, &cancel)
        .await
        .unwrap();

    assert_eq!(emitted, 3);
    assert_eq!(inner.calls.load(Ordering::SeqCst), K + 1);
    let stored = inner.stored.lock().unwrap();
    assert_eq!(stored.len(), 3);
    let mut unique = stored.clone();
    unique.dedup();
    assert_eq!(unique.len(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_the_document() {
    let inner = Arc::new(FlakySink { failures: usize::MAX, calls: AtomicUsize::new(0), stored: Mutex::new(Vec::new()) });
    let sink = RetryingSink::new(inner.clone(), RetryPolicy::new(2, Duration::from_millis(1)));
    let cancel = CancelToken::new();
    let mut reader = VecReader::new(vec![paragraph(50)]);
    let mut batcher = ChunkBatcher::new(&sink, &cancel, 10);
    let err = Assembler::default()
        .assemble(&record(), &mut reader, &mut batcher, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::RetriesExhausted { attempts: 2, .. })));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}
