use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tantivy::schema::{Schema, Term};
use tantivy::{doc, Index, IndexWriter, TantivyDocument};
use tracing::{debug, info, warn};

use folio_core::{Batch, CancelToken, Chunk, RecordKind, StorageError, StorageSink};

use crate::schema::{build_schema, fields, register_tokenizers};

/// Storage sink writing each record kind into its own Tantivy index under a
/// common root (`<root>/chunks`, `<root>/authors`, ...).
///
/// Tables are opened, or created with their fixed layout, the first time a
/// batch of that kind arrives. Records are replaced by key, so a batch that is
/// written twice leaves one copy of each record.
#[derive(Clone)]
pub struct TantivyStore {
	inner: Arc<Inner>,
}

struct Inner {
	root: PathBuf,
	heap_bytes: usize,
	tables: Mutex<HashMap<RecordKind, Arc<Table>>>,
}

struct Table {
	schema: Schema,
	writer: Mutex<IndexWriter>,
}

impl TantivyStore {
	pub fn new(root: impl Into<PathBuf>, heap_bytes: usize) -> Self {
		Self {
			inner: Arc::new(Inner {
				root: root.into(),
				heap_bytes,
				tables: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Committed documents in the table for `kind`; zero if it was never created.
	pub fn count(&self, kind: RecordKind) -> anyhow::Result<u64> {
		let dir = self.inner.root.join(kind.table_name());
		if !dir.join("meta.json").exists() {
			return Ok(0);
		}
		let index = Index::open_in_dir(&dir)?;
		Ok(index.reader()?.searcher().num_docs())
	}
}

#[async_trait]
impl StorageSink for TantivyStore {
	async fn write(&self, batch: &Batch, cancel: &CancelToken) -> Result<(), StorageError> {
		if cancel.is_cancelled() {
			return Err(StorageError::Cancelled);
		}
		if batch.is_empty() {
			return Ok(());
		}
		let kind = batch.kind();
		let inner = Arc::clone(&self.inner);
		let batch = batch.clone();
		tokio::task::spawn_blocking(move || inner.write_blocking(&batch))
			.await
			.map_err(|e| StorageError::backend(kind, e))?
	}
}

impl Inner {
	fn table(&self, kind: RecordKind) -> Result<Arc<Table>, StorageError> {
		let mut tables = self.tables.lock().map_err(|e| StorageError::backend(kind, e))?;
		if let Some(table) = tables.get(&kind) {
			return Ok(Arc::clone(table));
		}
		let table = Arc::new(self.open_table(kind).map_err(|e| StorageError::backend(kind, e))?);
		tables.insert(kind, Arc::clone(&table));
		Ok(table)
	}

	/// Forget the cached table so the next write opens a fresh writer.
	fn evict(&self, kind: RecordKind) {
		if let Ok(mut tables) = self.tables.lock() {
			tables.remove(&kind);
		}
	}

	fn open_table(&self, kind: RecordKind) -> tantivy::Result<Table> {
		let dir = self.root.join(kind.table_name());
		let index = if dir.join("meta.json").exists() {
			Index::open_in_dir(&dir)?
		} else {
			std::fs::create_dir_all(&dir)?;
			info!(table = kind.table_name(), dir = %dir.display(), "creating table");
			Index::create_in_dir(&dir, build_schema(kind))?
		};
		register_tokenizers(&index)?;
		let schema = index.schema();
		let writer = index.writer(self.heap_bytes)?;
		Ok(Table { schema, writer: Mutex::new(writer) })
	}

	fn write_blocking(&self, batch: &Batch) -> Result<(), StorageError> {
		let kind = batch.kind();
		let table = self.table(kind)?;
		let mut writer = table.writer.lock().map_err(|e| StorageError::backend(kind, e))?;

		let staged = stage(&table.schema, &writer, batch);
		let committed = staged.and_then(|()| writer.commit().map(|_| ()));
		if let Err(e) = committed {
			// Drop whatever was staged so the retry starts from a clean writer.
			if let Err(rollback) = writer.rollback() {
				warn!(table = kind.table_name(), error = %rollback, "rollback failed, reopening table on next write");
				drop(writer);
				self.evict(kind);
			}
			return Err(StorageError::backend(kind, e));
		}
		debug!(table = kind.table_name(), records = batch.len(), "committed");
		Ok(())
	}
}

fn stage(schema: &Schema, writer: &IndexWriter, batch: &Batch) -> tantivy::Result<()> {
	let f = |name: &str| schema.get_field(name);
	let key = f(fields::KEY)?;
	let created_at = f(fields::CREATED_AT)?;
	let updated_at = f(fields::UPDATED_AT)?;
	let entry_type = f(fields::ENTRY_TYPE);
	let description = f(fields::DESCRIPTION);

	let put = |id: String, document: TantivyDocument| -> tantivy::Result<()> {
		writer.delete_term(Term::from_field_text(key, &id));
		writer.add_document(document)?;
		Ok(())
	};

	match batch {
		Batch::Chunks(chunks) => {
			let source_id = f(fields::SOURCE_ID)?;
			let source_name = f(fields::SOURCE_NAME)?;
			let genre = f(fields::GENRE)?;
			let author = f(fields::AUTHOR)?;
			let book_title = f(fields::BOOK_TITLE)?;
			let content = f(fields::CONTENT)?;
			let content_exact = f(fields::CONTENT_EXACT)?;
			let sequence_index = f(fields::SEQUENCE_INDEX)?;
			let char_count = f(fields::CHAR_COUNT)?;
			let word_count = f(fields::WORD_COUNT)?;
			let language = f(fields::LANGUAGE)?;
			let ocr_quality = f(fields::OCR_QUALITY)?;
			for c in chunks {
				let id = chunk_key(c);
				put(id.clone(), doc!(
					key => id,
					source_id => c.source_id.to_string(),
					source_name => c.source_name.clone(),
					genre => c.genre.clone(),
					author => c.author.clone(),
					book_title => c.book_title.clone(),
					content => c.content.clone(),
					content_exact => c.content.clone(),
					sequence_index => c.sequence_index,
					char_count => c.char_count,
					word_count => c.word_count,
					language => c.language.clone(),
					ocr_quality => c.ocr_quality,
					created_at => c.created_at,
					updated_at => c.updated_at,
				))?;
			}
		}
		Batch::Authors(authors) => {
			let name = f(fields::NAME)?;
			let name_infix = f(fields::NAME_INFIX)?;
			let role = f(fields::ROLE)?;
			let avatar_file = f(fields::AVATAR_FILE)?;
			let (entry_type, description) = (entry_type?, description?);
			for a in authors {
				put(a.name.clone(), doc!(
					key => a.name.clone(),
					name => a.name.clone(),
					name_infix => a.name.clone(),
					entry_type => a.entry_type.clone(),
					role => a.role.clone(),
					description => a.description.clone(),
					avatar_file => a.avatar_file.clone(),
					created_at => a.created_at,
					updated_at => a.updated_at,
				))?;
			}
		}
		Batch::Categories(categories) => {
			let name = f(fields::NAME)?;
			let name_infix = f(fields::NAME_INFIX)?;
			let (entry_type, description) = (entry_type?, description?);
			for c in categories {
				put(c.name.clone(), doc!(
					key => c.name.clone(),
					name => c.name.clone(),
					name_infix => c.name.clone(),
					entry_type => c.entry_type.clone(),
					description => c.description.clone(),
					created_at => c.created_at,
					updated_at => c.updated_at,
				))?;
			}
		}
		Batch::Titles(titles) => {
			let title = f(fields::TITLE)?;
			let title_infix = f(fields::TITLE_INFIX)?;
			let (entry_type, description) = (entry_type?, description?);
			for t in titles {
				put(t.title.clone(), doc!(
					key => t.title.clone(),
					title => t.title.clone(),
					title_infix => t.title.clone(),
					entry_type => t.entry_type.clone(),
					description => t.description.clone(),
					created_at => t.created_at,
					updated_at => t.updated_at,
				))?;
			}
		}
	}
	Ok(())
}

fn chunk_key(chunk: &Chunk) -> String {
	format!("{}:{}", chunk.source_id, chunk.sequence_index)
}
