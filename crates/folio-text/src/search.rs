use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Term, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, TantivyDocument};

use folio_core::RecordKind;

use crate::schema::{fields, name_fields, register_tokenizers, INFIX_TOKENIZER};

/// Read-only full-text search over the chunk table.
pub struct ChunkSearcher {
	index: Index,
	searcher: tantivy::Searcher,
	content: Field,
	book_title: Field,
	author: Field,
	genre: Field,
	source_name: Field,
	sequence_index: Field,
}

#[derive(Debug, Clone)]
pub struct ChunkHit {
	pub score: f32,
	pub source_name: String,
	pub book_title: String,
	pub author: String,
	pub genre: String,
	pub sequence_index: u64,
	/// HTML fragment with matched terms wrapped in `<b>`.
	pub snippet: String,
}

impl ChunkSearcher {
	/// Open the chunk table under an index root written by [`crate::TantivyStore`].
	pub fn open(root: &Path) -> Result<Self> {
		let dir = root.join(RecordKind::Chunk.table_name());
		let index = Index::open_in_dir(&dir).with_context(|| format!("opening {}", dir.display()))?;
		register_tokenizers(&index)?;
		let searcher = index.reader()?.searcher();
		let schema = index.schema();
		Ok(Self {
			content: schema.get_field(fields::CONTENT)?,
			book_title: schema.get_field(fields::BOOK_TITLE)?,
			author: schema.get_field(fields::AUTHOR)?,
			genre: schema.get_field(fields::GENRE)?,
			source_name: schema.get_field(fields::SOURCE_NAME)?,
			sequence_index: schema.get_field(fields::SEQUENCE_INDEX)?,
			index,
			searcher,
		})
	}

	pub fn num_chunks(&self) -> u64 {
		self.searcher.num_docs()
	}

	pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<ChunkHit>> {
		let mut parser = QueryParser::for_index(&self.index, vec![self.content, self.book_title, self.author]);
		parser.set_field_boost(self.book_title, 2.0);
		let query = parser.parse_query(query_text)?;
		let top_docs = self.searcher.search(&query, &TopDocs::with_limit(limit.max(1)))?;
		let snippets = tantivy::snippet::SnippetGenerator::create(&self.searcher, &query, self.content)?;

		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, address) in top_docs {
			let doc: TantivyDocument = self.searcher.doc(address)?;
			let text = |field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string();
			hits.push(ChunkHit {
				score,
				source_name: text(self.source_name),
				book_title: text(self.book_title),
				author: text(self.author),
				genre: text(self.genre),
				sequence_index: doc.get_first(self.sequence_index).and_then(|v| v.as_u64()).unwrap_or(0),
				snippet: snippets.snippet_from_doc(&doc).to_html(),
			});
		}
		Ok(hits)
	}
}

/// Registry names of `kind` containing `fragment` as a substring (case-insensitive).
///
/// Fragments shorter than three characters match nothing.
pub fn search_names(root: &Path, kind: RecordKind, fragment: &str, limit: usize) -> Result<Vec<String>> {
	let (name_field, infix_field) =
		name_fields(kind).with_context(|| format!("{kind} has no name registry"))?;
	let dir = root.join(kind.table_name());
	let index = Index::open_in_dir(&dir).with_context(|| format!("opening {}", dir.display()))?;
	register_tokenizers(&index)?;
	let schema = index.schema();
	let name = schema.get_field(name_field)?;
	let infix = schema.get_field(infix_field)?;

	let mut analyzer = index
		.tokenizers()
		.get(INFIX_TOKENIZER)
		.context("infix tokenizer not registered")?;
	let mut grams: Vec<Term> = Vec::new();
	let mut stream = analyzer.token_stream(fragment);
	while stream.advance() {
		grams.push(Term::from_field_text(infix, &stream.token().text));
	}
	if grams.is_empty() {
		return Ok(Vec::new());
	}
	let clauses: Vec<(Occur, Box<dyn Query>)> = grams
		.into_iter()
		.map(|term| (Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>))
		.collect();
	let query = BooleanQuery::new(clauses);

	let searcher = index.reader()?.searcher();
	let needle = fragment.to_lowercase();
	let mut names = Vec::new();
	// Filter every candidate before truncating, false positives must not use up the limit.
	for address in searcher.search(&query, &DocSetCollector)? {
		let doc: TantivyDocument = searcher.doc(address)?;
		if let Some(value) = doc.get_first(name).and_then(|v| v.as_str()) {
			// Trigram hits can be false positives when grams occur apart.
			if value.to_lowercase().contains(&needle) {
				names.push(value.to_string());
			}
		}
	}
	names.sort();
	names.truncate(limit);
	Ok(names)
}
