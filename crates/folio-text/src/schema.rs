use tantivy::schema::{
	IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED, STRING,
};
use tantivy::tokenizer::{Language, LowerCaser, NgramTokenizer, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::Index;

use folio_core::RecordKind;

/// English then Russian stemming over lowercased words.
pub const STEM_TOKENIZER: &str = "folio_stem";
/// Lowercased words, no stemming.
pub const EXACT_TOKENIZER: &str = "folio_exact";
/// Lowercased 3-grams for substring lookups.
pub const INFIX_TOKENIZER: &str = "folio_infix";

pub mod fields {
	/// Identity of a record within its table; rewrites replace by key.
	pub const KEY: &str = "key";

	pub const SOURCE_ID: &str = "source_id";
	pub const SOURCE_NAME: &str = "source_name";
	pub const GENRE: &str = "genre";
	pub const AUTHOR: &str = "author";
	pub const BOOK_TITLE: &str = "book_title";
	pub const CONTENT: &str = "content";
	pub const CONTENT_EXACT: &str = "content_exact";
	pub const SEQUENCE_INDEX: &str = "sequence_index";
	pub const CHAR_COUNT: &str = "char_count";
	pub const WORD_COUNT: &str = "word_count";
	pub const LANGUAGE: &str = "language";
	pub const OCR_QUALITY: &str = "ocr_quality";

	pub const NAME: &str = "name";
	pub const NAME_INFIX: &str = "name_infix";
	pub const TITLE: &str = "title";
	pub const TITLE_INFIX: &str = "title_infix";
	pub const ENTRY_TYPE: &str = "entry_type";
	pub const ROLE: &str = "role";
	pub const DESCRIPTION: &str = "description";
	pub const AVATAR_FILE: &str = "avatar_file";

	pub const CREATED_AT: &str = "created_at";
	pub const UPDATED_AT: &str = "updated_at";
}

fn text(tokenizer: &str, stored: bool) -> TextOptions {
	let indexing = TextFieldIndexing::default()
		.set_tokenizer(tokenizer)
		.set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let options = TextOptions::default().set_indexing_options(indexing);
	if stored { options.set_stored() } else { options }
}

/// Field layout of the table backing `kind`.
pub fn build_schema(kind: RecordKind) -> Schema {
	use fields::*;

	let mut builder = Schema::builder();
	builder.add_text_field(KEY, STRING | STORED);
	match kind {
		RecordKind::Chunk => {
			builder.add_text_field(SOURCE_ID, STRING | STORED);
			builder.add_text_field(SOURCE_NAME, STRING | STORED);
			builder.add_text_field(GENRE, text(EXACT_TOKENIZER, true));
			builder.add_text_field(AUTHOR, text(EXACT_TOKENIZER, true));
			builder.add_text_field(BOOK_TITLE, text(STEM_TOKENIZER, true));
			builder.add_text_field(CONTENT, text(STEM_TOKENIZER, true));
			builder.add_text_field(CONTENT_EXACT, text(EXACT_TOKENIZER, false));
			builder.add_u64_field(SEQUENCE_INDEX, INDEXED | STORED | FAST);
			builder.add_u64_field(CHAR_COUNT, STORED | FAST);
			builder.add_u64_field(WORD_COUNT, STORED | FAST);
			builder.add_text_field(LANGUAGE, STRING | STORED);
			builder.add_f64_field(OCR_QUALITY, STORED | FAST);
		}
		RecordKind::Author => {
			builder.add_text_field(NAME, text(EXACT_TOKENIZER, true));
			builder.add_text_field(NAME_INFIX, text(INFIX_TOKENIZER, false));
			builder.add_text_field(ENTRY_TYPE, STRING | STORED);
			builder.add_text_field(ROLE, text(STEM_TOKENIZER, true));
			builder.add_text_field(DESCRIPTION, text(STEM_TOKENIZER, true));
			builder.add_text_field(AVATAR_FILE, STORED);
		}
		RecordKind::Category => {
			builder.add_text_field(NAME, text(EXACT_TOKENIZER, true));
			builder.add_text_field(NAME_INFIX, text(INFIX_TOKENIZER, false));
			builder.add_text_field(ENTRY_TYPE, STRING | STORED);
			builder.add_text_field(DESCRIPTION, text(STEM_TOKENIZER, true));
		}
		RecordKind::Title => {
			builder.add_text_field(TITLE, text(EXACT_TOKENIZER, true));
			builder.add_text_field(TITLE_INFIX, text(INFIX_TOKENIZER, false));
			builder.add_text_field(ENTRY_TYPE, STRING | STORED);
			builder.add_text_field(DESCRIPTION, text(STEM_TOKENIZER, true));
		}
	}
	builder.add_i64_field(CREATED_AT, STORED | FAST);
	builder.add_i64_field(UPDATED_AT, STORED | FAST);
	builder.build()
}

/// Name field and its 3-gram companion for registry kinds.
pub fn name_fields(kind: RecordKind) -> Option<(&'static str, &'static str)> {
	match kind {
		RecordKind::Chunk => None,
		RecordKind::Author | RecordKind::Category => Some((fields::NAME, fields::NAME_INFIX)),
		RecordKind::Title => Some((fields::TITLE, fields::TITLE_INFIX)),
	}
}

pub fn register_tokenizers(index: &Index) -> tantivy::Result<()> {
	let stem = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(64))
		.filter(LowerCaser)
		.filter(Stemmer::new(Language::English))
		.filter(Stemmer::new(Language::Russian))
		.build();
	let exact = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(64))
		.filter(LowerCaser)
		.build();
	let infix = TextAnalyzer::builder(NgramTokenizer::new(3, 3, false)?)
		.filter(LowerCaser)
		.build();

	let manager = index.tokenizers();
	manager.register(STEM_TOKENIZER, stem);
	manager.register(EXACT_TOKENIZER, exact);
	manager.register(INFIX_TOKENIZER, infix);
	Ok(())
}
