//! Full-text chunk index backed by Tantivy.
//!
//! One document per chunk. The searchable fields are the file path,
//! chunk type, symbol name, and content; the raw path doubles as the
//! delete/replace key so a file's chunks are always swapped en bloc.
//! BM25 scores are multiplied by the doc-file boost at collection time.

use std::path::Path;

use tantivy::{
    DocId,
    Index,
    IndexReader,
    IndexWriter,
    Score,
    SegmentReader,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::*,
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
};

use crate::{chunker::Chunk, error::Result, search::DOC_BOOST};

/// Field names used in the schema.
pub mod fields {
    pub const PATH: &str = "path";
    pub const PATH_TOKENS: &str = "path_tokens";
    pub const CHUNK_TYPE: &str = "chunk_type";
    pub const SYMBOL_NAME: &str = "symbol_name";
    pub const CONTENT: &str = "content";
    pub const EXT: &str = "ext";
    pub const LINE_START: &str = "line_start";
    pub const LINE_END: &str = "line_end";
    pub const IS_DOC_FILE: &str = "is_doc_file";
}

const TOKENIZER: &str = "code";

/// Extension filter applied at the store level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionFilter {
    /// The `*` wildcard: no filtering.
    All,
    /// File-name suffixes such as `.md`; a chunk matches when its file path
    /// ends in any of them (case-sensitive).
    Suffixes(Vec<String>),
}

/// A chunk returned from the index with its boosted BM25 score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub score: f32,
    pub file_path: String,
    pub chunk_type: String,
    pub symbol_name: String,
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
    pub is_doc_file: bool,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    path: Field,
    path_tokens: Field,
    chunk_type: Field,
    symbol_name: Field,
    content: Field,
    ext: Field,
    line_start: Field,
    line_end: Field,
    is_doc_file: Field,
}

pub struct ChunkIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    let tokenized = || {
        TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
    };

    builder.add_text_field(fields::PATH, STRING | STORED);
    builder.add_text_field(fields::PATH_TOKENS, tokenized());
    builder.add_text_field(fields::CHUNK_TYPE, tokenized().set_stored());
    builder.add_text_field(fields::SYMBOL_NAME, tokenized().set_stored());
    builder.add_text_field(fields::CONTENT, tokenized().set_stored());
    builder.add_text_field(fields::EXT, STRING);
    builder.add_u64_field(fields::LINE_START, STORED);
    builder.add_u64_field(fields::LINE_END, STORED);
    builder.add_u64_field(fields::IS_DOC_FILE, STORED | FAST);

    builder.build()
}

/// Identifier-friendly analyzer: split on non-alphanumerics, drop
/// over-long tokens, lowercase. No stemming -- `login` must not be
/// conflated with `logins`' stem when matching identifiers.
fn register_tokenizers(index: &Index) {
    let code = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(60))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER, code);
}

impl ChunkIndex {
    /// Open or create the index at the given directory.
    ///
    /// An existing index whose schema differs from the current one (or
    /// that cannot be opened at all) is dropped and recreated empty.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let schema = build_schema();

        let index = match Self::try_open_existing(dir, &schema) {
            Ok(Some(index)) => index,
            Ok(None) => Self::create_at(dir, &schema)?,
            Err(e) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "search index unreadable or stale, recreating"
                );
                std::fs::remove_dir_all(dir)?;
                std::fs::create_dir_all(dir)?;
                Self::create_at(dir, &schema)?
            }
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    fn try_open_existing(
        dir: &Path,
        expected: &Schema,
    ) -> Result<Option<Index>> {
        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        if !Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            return Ok(None);
        }

        let index = Index::open(mmap_dir)?;
        let stored = serde_json::to_string(&index.schema()).ok();
        let current = serde_json::to_string(expected).ok();
        if stored.is_none() || stored != current {
            return Err(tantivy::TantivyError::SchemaError(
                "stored schema does not match the current field set".into(),
            )
            .into());
        }
        Ok(Some(index))
    }

    fn create_at(dir: &Path, schema: &Schema) -> Result<Index> {
        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        Ok(Index::create(
            mmap_dir,
            schema.clone(),
            tantivy::IndexSettings::default(),
        )?)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let schema = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    fn fields(&self) -> SchemaFields {
        let f = |name: &str| self.schema.get_field(name).unwrap();
        SchemaFields {
            path: f(fields::PATH),
            path_tokens: f(fields::PATH_TOKENS),
            chunk_type: f(fields::CHUNK_TYPE),
            symbol_name: f(fields::SYMBOL_NAME),
            content: f(fields::CONTENT),
            ext: f(fields::EXT),
            line_start: f(fields::LINE_START),
            line_end: f(fields::LINE_END),
            is_doc_file: f(fields::IS_DOC_FILE),
        }
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Stage deletion of every chunk belonging to `path`.
    pub fn delete_file(&self, writer: &IndexWriter, path: &str) {
        let f = self.fields();
        writer.delete_term(tantivy::Term::from_field_text(f.path, path));
    }

    /// Stage insertion of a file's chunks. Existing chunks for the path are
    /// staged for deletion first so the replacement is en bloc.
    pub fn add_chunks(
        &self,
        writer: &IndexWriter,
        path: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let f = self.fields();
        self.delete_file(writer, path);

        let ext = path
            .rfind('.')
            .map(|i| &path[i..])
            .unwrap_or("")
            .to_string();

        for chunk in chunks {
            writer.add_document(doc!(
                f.path => path,
                f.path_tokens => path,
                f.chunk_type => chunk.chunk_type.as_str(),
                f.symbol_name => chunk.symbol_name.as_str(),
                f.content => chunk.content.as_str(),
                f.ext => ext.as_str(),
                f.line_start => chunk.line_start as u64,
                f.line_end => chunk.line_end as u64,
                f.is_doc_file => u64::from(chunk.is_doc_file),
            ))?;
        }

        Ok(())
    }

    /// Stage deletion of every chunk in the index.
    pub fn clear(&self, writer: &mut IndexWriter) -> Result<()> {
        writer.delete_all_documents()?;
        Ok(())
    }

    /// Execute a sanitized query expression with BM25 ranking, the doc-file
    /// boost, and an optional extension filter. Results come back best
    /// match first.
    ///
    /// Terms combine with implicit AND: every term must appear in one of
    /// the indexed fields of a matching chunk.
    pub fn search(
        &self,
        query_str: &str,
        extensions: &ExtensionFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let mut parser = QueryParser::for_index(
            &self.index,
            vec![f.path_tokens, f.chunk_type, f.symbol_name, f.content],
        );
        parser.set_conjunction_by_default();
        let (user_query, _errors) = parser.parse_query_lenient(query_str);

        let query: Box<dyn Query> = match extensions {
            ExtensionFilter::All => user_query,
            ExtensionFilter::Suffixes(suffixes) => {
                let ext_clauses: Vec<(Occur, Box<dyn Query>)> = suffixes
                    .iter()
                    .map(|suffix| {
                        let term =
                            tantivy::Term::from_field_text(f.ext, suffix);
                        (
                            Occur::Should,
                            Box::new(TermQuery::new(
                                term,
                                IndexRecordOption::Basic,
                            )) as Box<dyn Query>,
                        )
                    })
                    .collect();
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, user_query),
                    (Occur::Must, Box::new(BooleanQuery::new(ext_clauses))),
                ]))
            }
        };

        let collector = TopDocs::with_limit(limit).tweak_score(
            move |segment_reader: &SegmentReader| {
                let is_doc = segment_reader
                    .fast_fields()
                    .u64(fields::IS_DOC_FILE)
                    .expect("is_doc_file fast field");
                move |doc: DocId, score: Score| {
                    if is_doc.first(doc).unwrap_or(0) == 1 {
                        score * DOC_BOOST
                    } else {
                        score
                    }
                }
            },
        );

        let top_docs = searcher.search(&*query, &collector)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(ScoredChunk {
                score,
                file_path: extract_text(&doc, f.path),
                chunk_type: extract_text(&doc, f.chunk_type),
                symbol_name: extract_text(&doc, f.symbol_name),
                content: extract_text(&doc, f.content),
                line_start: extract_u64(&doc, f.line_start) as usize,
                line_end: extract_u64(&doc, f.line_end) as usize,
                is_doc_file: extract_u64(&doc, f.is_doc_file) == 1,
            });
        }

        Ok(results)
    }
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
