//! racode -- local retrieval-augmented code search for a single repository.
//!
//! racode answers three classes of question about a source tree: ranked
//! full-text search over semantically meaningful chunks, the definition
//! site(s) of a named symbol, and the reference sites of a named symbol.
//! It is designed to be driven by a tool-using agent through the MCP
//! request/response protocol, with zero external services.
//!
//! # Architecture
//!
//! - **Chunking** ([`chunker`]) -- files are split into typed fragments:
//!   Markdown by headings, Python by top-level declarations,
//!   TypeScript/JavaScript by export declarations, whole-file for text and
//!   config formats.
//! - **Index store** ([`store`]) -- chunks live in a
//!   [Tantivy](https://github.com/quickwit-oss/tantivy) full-text index
//!   with BM25 ranking; per-file metadata (mtime, chunk count) lives in a
//!   [redb](https://github.com/cberner/redb) database next to it. Chunks
//!   from `FileStructure.md` / `IntegrationGuide.md` rank 3x higher.
//! - **Incremental indexing** ([`indexer`]) -- refreshes diff the tree
//!   against stored modification times and re-chunk only what changed.
//! - **Search** ([`search`]) -- sanitized implicit-AND queries with an
//!   extension filter; prose results are trimmed to a window around the
//!   first matching line.
//! - **Symbol resolution** ([`resolver`]) -- tree-sitter backends for
//!   Python and TypeScript/JavaScript operating on the live filesystem.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use racode::{IndexStore, Indexer, SearchEngine};
//!
//! let root = std::path::PathBuf::from(".");
//! let store =
//!     Arc::new(IndexStore::open(&root.join(".code_search.db")).unwrap());
//!
//! let indexer = Indexer::new(root, store.clone());
//! indexer.refresh().unwrap();
//!
//! let engine = SearchEngine::new(store);
//! for hit in engine.search("authentication", "*", 5).unwrap() {
//!     println!(
//!         "{:.3} {}:{} {}",
//!         hit.score, hit.file_path, hit.line_start, hit.symbol_name
//!     );
//! }
//! ```

pub mod chunker;
pub mod cli;
pub mod error;
pub mod fts;
pub mod indexer;
pub mod mcp;
pub mod meta_db;
pub mod resolver;
pub mod search;
pub mod store;
pub mod walker;

pub use chunker::{Chunk, ChunkType};
pub use error::{Error, Result};
pub use indexer::Indexer;
pub use resolver::{Language, Location, SymbolResolver};
pub use search::SearchEngine;
pub use store::IndexStore;
