//! Query construction and result post-processing.
//!
//! Turns a free-form query into a safe full-text expression (whitespace
//! terms, grammar metacharacters stripped, implicit AND), applies the
//! extension filter and result limit, and trims prose results to a short
//! window around the first matching line.

use std::sync::Arc;

use crate::{
    error::{Error, Result},
    fts::{ExtensionFilter, ScoredChunk},
    store::IndexStore,
};

/// Multiplicative ranking bonus for chunks from structural documentation.
pub const DOC_BOOST: f32 = 3.0;

/// File basenames whose chunks receive [`DOC_BOOST`].
pub const DOC_BASENAMES: &[&str] = &["FileStructure.md", "IntegrationGuide.md"];

/// Extension filter applied when the caller does not pass one.
pub const DEFAULT_EXTENSIONS: &str = ".md";

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 100;

/// Window size for trimmed prose snippets: the first matching line sits
/// tenth, with nine lines above and ten below.
const SNIPPET_LINES: usize = 20;
const SNIPPET_LINES_ABOVE: usize = 9;
const SNIPPET_LINES_BELOW: usize = 10;

/// Characters with meaning in the full-text query grammar, stripped from
/// every term before the query is built.
const QUERY_METACHARACTERS: &[char] = &[
    '"', '\'', '(', ')', '[', ']', '{', '}', '^', '~', '*', ':', '+', '-',
    '!', '\\',
];

/// A ranked search result, possibly trimmed for prose files.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub file_path: String,
    pub chunk_type: String,
    pub symbol_name: String,
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
    pub score: f32,
}

/// Split a query on whitespace and strip grammar metacharacters from each
/// term. Bare boolean operators are dropped entirely.
pub fn sanitize_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|term| !matches!(*term, "AND" | "OR" | "NOT"))
        .map(|term| {
            term.chars()
                .filter(|c| !QUERY_METACHARACTERS.contains(c))
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .collect()
}

/// Parse the caller's extension argument: `*` for everything, or a
/// comma-separated list of suffixes (a missing leading dot is tolerated).
pub fn parse_extensions(arg: &str) -> ExtensionFilter {
    let arg = arg.trim();
    if arg.is_empty() {
        return parse_extensions(DEFAULT_EXTENSIONS);
    }

    let mut suffixes = Vec::new();
    for part in arg.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part == "*" {
            return ExtensionFilter::All;
        }
        if let Some(stripped) = part.strip_prefix('.') {
            suffixes.push(format!(".{stripped}"));
        } else {
            suffixes.push(format!(".{part}"));
        }
    }

    if suffixes.is_empty() {
        ExtensionFilter::All
    } else {
        ExtensionFilter::Suffixes(suffixes)
    }
}

pub struct SearchEngine {
    store: Arc<IndexStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// Run a ranked search. `extensions` is a suffix list or `*`; `limit`
    /// must be within 1..=100.
    pub fn search(
        &self,
        query: &str,
        extensions: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::InvalidArgument(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }

        let terms = sanitize_terms(query);
        if terms.is_empty() {
            return Err(Error::InvalidArgument(
                "search query contains no usable terms; use simple keywords"
                    .to_string(),
            ));
        }

        let filter = parse_extensions(extensions);
        let chunks = self.store.search(&terms.join(" "), &filter, limit)?;

        Ok(chunks
            .into_iter()
            .map(|chunk| postprocess(chunk, &terms))
            .collect())
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine").finish_non_exhaustive()
    }
}

fn postprocess(chunk: ScoredChunk, terms: &[String]) -> SearchHit {
    let (content, line_start, line_end) = if chunk.file_path.ends_with(".md") {
        trim_prose_window(
            &chunk.content,
            chunk.line_start,
            chunk.line_end,
            terms,
        )
    } else {
        (chunk.content, chunk.line_start, chunk.line_end)
    };

    SearchHit {
        file_path: chunk.file_path,
        chunk_type: chunk.chunk_type,
        symbol_name: chunk.symbol_name,
        content,
        line_start,
        line_end,
        score: chunk.score,
    }
}

/// Trim chunk content to roughly twenty lines around the first line
/// containing any query term (case-insensitive). Returns the window and
/// its absolute line range.
fn trim_prose_window(
    content: &str,
    abs_start: usize,
    abs_end: usize,
    terms: &[String],
) -> (String, usize, usize) {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= SNIPPET_LINES {
        return (content.to_string(), abs_start, abs_end);
    }

    let lowered: Vec<String> =
        terms.iter().map(|t| t.to_lowercase()).collect();
    let hit = lines.iter().position(|line| {
        let line = line.to_lowercase();
        lowered.iter().any(|term| line.contains(term))
    });

    let (start, end) = match hit {
        // 1-based within the chunk.
        Some(idx) => {
            let h = idx + 1;
            let start = h.saturating_sub(SNIPPET_LINES_ABOVE).max(1);
            let end = (h + SNIPPET_LINES_BELOW).min(lines.len());
            (start, end)
        }
        None => (1, SNIPPET_LINES.min(lines.len())),
    };

    let window = lines[start - 1..end].join("\n");
    (window, abs_start + start - 1, abs_start + end - 1)
}
