//! MCP service surface.
//!
//! Exposes the four `code_search_*` tools over stdio. Free-form tool
//! arguments are validated into typed request structs before they reach
//! the core; every operation refreshes the index first except the rebuild,
//! which rebuilds from scratch.

use std::{path::PathBuf, sync::Arc};

use rmcp::{
    RoleServer,
    ServerHandler,
    ServiceExt,
    handler::server::{
        router::{prompt::PromptRouter, tool::ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolResult,
        Content,
        GetPromptRequestParam,
        GetPromptResult,
        Implementation,
        ListPromptsResult,
        PaginatedRequestParam,
        PromptMessage,
        PromptMessageRole,
        ServerCapabilities,
        ServerInfo,
    },
    prompt,
    prompt_handler,
    prompt_router,
    service::RequestContext,
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{self, Error},
    indexer::Indexer,
    resolver::{Language, Location, SymbolResolver},
    search::{DEFAULT_EXTENSIONS, DEFAULT_LIMIT, SearchEngine, SearchHit},
    store::IndexStore,
};

struct RacodeState {
    indexer: Indexer,
    engine: SearchEngine,
    resolver: SymbolResolver,
}

#[derive(Clone)]
pub struct RacodeMcpServer {
    state: Arc<RacodeState>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl RacodeMcpServer {
    pub fn new(project_root: PathBuf, store: Arc<IndexStore>) -> Self {
        let state = RacodeState {
            indexer: Indexer::new(project_root.clone(), store.clone()),
            engine: SearchEngine::new(store),
            resolver: SymbolResolver::new(project_root),
        };
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    pub fn indexer(&self) -> &Indexer {
        &self.state.indexer
    }

    fn refresh_index(&self) -> Result<(), rmcp::ErrorData> {
        self.state
            .indexer
            .refresh()
            .map(|_| ())
            .map_err(|e| mcp_error("index refresh failed", e))
    }
}

#[tool_router(router = tool_router)]
impl RacodeMcpServer {
    /// Ranked full-text search over the project's chunk index.
    #[tool(
        name = "code_search_search",
        description = "Search the codebase with BM25 ranking. Structural documentation (FileStructure.md, IntegrationGuide.md) is boosted 3x. The index refreshes automatically before each search."
    )]
    pub async fn code_search_search(
        &self,
        params: Parameters<SearchRequest>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        self.refresh_index()?;

        let extensions = params
            .extensions
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.to_string());
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

        let results = match self.state.engine.search(
            &params.query,
            &extensions,
            limit,
        ) {
            Ok(results) => results,
            Err(e) if e.is_invalid_argument() => {
                return Err(rmcp::ErrorData::invalid_params(
                    e.to_string(),
                    None,
                ));
            }
            Err(e) => return Err(mcp_error("search failed", e)),
        };

        let message = results.is_empty().then(|| {
            format!(
                "No results found for '{}'. Try different keywords or \
                 extensions='*' to search all files.",
                params.query
            )
        });

        let summary = format_search_summary(&results, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            count: results.len(),
            results,
            query: params.query,
            message,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        Ok(CallToolResult {
            content: vec![Content::text(summary)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }

    /// Definition sites of a symbol.
    #[tool(
        name = "code_search_get_definition",
        description = "Find where a symbol (function, class, variable, type) is defined, by parsing project sources. Languages: python, typescript."
    )]
    pub async fn code_search_get_definition(
        &self,
        params: Parameters<SymbolRequest>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        self.refresh_index()?;

        let outcome = self
            .state
            .resolver
            .get_definition(&params.symbol, params.language);
        symbol_result(outcome, params, "definition")
    }

    /// Reference sites of a symbol.
    #[tool(
        name = "code_search_get_references",
        description = "Find everywhere a symbol is referenced, by parsing project sources. Languages: python, typescript."
    )]
    pub async fn code_search_get_references(
        &self,
        params: Parameters<SymbolRequest>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        self.refresh_index()?;

        let outcome = self
            .state
            .resolver
            .get_references(&params.symbol, params.language);
        symbol_result(outcome, params, "reference")
    }

    /// Full index rebuild.
    #[tool(
        name = "code_search_rebuild_index",
        description = "Drop the search index and rebuild it from scratch. Normally unnecessary; refreshes happen automatically before each search."
    )]
    pub async fn code_search_rebuild_index(
        &self,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let stats = self
            .state
            .indexer
            .rebuild()
            .map_err(|e| mcp_error("index rebuild failed", e))?;

        let summary = format!(
            "Rebuilt index: {} files, {} chunks in {} ms",
            stats.indexed_files, stats.chunks, stats.elapsed_ms
        );
        let structured = serde_json::to_value(&stats)
            .map_err(|e| mcp_error("failed to serialize rebuild stats", e))?;

        Ok(CallToolResult {
            content: vec![Content::text(summary)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }
}

#[prompt_router]
impl RacodeMcpServer {
    /// racode query guide.
    #[prompt(
        name = "code_search_guide",
        title = "Code Search Guide",
        description = "How to search code and resolve symbols with racode"
    )]
    pub async fn query_guide(&self) -> Vec<PromptMessage> {
        vec![PromptMessage::new_text(
            PromptMessageRole::User,
            r#"# racode Quick Guide

racode indexes this repository and answers three kinds of question:

- code_search_search: ranked full-text search over semantic chunks
  (markdown sections, python/typescript declarations, config files)
- code_search_get_definition: where a symbol is defined
- code_search_get_references: everywhere a symbol is used
- code_search_rebuild_index: drop and rebuild the index

## Tips

- Searches default to .md files; pass extensions='*' for everything
  or a comma-separated list like '.py,.ts'
- Use simple keywords; boolean operators are stripped
- FileStructure.md and IntegrationGuide.md always rank 3x higher
"#,
        )]
    }
}

#[tool_handler(router = self.tool_router)]
#[prompt_handler(router = self.prompt_router)]
impl ServerHandler for RacodeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "racode".to_string(),
                title: Some("racode code search".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use code_search_search to find relevant code and docs, then \
                 code_search_get_definition / code_search_get_references to \
                 resolve symbols precisely."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRequest {
    /// Search keywords. Use simple terms; special characters are stripped.
    pub query: String,
    /// Comma-separated file suffixes (e.g. ".py,.ts"), or "*" for all
    /// files. Defaults to ".md".
    pub extensions: Option<String>,
    /// Maximum number of results, 1..=100. Defaults to 5.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SymbolRequest {
    /// Symbol name to look up, e.g. "get_gpt_service" or "ModelSelector".
    pub symbol: String,
    /// Language of the symbol: "python" or "typescript".
    pub language: Language,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
    count: usize,
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SymbolResponse {
    results: Vec<Location>,
    count: usize,
    symbol: String,
    language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

fn symbol_result(
    outcome: error::Result<Vec<Location>>,
    params: SymbolRequest,
    noun: &str,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let (results, warning) = match outcome {
        Ok(results) => (results, None),
        // A timed-out backend reports an empty list plus a warning rather
        // than a hard error.
        Err(e @ Error::BackendTimeout(_)) => (Vec::new(), Some(e.to_string())),
        Err(e) if e.is_invalid_argument() => {
            return Err(rmcp::ErrorData::invalid_params(e.to_string(), None));
        }
        Err(e @ Error::BackendUnavailable { .. }) => {
            return Err(rmcp::ErrorData::internal_error(e.to_string(), None));
        }
        Err(e) => return Err(mcp_error("symbol lookup failed", e)),
    };

    let message = (results.is_empty() && warning.is_none()).then(|| {
        format!(
            "No {noun} found for symbol '{}'. Check the spelling or try \
             code_search_search.",
            params.symbol
        )
    });

    let summary = match &warning {
        Some(warning) => warning.clone(),
        None => format_symbol_summary(&results, &params.symbol, noun),
    };

    let structured = serde_json::to_value(SymbolResponse {
        count: results.len(),
        results,
        symbol: params.symbol,
        language: params.language,
        message,
        warning,
    })
    .map_err(|e| mcp_error("failed to serialize symbol results", e))?;

    Ok(CallToolResult {
        content: vec![Content::text(summary)],
        structured_content: Some(structured),
        is_error: Some(false),
        meta: None,
    })
}

fn format_search_summary(results: &[SearchHit], query: &str) -> String {
    if results.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} result{} for \"{query}\":",
        results.len(),
        suffix
    ));
    for hit in results {
        lines.push(format!(
            "{:.3} {}:{} [{}] {}",
            hit.score,
            hit.file_path,
            hit.line_start,
            hit.chunk_type,
            hit.symbol_name
        ));
    }
    lines.join("\n")
}

fn format_symbol_summary(
    results: &[Location],
    symbol: &str,
    noun: &str,
) -> String {
    if results.is_empty() {
        return format!("No {noun} found for '{symbol}'");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} {noun}{} for '{symbol}':",
        results.len(),
        suffix
    ));
    for loc in results {
        lines.push(format!(
            "{}:{}:{} {}",
            loc.file_path, loc.line, loc.column, loc.context
        ));
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Open the store, run the initial refresh, and serve MCP over stdio
/// until the client disconnects.
pub fn run_mcp(project_root: PathBuf, db_path: PathBuf) -> error::Result<()> {
    let store = Arc::new(IndexStore::open(&db_path)?);
    let server = RacodeMcpServer::new(project_root, store);

    let stats = server.indexer().refresh()?;
    tracing::info!(
        files = stats.files_seen(),
        chunks_created = stats.chunks_created,
        time_ms = stats.duration_ms,
        "index ready"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            Error::Config(format!("MCP server initialization failed: {e}"))
        })?;
        running
            .waiting()
            .await
            .map_err(|e| Error::Config(format!("MCP server error: {e}")))?;
        Ok(())
    })
}
