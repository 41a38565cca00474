/// MCP Tool handlers for mettarag.
///
/// 1. search               – retrieval with dependency expansion
/// 2. index_repository     – ingest a repository checkout
/// 3. resolve_dependencies – batch function-dependency resolution
/// 4. chunk_dependencies   – expand one stored chunk
use crate::deps::add_function_dependencies;
use crate::indexer::Indexer;
use crate::mcp::server::McpContext;
use crate::rag::Document;
use crate::rag::context::{assemble_context, format_sources};
use crate::rag::retriever::Retriever;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Search query (natural language or code)
    query: String,
    /// Max results per category (default: 5)
    top_k: Option<usize>,
    /// Only search chunks of this project
    project: Option<String>,
    /// Only search chunks of this repository
    repo: Option<String>,
    /// Dependency hops to follow from retrieved code (default from config)
    max_depth: Option<usize>,
    /// Pull in the chunks retrieved code depends on (default from config)
    expand_dependencies: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct IndexRepositoryParams {
    /// Repository checkout to index
    directory: String,
    /// Project name stored on every chunk
    project: String,
    /// Repository name stored on every chunk
    repo: String,
    /// Delete the project/repo's existing chunks first (default: false)
    replace: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct ResolveDependenciesParams {
    /// Chunks per page (default from config)
    batch_size: Option<usize>,
    /// Re-resolve chunks that already have dependencies (default: false)
    force: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct ChunkDependenciesParams {
    /// Chunk id to start from
    chunk_id: String,
    /// Dependency hops to follow (default from config)
    max_depth: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: search ──────────────────────────────────────────────

    #[tool(
        description = "Search indexed MeTTa code and documentation. Retrieved code is expanded with the chunks it depends on. Returns an assembled context plus the individual sources."
    )]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }

        let top_k = p.top_k.unwrap_or(self.ctx.config.search_top_k);
        let deps = &self.ctx.config.dependencies;
        let expand = p.expand_dependencies.unwrap_or(deps.expand_on_search);

        let db = self.ctx.db.lock().await;
        let retriever = Retriever::new(&db, self.ctx.embedder.as_ref(), top_k)
            .scoped(p.project.as_deref(), p.repo.as_deref());

        let retrieved = if expand {
            retriever.retrieve_with_dependencies(&p.query, &deps.expander(p.max_depth))
        } else {
            retriever.retrieve(&p.query)
        };
        let context = retrieved
            .map_err(|e| McpError::internal_error(format!("search failed: {e}"), None))?;

        json_result(serde_json::json!({
            "context": assemble_context(&context),
            "sources": format_sources(&context),
            "dependencies_expanded": expand,
        }))
    }

    // ── Tool 2: index_repository ────────────────────────────────────

    #[tool(
        description = "Index a repository checkout: .metta files are chunked along top-level forms, .md files along headings. Run resolve_dependencies afterwards to link code chunks."
    )]
    async fn index_repository(
        &self,
        params: Parameters<IndexRepositoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.project.is_empty() || p.repo.is_empty() {
            return error_result("project and repo are required");
        }
        if !Path::new(&p.directory).is_dir() {
            return error_result(&format!("directory not found: {}", p.directory));
        }

        let mut indexer = Indexer::new(
            self.ctx.db.clone(),
            self.ctx.embedder.as_ref(),
            self.ctx.config.max_chunk_size,
        );
        let stats = indexer
            .index_repository(&p.directory, &p.project, &p.repo, p.replace.unwrap_or(false))
            .await
            .map_err(|e| McpError::internal_error(format!("indexing failed: {e:#}"), None))?;

        json_result(serde_json::json!({
            "success": stats.files_failed == 0,
            "directory": p.directory,
            "stats": stats,
        }))
    }

    // ── Tool 3: resolve_dependencies ────────────────────────────────

    #[tool(
        description = "Link every unresolved code chunk to the chunks defining the functions it calls (same project, repo and file). Use force to re-resolve everything."
    )]
    async fn resolve_dependencies(
        &self,
        params: Parameters<ResolveDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let batch_size = p
            .batch_size
            .unwrap_or(self.ctx.config.dependencies.batch_size);

        let db = self.ctx.db.lock().await;
        let stats = add_function_dependencies(&*db, batch_size, p.force.unwrap_or(false))
            .map_err(|e| McpError::internal_error(format!("resolution failed: {e}"), None))?;

        json_result(serde_json::json!({
            "stats": stats,
            "average_dependencies": stats.average_dependencies(),
        }))
    }

    // ── Tool 4: chunk_dependencies ──────────────────────────────────

    #[tool(description = "List the chunks a stored code chunk depends on, transitively up to max_depth hops")]
    async fn chunk_dependencies(
        &self,
        params: Parameters<ChunkDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let db = self.ctx.db.lock().await;

        let chunk = db
            .get_chunk(&p.chunk_id)
            .map_err(|e| McpError::internal_error(format!("lookup failed: {e}"), None))?;
        let Some(chunk) = chunk else {
            return error_result(&format!("chunk not found: {}", p.chunk_id));
        };
        let resolved = chunk.functions.is_some();

        let expander = self.ctx.config.dependencies.expander(p.max_depth);
        let expanded = match expander.expand(&*db, &[Document::from_chunk(chunk)]) {
            Ok(docs) => docs,
            Err(e) => return error_result(&format!("expansion failed: {e}")),
        };

        json_result(serde_json::json!({
            "chunk": expanded[0],
            "resolved": resolved,
            "dependencies": &expanded[1..],
        }))
    }
}
