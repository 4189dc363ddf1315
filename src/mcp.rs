use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    doc_key::DocumentKey,
    error::{self, Error},
    search::{Hit, Language, Query, Scope, SearchEngine},
};

const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AventineMcpServer {
    /// `None` until sources have been acquired.
    engine: Arc<Option<SearchEngine>>,
    tool_router: ToolRouter<Self>,
}

impl AventineMcpServer {
    pub fn new(engine: Option<SearchEngine>) -> Self {
        Self {
            engine: Arc::new(engine),
            tool_router: Self::tool_router(),
        }
    }

    fn instructions(&self) -> String {
        let mut text = "Use aventine_search to find Latin lemmata by meaning and the passages quoting them.".to_string();
        match &*self.engine {
            Some(engine) => {
                let keys: Vec<&str> =
                    engine.documents().map(DocumentKey::as_str).collect();
                if !keys.is_empty() {
                    text.push_str(&format!(
                        " Searchable documents: {}.",
                        keys.join(", ")
                    ));
                }
            }
            None => text.push_str(" No sources have been acquired yet."),
        }
        text
    }
}

#[tool_router(router = tool_router)]
impl AventineMcpServer {
    /// Rank lemmata by meaning and cite where they occur.
    #[tool(
        name = "aventine_search",
        description = "Search lemmata by meaning. language=target matches an English description against definitions; language=source matches Latin words against lemma vectors. Optionally restrict to documents or a document-scoped vector space."
    )]
    pub async fn aventine_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;

        let Some(engine) = &*self.engine else {
            return Ok(tool_error(
                "The index has not been built yet: no sources were found.",
            ));
        };

        let query = match params.to_query() {
            Ok(query) => query,
            Err(e) => return Ok(tool_error(&e.to_string())),
        };

        let hits = match engine.search(&query) {
            Ok(hits) => hits,
            Err(e) => return Ok(tool_error(&e.to_string())),
        };

        let summary = format_search_summary(&hits, &query.text);
        let structured = serde_json::to_value(SearchResponse {
            query: query.text,
            language: query.language,
            result_count: hits.len(),
            results: hits,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for AventineMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("aventine", env!("CARGO_PKG_VERSION"))
                    .with_title("aventine MCP"),
            )
            .with_instructions(self.instructions())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Query text.
    pub query: String,
    /// "target" (default) or "source".
    pub language: Option<String>,
    /// Only accept lemmata occurring in these documents. An empty list
    /// accepts every lemma without citations. Default: all documents.
    pub documents: Option<Vec<String>>,
    /// Maximum number of results (default: 10).
    pub limit: Option<usize>,
    /// "universal" (default) or a document key with its own word vectors.
    pub scope: Option<String>,
}

impl SearchParams {
    fn to_query(&self) -> error::Result<Query> {
        let language = match &self.language {
            Some(language) => language.parse()?,
            None => Language::Target,
        };
        let scope: Scope = match &self.scope {
            Some(scope) => scope.parse()?,
            None => Scope::Universal,
        };

        let mut query = Query::new(self.query.clone(), language)
            .with_max_results(self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .with_scope(scope);
        if let Some(documents) = &self.documents {
            let keys = documents
                .iter()
                .map(|key| {
                    DocumentKey::parse(key)
                        .map_err(|e| Error::InvalidQuery(e.to_string()))
                })
                .collect::<error::Result<Vec<_>>>()?;
            query = query.with_documents(keys);
        }
        Ok(query)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    language: Language,
    result_count: usize,
    results: Vec<Hit>,
}

fn format_search_summary(hits: &[Hit], query: &str) -> String {
    if hits.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(hits.len() + 1);
    let suffix = if hits.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} result{} for \"{query}\":",
        hits.len(),
        suffix
    ));

    for hit in hits {
        let mut line = format!("{:.3} {}", hit.score, hit.lemma);
        if !hit.definition.is_empty() {
            line.push_str(&format!(" - {}", hit.definition));
        }
        let cited: usize = hit.locations.values().map(Vec::len).sum();
        if cited > 0 {
            line.push_str(&format!(" ({cited} citations)"));
        }
        lines.push(line);
    }

    lines.join("\n")
}

fn tool_error(message: &str) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.to_string())])
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(engine: Option<SearchEngine>) -> error::Result<()> {
    let server = AventineMcpServer::new(engine);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
