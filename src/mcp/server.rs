use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use gtags_nav::error::Result;
use gtags_nav::process::RunOptions;
use gtags_nav::store::require_root;
use gtags_nav::{
    paths, BackgroundTask, GtagsError, Navigator, RootLocks, SessionRegistry, SettingsSource,
    TaskOutcome,
};

/// Settings are resolved for each request from the project it targets, so one
/// server can serve several tag roots with their own `.gtags-nav.yml`.
#[derive(Clone)]
pub struct McpServer {
    source: SettingsSource,
    registry: SessionRegistry,
    locks: RootLocks,
}

impl McpServer {
    pub fn new(source: SettingsSource) -> Self {
        Self {
            source,
            registry: SessionRegistry::new(),
            locks: RootLocks::new(),
        }
    }

    async fn run_blocking<T, F>(&self, label: &str, start: PathBuf, f: F) -> CallToolResult
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Navigator, CancellationToken) -> Result<T> + Send + 'static,
    {
        let source = self.source.clone();
        let registry = self.registry.clone();
        let task = BackgroundTask::spawn(label, move |token| {
            let navigator = Navigator::new(source.resolve(&start)?, registry);
            f(navigator, token)
        });

        match task.wait().await {
            TaskOutcome::Completed(value) => {
                let json = serde_json::to_string_pretty(&value).unwrap_or_default();
                CallToolResult::success(vec![Content::text(json)])
            }
            TaskOutcome::Cancelled => {
                CallToolResult::error(vec![Content::text(format!("{} was cancelled", label))])
            }
            TaskOutcome::Failed(message) => CallToolResult::error(vec![Content::text(message)]),
        }
    }
}

fn schema_for<T: JsonSchema>() -> Arc<serde_json::Map<String, serde_json::Value>> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(&schema) {
        Ok(serde_json::Value::Object(map)) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    }
}

fn parse_params<T: DeserializeOwned>(
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
) -> std::result::Result<T, McpError> {
    serde_json::from_value(serde_json::Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| McpError::invalid_params(e.to_string(), None))
}

fn tool<T: JsonSchema>(name: &'static str, title: &str, description: &'static str) -> Tool {
    Tool {
        name: name.into(),
        title: Some(title.to_string()),
        description: Some(description.into()),
        input_schema: schema_for::<T>(),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindSymbolParams {
    /// Any file or directory inside the tagged project
    pub path: String,
    /// Symbol name or pattern
    pub symbol: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListSymbolsParams {
    /// Any file or directory inside the tagged project
    pub path: String,
    /// Only symbols starting with this prefix (default: all)
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RebuildTagsParams {
    /// Project directory (must already contain GTAGS unless `create` is set)
    pub path: String,
    /// Build a fresh index in `path` even if no GTAGS exists yet
    #[serde(default)]
    pub create: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateFileParams {
    /// File to re-index
    pub file: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ToolVersionParams {
    /// Any file or directory inside the tagged project
    pub path: String,
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "gtags-nav".to_string(),
                title: Some("GNU GLOBAL Navigator".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Symbol navigation backed by GNU GLOBAL tag databases. \
                 Provides definition lookup, reference search and tag updates. \
                 Settings are read from the .gtags-nav.yml of each request's tag root."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        let tools = vec![
            tool::<FindSymbolParams>("find_definition", "Find Definition", "Find symbol definitions"),
            tool::<FindSymbolParams>("find_references", "Find References", "Find symbol references"),
            tool::<ListSymbolsParams>("list_symbols", "List Symbols", "List symbols by prefix"),
            tool::<RebuildTagsParams>("rebuild_tags", "Rebuild Tags", "Rebuild the tag database"),
            tool::<UpdateFileParams>("update_file", "Update File", "Re-index one file"),
            tool::<ToolVersionParams>("tool_version", "Tool Version", "Installed GNU GLOBAL version"),
        ];

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let result = match request.name.as_ref() {
            "find_definition" | "find_references" => {
                let reference = request.name.as_ref() == "find_references";
                let params: FindSymbolParams = parse_params(request.arguments)?;
                let start = PathBuf::from(&params.path);

                self.run_blocking("match", start, move |navigator, token| {
                    let store = navigator.open(Path::new(&params.path))?;
                    store.match_pattern_with(
                        &params.symbol,
                        reference,
                        &RunOptions::default().with_cancel(token),
                    )
                })
                .await
            }
            "list_symbols" => {
                let params: ListSymbolsParams = parse_params(request.arguments)?;
                let start = PathBuf::from(&params.path);

                self.run_blocking("list_symbols", start, move |navigator, _| {
                    let store = navigator.open(Path::new(&params.path))?;
                    match params.prefix.as_deref() {
                        Some(prefix) if !prefix.is_empty() => store.by_prefix(prefix),
                        _ => navigator.show_symbols(&store),
                    }
                })
                .await
            }
            "rebuild_tags" => {
                let params: RebuildTagsParams = parse_params(request.arguments)?;
                let root = if params.create.unwrap_or(false) {
                    std::env::current_dir()
                        .map_err(GtagsError::from)
                        .and_then(|cwd| paths::absolutize(&params.path, &cwd))
                } else {
                    require_root(&params.path)
                };
                let root = match root {
                    Ok(root) => root,
                    Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
                };

                let _guard = self.locks.lock(&root.to_string_lossy()).await;
                self.run_blocking("rebuild", root.clone(), move |navigator, token| {
                    let store = navigator.open_root(root)?;
                    navigator.rebuild(&store, RunOptions::default().with_cancel(token))
                })
                .await
            }
            "update_file" => {
                let params: UpdateFileParams = parse_params(request.arguments)?;
                let root = match require_root(&params.file) {
                    Ok(root) => root,
                    Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
                };

                let _guard = self.locks.lock(&root.to_string_lossy()).await;
                self.run_blocking("update_file", root.clone(), move |navigator, _| {
                    let store = navigator.open_root(root)?;
                    navigator.update_in(&store, Path::new(&params.file))
                })
                .await
            }
            "tool_version" => {
                let params: ToolVersionParams = parse_params(request.arguments)?;
                let start = PathBuf::from(&params.path);

                self.run_blocking("tool_version", start, move |navigator, _| {
                    let store = navigator.open(Path::new(&params.path))?;
                    store.version()
                })
                .await
            }
            _ => {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {}", request.name),
                    None,
                ));
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_settings_follow_request_root() {
        let dir = TempDir::new().unwrap();
        let cached = dir.path().join("cached");
        let plain = dir.path().join("plain");
        for root in [&cached, &plain] {
            std::fs::create_dir_all(root).unwrap();
            std::fs::write(root.join("GTAGS"), b"").unwrap();
        }
        std::fs::write(cached.join(".gtags-nav.yml"), "cache_search_results: true\n").unwrap();

        let server = McpServer::new(SettingsSource::default());
        let caching = |navigator: Navigator, _: CancellationToken| -> Result<bool> {
            Ok(navigator.settings().cache_search_results)
        };

        let result = server.run_blocking("settings", cached, caching).await;
        assert_eq!(text_of(&result), "true");
        let result = server.run_blocking("settings", plain, caching).await;
        assert_eq!(text_of(&result), "false");
    }

    #[tokio::test]
    async fn test_invalid_settings_are_reported_per_request() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("GTAGS"), b"").unwrap();
        std::fs::write(dir.path().join(".gtags-nav.yml"), "cache_search_results: [\n").unwrap();

        let server = McpServer::new(SettingsSource::default());
        let result = server
            .run_blocking("settings", dir.path().to_path_buf(), |_, _| Ok(true))
            .await;
        assert_eq!(result.is_error, Some(true));
    }
}
