//! MCP server handler exposing the agent catalog as tools.
//!
//! Every tool answers with one JSON text block. Lookups that find nothing and
//! requests the catalog rejects come back as `{"ok": false, "error": ...}`;
//! unknown tools and missing or malformed arguments are protocol errors.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::schema::{
    CallToolResult, ClientRequest, ListToolsResult, RpcError, TextContent, Tool, ToolInputSchema,
    schema_utils::{NotificationFromClient, RequestFromClient, ResultFromServer},
};
use rust_mcp_sdk::{
    McpServer,
    mcp_server::{ServerHandlerCore, enforce_compatible_protocol_version},
};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue, json};

use crate::catalog::{Catalog, ProposalTarget};
use crate::error::CatalogResult;
use crate::model::{MetadataUpdate, Tier, agent_count};
use crate::search::{SearchFilters, index::DEFAULT_SUGGESTION_LIMIT};

type Args = JsonMap<String, JsonValue>;

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    /// (name, json type, description)
    props: &'static [(&'static str, &'static str, &'static str)],
    required: &'static [&'static str],
    /// Accepts the tier/model/category/subcategory/role filters.
    filters: bool,
}

const FILTER_PROPS: &[(&str, &str, &str)] = &[
    ("tier", "string", "focused, expert or phd"),
    ("model", "string", "opus, sonnet or haiku"),
    ("category", "string", "Category id"),
    ("subcategory", "string", "Subcategory id"),
    ("role", "string", "executor, auditor or advisor"),
];

const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "list_navigation",
        description: "Category/subcategory/agent tree across both lineages",
        props: &[],
        required: &[],
        filters: false,
    },
    ToolSpec {
        name: "get_agent",
        description: "Parsed agent by id, or by category + subcategory + slug",
        props: &[
            ("id", "string", "category/subcategory/slug"),
            ("category", "string", "Category id"),
            ("subcategory", "string", "Subcategory id"),
            ("slug", "string", "Agent slug"),
        ],
        required: &[],
        filters: false,
    },
    ToolSpec {
        name: "get_raw_agent",
        description: "Raw file content of an agent",
        props: &[("id", "string", "category/subcategory/slug")],
        required: &["id"],
        filters: false,
    },
    ToolSpec {
        name: "list_agents",
        description: "Agent summaries matching the filters",
        props: &[],
        required: &[],
        filters: true,
    },
    ToolSpec {
        name: "search_agents",
        description: "Ranked full-text search over name, description, identity and vocabulary",
        props: &[("query", "string", "Search text")],
        required: &["query"],
        filters: true,
    },
    ToolSpec {
        name: "suggest",
        description: "Autocomplete suggestions for a partial query",
        props: &[
            ("query", "string", "Partial search text"),
            ("limit", "integer", "Maximum suggestions (default 5)"),
        ],
        required: &["query"],
        filters: false,
    },
    ToolSpec {
        name: "save_agent",
        description: "Overwrite an existing agent file after validating the new content",
        props: &[
            ("id", "string", "category/subcategory/slug"),
            ("content", "string", "Full markdown file content"),
        ],
        required: &["id", "content"],
        filters: false,
    },
    ToolSpec {
        name: "update_metadata",
        description: "Merge metadata fields into an agent's frontmatter, keeping the body",
        props: &[
            ("id", "string", "category/subcategory/slug"),
            ("updates", "object", "Fields to set: name, description, tier, model, role, version"),
        ],
        required: &["id", "updates"],
        filters: false,
    },
    ToolSpec {
        name: "create_agent",
        description: "Create a new expert agent file",
        props: &[
            ("name", "string", "File name without .md"),
            ("category", "string", "Category directory"),
            ("subcategory", "string", "Subcategory directory"),
            ("content", "string", "Full markdown file content"),
        ],
        required: &["name", "category", "subcategory", "content"],
        filters: false,
    },
    ToolSpec {
        name: "get_template",
        description: "Starter template for a tier",
        props: &[("tier", "string", "focused, expert or phd")],
        required: &["tier"],
        filters: false,
    },
    ToolSpec {
        name: "agent_stats",
        description: "Per-category counts and available filter values",
        props: &[],
        required: &[],
        filters: false,
    },
    ToolSpec {
        name: "propose_change",
        description: "Render a GitHub issue proposing an edit (id) or a new agent (name + category + subcategory)",
        props: &[
            ("content", "string", "Proposed full markdown content"),
            ("description", "string", "Why the change is needed"),
            ("id", "string", "Existing agent id"),
            ("name", "string", "New agent file name"),
            ("category", "string", "New agent category"),
            ("subcategory", "string", "New agent subcategory"),
        ],
        required: &["content"],
        filters: false,
    },
    ToolSpec {
        name: "sync_status",
        description: "Local and remote divergence of the agents repository",
        props: &[],
        required: &[],
        filters: false,
    },
    ToolSpec {
        name: "sync_pull",
        description: "Pull remote changes, stashing local edits around the rebase",
        props: &[],
        required: &[],
        filters: false,
    },
];

pub struct AgentManagerHandler {
    catalog: Arc<Catalog>,
}

impl AgentManagerHandler {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    fn tool_definitions(&self) -> Vec<Tool> {
        TOOLS
            .iter()
            .map(|spec| {
                let filters: &[(&str, &str, &str)] = if spec.filters { FILTER_PROPS } else { &[] };
                let mut props = HashMap::<String, JsonMap<String, JsonValue>>::new();
                for (name, ty, desc) in spec.props.iter().chain(filters) {
                    let mut schema = JsonMap::new();
                    schema.insert("type".to_string(), JsonValue::String(ty.to_string()));
                    schema.insert("description".to_string(), JsonValue::String(desc.to_string()));
                    props.insert(name.to_string(), schema);
                }
                Tool {
                    annotations: None,
                    description: Some(spec.description.to_string()),
                    input_schema: ToolInputSchema::new(
                        spec.required.iter().map(|r| r.to_string()).collect(),
                        Some(props),
                    ),
                    meta: None,
                    name: spec.name.to_string(),
                    output_schema: None,
                    title: None,
                }
            })
            .collect()
    }

    /// Run one tool and build its JSON payload.
    async fn call(&self, tool: &str, args: &Args) -> Result<JsonValue, RpcError> {
        let catalog = &self.catalog;
        match tool {
            "list_navigation" => {
                let tree = catalog.navigation().await;
                Ok(json!({"agent_count": agent_count(&tree), "categories": to_json(&tree)?}))
            }
            "get_agent" => {
                let agent = match optional_str(args, "id") {
                    Some(id) => catalog.load_agent_by_id(id).await,
                    None => {
                        let category = required_str(args, "category")?;
                        let subcategory = required_str(args, "subcategory")?;
                        let slug = required_str(args, "slug")?;
                        catalog.load_agent(category, subcategory, slug).await
                    }
                };
                match agent {
                    Some(a) => Ok(json!({"ok": true, "agent": to_json(&a)?})),
                    None => Ok(not_found("agent")),
                }
            }
            "get_raw_agent" => {
                let id = required_str(args, "id")?;
                match catalog.load_agent_by_id(id).await {
                    Some(a) => Ok(json!({"ok": true, "id": a.id, "content": a.raw_content})),
                    None => Ok(not_found(id)),
                }
            }
            "list_agents" => {
                let agents = catalog.list_agents(&filters(args)?).await;
                Ok(json!({"count": agents.len(), "agents": to_json(&agents)?}))
            }
            "search_agents" => {
                let query = required_str(args, "query")?;
                let hits = catalog.search(query, &filters(args)?).await;
                Ok(json!({"count": hits.len(), "results": to_json(&hits)?}))
            }
            "suggest" => {
                let query = required_str(args, "query")?;
                let limit = args
                    .get("limit")
                    .and_then(JsonValue::as_u64)
                    .map_or(DEFAULT_SUGGESTION_LIMIT, |l| l as usize);
                Ok(json!({"suggestions": catalog.suggest(query, limit).await}))
            }
            "save_agent" => {
                let id = required_str(args, "id")?;
                let content = required_str(args, "content")?;
                outcome(catalog.save_agent(id, content).await)
            }
            "update_metadata" => {
                let id = required_str(args, "id")?;
                let updates: MetadataUpdate = args
                    .get("updates")
                    .cloned()
                    .ok_or_else(|| missing("updates"))
                    .and_then(|v| {
                        serde_json::from_value(v).map_err(|e| {
                            RpcError::invalid_params().with_message(format!("invalid 'updates': {e}"))
                        })
                    })?;
                outcome(catalog.update_metadata(id, updates).await)
            }
            "create_agent" => {
                let name = required_str(args, "name")?;
                let category = required_str(args, "category")?;
                let subcategory = required_str(args, "subcategory")?;
                let content = required_str(args, "content")?;
                outcome(catalog.create_agent(name, category, subcategory, content).await)
            }
            "get_template" => {
                let raw = required_str(args, "tier")?;
                let tier = Tier::from_str(raw)
                    .map_err(|e| RpcError::invalid_params().with_message(e.to_string()))?;
                outcome(catalog.load_template(tier).await.map(|content| json!({"tier": tier, "content": content})))
            }
            "agent_stats" => {
                let counts = catalog.agent_counts().await;
                let total: usize = counts.values().sum();
                Ok(json!({
                    "total": total,
                    "counts": counts,
                    "filter_options": to_json(&catalog.filter_options().await)?,
                }))
            }
            "propose_change" => {
                let content = required_str(args, "content")?;
                let description = optional_str(args, "description");
                let target = match optional_str(args, "id") {
                    Some(id) => ProposalTarget::Existing { id: id.to_string() },
                    None => ProposalTarget::New {
                        name: required_str(args, "name")?.to_string(),
                        category: required_str(args, "category")?.to_string(),
                        subcategory: required_str(args, "subcategory")?.to_string(),
                    },
                };
                outcome(catalog.propose_change(target, content, description).await)
            }
            "sync_status" => to_json(&catalog.sync_status().await),
            "sync_pull" => to_json(&catalog.sync_pull().await),
            _ => {
                tracing::warn!("unknown tool: {}", tool);
                Err(RpcError::method_not_found().with_message(format!("Unknown tool '{tool}'")))
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error().with_message(e.to_string()))
}

fn missing(key: &str) -> RpcError {
    RpcError::invalid_params().with_message(format!("missing required '{key}' string"))
}

fn required_str<'a>(args: &'a Args, key: &str) -> Result<&'a str, RpcError> {
    args.get(key).and_then(JsonValue::as_str).ok_or_else(|| missing(key))
}

fn optional_str<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key).and_then(JsonValue::as_str).filter(|s| !s.is_empty())
}

fn filters(args: &Args) -> Result<SearchFilters, RpcError> {
    serde_json::from_value(JsonValue::Object(args.clone()))
        .map_err(|e| RpcError::invalid_params().with_message(format!("invalid filters: {e}")))
}

fn not_found(what: &str) -> JsonValue {
    json!({"ok": false, "error": format!("not found: {what}")})
}

/// Caller-fixable failures become payloads; anything else is internal.
fn outcome<T: Serialize>(result: CatalogResult<T>) -> Result<JsonValue, RpcError> {
    match result {
        Ok(value) => Ok(json!({"ok": true, "result": to_json(&value)?})),
        Err(e) if e.is_caller_error() => {
            tracing::info!("request rejected: {}", e);
            Ok(json!({"ok": false, "error": e.to_string()}))
        }
        Err(e) => {
            tracing::error!("catalog operation failed: {}", e);
            Err(RpcError::internal_error().with_message(e.to_string()))
        }
    }
}

#[async_trait]
impl ServerHandlerCore for AgentManagerHandler {
    async fn handle_request(
        &self,
        request: RequestFromClient,
        runtime: &dyn McpServer,
    ) -> std::result::Result<ResultFromServer, RpcError> {
        let method_name = request.method().to_owned();
        tracing::info!("handle_request: method={}", method_name);
        match request {
            RequestFromClient::ClientRequest(client_request) => match client_request {
                ClientRequest::InitializeRequest(initialize_request) => {
                    let mut server_info = runtime.server_info().to_owned();
                    if let Some(updated_protocol_version) = enforce_compatible_protocol_version(
                        &initialize_request.params.protocol_version,
                        &server_info.protocol_version,
                    )
                    .map_err(|err| {
                        tracing::error!(
                            "incompatible protocol version (client={}, server={})",
                            initialize_request.params.protocol_version,
                            server_info.protocol_version
                        );
                        RpcError::internal_error().with_message(err.to_string())
                    })? {
                        server_info.protocol_version = updated_protocol_version;
                    }
                    tracing::info!("initialized (protocol={})", server_info.protocol_version);
                    Ok(server_info.into())
                }

                ClientRequest::ListToolsRequest(_) => Ok(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: self.tool_definitions(),
                }
                .into()),

                ClientRequest::CallToolRequest(request) => {
                    let tool = request.tool_name().to_string();
                    let args = request.params.arguments.clone().unwrap_or_default();
                    tracing::debug!("call_tool: tool={}, arg_keys={:?}", tool, args.keys().collect::<Vec<_>>());
                    let payload = self.call(&tool, &args).await?;
                    Ok(CallToolResult::text_content(vec![TextContent::from(payload.to_string())]).into())
                }

                _ => {
                    tracing::warn!("method not implemented: {}", method_name);
                    Err(RpcError::method_not_found()
                        .with_message(format!("No handler is implemented for '{method_name}'.")))
                }
            },
            RequestFromClient::CustomRequest(_) => Err(RpcError::method_not_found()
                .with_message("No handler is implemented for custom requests.".to_string())),
        }
    }

    async fn handle_notification(
        &self,
        notification: NotificationFromClient,
        _: &dyn McpServer,
    ) -> std::result::Result<(), RpcError> {
        match &notification {
            NotificationFromClient::ClientNotification(_) => {
                tracing::debug!("handle_notification: client notification")
            }
            NotificationFromClient::CustomNotification(_) => {
                tracing::debug!("handle_notification: custom notification")
            }
        }
        Ok(())
    }

    async fn handle_error(
        &self,
        error: &RpcError,
        _: &dyn McpServer,
    ) -> std::result::Result<(), RpcError> {
        tracing::error!(
            "handle_error from client (code={:?}, message={:?})",
            error.code,
            error.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::catalog_for;
    use crate::loader::tests::{agent, fixture_repo};

    fn handler(repo: &std::path::Path) -> AgentManagerHandler {
        AgentManagerHandler::new(Arc::new(catalog_for(repo)))
    }

    fn args(v: JsonValue) -> Args {
        match v {
            JsonValue::Object(m) => m,
            _ => panic!("args must be an object"),
        }
    }

    #[test]
    fn every_tool_has_a_schema() {
        let repo = fixture_repo();
        let tools = handler(repo.path()).tool_definitions();
        assert_eq!(tools.len(), TOOLS.len());
        let search = tools.iter().find(|t| t.name == "search_agents").unwrap();
        let val = serde_json::to_value(search).unwrap();
        assert_eq!(val["inputSchema"]["required"], json!(["query"]));
        assert!(val["inputSchema"]["properties"].get("tier").is_some());
    }

    #[tokio::test]
    async fn every_declared_tool_is_dispatched() {
        let repo = fixture_repo();
        let h = handler(repo.path());
        let unknown = RpcError::method_not_found().code;
        for spec in TOOLS {
            if let Err(e) = h.call(spec.name, &Args::new()).await {
                assert_ne!(e.code, unknown, "{} is not dispatched", spec.name);
            }
        }
        let err = h.call("launch_rockets", &Args::new()).await.unwrap_err();
        assert_eq!(err.code, unknown);
    }

    #[tokio::test]
    async fn get_agent_by_id_or_parts() {
        let repo = fixture_repo();
        let h = handler(repo.path());
        let out = h
            .call("get_agent", &args(json!({"id": "backend-ecosystems/rust/rust-pro"})))
            .await
            .unwrap();
        assert_eq!(out["agent"]["resolved"]["name"], "Rust Pro");

        let out = h
            .call(
                "get_agent",
                &args(json!({"category": "web", "subcategory": "react", "slug": "react-expert"})),
            )
            .await
            .unwrap();
        assert_eq!(out["ok"], true);

        let out = h.call("get_agent", &args(json!({"id": "x/y/z"}))).await.unwrap();
        assert_eq!(out["ok"], false);

        let err = h.call("get_agent", &args(json!({"category": "web"}))).await.unwrap_err();
        assert_eq!(err.code, RpcError::invalid_params().code);
    }

    #[tokio::test]
    async fn search_with_filters_and_bad_filter() {
        let repo = fixture_repo();
        let h = handler(repo.path());
        let out = h
            .call("search_agents", &args(json!({"query": "rust", "tier": "phd"})))
            .await
            .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["results"][0]["agent"]["id"], "backend-ecosystems/rust/rust-pro");

        let err = h
            .call("search_agents", &args(json!({"query": "rust", "tier": "genius"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcError::invalid_params().code);
    }

    #[tokio::test]
    async fn writes_report_rejections_as_payloads() {
        let repo = fixture_repo();
        let h = handler(repo.path());
        let out = h
            .call(
                "create_agent",
                &args(json!({
                    "name": "rust-pro", "category": "web", "subcategory": "react",
                    "content": agent("Rust Pro", "expert"),
                })),
            )
            .await
            .unwrap();
        assert_eq!(out["ok"], true);
        assert_eq!(out["result"]["id"], "web/react/rust-pro");

        let out = h
            .call(
                "create_agent",
                &args(json!({
                    "name": "rust-pro", "category": "web", "subcategory": "react",
                    "content": agent("Rust Pro", "expert"),
                })),
            )
            .await
            .unwrap();
        assert_eq!(out["ok"], false);
        assert!(out["error"].as_str().unwrap().contains("already exists"));

        let out = h
            .call(
                "update_metadata",
                &args(json!({"id": "web/react/react-expert", "updates": {"tier": "focused"}})),
            )
            .await
            .unwrap();
        assert_eq!(out["result"]["resolved"]["tier"], "focused");

        let out = h.call("get_template", &args(json!({"tier": "phd"}))).await.unwrap();
        assert_eq!(out["ok"], false);
        let out = h.call("get_template", &args(json!({"tier": "expert"}))).await.unwrap();
        assert_eq!(out["result"]["tier"], "expert");
    }

    #[tokio::test]
    async fn stats_navigation_and_sync() {
        let repo = fixture_repo();
        let h = handler(repo.path());
        let nav = h.call("list_navigation", &Args::new()).await.unwrap();
        assert_eq!(nav["agent_count"], 6);
        let stats = h.call("agent_stats", &Args::new()).await.unwrap();
        assert_eq!(stats["total"], 6);
        assert_eq!(stats["filter_options"]["tiers"], json!(["expert", "focused", "phd"]));
        let sync = h.call("sync_status", &Args::new()).await.unwrap();
        assert_eq!(sync["status"], "unknown");
    }

    #[tokio::test]
    async fn propose_change_requires_a_target() {
        let repo = fixture_repo();
        let h = handler(repo.path());
        let err = h
            .call("propose_change", &args(json!({"content": "# X"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcError::invalid_params().code);

        let out = h
            .call(
                "propose_change",
                &args(json!({"id": "web/react/react-expert", "content": agent("React Expert", "phd")})),
            )
            .await
            .unwrap();
        assert_eq!(out["result"]["title"], "[Edit] React Expert");
        assert!(out["result"]["issue_url"].as_str().unwrap().starts_with("https://github.com/turbobeest/agents/"));
    }
}
