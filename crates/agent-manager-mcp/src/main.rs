mod catalog;
mod config;
mod error;
mod git;
mod handler;
mod loader;
mod model;
mod parser;
mod proposal;
mod resolver;
mod search;
mod titlemap;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use env_flags::env_flags;
use once_cell::sync::OnceCell;
use rust_mcp_sdk::error::SdkResult;
use rust_mcp_sdk::mcp_server::{
    HyperServerOptions, ServerRuntime, hyper_server_core, server_runtime_core,
};
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, LATEST_PROTOCOL_VERSION, ServerCapabilities,
    ServerCapabilitiesTools,
};
use rust_mcp_sdk::{McpServer, StdioTransport, TransportOptions};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::catalog::Catalog;
use crate::config::{LoggingCfg, UserConfig, expand_home, load_user_config, resolve_home};
use crate::git::ProcessGitRunner;
use crate::handler::AgentManagerHandler;
use crate::loader::default_settings;
use crate::model::agent_count;
use crate::proposal::GithubRepo;
use crate::titlemap::{TitleMap, load_default, load_from_file};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

fn env_set(k: &str) -> bool {
    std::env::var_os(k).is_some()
}

#[derive(Clone, Copy)]
enum LogStyle {
    Json,
    Compact,
    Pretty,
    Full,
}

fn fmt_layer<W>(writer: W, ansi: bool, style: LogStyle) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    match style {
        LogStyle::Json => base.json().boxed(),
        LogStyle::Compact => base.compact().boxed(),
        LogStyle::Pretty => base.pretty().boxed(),
        LogStyle::Full => base.boxed(),
    }
}

fn init_tracing(home: &Path, cfg: Option<&LoggingCfg>) {
    env_flags! {
        /// Tracing filter, e.g. "info", "debug", or targets format.
        RUST_LOG: &str = "info";
        /// Preferred filter env (alias). If set, overrides RUST_LOG.
        TRACING_FILTER: &str = "";
        /// Pretty formatting for logs (ignored if TRACING_JSON=true).
        TRACING_PRETTY: bool = false;
        /// Compact single-line formatting for logs (ignored if TRACING_JSON=true)
        TRACING_COMPACT: bool = true;
        /// JSON formatting for logs
        TRACING_JSON: bool = false;
        /// If true, also log to file under <AGENT_MANAGER_HOME>/logs or LOG_DIR
        LOG_TO_FILE: bool = true;
        /// Optional explicit log directory. Defaults to <AGENT_MANAGER_HOME>/logs
        LOG_DIR: &str = "";
    }

    let mut level = if !(*TRACING_FILTER).is_empty() {
        (*TRACING_FILTER).to_string()
    } else {
        (*RUST_LOG).to_string()
    };
    let mut json = *TRACING_JSON;
    let mut compact = *TRACING_COMPACT;
    let mut pretty = *TRACING_PRETTY;
    let mut to_file = *LOG_TO_FILE;
    let mut log_dir = (!(*LOG_DIR).is_empty()).then(|| expand_home(*LOG_DIR));

    if let Some(cfg) = cfg {
        if !(env_set("TRACING_FILTER") || env_set("RUST_LOG"))
            && let Some(l) = cfg.level.as_ref()
        {
            level = l.clone();
        }
        if !env_set("TRACING_JSON")
            && let Some(v) = cfg.json
        {
            json = v;
        }
        if !env_set("TRACING_COMPACT")
            && let Some(v) = cfg.compact
        {
            compact = v;
        }
        if !env_set("TRACING_PRETTY")
            && let Some(v) = cfg.pretty
        {
            pretty = v;
        }
        if !env_set("LOG_TO_FILE")
            && let Some(v) = cfg.to_file
        {
            to_file = v;
        }
        if !env_set("LOG_DIR")
            && let Some(dir) = cfg.dir.as_ref()
        {
            log_dir = Some(expand_home(dir));
        }
    }

    let style = if json {
        LogStyle::Json
    } else if compact {
        LogStyle::Compact
    } else if pretty {
        LogStyle::Pretty
    } else {
        LogStyle::Full
    };

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries stdio JSON-RPC
    let mut layers: Vec<BoxedLayer> = vec![filter.boxed(), fmt_layer(std::io::stderr, true, style)];

    let mut dir_error = None;
    if to_file {
        let dir = log_dir.unwrap_or_else(|| home.join("logs"));
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&dir, "agent-manager-mcp.log");
                let (nb, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                layers.push(fmt_layer(nb, false, style));
            }
            Err(e) => dir_error = Some((dir, e)),
        }
    }

    if let Err(e) = tracing_subscriber::registry().with(layers).try_init() {
        eprintln!("tracing already set: {e:?}");
    }
    if let Some((dir, e)) = dir_error {
        tracing::warn!("failed to create log dir {}: {}", dir.display(), e);
    }
}

fn load_titles(explicit: Option<PathBuf>, home: &Path) -> TitleMap {
    let path = match explicit {
        Some(p) => p,
        None => {
            let candidate = home.join("title-map.toml");
            if !candidate.exists() {
                return load_default();
            }
            candidate
        }
    };
    match load_from_file(&path) {
        Ok(map) => {
            tracing::info!("loaded title map from {}", path.display());
            map
        }
        Err(e) => {
            tracing::warn!("{:#} (using built-in titles)", e);
            load_default()
        }
    }
}

#[tokio::main]
async fn main() -> SdkResult<()> {
    env_flags! {
        /// Agent manager home directory. Defaults to $HOME/.agent-manager
        AGENT_MANAGER_HOME: &str = "";
        /// Transport: "stdio" (default) or "http"
        TRANSPORT: &str = "stdio";
        /// Host for HTTP transport
        HOST: &str = "127.0.0.1";
        /// Port for HTTP transport
        PORT: u16 = 8081;
        /// Ping interval for HTTP SSE
        PING_SECS: u64 = 5;
        /// Enable JSON response mode for HTTP
        HTTP_JSON: bool = false;
        /// Root of the agents git repository. Defaults to the current directory.
        AGENTS_REPO_PATH: &str = "";
        /// Expert lineage root, relative to the repository
        EXPERT_AGENTS_DIR: &str = "expert-agents";
        /// Pipeline lineage root, relative to the repository
        PIPELINE_AGENTS_DIR: &str = "pipeline-agents";
        /// Prefix applied to pipeline category ids
        PIPELINE_PREFIX: &str = "pipeline-";
        /// Optional TOML file extending the built-in category titles
        TITLE_MAP_FILE: &str = "";
        /// Depth bound for the slug fallback search
        SEARCH_MAX_DEPTH: usize = 8;
        /// Repository that change proposals target
        GITHUB_OWNER: &str = "turbobeest";
        GITHUB_REPO: &str = "agents";
        /// Timeout for each git invocation
        GIT_TIMEOUT_MS: u64 = 15000;
    }

    let home = resolve_home(*AGENT_MANAGER_HOME);
    let (user_cfg, cfg_error) = match load_user_config(&home) {
        Ok(cfg) => (cfg.unwrap_or_default(), None),
        Err(e) => (UserConfig::default(), Some(e)),
    };
    init_tracing(&home, user_cfg.logging.as_ref());
    if let Some(e) = cfg_error {
        tracing::warn!("ignoring user config: {:#}", e);
    }
    tracing::info!(
        "starting agent-manager-mcp (transport={}, home={})",
        *TRANSPORT,
        home.display()
    );

    let repo_cfg = user_cfg.repo.unwrap_or_default();
    let github_cfg = user_cfg.github.unwrap_or_default();
    let git_cfg = user_cfg.git.unwrap_or_default();
    let pick = |env: &str, flag: &str, file: Option<String>| -> String {
        if env_set(env) {
            flag.to_string()
        } else {
            file.unwrap_or_else(|| flag.to_string())
        }
    };

    let repo_path = pick("AGENTS_REPO_PATH", *AGENTS_REPO_PATH, repo_cfg.path);
    let repo_path = if repo_path.is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        expand_home(&repo_path)
    };
    if !repo_path.is_dir() {
        tracing::warn!("agents repository {} does not exist", repo_path.display());
    }
    let expert_dir = pick("EXPERT_AGENTS_DIR", *EXPERT_AGENTS_DIR, repo_cfg.expert_dir);
    let pipeline_dir = pick("PIPELINE_AGENTS_DIR", *PIPELINE_AGENTS_DIR, repo_cfg.pipeline_dir);
    let pipeline_prefix = pick("PIPELINE_PREFIX", *PIPELINE_PREFIX, repo_cfg.pipeline_prefix);
    let title_map_file = pick("TITLE_MAP_FILE", *TITLE_MAP_FILE, repo_cfg.title_map_file);
    let max_depth = if env_set("SEARCH_MAX_DEPTH") {
        *SEARCH_MAX_DEPTH
    } else {
        repo_cfg.search_max_depth.unwrap_or(*SEARCH_MAX_DEPTH)
    };
    let git_timeout = if env_set("GIT_TIMEOUT_MS") {
        *GIT_TIMEOUT_MS
    } else {
        git_cfg.timeout_ms.unwrap_or(*GIT_TIMEOUT_MS)
    };
    let github = GithubRepo {
        owner: pick("GITHUB_OWNER", *GITHUB_OWNER, github_cfg.owner),
        repo: pick("GITHUB_REPO", *GITHUB_REPO, github_cfg.repo),
    };

    let titles = load_titles(
        (!title_map_file.is_empty()).then(|| expand_home(&title_map_file)),
        &home,
    );
    let settings = default_settings(
        repo_path.clone(),
        &expert_dir,
        &pipeline_dir,
        &pipeline_prefix,
        titles,
        max_depth,
    );
    let git = ProcessGitRunner::new(repo_path, Duration::from_millis(git_timeout));
    let catalog = Arc::new(Catalog::new(settings, Arc::new(git), github));

    for root in &catalog.settings().lineages {
        tracing::debug!(
            "lineage {:?} at {} (pipeline={})",
            root.lineage,
            root.path.display(),
            root.is_pipeline()
        );
    }
    let tree = catalog.navigation().await;
    tracing::info!(
        "found {} agent(s) in {} categories",
        agent_count(&tree),
        tree.len()
    );

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "agent-manager-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Agent Manager MCP Server".to_string()),
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Browse with list_navigation, find agents with search_agents, read with get_agent. \
             Agent ids are category/subcategory/slug."
                .to_string(),
        ),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    };

    let handler = AgentManagerHandler::new(catalog);

    if *TRANSPORT == "stdio" {
        let transport = StdioTransport::new(TransportOptions::default())?;
        let server: ServerRuntime =
            server_runtime_core::create_server(server_details, transport, handler);
        tracing::info!("starting stdio server");
        if let Err(e) = server.start().await {
            let msg = match e.rpc_error_message() {
                Some(m) => m.to_string(),
                None => e.to_string(),
            };
            tracing::error!("server runtime error: {}", msg);
        }
    } else {
        let host = (*HOST).to_string();
        let port = *PORT;
        let server = hyper_server_core::create_server(
            server_details,
            handler,
            HyperServerOptions {
                host: host.clone(),
                port,
                ping_interval: Duration::from_secs(*PING_SECS),
                enable_json_response: Some(*HTTP_JSON),
                ..Default::default()
            },
        );
        tracing::info!(
            "http server listening on {}:{} (json={}, ping_secs={})",
            host,
            port,
            *HTTP_JSON,
            *PING_SECS
        );
        if let Err(e) = server.start().await {
            let msg = match e.rpc_error_message() {
                Some(m) => m.to_string(),
                None => e.to_string(),
            };
            tracing::error!("hyper server error: {}", msg);
        }
    }
    tracing::info!("server stopped");
    Ok(())
}
