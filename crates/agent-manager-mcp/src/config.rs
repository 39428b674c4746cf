use serde::Deserialize;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// `<AGENT_MANAGER_HOME>/config.toml`. Environment variables that are set
/// always win over these values.
#[derive(Debug, Default, Deserialize)]
pub struct UserConfig {
    pub logging: Option<LoggingCfg>,
    pub repo: Option<RepoCfg>,
    pub github: Option<GithubCfg>,
    pub git: Option<GitCfg>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingCfg {
    pub to_file: Option<bool>,
    pub dir: Option<String>,
    pub json: Option<bool>,
    pub compact: Option<bool>,
    pub pretty: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepoCfg {
    pub path: Option<String>,
    pub expert_dir: Option<String>,
    pub pipeline_dir: Option<String>,
    pub pipeline_prefix: Option<String>,
    pub title_map_file: Option<String>,
    pub search_max_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GithubCfg {
    pub owner: Option<String>,
    pub repo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GitCfg {
    pub timeout_ms: Option<u64>,
}

pub fn load_user_config(home: &Path) -> anyhow::Result<Option<UserConfig>> {
    let path = home.join("config.toml");
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: UserConfig = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

/// `AGENT_MANAGER_HOME` if set and non-empty, else `$HOME/.agent-manager`,
/// else `./.agent-manager`.
pub fn resolve_home(explicit: &str) -> PathBuf {
    if !explicit.is_empty() {
        return expand_home(explicit);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".agent-manager"),
        Err(_) => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".agent-manager"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_user_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn parses_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
[logging]
level = "debug"
to_file = false

[repo]
path = "~/dev/agents"
pipeline_prefix = "pipe-"
search_max_depth = 4

[github]
owner = "acme"

[git]
timeout_ms = 2500
"#,
        )
        .unwrap();
        let cfg = load_user_config(dir.path()).unwrap().unwrap();
        assert_eq!(cfg.logging.unwrap().level.as_deref(), Some("debug"));
        let repo = cfg.repo.unwrap();
        assert_eq!(repo.pipeline_prefix.as_deref(), Some("pipe-"));
        assert_eq!(repo.search_max_depth, Some(4));
        assert_eq!(cfg.github.unwrap().owner.as_deref(), Some("acme"));
        assert_eq!(cfg.git.unwrap().timeout_ms, Some(2500));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[repo\npath=").unwrap();
        assert!(load_user_config(dir.path()).is_err());
    }

    #[test]
    fn explicit_home_wins() {
        assert_eq!(resolve_home("/opt/am"), PathBuf::from("/opt/am"));
        assert!(resolve_home("").ends_with(".agent-manager"));
    }
}
