//! The long-lived service object behind every tool: owns the loader
//! settings, the path cache, the search index and the git runner.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{CatalogError, CatalogResult};
use crate::git::{self, GitRunner, GitStatus, PullOutcome};
use crate::loader::{LoaderSettings, build_navigation};
use crate::model::{AgentRecord, MetadataUpdate, NavCategory, Tier, is_path_segment};
use crate::parser::{parse_agent_file, update_frontmatter};
use crate::proposal::{self, ChangeKind, ChangeProposal, GithubRepo};
use crate::resolver::{PathCache, resolve};
use crate::search::{AgentSummary, FilterOptions, SearchFilters, SearchHit, SearchIndex};

/// Where a proposed change lands.
#[derive(Debug, Clone)]
pub enum ProposalTarget {
    Existing {
        id: String,
    },
    New {
        name: String,
        category: String,
        subcategory: String,
    },
}

pub struct Catalog {
    settings: LoaderSettings,
    paths: PathCache,
    index: RwLock<Option<Arc<SearchIndex>>>,
    git: Arc<dyn GitRunner>,
    github: GithubRepo,
}

impl Catalog {
    pub fn new(settings: LoaderSettings, git: Arc<dyn GitRunner>, github: GithubRepo) -> Self {
        Self {
            settings,
            paths: PathCache::new(),
            index: RwLock::new(None),
            git,
            github,
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Fresh tree; its paths refresh the path cache.
    pub async fn navigation(&self) -> Vec<NavCategory> {
        let build = build_navigation(&self.settings).await;
        self.paths.record(build.paths).await;
        build.tree
    }

    pub async fn load_agent(&self, category: &str, subcategory: &str, slug: &str) -> Option<AgentRecord> {
        if ![category, subcategory, slug].into_iter().all(is_path_segment) {
            tracing::debug!("rejecting lookup {category}/{subcategory}/{slug}");
            return None;
        }
        let path = resolve(&self.settings, &self.paths, slug, Some(category), Some(subcategory)).await?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("failed to read agent {}: {}", path.display(), e);
                return None;
            }
        };
        let relative = self.settings.relative_to_repo(&path);
        match parse_agent_file(&path, &relative, &content, category, subcategory) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("failed to parse agent {}: {:#}", path.display(), e);
                None
            }
        }
    }

    /// `category/subcategory/slug`; anything else is `None`.
    pub async fn load_agent_by_id(&self, id: &str) -> Option<AgentRecord> {
        let (category, subcategory, slug) = split_id(id)?;
        self.load_agent(category, subcategory, slug).await
    }

    /// Every agent listed in a freshly built tree.
    pub async fn load_all_agents(&self) -> Vec<AgentRecord> {
        let mut agents = Vec::new();
        for category in self.navigation().await {
            for sub in &category.subcategories {
                for nav in &sub.agents {
                    if let Some(record) = self.load_agent(&category.id, &sub.id, nav.slug()).await {
                        agents.push(record);
                    }
                }
            }
        }
        agents
    }

    /// Overwrite an existing agent after checking that `content` parses.
    pub async fn save_agent(&self, id: &str, content: &str) -> CatalogResult<AgentRecord> {
        if content.trim().is_empty() {
            return Err(CatalogError::InvalidArgument("content must not be empty".into()));
        }
        let existing = self
            .load_agent_by_id(id)
            .await
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let updated = parse_agent_file(
            &existing.file_path,
            &existing.relative_path,
            content,
            &existing.category,
            &existing.subcategory,
        )
        .map_err(|e| CatalogError::InvalidContent(format!("{e:#}")))?;

        tokio::fs::write(&existing.file_path, content).await?;
        tracing::info!("saved agent {} ({})", id, existing.relative_path.display());
        self.invalidate().await;
        Ok(updated)
    }

    /// Merge partial metadata into an agent's block and save it.
    pub async fn update_metadata(&self, id: &str, updates: MetadataUpdate) -> CatalogResult<AgentRecord> {
        let existing = self
            .load_agent_by_id(id)
            .await
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let content = update_frontmatter(&existing, updates)
            .map_err(|e| CatalogError::InvalidContent(format!("{e:#}")))?;
        self.save_agent(id, &content).await
    }

    pub async fn create_agent(
        &self,
        name: &str,
        category: &str,
        subcategory: &str,
        content: &str,
    ) -> CatalogResult<AgentRecord> {
        let target = self.new_agent_path(name, category, subcategory)?;
        if content.trim().is_empty() {
            return Err(CatalogError::InvalidArgument("content must not be empty".into()));
        }
        let relative = self.settings.relative_to_repo(&target);
        let record = parse_agent_file(&target, &relative, content, category, subcategory)
            .map_err(|e| CatalogError::InvalidContent(format!("{e:#}")))?;

        if tokio::fs::try_exists(&target).await? {
            return Err(CatalogError::Conflict(relative.display().to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        tracing::info!("created agent {} at {}", record.id, relative.display());
        self.invalidate().await;
        Ok(record)
    }

    /// `<repo>/<expert root>/<category>/<subcategory>/<name>.md`
    fn new_agent_path(&self, name: &str, category: &str, subcategory: &str) -> CatalogResult<PathBuf> {
        for (field, value) in [("name", name), ("category", category), ("subcategory", subcategory)] {
            if !is_path_segment(value) {
                return Err(CatalogError::InvalidArgument(format!(
                    "{field} must be a non-empty single path segment"
                )));
            }
        }
        let root = self
            .settings
            .expert_root()
            .ok_or_else(|| CatalogError::InvalidArgument("no expert lineage configured".into()))?;
        Ok(root.path.join(category).join(subcategory).join(format!("{name}.md")))
    }

    pub async fn load_template(&self, tier: Tier) -> CatalogResult<String> {
        let path = self
            .settings
            .repo_path
            .join("templates")
            .join(format!("TEMPLATE-{tier}.md"));
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CatalogError::NotFound(format!("template for tier {tier}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn index(&self) -> Arc<SearchIndex> {
        if let Some(idx) = self.index.read().await.as_ref() {
            return idx.clone();
        }
        let mut slot = self.index.write().await;
        if let Some(idx) = slot.as_ref() {
            return idx.clone();
        }
        let idx = Arc::new(SearchIndex::build(self.load_all_agents().await));
        tracing::info!("search index ready ({} agents)", idx.doc_count());
        *slot = Some(idx.clone());
        idx
    }

    async fn invalidate(&self) {
        *self.index.write().await = None;
        self.paths.invalidate().await;
    }

    pub async fn search(&self, query: &str, filters: &SearchFilters) -> Vec<SearchHit> {
        self.index().await.search(query, filters)
    }

    pub async fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        self.index().await.suggest(query, limit)
    }

    pub async fn list_agents(&self, filters: &SearchFilters) -> Vec<AgentSummary> {
        self.index().await.list(filters)
    }

    pub async fn agent_counts(&self) -> BTreeMap<String, usize> {
        self.index().await.counts()
    }

    pub async fn filter_options(&self) -> FilterOptions {
        self.index().await.filter_options()
    }

    /// Render the issue for a change without writing anything.
    pub async fn propose_change(
        &self,
        target: ProposalTarget,
        content: &str,
        description: Option<&str>,
    ) -> CatalogResult<ChangeProposal> {
        if content.trim().is_empty() {
            return Err(CatalogError::InvalidArgument("content must not be empty".into()));
        }
        let invalid = |e: anyhow::Error| CatalogError::InvalidContent(format!("{e:#}"));
        match target {
            ProposalTarget::Existing { id } => {
                let existing = self
                    .load_agent_by_id(&id)
                    .await
                    .ok_or(CatalogError::NotFound(id))?;
                let proposed = parse_agent_file(
                    &existing.file_path,
                    &existing.relative_path,
                    content,
                    &existing.category,
                    &existing.subcategory,
                )
                .map_err(invalid)?;
                Ok(proposal::build(
                    &self.github,
                    ChangeKind::Edit,
                    &proposed,
                    &existing.raw_content,
                    content,
                    description,
                ))
            }
            ProposalTarget::New {
                name,
                category,
                subcategory,
            } => {
                let target = self.new_agent_path(&name, &category, &subcategory)?;
                let relative = self.settings.relative_to_repo(&target);
                let proposed = parse_agent_file(&target, &relative, content, &category, &subcategory)
                    .map_err(invalid)?;
                Ok(proposal::build(
                    &self.github,
                    ChangeKind::Create,
                    &proposed,
                    "",
                    content,
                    description,
                ))
            }
        }
    }

    pub async fn sync_status(&self) -> GitStatus {
        git::status(self.git.as_ref()).await
    }

    /// Pull, then drop cached state since files may have changed.
    pub async fn sync_pull(&self) -> PullOutcome {
        let outcome = git::pull(self.git.as_ref()).await;
        if outcome.success {
            self.invalidate().await;
        }
        outcome
    }
}

fn split_id(id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = id.split('/');
    let (c, s, slug) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || ![c, s, slug].into_iter().all(is_path_segment) {
        return None;
    }
    Some((c, s, slug))
}
