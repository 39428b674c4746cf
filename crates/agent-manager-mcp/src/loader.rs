//! Navigation builder.
//!
//! Walks every lineage root (`expert-agents`, `pipeline-agents`), parses each
//! agent file and assembles the category -> subcategory -> agent tree.
//! Per-file and per-directory failures are logged and skipped.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::model::{
    GENERAL_SUBCATEGORY, Lineage, LineageRoot, NavAgent, NavCategory, locale_cmp,
    strip_leading_hyphen,
};
use crate::parser::parse_agent_file;
use crate::titlemap::TitleMap;

/// Where the agent corpus lives and how its directories are named.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Repository root; every relative path is relative to it.
    pub repo_path: PathBuf,
    /// Scanned in order. Earlier lineages win identity clashes.
    pub lineages: Vec<LineageRoot>,
    pub titles: TitleMap,
    /// Depth bound for the resolver's fallback directory search.
    pub max_search_depth: usize,
}

pub fn default_settings(
    repo_path: PathBuf,
    expert_dir: &str,
    pipeline_dir: &str,
    pipeline_prefix: &str,
    titles: TitleMap,
    max_search_depth: usize,
) -> LoaderSettings {
    let lineages = vec![
        LineageRoot {
            lineage: Lineage::Expert,
            path: repo_path.join(expert_dir),
            id_prefix: String::new(),
        },
        LineageRoot {
            lineage: Lineage::Pipeline,
            path: repo_path.join(pipeline_dir),
            id_prefix: pipeline_prefix.to_string(),
        },
    ];
    LoaderSettings {
        repo_path,
        lineages,
        titles,
        max_search_depth,
    }
}

impl LoaderSettings {
    /// Root that new agents are created under.
    pub fn expert_root(&self) -> Option<&LineageRoot> {
        self.lineages
            .iter()
            .find(|l| matches!(l.lineage, Lineage::Expert))
    }

    pub fn relative_to_repo(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.repo_path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// A freshly built tree plus the identity -> repo-relative path of every
/// agent listed in it.
#[derive(Debug, Default)]
pub struct NavigationBuild {
    pub tree: Vec<NavCategory>,
    pub paths: HashMap<String, PathBuf>,
}

/// One directory entry with symlinks followed.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_file: bool,
}

/// Entries of `dir` sorted by file name. Entries whose metadata cannot be
/// read (dangling links) are dropped.
pub(crate) async fn list_dir(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let mut rd = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();
    while let Some(de) = rd.next_entry().await? {
        let path = de.path();
        let Ok(meta) = tokio::fs::metadata(&path).await else {
            tracing::debug!("skipping unreadable entry {}", path.display());
            continue;
        };
        out.push(Entry {
            name: de.file_name().to_string_lossy().into_owned(),
            path,
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

async fn list_dir_or_warn(dir: &Path) -> Vec<Entry> {
    match list_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("skipping unreadable directory {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

fn md_files(entries: &[Entry]) -> impl Iterator<Item = &Entry> {
    entries.iter().filter(|e| e.is_file && e.name.ends_with(".md"))
}

struct Scan<'a> {
    settings: &'a LoaderSettings,
    paths: HashMap<String, PathBuf>,
    seen: HashSet<String>,
}

impl Scan<'_> {
    async fn collect(&mut self, files: Vec<PathBuf>, category_id: &str, subcategory_id: &str) -> Vec<NavAgent> {
        let mut agents = Vec::new();
        for file in files {
            let content = match tokio::fs::read_to_string(&file).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("failed to read agent {}: {}", file.display(), e);
                    continue;
                }
            };
            let relative = self.settings.relative_to_repo(&file);
            let record = match parse_agent_file(&file, &relative, &content, category_id, subcategory_id) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("failed to parse agent {}: {:#}", file.display(), e);
                    continue;
                }
            };
            if record.slug.is_empty() {
                tracing::warn!("skipping {}: no usable metadata", file.display());
                continue;
            }
            if !self.seen.insert(record.id.clone()) {
                tracing::warn!(
                    "skipping {}: identity '{}' already provided by {}",
                    file.display(),
                    record.id,
                    self.paths
                        .get(&record.id)
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                );
                continue;
            }
            tracing::debug!("indexed agent {} from {}", record.id, relative.display());
            self.paths.insert(record.id.clone(), relative);
            agents.push(NavAgent::from_record(&record));
        }
        agents
    }
}

/// Build the navigation tree. Never fails; problems are logged and skipped.
pub async fn build_navigation(settings: &LoaderSettings) -> NavigationBuild {
    let mut categories: Vec<NavCategory> = Vec::new();
    let mut scan = Scan {
        settings,
        paths: HashMap::new(),
        seen: HashSet::new(),
    };

    for root in &settings.lineages {
        let category_dirs = list_dir_or_warn(&root.path).await;
        for cat_dir in category_dirs.iter().filter(|e| e.is_dir) {
            let category_id = root.category_id(&cat_dir.name);
            let category_title = settings.titles.folder_title(&cat_dir.name);
            let idx = match categories.iter().position(|c| c.id == category_id) {
                Some(i) => i,
                None => {
                    categories.push(NavCategory {
                        id: category_id.clone(),
                        title: category_title.clone(),
                        description: format!("{category_title} agents"),
                        is_pipeline: root.is_pipeline(),
                        subcategories: Vec::new(),
                    });
                    categories.len() - 1
                }
            };

            let entries = list_dir_or_warn(&cat_dir.path).await;

            let loose: Vec<PathBuf> = md_files(&entries).map(|e| e.path.clone()).collect();
            let general = scan.collect(loose, &category_id, GENERAL_SUBCATEGORY).await;
            categories[idx].merge_subcategory(
                GENERAL_SUBCATEGORY,
                "General".to_string(),
                format!("General {category_title} specialists"),
                general,
            );

            for sub_dir in entries.iter().filter(|e| e.is_dir) {
                let subcategory_id = strip_leading_hyphen(&sub_dir.name).to_string();
                let subcategory_title = if root.is_pipeline() {
                    settings.titles.phase_title(&sub_dir.name)
                } else {
                    settings.titles.folder_title(&sub_dir.name)
                };

                let sub_entries = list_dir_or_warn(&sub_dir.path).await;
                let mut files: Vec<PathBuf> = md_files(&sub_entries).map(|e| e.path.clone()).collect();
                for nested in sub_entries.iter().filter(|e| e.is_dir) {
                    let nested_entries = list_dir_or_warn(&nested.path).await;
                    files.extend(md_files(&nested_entries).map(|e| e.path.clone()));
                }

                let agents = scan.collect(files, &category_id, &subcategory_id).await;
                categories[idx].merge_subcategory(
                    &subcategory_id,
                    subcategory_title.clone(),
                    format!("{subcategory_title} specialists"),
                    agents,
                );
            }
        }
    }

    categories.sort_by(|a, b| locale_cmp(&a.title, &b.title));
    for category in &mut categories {
        category.subcategories.sort_by(|a, b| locale_cmp(&a.title, &b.title));
        for sub in &mut category.subcategories {
            sub.agents.sort_by(|a, b| locale_cmp(&a.name, &b.name));
        }
    }

    tracing::debug!(
        categories = categories.len(),
        agents = scan.paths.len(),
        "navigation built"
    );
    NavigationBuild {
        tree: categories,
        paths: scan.paths,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::agent_count;
    use crate::titlemap::load_default;
    use std::fs;

    pub(crate) fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    pub(crate) fn agent(name: &str, tier: &str) -> String {
        format!("---\nname: {name}\ndescription: {name} does things\ntier: {tier}\nmodel: opus\n---\n## Identity\n{name} identity.\n")
    }

    pub(crate) fn settings_for(repo: &Path) -> LoaderSettings {
        default_settings(
            repo.to_path_buf(),
            "expert-agents",
            "pipeline-agents",
            "pipeline-",
            load_default(),
            8,
        )
    }

    /// A small corpus covering both lineages and every file layout.
    pub(crate) fn fixture_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let r = dir.path();
        write(r, "expert-agents/-backend-ecosystems/rust/rust-pro.md", &agent("Rust Pro", "phd"));
        write(r, "expert-agents/-backend-ecosystems/rust/async-expert.md", &agent("async-expert", "expert"));
        write(r, "expert-agents/-backend-ecosystems/go/go-pro/AGENT.md", "# Go Pro\n\n## Purpose\nWrites focused Go services.\n");
        write(r, "expert-agents/-backend-ecosystems/loose-helper.md", &agent("Loose Helper", "focused"));
        write(r, "expert-agents/web/react/react-expert.md", &agent("React Expert", "expert"));
        write(r, "expert-agents/web/react/broken.md", "---\nname: [unclosed\n---\n");
        write(r, "pipeline-agents/-10-testing/01-02-unit-tests/test-writer.md", &agent("Test Writer", "focused"));
        write(r, "templates/TEMPLATE-expert.md", "---\nname: \n---\n# Template\n");
        dir
    }

    #[tokio::test]
    async fn builds_sorted_tree_across_lineages() {
        let repo = fixture_repo();
        let nav = build_navigation(&settings_for(repo.path())).await;

        let titles: Vec<_> = nav.tree.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["07 Testing", "Languages", "Web"]);

        let langs = &nav.tree[1];
        assert_eq!(langs.id, "backend-ecosystems");
        assert!(!langs.is_pipeline);
        let subs: Vec<_> = langs.subcategories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(subs, vec!["general", "go", "rust"]);
        assert_eq!(langs.subcategories[0].description, "General Languages specialists");
        let rust_names: Vec<_> = langs.subcategories[2].agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(rust_names, vec!["async-expert", "Rust Pro"]);
        assert_eq!(langs.subcategories[1].agents[0].id, "backend-ecosystems/go/go-pro");

        let testing = &nav.tree[0];
        assert!(testing.is_pipeline);
        assert_eq!(testing.id, "pipeline-10-testing");
        assert_eq!(testing.subcategories[0].title, "Unit Tests");
        assert_eq!(testing.subcategories[0].id, "01-02-unit-tests");

        // broken.md is skipped
        assert_eq!(agent_count(&nav.tree), 6);
        assert_eq!(nav.paths.len(), 6);
        assert_eq!(
            nav.paths.get("web/react/react-expert").unwrap(),
            Path::new("expert-agents/web/react/react-expert.md")
        );
    }

    #[tokio::test]
    async fn duplicate_identity_is_listed_once() {
        let dir = tempfile::tempdir().unwrap();
        let r = dir.path();
        write(r, "expert-agents/core/tools/a.md", &agent("Same Name", "expert"));
        write(r, "expert-agents/-core/tools/b.md", &agent("Same Name", "phd"));
        let nav = build_navigation(&settings_for(r)).await;
        assert_eq!(agent_count(&nav.tree), 1);
        // `-core` sorts before `core`, so b.md is scanned first.
        assert_eq!(
            nav.paths.get("core/tools/same-name").unwrap(),
            Path::new("expert-agents/-core/tools/b.md")
        );
        assert_eq!(nav.tree[0].subcategories[0].agents[0].tier, crate::model::Tier::Phd);
    }

    #[tokio::test]
    async fn missing_roots_yield_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let nav = build_navigation(&settings_for(dir.path())).await;
        assert!(nav.tree.is_empty());
        assert!(nav.paths.is_empty());
    }
}
