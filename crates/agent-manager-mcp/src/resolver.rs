//! Slug resolution: find the file backing an agent from its slug and
//! optional category/subcategory hints.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Component, Path, PathBuf};

use tokio::sync::{Mutex, RwLock};

use crate::loader::{LoaderSettings, list_dir};
use crate::model::is_path_segment;

/// Identity -> repo-relative path, filled by one navigation pass.
///
/// Population is single-flight: concurrent callers wait on the same gate and
/// only the first runs the pass. Entries are hints; callers verify the file
/// still exists before trusting one.
#[derive(Debug, Default)]
pub struct PathCache {
    populated: Mutex<bool>,
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `populate` unless a previous call already did.
    pub async fn ensure_populated<F, Fut>(&self, populate: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HashMap<String, PathBuf>>,
    {
        let mut done = self.populated.lock().await;
        if *done {
            return;
        }
        let paths = populate().await;
        self.record(paths).await;
        *done = true;
    }

    pub async fn record(&self, paths: HashMap<String, PathBuf>) {
        self.entries.write().await.extend(paths);
    }

    pub async fn get(&self, id: &str) -> Option<PathBuf> {
        self.entries.read().await.get(id).cloned()
    }

    /// Drop every entry; the next lookup repopulates.
    pub async fn invalidate(&self) {
        let mut done = self.populated.lock().await;
        self.entries.write().await.clear();
        *done = false;
    }
}

/// Locate the backing file for `slug`. Returns an absolute path, or `None`
/// when nothing matches.
///
/// Order: path cache, then the direct layouts under every lineage root, then
/// a bounded search of every lineage root. The slug and both hints must be
/// plain path segments, and a result must lie under a lineage root.
pub async fn resolve(
    settings: &LoaderSettings,
    cache: &PathCache,
    slug: &str,
    category: Option<&str>,
    subcategory: Option<&str>,
) -> Option<PathBuf> {
    if !std::iter::once(slug)
        .chain(category)
        .chain(subcategory)
        .all(is_path_segment)
    {
        tracing::debug!("refusing to resolve {slug:?} with hints {category:?}/{subcategory:?}");
        return None;
    }

    cache
        .ensure_populated(|| async {
            crate::loader::build_navigation(settings).await.paths
        })
        .await;

    let hints = category.zip(subcategory);

    if let Some((c, s)) = hints
        && let Some(rel) = cache.get(&format!("{c}/{s}/{slug}")).await
    {
        let full = settings.repo_path.join(&rel);
        if within_lineage(settings, &full) && exists(&full).await {
            return Some(full);
        }
        tracing::debug!("stale path cache entry for {c}/{s}/{slug}: {}", rel.display());
    }

    if let Some((c, s)) = hints {
        for root in &settings.lineages {
            for cat in root.category_dir_candidates(c) {
                for candidate in direct_candidates(&root.path, &cat, s, slug) {
                    if exists(&candidate).await {
                        return Some(candidate);
                    }
                }
            }
        }
    }

    for root in &settings.lineages {
        if let Some(found) = search_tree(&root.path, slug, settings.max_search_depth).await
            && within_lineage(settings, &found)
        {
            return Some(found);
        }
    }
    None
}

/// Lexical containment: no `..` component and rooted at a lineage root.
/// Symlinks below a root are followed on purpose, so this does not
/// canonicalize.
fn within_lineage(settings: &LoaderSettings, path: &Path) -> bool {
    !path.components().any(|c| matches!(c, Component::ParentDir))
        && settings.lineages.iter().any(|root| path.starts_with(&root.path))
}

fn direct_candidates(base: &Path, c: &str, s: &str, slug: &str) -> [PathBuf; 6] {
    let file = format!("{slug}.md");
    let dashed_c = format!("-{c}");
    let dashed_s = format!("-{s}");
    [
        base.join(c).join(s).join(&file),
        base.join(&dashed_c).join(s).join(&file),
        base.join(c).join(&dashed_s).join(&file),
        base.join(&dashed_c).join(&dashed_s).join(&file),
        base.join(c).join(s).join(slug).join("AGENT.md"),
        base.join(&dashed_c).join(s).join(slug).join("AGENT.md"),
    ]
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Depth-first preorder search for `slug.md`, or `AGENT.md` whose parent
/// directory is named `slug`. Entries are visited in file-name order.
/// Bounded by `max_depth` and by a visited set of canonical directories.
async fn search_tree(root: &Path, slug: &str, max_depth: usize) -> Option<PathBuf> {
    let file_name = format!("{slug}.md");
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        let canonical = match tokio::fs::canonicalize(&dir).await {
            Ok(p) => p,
            Err(_) => continue,
        };
        if !visited.insert(canonical) {
            tracing::debug!("already visited {}, skipping", dir.display());
            continue;
        }
        let Ok(entries) = list_dir(&dir).await else {
            continue;
        };

        let dir_is_slug = dir.file_name().is_some_and(|n| n == slug);
        let mut subdirs = Vec::new();
        for entry in entries {
            if entry.is_file {
                if entry.name == file_name || (entry.name == "AGENT.md" && dir_is_slug) {
                    return Some(entry.path);
                }
            } else if entry.is_dir && depth < max_depth {
                subdirs.push((entry.path, depth + 1));
            }
        }
        // Reverse so the first subdirectory is popped first.
        stack.extend(subdirs.into_iter().rev());
    }
    None
}
