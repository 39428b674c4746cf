//! Lineage roots: the independently rooted directory trees that are merged
//! into one navigation tree.

use std::path::PathBuf;

use serde::Serialize;

use super::naming::strip_leading_hyphen;

/// Which tree an agent was scanned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lineage {
    Expert,
    Pipeline,
}

/// A lineage bound to its directory and category id prefix.
#[derive(Debug, Clone)]
pub struct LineageRoot {
    pub lineage: Lineage,
    pub path: PathBuf,
    /// Prepended to every category id scanned from this root.
    pub id_prefix: String,
}

impl LineageRoot {
    pub fn is_pipeline(&self) -> bool {
        matches!(self.lineage, Lineage::Pipeline)
    }

    /// `-frontend` under the pipeline root -> `pipeline-frontend`.
    pub fn category_id(&self, dir_name: &str) -> String {
        format!("{}{}", self.id_prefix, strip_leading_hyphen(dir_name))
    }

    /// Directory names a category hint may correspond to under this root.
    pub fn category_dir_candidates(&self, category_hint: &str) -> Vec<String> {
        let mut out = vec![category_hint.to_string()];
        if !self.id_prefix.is_empty()
            && let Some(stripped) = category_hint.strip_prefix(self.id_prefix.as_str())
            && !stripped.is_empty()
        {
            out.push(stripped.to_string());
        }
        out
    }
}
