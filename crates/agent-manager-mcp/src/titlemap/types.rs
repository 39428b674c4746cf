use serde::Deserialize;
use std::collections::HashMap;

use crate::model::naming::{strip_leading_hyphen, strip_phase_prefix, title_case};

/// Directory name (leading hyphen stripped) -> display title.
#[derive(Debug, Clone, Default)]
pub struct TitleMap {
    pub by_folder: HashMap<String, String>,
}

/// On-disk override file:
///
/// ```toml
/// [titles]
/// "backend-ecosystems" = "Languages"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawTitleFile {
    #[serde(default)]
    pub titles: HashMap<String, String>,
}

impl TitleMap {
    /// Title for a category, or an expert-lineage subcategory.
    pub fn folder_title(&self, folder: &str) -> String {
        let clean = strip_leading_hyphen(folder);
        match self.by_folder.get(clean) {
            Some(mapped) => mapped.clone(),
            None => title_case(clean),
        }
    }

    /// Title for a pipeline subcategory: the phase prefix is dropped and the
    /// map is not consulted.
    pub fn phase_title(&self, folder: &str) -> String {
        title_case(strip_phase_prefix(strip_leading_hyphen(folder)))
    }
}
