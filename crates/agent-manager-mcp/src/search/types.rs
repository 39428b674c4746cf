use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{AgentRecord, ModelKind, Role, Tier};

/// Exact-match filters; unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub model: Option<ModelKind>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl SearchFilters {
    pub fn matches(&self, record: &AgentRecord) -> bool {
        self.tier.is_none_or(|t| record.resolved.tier == t)
            && self.model.is_none_or(|m| record.resolved.model == m)
            && self
                .category
                .as_deref()
                .is_none_or(|c| record.category == c)
            && self
                .subcategory
                .as_deref()
                .is_none_or(|s| record.subcategory == s)
            && self.role.is_none_or(|r| record.resolved.role == Some(r))
    }
}

/// What search and listing results carry for each agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub tier: Tier,
    pub model: ModelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub category: String,
    pub subcategory: String,
    pub relative_path: PathBuf,
}

impl From<&AgentRecord> for AgentSummary {
    fn from(r: &AgentRecord) -> Self {
        Self {
            id: r.id.clone(),
            slug: r.slug.clone(),
            name: r.resolved.name.clone(),
            description: r.resolved.description.clone(),
            tier: r.resolved.tier,
            model: r.resolved.model,
            role: r.resolved.role,
            category: r.category.clone(),
            subcategory: r.subcategory.clone(),
            relative_path: r.relative_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub agent: AgentSummary,
    pub score: f64,
    /// Index terms the query matched, sorted.
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub tiers: Vec<String>,
    pub models: Vec<String>,
    pub categories: Vec<String>,
    pub roles: Vec<String>,
}
