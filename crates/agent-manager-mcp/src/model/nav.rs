//! Navigation tree: categories -> subcategories -> agent summaries.

use serde::Serialize;

use super::types::{AgentRecord, ModelKind, Tier};

/// Subcategory id used for loose files sitting directly in a category.
pub const GENERAL_SUBCATEGORY: &str = "general";

#[derive(Debug, Clone, Serialize)]
pub struct NavCategory {
    pub id: String,
    pub title: String,
    pub description: String,
    pub is_pipeline: bool,
    pub subcategories: Vec<NavSubcategory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavSubcategory {
    pub id: String,
    pub category_id: String,
    pub title: String,
    pub description: String,
    pub agents: Vec<NavAgent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavAgent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tier: Tier,
    pub model: ModelKind,
    pub category_id: String,
    pub subcategory_id: String,
}

impl NavAgent {
    pub fn from_record(record: &AgentRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.resolved.name.clone(),
            description: record.resolved.description.clone(),
            tier: record.resolved.tier,
            model: record.resolved.model,
            category_id: record.category.clone(),
            subcategory_id: record.subcategory.clone(),
        }
    }

    /// Last segment of the identity.
    pub fn slug(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

impl NavCategory {
    /// Append `agents` to the subcategory with `id`, creating it if needed.
    pub fn merge_subcategory(
        &mut self,
        id: &str,
        title: String,
        description: String,
        agents: Vec<NavAgent>,
    ) {
        if agents.is_empty() {
            return;
        }
        if let Some(existing) = self.subcategories.iter_mut().find(|s| s.id == id) {
            existing.agents.extend(agents);
            return;
        }
        self.subcategories.push(NavSubcategory {
            id: id.to_string(),
            category_id: self.id.clone(),
            title,
            description,
            agents,
        });
    }
}

/// Total number of agents listed in a tree.
pub fn agent_count(tree: &[NavCategory]) -> usize {
    tree.iter()
        .flat_map(|c| c.subcategories.iter())
        .map(|s| s.agents.len())
        .sum()
}
