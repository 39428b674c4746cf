use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

/// Capability classification of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Focused,
    Expert,
    Phd,
}

/// Model family an agent is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Opus,
    Sonnet,
    Haiku,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Executor,
    Auditor,
    Advisor,
}

macro_rules! lowercase_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(anyhow::anyhow!(
                        "unknown {} '{}'",
                        stringify!($ty).to_ascii_lowercase(),
                        other
                    )),
                }
            }
        }
    };
}

lowercase_enum!(Tier { Focused => "focused", Expert => "expert", Phd => "phd" });
lowercase_enum!(ModelKind { Opus => "opus", Sonnet => "sonnet", Haiku => "haiku" });
lowercase_enum!(Role { Executor => "executor", Auditor => "auditor", Advisor => "advisor" });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
}

/// Agent metadata as written in the file. Every field is either present and
/// typed, or absent; defaults are applied only by [`AgentMetadata::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_fallbacks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_bearing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proactive_triggers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Keys this crate does not interpret (`tools`, `mcp_servers`,
    /// `cognitive_modes`, ...), kept verbatim so a rewrite does not lose them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

/// Metadata with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMetadata {
    pub name: String,
    pub description: String,
    pub tier: Tier,
    pub model: ModelKind,
    pub role: Option<Role>,
}

impl AgentMetadata {
    /// The single place where absent fields get their defaults.
    pub fn resolve(&self, slug: &str) -> ResolvedMetadata {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(slug)
            .to_string();
        ResolvedMetadata {
            name,
            description: self.description.clone().unwrap_or_default(),
            tier: self.tier.unwrap_or(Tier::Expert),
            model: self.model.unwrap_or(ModelKind::Sonnet),
            role: self.role,
        }
    }

    /// Overlay the fields that are set in `updates`.
    pub fn merge(&mut self, updates: MetadataUpdate) {
        if let Some(v) = updates.name {
            self.name = Some(v);
        }
        if let Some(v) = updates.description {
            self.description = Some(v);
        }
        if let Some(v) = updates.tier {
            self.tier = Some(v);
        }
        if let Some(v) = updates.model {
            self.model = Some(v);
        }
        if let Some(v) = updates.role {
            self.role = Some(v);
        }
        if let Some(v) = updates.version {
            self.version = Some(v);
        }
    }

    /// YAML mapping text for the metadata block, without delimiters. Empty
    /// metadata renders as an empty string.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        if self == &AgentMetadata::default() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Partial metadata edit applied by the editor write path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tier: Option<Tier>,
    pub model: Option<ModelKind>,
    pub role: Option<Role>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Instructions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generative: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluative: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub informative: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specialization {
    pub title: String,
    pub body: String,
}

/// Structured body sections. A missing heading leaves its field `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Instructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub never: Option<Vec<String>>,
    /// In document order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specializations: Option<Vec<Specialization>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

/// One parsed agent file. Built fresh on every read.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    /// `category/subcategory/slug`
    pub id: String,
    pub slug: String,
    pub file_path: PathBuf,
    pub relative_path: PathBuf,
    pub category: String,
    pub subcategory: String,
    pub metadata: AgentMetadata,
    pub resolved: ResolvedMetadata,
    pub content: AgentContent,
    /// Whole file as read from disk.
    pub raw_content: String,
    /// Body after the metadata block (the whole file when there is none).
    pub raw_markdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_defaults_once() {
        let meta = AgentMetadata::default();
        let r = meta.resolve("api-designer");
        assert_eq!(r.name, "api-designer");
        assert_eq!(r.description, "");
        assert_eq!(r.tier, Tier::Expert);
        assert_eq!(r.model, ModelKind::Sonnet);
        assert_eq!(r.role, None);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("PhD".parse::<Tier>().unwrap(), Tier::Phd);
        assert_eq!(" opus ".parse::<ModelKind>().unwrap(), ModelKind::Opus);
        assert!("ultra".parse::<Tier>().is_err());
        assert_eq!(Role::Auditor.to_string(), "auditor");
    }

    #[test]
    fn merge_overlays_only_set_fields() {
        let mut meta = AgentMetadata {
            name: Some("Old".into()),
            description: Some("keep".into()),
            ..Default::default()
        };
        meta.merge(MetadataUpdate {
            name: Some("New".into()),
            tier: Some(Tier::Phd),
            ..Default::default()
        });
        assert_eq!(meta.name.as_deref(), Some("New"));
        assert_eq!(meta.description.as_deref(), Some("keep"));
        assert_eq!(meta.tier, Some(Tier::Phd));
    }
}
