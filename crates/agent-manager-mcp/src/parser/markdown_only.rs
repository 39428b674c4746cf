//! Heuristic metadata for plain markdown agent files (the `slug/AGENT.md`
//! layout), which carry no metadata block.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AgentMetadata, ModelKind, Role, Tier};

use super::sections::SectionMap;
use super::{MetadataParser, ParsedMetadata};

static H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#[ \t]+(.+)").expect("valid h1 regex"));
static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*Name:\*\*\s*(.+)").expect("valid name regex"));
static ROLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*Role:\*\*\s*(.+)").expect("valid role regex"));

const IDENTITY_DESCRIPTION_LIMIT: usize = 200;

pub struct MarkdownOnlyParser;

impl MetadataParser for MarkdownOnlyParser {
    fn supports(_content: &str) -> bool {
        true
    }

    fn parse(content: &str, path: &Path) -> anyhow::Result<ParsedMetadata> {
        let sections = SectionMap::scan(content);

        let name = NAME
            .captures(content)
            .or_else(|| H1.captures(content))
            .map(|c| c[1].trim().to_string());

        let role = ROLE.captures(content).and_then(|c| {
            let raw = c[1].trim();
            raw.parse::<Role>()
                .map_err(|_| tracing::debug!("unrecognised role '{}' in {}", raw, path.display()))
                .ok()
        });

        let description = sections
            .get("Purpose")
            .and_then(first_paragraph)
            .or_else(|| sections.get("Identity").and_then(identity_summary))
            .unwrap_or_else(|| format!("Agent from {}", parent_dir_name(path)));

        Ok(ParsedMetadata {
            metadata: AgentMetadata {
                name,
                description: Some(description),
                tier: Some(derive_tier(content)),
                model: Some(ModelKind::Sonnet),
                role,
                ..Default::default()
            },
            body: content.to_string(),
        })
    }
}

/// `phd` wins over `focused` when both hints appear.
pub fn derive_tier(text: &str) -> Tier {
    let lower = text.to_lowercase();
    if lower.contains("phd") || lower.contains("research-grade") {
        Tier::Phd
    } else if lower.contains("focused") || lower.contains("single-purpose") {
        Tier::Focused
    } else {
        Tier::Expert
    }
}

fn first_paragraph(section: &str) -> Option<String> {
    let para = section.trim().split("\n\n").next()?;
    let joined = para.replace('\n', " ").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

fn identity_summary(section: &str) -> Option<String> {
    let joined = section
        .lines()
        .filter(|l| !l.starts_with("**"))
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(IDENTITY_DESCRIPTION_LIMIT).collect())
}

fn parent_dir_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(content: &str) -> AgentMetadata {
        MarkdownOnlyParser::parse(content, Path::new("/repo/expert-agents/x/y/rust-pro/AGENT.md"))
            .expect("markdown parse never fails")
            .metadata
    }

    #[test]
    fn name_and_role_markers() {
        let m = parse("# Heading Name\n\n## Identity\n**Name:** Rust Pro\n**Role:** Auditor\n");
        assert_eq!(m.name.as_deref(), Some("Rust Pro"));
        assert_eq!(m.role, Some(Role::Auditor));
        assert_eq!(m.model, Some(ModelKind::Sonnet));
    }

    #[test]
    fn heading_is_name_without_marker() {
        let m = parse("# Heading Name\n\nprose\n");
        assert_eq!(m.name.as_deref(), Some("Heading Name"));
        assert_eq!(m.role, None);
    }

    #[test]
    fn purpose_then_identity_then_fallback() {
        let m = parse("## Purpose\nFirst line\nsecond line\n\nLater para\n## Identity\nignored\n");
        assert_eq!(m.description.as_deref(), Some("First line second line"));

        let long = "word ".repeat(100);
        let m = parse(&format!("## Identity\n**Name:** X\n{long}\n"));
        let desc = m.description.unwrap();
        assert_eq!(desc.chars().count(), IDENTITY_DESCRIPTION_LIMIT);
        assert!(desc.starts_with("word word"));

        let m = parse("# Only a title\n");
        assert_eq!(m.description.as_deref(), Some("Agent from rust-pro"));
    }

    #[test]
    fn tier_hints() {
        assert_eq!(derive_tier("A PhD level focused agent"), Tier::Phd);
        assert_eq!(derive_tier("single-purpose helper"), Tier::Focused);
        assert_eq!(derive_tier("general"), Tier::Expert);
    }

    proptest! {
        #[test]
        fn phd_hint_always_dominates(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
            let text = format!("{prefix} focused research-grade {suffix}");
            prop_assert_eq!(derive_tier(&text), Tier::Phd);
        }
    }
}
