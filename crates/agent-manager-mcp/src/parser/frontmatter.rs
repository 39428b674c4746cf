//! Parser for agent files that open with a `---` delimited YAML block.

use std::path::Path;

use anyhow::Context as _;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::model::{AgentMetadata, Escalation};

use super::{MetadataParser, ParsedMetadata};

pub struct FrontmatterParser;

impl MetadataParser for FrontmatterParser {
    fn supports(content: &str) -> bool {
        content
            .trim_start()
            .lines()
            .next()
            .is_some_and(|first| first.trim() == "---")
    }

    fn parse(content: &str, path: &Path) -> anyhow::Result<ParsedMetadata> {
        let (yaml, body) = split_block(content);

        let metadata = if yaml.trim().is_empty() {
            AgentMetadata::default()
        } else {
            let value: YamlValue =
                serde_yaml::from_str(yaml).context("invalid YAML frontmatter")?;
            match value {
                YamlValue::Null => AgentMetadata::default(),
                YamlValue::Mapping(map) => metadata_from_mapping(map, path),
                other => {
                    return Err(anyhow::anyhow!(
                        "frontmatter in {} is not a mapping (found {})",
                        path.display(),
                        kind_of(&other)
                    ));
                }
            }
        };

        Ok(ParsedMetadata {
            metadata,
            body: body.to_string(),
        })
    }
}

/// Split `content` into the YAML between the delimiters and the body after
/// the closing delimiter line. Body bytes are returned untouched. Without a
/// closing delimiter everything after the opening line is YAML and the body
/// is empty.
fn split_block(content: &str) -> (&str, &str) {
    let trimmed = content.trim_start();
    let mut lines = trimmed.split_inclusive('\n');
    let yaml_start = lines.next().map_or(0, str::len);
    let mut offset = yaml_start;
    for line in lines {
        if line.trim() == "---" {
            return (&trimmed[yaml_start..offset], &trimmed[offset + line.len()..]);
        }
        offset += line.len();
    }
    (&trimmed[yaml_start..], "")
}

/// Render metadata back into a delimited block.
pub fn render_block(metadata: &AgentMetadata) -> anyhow::Result<String> {
    let yaml = metadata.to_yaml().context("serialize frontmatter")?;
    Ok(format!("---\n{yaml}---\n"))
}

/// Typed extraction of known keys; a value of the wrong shape is dropped to
/// absent instead of failing the whole file.
fn metadata_from_mapping(mut map: Mapping, path: &Path) -> AgentMetadata {
    let mut take = |key: &str| map.remove(YamlValue::String(key.to_string()));

    let name = take("name").and_then(|v| scalar_string(v, "name", path));
    let description = take("description").and_then(|v| scalar_string(v, "description", path));
    let version = take("version").and_then(|v| scalar_string(v, "version", path));
    let model = take("model").and_then(|v| parse_enum(v, "model", path));
    let tier = take("tier").and_then(|v| parse_enum(v, "tier", path));
    let role = take("role").and_then(|v| parse_enum(v, "role", path));
    let model_fallbacks = take("model_fallbacks").and_then(|v| string_list(v, "model_fallbacks", path));
    let proactive_triggers =
        take("proactive_triggers").and_then(|v| string_list(v, "proactive_triggers", path));
    let load_bearing = match take("load_bearing") {
        Some(YamlValue::Bool(b)) => Some(b),
        Some(other) => {
            tracing::debug!(
                "ignoring non-bool 'load_bearing' in {} (found: {})",
                path.display(),
                kind_of(&other)
            );
            None
        }
        None => None,
    };
    let escalation = take("escalation").and_then(|v| {
        match serde_yaml::from_value::<Escalation>(v) {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::debug!("invalid 'escalation' in {}: {}", path.display(), e);
                None
            }
        }
    });

    let mut extra = std::collections::BTreeMap::new();
    for (k, v) in map {
        match k {
            YamlValue::String(key) => {
                extra.insert(key, v);
            }
            other => tracing::debug!(
                "dropping non-string frontmatter key in {} ({})",
                path.display(),
                kind_of(&other)
            ),
        }
    }

    AgentMetadata {
        name,
        description,
        model,
        model_fallbacks,
        tier,
        role,
        load_bearing,
        proactive_triggers,
        escalation,
        version,
        extra,
    }
}

fn scalar_string(v: YamlValue, key: &str, path: &Path) -> Option<String> {
    match v {
        YamlValue::String(s) => Some(s),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Null => None,
        other => {
            tracing::debug!(
                "ignoring non-scalar '{}' in {} (found: {})",
                key,
                path.display(),
                kind_of(&other)
            );
            None
        }
    }
}

fn parse_enum<T: std::str::FromStr>(v: YamlValue, key: &str, path: &Path) -> Option<T> {
    let YamlValue::String(s) = v else {
        tracing::debug!(
            "ignoring non-string '{}' in {} (found: {})",
            key,
            path.display(),
            kind_of(&v)
        );
        return None;
    };
    match s.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::debug!("unknown {} '{}' in {}", key, s, path.display());
            None
        }
    }
}

fn string_list(v: YamlValue, key: &str, path: &Path) -> Option<Vec<String>> {
    match v {
        YamlValue::Sequence(items) => Some(
            items
                .into_iter()
                .filter_map(|it| match it {
                    YamlValue::String(s) => Some(s),
                    YamlValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        YamlValue::String(s) => Some(vec![s]),
        other => {
            tracing::debug!(
                "ignoring '{}' in {} (found: {})",
                key,
                path.display(),
                kind_of(&other)
            );
            None
        }
    }
}

fn kind_of(v: &YamlValue) -> &'static str {
    match v {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "bool",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "sequence",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelKind, Role, Tier};

    fn parse(content: &str) -> anyhow::Result<ParsedMetadata> {
        FrontmatterParser::parse(content, Path::new("/tmp/example.md"))
    }

    #[test]
    fn typed_fields_and_body() {
        let content = r#"---
name: api-designer
description: Designs HTTP APIs
model: opus
tier: phd
role: auditor
version: 1.2
escalation:
  confidence_threshold: 0.6
  escalate_to: architect
  triggers: [ambiguity]
tools:
  audit: Read, Grep
---
# API Designer

Body text.
"#;
        let parsed = parse(content).expect("parse ok");
        let m = &parsed.metadata;
        assert_eq!(m.name.as_deref(), Some("api-designer"));
        assert_eq!(m.model, Some(ModelKind::Opus));
        assert_eq!(m.tier, Some(Tier::Phd));
        assert_eq!(m.role, Some(Role::Auditor));
        assert_eq!(m.version.as_deref(), Some("1.2"));
        let esc = m.escalation.as_ref().expect("escalation");
        assert_eq!(esc.escalate_to.as_deref(), Some("architect"));
        assert!(m.extra.contains_key("tools"));
        assert_eq!(parsed.body, "# API Designer\n\nBody text.\n");
    }

    #[test]
    fn wrong_types_fall_back_to_absent() {
        let parsed = parse("---\nname: [a, b]\ntier: ultra\nmodel: 3\n---\nbody\n").expect("parse ok");
        assert_eq!(parsed.metadata.name, None);
        assert_eq!(parsed.metadata.tier, None);
        assert_eq!(parsed.metadata.model, None);
    }

    #[test]
    fn empty_block_is_not_an_error() {
        let parsed = parse("---\n---\nbody").expect("parse ok");
        assert_eq!(parsed.metadata, AgentMetadata::default());
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn unterminated_block_is_all_metadata() {
        let parsed = parse("---\nname: Oncall\ntier: phd\n").expect("parse ok");
        assert_eq!(parsed.metadata.name.as_deref(), Some("Oncall"));
        assert_eq!(parsed.metadata.tier, Some(Tier::Phd));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn structural_failures_are_errors() {
        assert!(parse("---\nname: x\nno closing: [\n").is_err());
        assert!(parse("---\nname: [unclosed\n---\nbody\n").is_err());
        assert!(parse("---\n- just\n- a list\n---\nbody\n").is_err());
    }

    #[test]
    fn rendered_block_round_trips() {
        let content = "---\nname: Reviewer\ndescription: Reviews code\ntier: focused\nmodel: haiku\nproactive_triggers:\n- '*.rs'\ncognitive_modes:\n  default: critical\n---\n## Identity\n\nA reviewer.\n";
        let parsed = parse(content).expect("parse ok");
        let rendered = format!("{}{}", render_block(&parsed.metadata).unwrap(), parsed.body);
        let reparsed = parse(&rendered).expect("reparse ok");
        assert_eq!(reparsed.metadata, parsed.metadata);
        assert_eq!(reparsed.body, parsed.body);
    }

    #[test]
    fn supports_requires_delimiter_line() {
        assert!(FrontmatterParser::supports("\n\n---\nname: x\n---\n"));
        assert!(!FrontmatterParser::supports("# Title\n---\n"));
        assert!(!FrontmatterParser::supports("----\n"));
    }
}
