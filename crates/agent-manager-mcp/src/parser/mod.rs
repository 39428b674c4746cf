//! Agent file parsing.
//!
//! A file either opens with a `---` delimited YAML block or is plain
//! markdown whose metadata is derived heuristically. Each format implements
//! [`MetadataParser`]; [`parse_agent_file`] picks one and then extracts the
//! body sections.

use std::path::Path;

use anyhow::Result;

use crate::model::{AgentMetadata, AgentRecord, MetadataUpdate, normalize_slug};

pub mod frontmatter;
pub mod markdown_only;
pub mod sections;

use frontmatter::FrontmatterParser;
use markdown_only::MarkdownOnlyParser;

/// Metadata plus the body text that follows it.
#[derive(Debug)]
pub struct ParsedMetadata {
    pub metadata: AgentMetadata,
    pub body: String,
}

/// Parser trait implemented by each agent file format.
pub trait MetadataParser {
    fn supports(content: &str) -> bool;
    fn parse(content: &str, path: &Path) -> Result<ParsedMetadata>;
}

fn parse_metadata(content: &str, path: &Path) -> Result<ParsedMetadata> {
    if FrontmatterParser::supports(content) {
        FrontmatterParser::parse(content, path)
    } else {
        MarkdownOnlyParser::parse(content, path)
    }
}

/// Parse one agent file into a record. Performs no uniqueness checks.
pub fn parse_agent_file(
    file_path: &Path,
    relative_path: &Path,
    content: &str,
    category: &str,
    subcategory: &str,
) -> Result<AgentRecord> {
    let ParsedMetadata { metadata, body } = parse_metadata(content, file_path)?;
    let content_sections = sections::parse_content(&body);
    let slug = derive_slug(metadata.name.as_deref(), file_path);
    let resolved = metadata.resolve(&slug);

    Ok(AgentRecord {
        id: format!("{category}/{subcategory}/{slug}"),
        slug,
        file_path: file_path.to_path_buf(),
        relative_path: relative_path.to_path_buf(),
        category: category.to_string(),
        subcategory: subcategory.to_string(),
        metadata,
        resolved,
        content: content_sections,
        raw_content: content.to_string(),
        raw_markdown: body,
    })
}

/// Metadata name if present, else the file stem, else (for `AGENT.md`) the
/// parent directory name; then normalized.
pub fn derive_slug(name: Option<&str>, file_path: &Path) -> String {
    let raw = match name.filter(|n| !n.trim().is_empty()) {
        Some(n) => n.to_string(),
        None => {
            let stem = file_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if stem == "AGENT" {
                file_path
                    .parent()
                    .and_then(Path::file_name)
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                stem
            }
        }
    };
    normalize_slug(&raw)
}

/// Re-render the metadata block followed by the original body.
pub fn serialize_agent(record: &AgentRecord) -> Result<String> {
    Ok(format!(
        "{}{}",
        frontmatter::render_block(&record.metadata)?,
        record.raw_markdown
    ))
}

/// Merge `updates` into the record's metadata and re-serialize, keeping the
/// body as is.
pub fn update_frontmatter(record: &AgentRecord, updates: MetadataUpdate) -> Result<String> {
    let mut updated = record.clone();
    updated.metadata.merge(updates);
    serialize_agent(&updated)
}
