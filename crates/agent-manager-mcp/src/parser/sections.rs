//! Extraction of the structured `## ` sections of an agent body.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AgentContent, Instructions, Specialization};

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)]+").expect("valid url regex"));
static NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s+(.+)").expect("valid numbered-list regex"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s+(.+)").expect("valid bullet regex"));
static VOCABULARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*Vocabulary\*\*:\s*(.+)").expect("valid vocabulary regex"));

/// Body of every `## ` section, keyed by heading text, first occurrence only.
#[derive(Debug, Default)]
pub struct SectionMap {
    sections: Vec<(String, String)>,
}

impl SectionMap {
    /// Single pass over the lines. Headings inside fenced code blocks are
    /// treated as text.
    pub fn scan(markdown: &str) -> Self {
        enum State {
            SeekingHeading,
            InSection { title: String, body: String },
        }

        let mut map = SectionMap::default();
        let mut state = State::SeekingHeading;
        let mut in_fence = false;

        for line in markdown.lines() {
            let is_fence = line.trim_start().starts_with("```");
            let heading = if in_fence { None } else { level2_heading(line) };
            if is_fence {
                in_fence = !in_fence;
            }

            match heading {
                Some(title) => {
                    if let State::InSection { title: prev, body } =
                        std::mem::replace(&mut state, State::SeekingHeading)
                    {
                        map.insert(prev, body);
                    }
                    state = State::InSection {
                        title: title.to_string(),
                        body: String::new(),
                    };
                }
                None => {
                    if let State::InSection { body, .. } = &mut state {
                        body.push_str(line);
                        body.push('\n');
                    }
                }
            }
        }
        if let State::InSection { title, body } = state {
            map.insert(title, body);
        }
        map
    }

    fn insert(&mut self, title: String, body: String) {
        if self.get(&title).is_none() {
            self.sections.push((title, body));
        }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, b)| b.as_str())
    }
}

fn level2_heading(line: &str) -> Option<&str> {
    line.strip_prefix("## ").map(str::trim)
}

/// Split a section body on `### ` headings, in document order. Text before
/// the first sub-heading is dropped.
fn subsections(section: &str) -> Vec<(&str, String)> {
    let mut out: Vec<(&str, String)> = Vec::new();
    let mut in_fence = false;
    for line in section.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && let Some(title) = line.strip_prefix("### ") {
            out.push((title.trim(), String::new()));
            continue;
        }
        if let Some((_, body)) = out.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    out
}

fn numbered_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|l| NUMBERED.captures(l))
        .map(|c| c[1].trim().to_string())
        .collect()
}

fn bullet_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|l| BULLET.captures(l))
        .map(|c| c[1].trim().to_string())
        .collect()
}

fn parse_instructions(section: &str) -> Instructions {
    let mut out = Instructions::default();
    for (title, body) in subsections(section) {
        let slot = if title.starts_with("Always") {
            &mut out.always
        } else if title.starts_with("When Generative") {
            &mut out.generative
        } else if title.starts_with("When Critical") {
            &mut out.critical
        } else if title.starts_with("When Evaluative") {
            &mut out.evaluative
        } else if title.starts_with("When Informative") {
            &mut out.informative
        } else {
            continue;
        };
        if slot.is_none() {
            *slot = Some(numbered_items(&body));
        }
    }
    out
}

/// Parse the known sections of `markdown`. Absent headings stay `None`.
pub fn parse_content(markdown: &str) -> AgentContent {
    let sections = SectionMap::scan(markdown);
    let mut content = AgentContent::default();

    if let Some(identity) = sections.get("Identity") {
        content.identity = Some(identity.trim().to_string());
        content.vocabulary = VOCABULARY.captures(identity).map(|c| {
            c[1].split(',')
                .map(|v| v.trim().to_string())
                .collect()
        });
    }
    content.instructions = sections.get("Instructions").map(parse_instructions);
    content.never = sections.get("Never").map(bullet_items);
    content.specializations = sections.get("Specializations").map(|s| {
        subsections(s)
            .into_iter()
            .filter(|(title, _)| !title.is_empty())
            .map(|(title, body)| Specialization {
                title: title.to_string(),
                body: body.trim().to_string(),
            })
            .collect()
    });
    content.knowledge_sources = sections.get("Knowledge Sources").map(|s| {
        URL.find_iter(s).map(|m| m.as_str().to_string()).collect()
    });
    content.output_format = sections.get("Output Format").map(|s| s.trim().to_string());

    content
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"# Rust Expert

## Identity

You are a systems programmer.
**Vocabulary**: ownership, borrowing , lifetimes

## Instructions

### Always (all modes)
1. Read the code first
2. Prefer small diffs

### When Generative
1. Write tests

### When Critical
- not numbered
1. Check unsafe blocks

## Never
- Ignore clippy
* Panic in libraries

## Specializations

### Async
Tokio runtime details.

### FFI
bindgen and cbindgen.

## Knowledge Sources

- https://doc.rust-lang.org/book/ (The Book)
- [nomicon](https://doc.rust-lang.org/nomicon)

## Output Format

```
## Not a heading
```

## Identity

Duplicate identity is ignored.
"#;

    #[test]
    fn extracts_all_sections() {
        let c = parse_content(BODY);
        let identity = c.identity.expect("identity");
        assert!(identity.starts_with("You are a systems programmer."));
        assert_eq!(
            c.vocabulary.unwrap(),
            vec!["ownership", "borrowing", "lifetimes"]
        );
        let ins = c.instructions.expect("instructions");
        assert_eq!(ins.always.unwrap(), vec!["Read the code first", "Prefer small diffs"]);
        assert_eq!(ins.generative.unwrap(), vec!["Write tests"]);
        assert_eq!(ins.critical.unwrap(), vec!["Check unsafe blocks"]);
        assert!(ins.evaluative.is_none());
        assert_eq!(c.never.unwrap(), vec!["Ignore clippy", "Panic in libraries"]);
        let specs = c.specializations.unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].title, "Async");
        assert_eq!(specs[0].body, "Tokio runtime details.");
        assert_eq!(specs[1].title, "FFI");
        assert_eq!(
            c.knowledge_sources.unwrap(),
            vec![
                "https://doc.rust-lang.org/book/",
                "https://doc.rust-lang.org/nomicon"
            ]
        );
        assert_eq!(c.output_format.unwrap(), "```\n## Not a heading\n```");
    }

    #[test]
    fn missing_sections_stay_absent() {
        let c = parse_content("# Title\n\nJust prose.\n");
        assert_eq!(c, AgentContent::default());
    }

    #[test]
    fn first_occurrence_wins() {
        let map = SectionMap::scan("## Never\n- a\n## Never\n- b\n");
        assert_eq!(map.get("Never"), Some("- a\n"));
    }

    #[test]
    fn deeper_headings_do_not_open_sections() {
        let map = SectionMap::scan("### Identity\ntext\n");
        assert!(map.get("Identity").is_none());
    }
}
