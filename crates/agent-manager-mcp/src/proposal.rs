//! Change proposals: the GitHub issue an editor would file for an edit or a
//! new agent, rendered locally. Nothing is sent anywhere.

use serde::Serialize;

use crate::model::AgentRecord;

const LABEL: &str = "agent-change";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Edit,
    Create,
}

impl ChangeKind {
    fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Edit => "edit",
            ChangeKind::Create => "create",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeProposal {
    pub kind: ChangeKind,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub diff: String,
    pub issue_url: String,
    pub gh_command: String,
}

#[derive(Debug, Clone)]
pub struct GithubRepo {
    pub owner: String,
    pub repo: String,
}

impl GithubRepo {
    fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Positional line diff: for each index where the lines differ, emit the old
/// line as `- ` and the new one as `+ `. Empty lines are not emitted.
pub fn line_diff(original: &str, modified: &str) -> String {
    let old: Vec<&str> = original.split('\n').collect();
    let new: Vec<&str> = modified.split('\n').collect();
    let mut out = Vec::new();
    for i in 0..old.len().max(new.len()) {
        let o = old.get(i).copied().unwrap_or("");
        let n = new.get(i).copied().unwrap_or("");
        if o == n {
            continue;
        }
        if !o.is_empty() {
            out.push(format!("- {o}"));
        }
        if !n.is_empty() {
            out.push(format!("+ {n}"));
        }
    }
    out.join("\n")
}

/// Build the proposal for `agent` (as it would look after the change).
/// `original` is the content before the change; empty for a creation.
pub fn build(
    github: &GithubRepo,
    kind: ChangeKind,
    agent: &AgentRecord,
    original: &str,
    modified: &str,
    description: Option<&str>,
) -> ChangeProposal {
    let name = &agent.resolved.name;
    let title = match kind {
        ChangeKind::Create => format!("[New Agent] {name}"),
        ChangeKind::Edit => format!("[Edit] {name}"),
    };
    let diff = line_diff(original, modified);
    let heading = match kind {
        ChangeKind::Create => "Creation",
        ChangeKind::Edit => "Edit",
    };
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("No description provided");
    let body = format!(
        "## Agent {heading} Request\n\n\
         **Agent**: {name}\n\
         **Tier**: {tier}\n\
         **Model**: {model}\n\
         **Path**: `{path}`\n\n\
         ### Description\n{description}\n\n\
         ### Changes\n```diff\n{diff}\n```\n\n\
         ---\n*Created via Agent Manager*\n",
        tier = agent.resolved.tier,
        model = agent.resolved.model,
        path = agent.relative_path.display(),
    );
    let labels = vec![
        LABEL.to_string(),
        kind.as_str().to_string(),
        agent.resolved.tier.to_string(),
    ];

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("title", &title)
        .append_pair("body", &body)
        .append_pair("labels", &labels.join(","))
        .finish();
    let issue_url = format!("https://github.com/{}/issues/new?{query}", github.slug());
    let gh_command = gh_command(github, &title, &body, &labels);

    ChangeProposal {
        kind,
        title,
        body,
        labels,
        diff,
        issue_url,
        gh_command,
    }
}

/// `gh issue create` with the body passed through a quoted heredoc.
fn gh_command(github: &GithubRepo, title: &str, body: &str, labels: &[String]) -> String {
    let body = body.trim_end();
    let delimiter = heredoc_delimiter(body);
    let mut cmd = format!(
        "gh issue create \\\n  --repo {} \\\n  --title {} \\\n  --body \"$(cat <<'{delimiter}'\n{body}\n{delimiter}\n)\"",
        github.slug(),
        shell_quote(title),
    );
    for label in labels {
        cmd.push_str(&format!(" \\\n  --label {}", shell_quote(label)));
    }
    cmd
}

/// A heredoc terminator that no line of `body` equals.
fn heredoc_delimiter(body: &str) -> String {
    let taken = |d: &str| body.lines().any(|line| line == d);
    let mut delimiter = "AGENT_MANAGER_EOF".to_string();
    let mut n = 0;
    while taken(&delimiter) {
        n += 1;
        delimiter = format!("AGENT_MANAGER_EOF_{n}");
    }
    delimiter
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_agent_file;
    use std::path::Path;

    fn github() -> GithubRepo {
        GithubRepo {
            owner: "turbobeest".into(),
            repo: "agents".into(),
        }
    }

    fn record(content: &str) -> AgentRecord {
        parse_agent_file(
            Path::new("/repo/expert-agents/web/react/react-pro.md"),
            Path::new("expert-agents/web/react/react-pro.md"),
            content,
            "web",
            "react",
        )
        .unwrap()
    }

    #[test]
    fn diff_is_positional() {
        assert_eq!(line_diff("a\nb\nc", "a\nB\nc"), "- b\n+ B");
        assert_eq!(line_diff("a", "a\n\nnew"), "+ new");
        assert_eq!(line_diff("a\nold", "a"), "- old");
        assert_eq!(line_diff("same", "same"), "");
    }

    #[test]
    fn edit_proposal_fields() {
        let before = "---\nname: React Pro\ntier: expert\n---\nOld body\n";
        let after = "---\nname: React Pro\ntier: expert\n---\nNew body\n";
        let p = build(&github(), ChangeKind::Edit, &record(after), before, after, None);
        assert_eq!(p.title, "[Edit] React Pro");
        assert_eq!(p.labels, vec!["agent-change", "edit", "expert"]);
        assert!(p.body.contains("**Path**: `expert-agents/web/react/react-pro.md`"));
        assert!(p.body.contains("No description provided"));
        assert!(p.body.contains("```diff\n- Old body\n+ New body\n```"));
        assert!(p.issue_url.starts_with("https://github.com/turbobeest/agents/issues/new?title=%5BEdit%5D+React+Pro&body="));
        assert!(p.issue_url.ends_with("&labels=agent-change%2Cedit%2Cexpert"));
        assert!(p.gh_command.contains("--repo turbobeest/agents"));
        assert!(p.gh_command.contains("--label 'agent-change'"));
    }

    #[test]
    fn create_proposal_and_quoting() {
        let content = "---\nname: O'Brien Helper\ntier: phd\n---\nBody\n";
        let p = build(&github(), ChangeKind::Create, &record(content), "", content, Some("  new one "));
        assert_eq!(p.title, "[New Agent] O'Brien Helper");
        assert!(p.body.starts_with("## Agent Creation Request"));
        assert!(p.body.contains("### Description\nnew one\n"));
        assert!(p.diff.starts_with("+ ---"));
        assert!(p.gh_command.contains(r"--title '[New Agent] O'\''Brien Helper'"));
    }

    #[test]
    fn heredoc_delimiter_avoids_body_lines() {
        let content = "---\nname: Quoter\n---\nAGENT_MANAGER_EOF\nafter\n";
        let p = build(
            &github(),
            ChangeKind::Create,
            &record(content),
            "",
            content,
            Some("AGENT_MANAGER_EOF\nAGENT_MANAGER_EOF_1"),
        );
        assert!(p.gh_command.contains("<<'AGENT_MANAGER_EOF_2'\n"));
        assert!(p.gh_command.contains("\nAGENT_MANAGER_EOF_2\n)\" \\\n  --label "));
        let terminators = p
            .gh_command
            .lines()
            .filter(|line| *line == "AGENT_MANAGER_EOF_2")
            .count();
        assert_eq!(terminators, 1);

        assert_eq!(heredoc_delimiter("plain body"), "AGENT_MANAGER_EOF");
        assert_eq!(heredoc_delimiter("x\n  AGENT_MANAGER_EOF\n"), "AGENT_MANAGER_EOF");
    }
}
