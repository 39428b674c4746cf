//! Git sync status and pull for the agents repository.
//!
//! Every command goes through [`GitRunner`]; [`ProcessGitRunner`] shells out
//! to `git` with a per-invocation timeout.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

const AUTO_STASH_MESSAGE: &str = "agent-manager-auto-stash";

#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` in the repository and return trimmed stdout. A
    /// nonzero exit or a timeout is an error.
    async fn run(&self, args: &[&str]) -> anyhow::Result<String>;
}

pub struct ProcessGitRunner {
    repo_path: PathBuf,
    timeout: Duration,
}

impl ProcessGitRunner {
    pub fn new(repo_path: PathBuf, timeout: Duration) -> Self {
        Self { repo_path, timeout }
    }
}

#[async_trait]
impl GitRunner for ProcessGitRunner {
    async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args).current_dir(&self.repo_path).kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("git {} timed out after {:?}", args.join(" "), self.timeout))?
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "git {} failed ({}): {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Synced,
    LocalChanges,
    RemoteChanges,
    Conflict,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitStatus {
    pub status: SyncStatus,
    pub local_changes: Vec<String>,
    pub remote_changes: Vec<String>,
    pub current_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<DateTime<Utc>>,
}

impl GitStatus {
    fn unknown() -> Self {
        Self {
            status: SyncStatus::Unknown,
            local_changes: Vec::new(),
            remote_changes: Vec::new(),
            current_branch: "unknown".to_string(),
            last_fetch: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PullOutcome {
    pub success: bool,
    pub message: String,
}

fn non_empty_lines(s: &str) -> Vec<String> {
    s.lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Local and remote divergence. Never fails; git errors degrade to
/// [`SyncStatus::Unknown`].
pub async fn status(git: &dyn GitRunner) -> GitStatus {
    match try_status(git).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("git status failed: {:#}", e);
            GitStatus::unknown()
        }
    }
}

async fn try_status(git: &dyn GitRunner) -> anyhow::Result<GitStatus> {
    let current_branch = git.run(&["branch", "--show-current"]).await?;

    if let Err(e) = git.run(&["fetch", "--quiet"]).await {
        tracing::debug!("git fetch failed (offline?): {:#}", e);
    }

    let local_changes = non_empty_lines(&git.run(&["status", "--porcelain"]).await?);

    let (status, remote_changes) = match divergence(git, &current_branch).await {
        Ok((behind, remote_changes)) => {
            let status = if !local_changes.is_empty() && !remote_changes.is_empty() {
                SyncStatus::Conflict
            } else if !local_changes.is_empty() {
                SyncStatus::LocalChanges
            } else if behind > 0 {
                SyncStatus::RemoteChanges
            } else {
                SyncStatus::Synced
            };
            (status, remote_changes)
        }
        Err(e) => {
            tracing::debug!("cannot compare with origin/{}: {:#}", current_branch, e);
            let status = if local_changes.is_empty() {
                SyncStatus::Unknown
            } else {
                SyncStatus::LocalChanges
            };
            (status, Vec::new())
        }
    };

    Ok(GitStatus {
        status,
        local_changes,
        remote_changes,
        current_branch,
        last_fetch: Some(Utc::now()),
    })
}

/// Commits behind `origin/<branch>` and the files they touch.
async fn divergence(git: &dyn GitRunner, branch: &str) -> anyhow::Result<(u64, Vec<String>)> {
    let behind_range = format!("HEAD..origin/{branch}");
    let ahead_range = format!("origin/{branch}..HEAD");
    let behind: u64 = git
        .run(&["rev-list", &behind_range, "--count"])
        .await?
        .parse()
        .unwrap_or(0);
    let ahead: u64 = git
        .run(&["rev-list", &ahead_range, "--count"])
        .await?
        .parse()
        .unwrap_or(0);
    tracing::debug!(behind, ahead, "branch divergence");

    let remote_changes = if behind > 0 {
        non_empty_lines(&git.run(&["diff", "--name-only", &behind_range]).await?)
    } else {
        Vec::new()
    };
    Ok((behind, remote_changes))
}

/// Stash local edits, rebase onto the remote, then restore the stash.
pub async fn pull(git: &dyn GitRunner) -> PullOutcome {
    let current = status(git).await;
    let stashed = !current.local_changes.is_empty();
    if stashed
        && let Err(e) = git
            .run(&["stash", "push", "-m", AUTO_STASH_MESSAGE])
            .await
    {
        return PullOutcome {
            success: false,
            message: format!("{e:#}"),
        };
    }

    let pulled = match git.run(&["pull", "--rebase"]).await {
        Ok(out) => out,
        Err(e) => {
            if stashed && let Err(pop) = git.run(&["stash", "pop"]).await {
                tracing::warn!("restoring auto-stash after failed pull: {:#}", pop);
            }
            return PullOutcome {
                success: false,
                message: format!("{e:#}"),
            };
        }
    };

    if stashed && git.run(&["stash", "pop"]).await.is_err() {
        return PullOutcome {
            success: false,
            message: "Pull succeeded but stash pop failed. Check for conflicts.".to_string(),
        };
    }

    tracing::info!("pulled agents repository");
    PullOutcome {
        success: true,
        message: pulled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replies keyed by the joined argument list; unscripted commands fail.
    #[derive(Default)]
    struct ScriptedRunner {
        replies: HashMap<String, Result<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn reply(mut self, cmd: &str, out: &str) -> Self {
            self.replies.insert(cmd.to_string(), Ok(out.to_string()));
            self
        }

        fn fail(mut self, cmd: &str) -> Self {
            self.replies.insert(cmd.to_string(), Err(format!("{cmd} failed")));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GitRunner for ScriptedRunner {
        async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
            let key = args.join(" ");
            self.calls.lock().unwrap().push(key.clone());
            match self.replies.get(&key) {
                Some(Ok(out)) => Ok(out.clone()),
                Some(Err(e)) => Err(anyhow!(e.clone())),
                None => Err(anyhow!("unscripted: {key}")),
            }
        }
    }

    fn base(local: &str, behind: &str, diff: &str) -> ScriptedRunner {
        ScriptedRunner::default()
            .reply("branch --show-current", "main")
            .reply("fetch --quiet", "")
            .reply("status --porcelain", local)
            .reply("rev-list HEAD..origin/main --count", behind)
            .reply("rev-list origin/main..HEAD --count", "0")
            .reply("diff --name-only HEAD..origin/main", diff)
    }

    #[tokio::test]
    async fn classification() {
        let s = status(&base("", "0", "")).await;
        assert_eq!(s.status, SyncStatus::Synced);
        assert_eq!(s.current_branch, "main");

        let s = status(&base(" M a.md\n", "0", "")).await;
        assert_eq!(s.status, SyncStatus::LocalChanges);
        assert_eq!(s.local_changes, vec![" M a.md"]);

        let s = status(&base("", "2", "b.md\nc.md\n")).await;
        assert_eq!(s.status, SyncStatus::RemoteChanges);
        assert_eq!(s.remote_changes, vec!["b.md", "c.md"]);

        let s = status(&base(" M a.md", "1", "b.md")).await;
        assert_eq!(s.status, SyncStatus::Conflict);
    }

    #[tokio::test]
    async fn missing_upstream_and_hard_failures() {
        let runner = ScriptedRunner::default()
            .reply("branch --show-current", "feature")
            .fail("fetch --quiet")
            .reply("status --porcelain", "");
        let s = status(&runner).await;
        assert_eq!(s.status, SyncStatus::Unknown);
        assert_eq!(s.current_branch, "feature");

        let runner = ScriptedRunner::default()
            .reply("branch --show-current", "feature")
            .reply("status --porcelain", "?? new.md");
        assert_eq!(status(&runner).await.status, SyncStatus::LocalChanges);

        let s = status(&ScriptedRunner::default()).await;
        assert_eq!(s.status, SyncStatus::Unknown);
        assert_eq!(s.current_branch, "unknown");
        assert!(s.last_fetch.is_none());
    }

    #[tokio::test]
    async fn pull_stashes_and_restores() {
        let runner = base(" M a.md", "1", "b.md")
            .reply("stash push -m agent-manager-auto-stash", "")
            .reply("pull --rebase", "Updated 1 file")
            .reply("stash pop", "");
        let out = pull(&runner).await;
        assert!(out.success);
        assert_eq!(out.message, "Updated 1 file");
        let calls = runner.calls();
        let pos = |c: &str| calls.iter().position(|x| x == c).unwrap();
        assert!(pos("stash push -m agent-manager-auto-stash") < pos("pull --rebase"));
        assert!(pos("pull --rebase") < pos("stash pop"));
    }

    #[tokio::test]
    async fn pull_reports_stash_pop_conflict() {
        let runner = base(" M a.md", "1", "b.md")
            .reply("stash push -m agent-manager-auto-stash", "")
            .reply("pull --rebase", "ok")
            .fail("stash pop");
        let out = pull(&runner).await;
        assert!(!out.success);
        assert!(out.message.contains("stash pop failed"));
    }

    #[tokio::test]
    async fn clean_pull_skips_stash() {
        let runner = base("", "1", "b.md").reply("pull --rebase", "Fast-forward");
        assert!(pull(&runner).await.success);
        assert!(!runner.calls().iter().any(|c| c.starts_with("stash")));
    }

    #[tokio::test]
    async fn process_runner_times_out_or_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessGitRunner::new(dir.path().to_path_buf(), Duration::from_secs(10));
        // Not a repository (or git missing): either way an error, never a panic.
        assert!(runner.run(&["rev-parse", "--verify", "HEAD"]).await.is_err());
    }
}
