//! Commit metadata from the working copy, via the git binary.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub email: String,
    pub message: String,
}

pub fn is_git_repository(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--git-dir"])
        .current_dir(dir)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run git {}", args.join(" ")))?;
    if !out.status.success() {
        bail!("git {} failed: {}", args.join(" "), String::from_utf8_lossy(&out.stderr).trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

pub fn repo_url(dir: &Path) -> Result<String> {
    let url = run_git(dir, &["config", "--get", "remote.origin.url"])?;
    if url.is_empty() {
        bail!("no remote origin URL found");
    }
    Ok(url)
}

/// The routing identity is the repository basename without `.git`.
pub fn app_name_from_repo_url(repo_url: &str) -> Result<String> {
    let last = repo_url
        .rsplit('/')
        .next()
        .ok_or_else(|| anyhow!("invalid repository URL: {repo_url}"))?;
    let name = last.trim_end_matches(".git");
    if name.is_empty() {
        bail!("could not extract app name from repository URL: {repo_url}");
    }
    Ok(name.to_string())
}

pub fn last_commit(dir: &Path) -> Result<CommitInfo> {
    Ok(CommitInfo {
        hash: run_git(dir, &["rev-parse", "HEAD"])?,
        author: run_git(dir, &["log", "-1", "--pretty=format:%an"])?,
        email: run_git(dir, &["log", "-1", "--pretty=format:%ae"])?,
        message: run_git(dir, &["log", "-1", "--pretty=format:%s"])?,
    })
}
