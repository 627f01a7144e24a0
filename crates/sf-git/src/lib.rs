#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-git
//!
//! Git repository helpers used by the sandboxed skill build driver:
//! baselining a staged workspace copy and reading back its diff so the
//! build driver can gate on an allow-listed file set.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Initializes a git repo at `path` with a baseline commit if one does not already exist.
pub fn ensure_git_repo(path: &Path) {
    if path.join(".git").exists() {
        return;
    }

    let _ = Command::new("git")
        .args(["init", "-q"])
        .current_dir(path)
        .status();

    let _ = Command::new("git")
        .args(["add", "-A"])
        .current_dir(path)
        .status();

    let _ = Command::new("git")
        .args([
            "-c",
            "user.name=skill-forge",
            "-c",
            "user.email=skill-forge@local",
            "commit",
            "-qm",
            "baseline",
        ])
        .current_dir(path)
        .status();
}

/// Returns the porcelain v1 status output for the repo at `path`, if available.
pub fn git_status(path: &Path) -> Option<String> {
    run_git(path, &["status", "--porcelain=v1"]).ok()
}

/// Returns the unified diff output for the repo at `path`, if available.
pub fn git_diff(path: &Path) -> Option<String> {
    run_git(path, &["diff", "--no-color"]).ok()
}

/// Returns the set of paths changed relative to the baseline commit, including
/// untracked files. Empty means no changes were made at all.
pub fn git_diff_names(path: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = run_git(path, &["diff", "--name-only", "HEAD"])?
        .lines()
        .map(str::to_string)
        .collect();

    let untracked = run_git(path, &["ls-files", "--others", "--exclude-standard"])?;
    names.extend(untracked.lines().map(str::to_string));

    names.sort();
    names.dedup();
    Ok(names)
}

fn run_git(path: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(path)
        .output()
        .with_context(|| format!("run git {args:?}"))?;

    if !out.status.success() {
        anyhow::bail!("git {:?} failed (code={:?})", args, out.status.code());
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn baseline_then_no_changes_is_empty_diff() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        ensure_git_repo(dir.path());
        let names = git_diff_names(dir.path()).expect("diff names");
        assert!(names.is_empty());
    }

    #[test]
    fn new_file_after_baseline_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        ensure_git_repo(dir.path());
        fs::write(dir.path().join("b.txt"), "world").unwrap();
        let names = git_diff_names(dir.path()).expect("diff names");
        assert_eq!(names, vec!["b.txt".to_string()]);
    }

    #[test]
    fn modified_file_after_baseline_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        ensure_git_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let names = git_diff_names(dir.path()).expect("diff names");
        assert_eq!(names, vec!["a.txt".to_string()]);
    }
}
