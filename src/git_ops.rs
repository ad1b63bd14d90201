//! Git operations for verifying and shipping rule changes
//!
//! Status, branch, stage, commit and diff go through git2; push shells out
//! to `git` so the user's credential helpers apply.

use anyhow::{Context, Result};
use git2::{DiffFormat, DiffOptions, IndexAddOption, Repository, Signature, StatusOptions};
use std::path::Path;
use std::process::Command;

fn open(repo_path: &Path) -> Result<Repository> {
    Repository::open(repo_path)
        .with_context(|| format!("Failed to open repository at {}", repo_path.display()))
}

fn pathspec_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Paths under `pathspecs` with any pending change: staged, unstaged, or untracked.
///
/// Pathspecs are relative to the repository root. Equivalent to
/// `git status --porcelain -- <pathspecs>` being non-empty.
pub fn changed_paths(repo_path: &Path, pathspecs: &[&Path]) -> Result<Vec<String>> {
    if pathspecs.is_empty() {
        return Ok(Vec::new());
    }
    let repo = open(repo_path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    for spec in pathspecs {
        opts.pathspec(pathspec_str(spec));
    }

    let statuses = repo
        .statuses(Some(&mut opts))
        .context("Failed to read working tree status")?;
    let mut changed: Vec<String> = statuses
        .iter()
        .filter(|entry| !entry.status().is_empty() && !entry.status().is_ignored())
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect();
    changed.sort();
    Ok(changed)
}

/// Short name of the checked-out branch
pub fn current_branch(repo_path: &Path) -> Result<String> {
    let repo = open(repo_path)?;
    let head = repo.head().context("Failed to get HEAD")?;
    Ok(head.shorthand().unwrap_or("HEAD").to_string())
}

pub fn branch_exists(repo_path: &Path, name: &str) -> Result<bool> {
    let repo = open(repo_path)?;
    let exists = repo.find_branch(name, git2::BranchType::Local).is_ok();
    Ok(exists)
}

/// Create a new branch from current HEAD
pub fn create_branch(repo_path: &Path, name: &str) -> Result<()> {
    let repo = open(repo_path)?;
    let head = repo.head()?;
    let commit = head.peel_to_commit()?;

    repo.branch(name, &commit, false)
        .with_context(|| format!("Failed to create branch '{}'", name))?;

    Ok(())
}

/// Checkout an existing branch, carrying uncommitted changes along
pub fn checkout_branch(repo_path: &Path, name: &str) -> Result<()> {
    let repo = open(repo_path)?;

    let (object, reference) = repo
        .revparse_ext(name)
        .with_context(|| format!("Branch '{}' not found", name))?;

    repo.checkout_tree(&object, None)
        .with_context(|| format!("Failed to check out '{}'", name))?;

    match reference {
        Some(r) => repo.set_head(r.name().unwrap_or("HEAD"))?,
        None => repo.set_head_detached(object.id())?,
    }

    Ok(())
}

/// Create branch and checkout in one step
pub fn create_and_checkout_branch(repo_path: &Path, name: &str) -> Result<()> {
    create_branch(repo_path, name)?;
    checkout_branch(repo_path, name)?;
    Ok(())
}

/// Stage additions, modifications and deletions under `pathspecs` (`git add <paths>`)
pub fn stage_paths(repo_path: &Path, pathspecs: &[&Path]) -> Result<()> {
    let repo = open(repo_path)?;
    let mut index = repo.index()?;
    let specs: Vec<String> = pathspecs.iter().map(|p| pathspec_str(p)).collect();

    index
        .add_all(specs.iter(), IndexAddOption::DEFAULT, None)
        .context("Failed to stage changes")?;
    index
        .update_all(specs.iter(), None)
        .context("Failed to stage deletions")?;
    index.write()?;

    Ok(())
}

/// Commit staged changes
pub fn commit(repo_path: &Path, message: &str) -> Result<String> {
    let repo = open(repo_path)?;
    let mut index = repo.index()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let head = repo.head()?;
    let parent = head.peel_to_commit()?;

    // Get author info from git config
    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| "rulemend".to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| "rulemend@local".to_string());

    let sig = Signature::now(&name, &email)?;

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;

    Ok(oid.to_string())
}

/// Zero-context patch of staged changes under `pathspecs` (`git diff --cached --unified=0`)
pub fn staged_diff(repo_path: &Path, pathspecs: &[&Path]) -> Result<String> {
    let repo = open(repo_path)?;
    let head_tree = repo.head()?.peel_to_tree()?;
    let index = repo.index()?;

    let mut opts = DiffOptions::new();
    opts.context_lines(0);
    for spec in pathspecs {
        opts.pathspec(pathspec_str(spec));
    }
    let diff = repo
        .diff_tree_to_index(Some(&head_tree), Some(&index), Some(&mut opts))
        .context("Failed to diff staged changes")?;

    let mut patch = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        let content = String::from_utf8_lossy(line.content());
        if matches!(line.origin(), '+' | '-' | ' ') {
            patch.push(line.origin());
        }
        patch.push_str(&content);
        true
    })?;
    Ok(patch)
}

/// Push a branch and set its upstream (shells out to git)
pub fn push_branch(repo_path: &Path, remote: &str, branch: &str) -> Result<String> {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(["push", "-u", remote, branch])
        .output()
        .context("Failed to execute git push")?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(anyhow::anyhow!(
            "git push failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}
