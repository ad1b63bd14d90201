//! Change publisher
//!
//! Turns verified rule edits into a branch, a commit, a push and a pull
//! request. Nothing happens unless the rules or fixtures trees have pending
//! changes.

use crate::error::{Error, Result};
use crate::git_ops;
use std::path::{Path, PathBuf};
use tracing::info;

const GENERIC_JUSTIFICATION: &str =
    "Changes made to improve rule accuracy and reduce false positives.";
const EXAMPLE_PREVIEW_CHARS: usize = 50;

/// Somewhere a pushed branch can be proposed for merging.
pub trait ProposalHost {
    /// Open a proposal from `head` into `base`; returns its URL.
    fn open_proposal(&self, base: &str, head: &str, title: &str, body: &str)
        -> anyhow::Result<String>;
}

pub fn branch_name(corpus: &str) -> String {
    format!("vale-rule-improvements-{}", corpus)
}

pub fn proposal_title(corpus: &str) -> String {
    format!("Improve Vale rules based on {} analysis", corpus)
}

pub fn commit_message(corpus: &str, namespace: &str) -> String {
    format!(
        "{title}\n\n\
         Analyzed {corpus} repository and identified false positives\n\
         in {namespace} Vale rules. This commit updates rules and test fixtures to\n\
         reduce false positives while maintaining accuracy.\n",
        title = proposal_title(corpus),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

fn unquote(term: &str) -> &str {
    term.trim_matches(|c| c == '\'' || c == '"')
}

fn preview(content: &str) -> String {
    let head: String = content.chars().take(EXAMPLE_PREVIEW_CHARS).collect();
    format!("'{}...'", head)
}

/// Explain one added or removed line, or `None` when its role is unclear.
pub fn justify_line(content: &str, file_name: &str, kind: ChangeKind) -> Option<String> {
    if file_name.ends_with(".yml") {
        return match kind {
            ChangeKind::Removed => {
                if let Some(term) = content.strip_prefix("- ") {
                    Some(format!("Removed '{}' as false positive", unquote(term)))
                } else if let Some((key, _)) = content.split_once(':') {
                    Some(format!("Removed '{}' pattern as false positive", key.trim()))
                } else {
                    None
                }
            }
            ChangeKind::Added => {
                if content.to_lowercase().contains("exceptions:") {
                    Some("Added exceptions list to filter false positives".to_string())
                } else if let Some(term) = content.strip_prefix("- ") {
                    Some(format!("Added exception for '{}'", unquote(term)))
                } else if content.contains("negative lookahead") || content.contains("(?!") {
                    Some("Added negative lookahead to exclude false positive context".to_string())
                } else if content.contains("negative lookbehind") || content.contains("(?<!") {
                    Some("Added negative lookbehind to exclude false positive context".to_string())
                } else if content.contains(':') && !content.to_lowercase().contains("swap") {
                    Some("Updated pattern to be more specific".to_string())
                } else {
                    None
                }
            }
        };
    }

    if file_name.ends_with(".adoc") {
        let invalid = file_name.contains("testinvalid");
        let valid = file_name.contains("testvalid");
        let example = preview(content);
        return match kind {
            ChangeKind::Removed if invalid => {
                Some(format!("Removed false positive example: {}", example))
            }
            ChangeKind::Added if valid => Some(format!(
                "Added valid usage example that should not trigger rule: {}",
                example
            )),
            ChangeKind::Added if invalid => {
                Some(format!("Added example that should trigger rule: {}", example))
            }
            ChangeKind::Removed if valid => {
                Some(format!("Removed example from valid cases: {}", example))
            }
            _ => None,
        };
    }

    None
}

/// Walk a zero-context patch and explain each changed line, one bullet per
/// distinct explanation.
pub fn justify_diff(diff: &str) -> String {
    if diff.trim().is_empty() {
        return "No changes to document.".to_string();
    }

    let mut file_name = String::from("unknown");
    let mut lines: Vec<String> = Vec::new();
    for line in diff.lines() {
        if let Some(path) = line.strip_prefix("+++") {
            let path = path.trim();
            let path = path.strip_prefix("b/").unwrap_or(path);
            file_name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            continue;
        }
        if line.starts_with("---") {
            continue;
        }
        let (kind, content) = if let Some(rest) = line.strip_prefix('+') {
            (ChangeKind::Added, rest.trim())
        } else if let Some(rest) = line.strip_prefix('-') {
            (ChangeKind::Removed, rest.trim())
        } else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        if let Some(reason) = justify_line(content, &file_name, kind) {
            let bullet = format!("- {}: {}", file_name, reason);
            if !lines.contains(&bullet) {
                lines.push(bullet);
            }
        }
    }

    if lines.is_empty() {
        GENERIC_JUSTIFICATION.to_string()
    } else {
        lines.join("\n")
    }
}

pub fn proposal_body(
    corpus: &str,
    namespace: &str,
    rules_dir: &Path,
    fixtures_dir: &Path,
    justifications: &str,
) -> String {
    format!(
        "## Summary
- Analyzed the {corpus} repository for Vale rule false positives
- Identified and filtered duplicate errors across files
- Used automated review to improve {namespace} Vale rules
- Updated both rule files and test fixtures
- Reduced false positives while maintaining rule accuracy

## Changes
This PR contains updates to:
- Vale rules in `{rules}/`
- Test fixtures in `{fixtures}/`

All changes are based on analysis of errors found in {corpus}.

## Detailed Change Justifications
{justifications}

## Test Plan
- [ ] Run Vale on {corpus} and verify reduced false positives
- [ ] Run Vale on test fixtures to ensure they pass/fail as expected
- [ ] Run Vale on existing test cases to ensure no regressions
- [ ] Review rule and fixture changes for correctness
",
        rules = rules_dir.display(),
        fixtures = fixtures_dir.display(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishReport {
    /// Nothing under the rules or fixtures trees changed
    Skipped,
    Published {
        branch: String,
        commit: String,
        url: String,
    },
}

pub struct Publisher<'a> {
    repo_root: PathBuf,
    namespace: String,
    /// Relative to `repo_root`
    rules_dir: PathBuf,
    /// Relative to `repo_root`
    fixtures_dir: PathBuf,
    remote: String,
    base_branch: String,
    host: &'a dyn ProposalHost,
}

impl<'a> Publisher<'a> {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        namespace: impl Into<String>,
        rules_dir: impl Into<PathBuf>,
        fixtures_dir: impl Into<PathBuf>,
        remote: impl Into<String>,
        base_branch: impl Into<String>,
        host: &'a dyn ProposalHost,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            namespace: namespace.into(),
            rules_dir: rules_dir.into(),
            fixtures_dir: fixtures_dir.into(),
            remote: remote.into(),
            base_branch: base_branch.into(),
            host,
        }
    }

    fn roots(&self) -> [&Path; 2] {
        [self.rules_dir.as_path(), self.fixtures_dir.as_path()]
    }

    pub fn has_changes(&self) -> Result<bool> {
        let changed = git_ops::changed_paths(&self.repo_root, &self.roots()).map_err(Error::publish)?;
        Ok(!changed.is_empty())
    }

    fn ensure_branch(&self, branch: &str) -> anyhow::Result<()> {
        let current = git_ops::current_branch(&self.repo_root)?;
        if current == branch {
            info!("Already on branch: {}", branch);
        } else if git_ops::branch_exists(&self.repo_root, branch)? {
            info!("Switching to existing branch: {}", branch);
            git_ops::checkout_branch(&self.repo_root, branch)?;
        } else {
            info!("Creating new branch: {}", branch);
            git_ops::create_and_checkout_branch(&self.repo_root, branch)?;
        }
        Ok(())
    }

    /// Commit, push and propose the pending rule changes for `corpus`.
    pub fn publish(&self, corpus: &str) -> Result<PublishReport> {
        info!("Checking for modified rules and fixtures...");
        if !self.has_changes()? {
            info!("No rule or fixture changes detected. Skipping PR creation.");
            return Ok(PublishReport::Skipped);
        }

        info!("Creating pull request with rule improvements...");
        let branch = branch_name(corpus);
        let roots = self.roots();

        self.ensure_branch(&branch).map_err(Error::publish)?;
        git_ops::stage_paths(&self.repo_root, &roots).map_err(Error::publish)?;

        info!("Generating change justifications...");
        let diff = git_ops::staged_diff(&self.repo_root, &roots).map_err(Error::publish)?;
        let justifications = justify_diff(&diff);

        let commit = git_ops::commit(&self.repo_root, &commit_message(corpus, &self.namespace))
            .map_err(Error::publish)?;
        info!("Committed {}", commit.get(..12).unwrap_or(&commit));

        git_ops::push_branch(&self.repo_root, &self.remote, &branch).map_err(Error::publish)?;
        info!("Pushed {} to {}", branch, self.remote);

        let body = proposal_body(
            corpus,
            &self.namespace,
            &self.rules_dir,
            &self.fixtures_dir,
            &justifications,
        );
        let url = self
            .host
            .open_proposal(&self.base_branch, &branch, &proposal_title(corpus), &body)
            .map_err(Error::publish)?;
        info!("Pull request created successfully!");

        Ok(PublishReport::Published {
            branch,
            commit,
            url,
        })
    }
}
