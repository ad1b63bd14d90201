//! Corpus acquisition
//!
//! Resolves a repository reference to a local working copy (clone or reuse)
//! and enumerates the documentation files that make up the corpus.

use crate::error::{Error, Result};
use crate::util::{run_command_with_timeout, truncate};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Clones run to completion; a large corpus can take far longer than any fixed limit.
const CLONE_TIMEOUT: Option<Duration> = None;

/// A working copy of the documentation repository under analysis.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    /// Corpus identity, used to key every artifact of the run
    pub name: String,
    pub reference: String,
    pub path: PathBuf,
    /// False when an existing clone was reused
    pub fresh: bool,
}

/// Derive the corpus name from a repository reference.
///
/// `https://github.com/openshift/openshift-docs.git/` → `openshift-docs`
pub fn corpus_name(reference: &str) -> String {
    let trimmed = reference.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Produce a ready working copy of `reference` under `cache_root`.
///
/// With `reuse` set and an existing clone present, nothing touches the
/// network. Otherwise any stale copy is removed and a full clone is made.
pub fn acquire(reference: &str, cache_root: &Path, reuse: bool) -> Result<WorkingCopy> {
    let name = corpus_name(reference);
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::acquisition(format!(
            "Cannot derive a corpus name from '{}'",
            reference
        )));
    }

    std::fs::create_dir_all(cache_root).map_err(|e| {
        Error::acquisition(format!(
            "Failed to create cache root '{}': {}",
            cache_root.display(),
            e
        ))
    })?;
    let path = cache_root.join(&name);

    if path.exists() && reuse {
        if path.join(".git").exists() {
            info!("Repository already cloned at: {}", path.display());
            info!("Skipping clone. Use --force-clone to re-clone.");
            return Ok(WorkingCopy {
                name,
                reference: reference.to_string(),
                path,
                fresh: false,
            });
        }
        warn!(
            "{} exists but is not a git repository; re-cloning",
            path.display()
        );
    }

    if path.exists() {
        info!("Removing existing clone: {}", path.display());
        std::fs::remove_dir_all(&path).map_err(|e| {
            Error::acquisition(format!("Failed to remove '{}': {}", path.display(), e))
        })?;
    }

    info!("Cloning repository: {}", reference);
    clone_repo(reference, &path)?;
    info!("Successfully cloned to: {}", path.display());

    Ok(WorkingCopy {
        name,
        reference: reference.to_string(),
        path,
        fresh: true,
    })
}

fn clone_repo(git_url: &str, dest: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("clone").arg(git_url).arg(dest);
    let output = run_command_with_timeout(&mut cmd, None, CLONE_TIMEOUT)
        .map_err(|e| Error::acquisition(format!("Failed to start git clone: {}", e)))?;
    if output.success() {
        return Ok(());
    }
    Err(Error::acquisition(format!(
        "git clone failed for {}: {}",
        git_url,
        truncate(output.stderr.trim(), 240)
    )))
}

/// All files under `root` whose extension is in `file_types`, sorted.
///
/// The `.git` directory is never descended into.
pub fn find_documents(root: &Path, file_types: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| file_types.iter().any(|t| t == ext))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Human-readable total size of the files under `root`.
pub fn repo_size(root: &Path) -> String {
    let bytes: u64 = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum();
    human_size(bytes)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .current_dir(repo)
            .args(args)
            .status()
            .expect("git command failed to start");
        assert!(status.success(), "git {:?} failed", args);
    }

    fn source_repo() -> tempfile::TempDir {
        let source = tempdir().unwrap();
        git(source.path(), &["init"]);
        git(source.path(), &["config", "user.email", "test@example.com"]);
        git(source.path(), &["config", "user.name", "Test"]);
        std::fs::write(source.path().join("index.adoc"), "= Title").unwrap();
        git(source.path(), &["add", "."]);
        git(source.path(), &["commit", "-m", "init"]);
        source
    }

    #[test]
    fn test_corpus_name_variants() {
        assert_eq!(
            corpus_name("https://github.com/openshift/openshift-docs"),
            "openshift-docs"
        );
        assert_eq!(corpus_name("https://github.com/org/docs.git/"), "docs");
        assert_eq!(corpus_name("git@github.com:org/guide.git"), "guide");
        assert_eq!(corpus_name("/srv/mirrors/manual"), "manual");
    }

    #[test]
    fn test_acquire_clones_then_reuses() {
        let source = source_repo();
        let cache = tempdir().unwrap();
        let reference = source.path().to_string_lossy().to_string();

        let first = acquire(&reference, cache.path(), true).unwrap();
        assert!(first.fresh);
        assert!(first.path.join("index.adoc").exists());

        // A local edit survives reuse because nothing is re-checked out.
        std::fs::write(first.path.join("scratch.adoc"), "local").unwrap();
        let second = acquire(&reference, cache.path(), true).unwrap();
        assert!(!second.fresh);
        assert!(second.path.join("scratch.adoc").exists());
    }

    #[test]
    fn test_acquire_without_reuse_replaces_stale_copy() {
        let source = source_repo();
        let cache = tempdir().unwrap();
        let reference = source.path().to_string_lossy().to_string();

        let first = acquire(&reference, cache.path(), true).unwrap();
        std::fs::write(first.path.join("stale.adoc"), "old").unwrap();

        let second = acquire(&reference, cache.path(), false).unwrap();
        assert!(second.fresh);
        assert!(!second.path.join("stale.adoc").exists());
    }

    #[test]
    fn test_acquire_failure_is_acquisition_error() {
        let cache = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        let missing = elsewhere.path().join("does-not-exist");
        let err = acquire(&missing.to_string_lossy(), cache.path(), true).unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
    }

    #[test]
    fn test_clone_is_not_time_limited() {
        assert!(CLONE_TIMEOUT.is_none());
    }

    #[test]
    fn test_find_documents_filters_and_sorts() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("b")).unwrap();
        std::fs::create_dir_all(root.path().join(".git")).unwrap();
        std::fs::write(root.path().join("b/two.adoc"), "").unwrap();
        std::fs::write(root.path().join("a.adoc"), "").unwrap();
        std::fs::write(root.path().join("notes.md"), "").unwrap();
        std::fs::write(root.path().join("image.png"), "").unwrap();
        std::fs::write(root.path().join(".git/hidden.adoc"), "").unwrap();

        let files = find_documents(root.path(), &["adoc".to_string()]);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.adoc"), PathBuf::from("b/two.adoc")]);

        let both = find_documents(root.path(), &["adoc".to_string(), "md".to_string()]);
        assert_eq!(both.len(), 3);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(2048), "2.0K");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0M");
    }
}
