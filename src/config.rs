//! Configuration management for rulemend
//!
//! Settings come from `--config <file>`, else `rulemend.toml` in the current
//! directory, else built-in defaults. CLI flags are applied on top by `main`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "rulemend.toml";
const MAX_DEFAULT_JOBS: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where clones, lint artifacts and batch file lists live
    pub scratch_dir: PathBuf,
    /// Git checkout holding the styles and fixtures; the agent runs here
    pub rules_repo: PathBuf,
    /// Root of the lint styles tree, e.g. `.vale/styles`
    pub styles_root: PathBuf,
    /// Root of the rule fixtures tree, e.g. `.vale/fixtures`
    pub fixtures_root: PathBuf,
    /// Style namespace under review; rule ids look like `<namespace>.<Rule>`
    pub namespace: String,
    /// Parallel lint workers (`None` means `min(16, cpus)`)
    pub jobs: Option<usize>,
    /// File extensions included in the corpus, without the dot
    pub file_types: Vec<String>,
    pub batch_timeout_secs: u64,
    pub lint_program: String,
    pub agent_program: String,
    pub agent_args: Vec<String>,
    /// Findings listed per rule in the review prompt
    pub max_findings_in_prompt: usize,
    /// Target branch of the pull request
    pub base_branch: String,
    pub remote: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("tmp"),
            rules_repo: PathBuf::from("."),
            styles_root: PathBuf::from(".vale/styles"),
            fixtures_root: PathBuf::from(".vale/fixtures"),
            namespace: "RedHat".to_string(),
            jobs: None,
            file_types: vec!["adoc".to_string()],
            batch_timeout_secs: 600,
            lint_program: "vale".to_string(),
            agent_program: "claude".to_string(),
            agent_args: vec![
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
                "--tools".to_string(),
                "Edit,Write,Read,Grep,Glob".to_string(),
            ],
            max_findings_in_prompt: 20,
            base_branch: "main".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Config {
    /// Load config from an explicit path, or from `rulemend.toml` if present.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file silently yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::config(format!("{} ({})", e, path.display())))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() || self.namespace.contains('.') {
            return Err(Error::config(format!(
                "namespace '{}' must be a non-empty name without dots",
                self.namespace
            )));
        }
        if self.file_types.iter().all(|ext| ext.trim().is_empty()) {
            return Err(Error::config("file_types must list at least one extension"));
        }
        if self.jobs == Some(0) {
            return Err(Error::config("jobs must be at least 1"));
        }
        if self.batch_timeout_secs == 0 {
            return Err(Error::config("batch_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_DEFAULT_JOBS)
        })
    }

    /// Rule definitions for the reviewed namespace, e.g. `.vale/styles/RedHat`.
    pub fn rules_dir(&self) -> PathBuf {
        self.styles_root.join(&self.namespace)
    }

    /// Fixture directories for the reviewed namespace.
    pub fn namespace_fixtures_dir(&self) -> PathBuf {
        self.fixtures_root.join(&self.namespace)
    }
}

/// Parse a comma-separated extension list such as `adoc, .md`.
pub fn parse_file_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_string())
        .filter(|ext| !ext.is_empty())
        .collect()
}
