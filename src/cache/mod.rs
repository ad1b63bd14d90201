//! Scratch-directory artifacts for one corpus
//!
//! Holds the merged raw lint output, the deduplicated findings that act as
//! the resume cache, and the generated engine config. Everything is keyed by
//! the corpus name, so runs over different corpora share a scratch dir.

use crate::error::{Error, Result};
use crate::lint::dedup::RuleRecords;
use crate::lint::{parse_engine_output, DiagnosticMap};
use crate::review::RepairOutcome;
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

const LOCK_FILE: &str = ".rulemend.lock";

pub struct ArtifactStore {
    dir: PathBuf,
    corpus: String,
}

/// Exclusive hold on the scratch directory for the length of a run.
pub struct RunLock {
    file: std::fs::File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, corpus: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            corpus: corpus.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure the scratch directory exists
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            debug!("Created scratch directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Take the scratch-dir lock without waiting.
    ///
    /// Another run holding it means the two would trample each other's
    /// batch lists and artifacts, so that is reported as an error.
    pub fn lock(&self) -> Result<RunLock> {
        self.ensure_dir()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(RunLock { file }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(Error::config(format!(
                "Another run is using scratch directory {}",
                self.dir.display()
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Merged raw diagnostics, e.g. `tmp/vale-openshift-docs.json`
    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(format!("vale-{}.json", self.corpus))
    }

    /// Deduplicated findings, e.g. `tmp/vale-openshift-docs-deduplicated.json`
    pub fn dedup_path(&self) -> PathBuf {
        self.dir
            .join(format!("vale-{}-deduplicated.json", self.corpus))
    }

    /// Per-rule review outcomes of the latest run
    pub fn review_path(&self) -> PathBuf {
        self.dir.join(format!("vale-{}-review.json", self.corpus))
    }

    /// Generated engine config restricted to one style namespace
    pub fn engine_config_path(&self, namespace: &str) -> PathBuf {
        self.dir
            .join(format!("vale-{}-only.ini", namespace.to_lowercase()))
    }

    pub fn save_raw(&self, merged: &DiagnosticMap) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.raw_path();
        write_atomic(&path, &serde_json::to_string_pretty(merged)?)?;
        Ok(path)
    }

    /// Re-read the merged raw diagnostics.
    ///
    /// An engine error payload or corrupt JSON here is an engine error; there
    /// is no batch left to blame it on.
    pub fn load_raw(&self) -> Result<DiagnosticMap> {
        let path = self.raw_path();
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            error!("Lint output is empty. No errors to process.");
            return Ok(DiagnosticMap::new());
        }
        parse_engine_output(&content)
    }

    pub fn has_dedup(&self) -> bool {
        self.dedup_path().is_file()
    }

    pub fn save_dedup(&self, records: &RuleRecords) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dedup_path();
        write_atomic(&path, &serde_json::to_string_pretty(records)?)?;
        Ok(path)
    }

    pub fn load_dedup(&self) -> Result<RuleRecords> {
        let content = fs::read_to_string(self.dedup_path())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_review(&self, outcomes: &[RepairOutcome]) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.review_path();
        write_atomic(&path, &serde_json::to_string_pretty(outcomes)?)?;
        Ok(path)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
