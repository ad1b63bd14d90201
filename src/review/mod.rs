//! Rule repair loop
//!
//! For each rule with findings: resolve its files, ask the agent to review
//! them, then check the working tree to see whether anything really changed.
//! One rule failing never stops the others.

pub mod agent;
pub mod prompt;

use crate::error::{Error, Result};
use crate::git_ops;
use crate::lint::dedup::{CanonicalFinding, RuleRecords};
use agent::ReviewAgent;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{error, info, warn};

static RULE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<ns>[A-Za-z0-9_-]+)\.(?P<name>[A-Za-z0-9_-]+)$")
        .expect("valid rule id regex")
});

const INVALID_FIXTURE: &str = "testinvalid.adoc";
const VALID_FIXTURE: &str = "testvalid.adoc";

/// Where rule definitions and fixtures live inside the rules repository.
#[derive(Debug, Clone)]
pub struct RuleLayout {
    /// Root of the git repository holding the rules
    pub repo_root: PathBuf,
    /// Relative to `repo_root`
    pub styles_root: PathBuf,
    /// Relative to `repo_root`
    pub fixtures_root: PathBuf,
    pub namespace: String,
}

/// The files one rule owns, relative to the rules repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTarget {
    pub rule_id: String,
    pub rule_file: PathBuf,
    pub fixture_dir: PathBuf,
    pub invalid_fixture: PathBuf,
    pub valid_fixture: PathBuf,
}

impl RuleTarget {
    /// The paths whose status decides whether the rule was modified.
    pub fn verified_paths(&self) -> [&Path; 3] {
        [
            self.rule_file.as_path(),
            self.invalid_fixture.as_path(),
            self.valid_fixture.as_path(),
        ]
    }
}

impl RuleLayout {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        styles_root: impl Into<PathBuf>,
        fixtures_root: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            styles_root: styles_root.into(),
            fixtures_root: fixtures_root.into(),
            namespace: namespace.into(),
        }
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.styles_root.join(&self.namespace)
    }

    pub fn fixtures_dir(&self) -> PathBuf {
        self.fixtures_root.join(&self.namespace)
    }

    /// Map `Namespace.Rule` to its files by naming convention. Does not touch disk.
    pub fn target(&self, rule_id: &str) -> Result<RuleTarget> {
        let caps = RULE_ID
            .captures(rule_id)
            .ok_or_else(|| Error::resolution(rule_id, "not a <Namespace>.<Rule> id"))?;
        if &caps["ns"] != self.namespace {
            return Err(Error::resolution(
                rule_id,
                format!("outside the {} namespace", self.namespace),
            ));
        }
        let name = &caps["name"];
        let fixture_dir = self.fixtures_dir().join(name);
        Ok(RuleTarget {
            rule_id: rule_id.to_string(),
            rule_file: self.rules_dir().join(format!("{}.yml", name)),
            invalid_fixture: fixture_dir.join(INVALID_FIXTURE),
            valid_fixture: fixture_dir.join(VALID_FIXTURE),
            fixture_dir,
        })
    }

    /// Like [`RuleLayout::target`], but the rule file must exist.
    pub fn resolve(&self, rule_id: &str) -> Result<RuleTarget> {
        let target = self.target(rule_id)?;
        if !self.repo_root.join(&target.rule_file).is_file() {
            return Err(Error::resolution(
                rule_id,
                format!("rule file {} not found", target.rule_file.display()),
            ));
        }
        Ok(target)
    }
}

/// Result of reviewing one rule.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub rule_id: String,
    /// Set only when the rule or its fixtures show pending changes afterwards
    pub modified: bool,
    pub exit_code: Option<i32>,
    pub agent_transcript: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ReviewSummary {
    pub outcomes: Vec<RepairOutcome>,
    /// Rules that could not be mapped to a rule file
    pub skipped: Vec<String>,
}

impl ReviewSummary {
    pub fn modified_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.modified).count()
    }
}

pub struct RepairLoop<'a> {
    layout: RuleLayout,
    agent: &'a dyn ReviewAgent,
    max_findings: usize,
}

impl<'a> RepairLoop<'a> {
    pub fn new(layout: RuleLayout, agent: &'a dyn ReviewAgent, max_findings: usize) -> Self {
        Self {
            layout,
            agent,
            max_findings,
        }
    }

    /// Review every rule, in rule-id order, one agent call at a time.
    pub fn review_all(&self, records: &RuleRecords) -> ReviewSummary {
        info!("Starting agent review of {} rules...", records.len());
        let total = records.len();
        let mut summary = ReviewSummary::default();

        for (idx, (rule_id, findings)) in records.iter().enumerate() {
            if findings.is_empty() {
                continue;
            }
            info!(
                "Reviewing rule {}/{}: {} ({} unique errors)",
                idx + 1,
                total,
                rule_id,
                findings.len()
            );
            match self.review_rule(rule_id, findings) {
                Ok(outcome) => {
                    if outcome.modified {
                        info!("Agent modified {} (file changed)", rule_id);
                    } else {
                        info!("No changes made to {}", rule_id);
                    }
                    summary.outcomes.push(outcome);
                }
                Err(err) => {
                    error!("{}", err);
                    summary.skipped.push(rule_id.clone());
                }
            }
        }

        info!(
            "Review complete: {}/{} rules modified",
            summary.modified_count(),
            total
        );
        summary
    }

    /// Review one rule. Only resolution failures are returned as errors.
    pub fn review_rule(&self, rule_id: &str, findings: &[CanonicalFinding]) -> Result<RepairOutcome> {
        let target = self.layout.resolve(rule_id)?;
        let root = &self.layout.repo_root;
        let rule_text = std::fs::read_to_string(root.join(&target.rule_file))?;
        let prompt = prompt::build_review_prompt(&target, root, &rule_text, findings, self.max_findings);

        info!("Asking agent to review {}...", rule_id);
        let reply = match self.agent.review(&prompt) {
            Ok(reply) => reply,
            Err(err) => {
                error!("{}", err);
                return Ok(unmodified(rule_id, None, String::new()));
            }
        };

        if !reply.succeeded() {
            error!(
                "Agent returned non-zero exit code {:?} for {}",
                reply.exit_code, rule_id
            );
            if !reply.stderr.trim().is_empty() {
                error!("Agent error output: {}", reply.stderr.trim());
            }
            return Ok(unmodified(rule_id, reply.exit_code, reply.transcript));
        }
        if reply.transcript.trim().is_empty() {
            error!("No output from agent for {}", rule_id);
            return Ok(unmodified(rule_id, reply.exit_code, reply.transcript));
        }

        print_transcript(rule_id, &reply.transcript);

        let modified = match git_ops::changed_paths(root, &target.verified_paths()) {
            Ok(changed) => !changed.is_empty(),
            Err(err) => {
                warn!("Could not verify changes for {}: {:#}", rule_id, err);
                false
            }
        };

        Ok(RepairOutcome {
            rule_id: rule_id.to_string(),
            modified,
            exit_code: reply.exit_code,
            agent_transcript: reply.transcript,
            reviewed_at: Utc::now(),
        })
    }
}

fn unmodified(rule_id: &str, exit_code: Option<i32>, transcript: String) -> RepairOutcome {
    RepairOutcome {
        rule_id: rule_id.to_string(),
        modified: false,
        exit_code,
        agent_transcript: transcript,
        reviewed_at: Utc::now(),
    }
}

fn print_transcript(rule_id: &str, transcript: &str) {
    let rule = "=".repeat(80);
    println!("{}", rule);
    println!("Agent review for {}:", rule_id);
    println!("{}", rule);
    println!("{}", transcript.trim_end());
    println!("{}", rule);
}
