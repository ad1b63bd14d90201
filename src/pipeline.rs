//! Pipeline controller
//!
//! Init → Acquired → (Linted) → Deduped → Reviewed → Published, with an early
//! exit to Done when linting finds nothing. Any stage-boundary error ends the
//! run; clones, artifacts and branches are left where they are.

use crate::cache::ArtifactStore;
use crate::config::Config;
use crate::corpus::{self, WorkingCopy};
use crate::error::{Error, Result};
use crate::lint::dedup::{deduplicate, finding_count, RuleRecords};
use crate::lint::engine::{write_engine_config, LintEngine};
use crate::lint::runner::BatchLintRunner;
use crate::lint::diagnostic_count;
use crate::publish::{ProposalHost, PublishReport, Publisher};
use crate::review::agent::ReviewAgent;
use crate::review::{RepairLoop, RuleLayout};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Acquired,
    Linted,
    Deduped,
    Reviewed,
    Published,
    /// Nothing to review
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Acquired => "acquired",
            Stage::Linted => "linted",
            Stage::Deduped => "deduped",
            Stage::Reviewed => "reviewed",
            Stage::Published => "published",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Repository URL or local path of the documentation corpus
    pub reference: String,
    /// Lint again even when deduplicated results are cached
    pub force_lint: bool,
    /// Discard an existing clone
    pub force_clone: bool,
    pub publish: bool,
}

/// The external systems a run talks to.
pub struct Collaborators {
    pub engine: Arc<dyn LintEngine>,
    pub agent: Box<dyn ReviewAgent>,
    pub host: Box<dyn ProposalHost>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub corpus: String,
    pub stage: Stage,
    pub unique_findings: usize,
    pub rules_reviewed: usize,
    pub rules_modified: usize,
    pub rules_skipped: usize,
    pub proposal_url: Option<String>,
}

impl RunSummary {
    fn new(corpus: &str) -> Self {
        Self {
            corpus: corpus.to_string(),
            stage: Stage::Init,
            unique_findings: 0,
            rules_reviewed: 0,
            rules_modified: 0,
            rules_skipped: 0,
            proposal_url: None,
        }
    }
}

pub struct Pipeline {
    config: Config,
    collaborators: Collaborators,
}

impl Pipeline {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        self.execute(options).inspect_err(|err| error!("{}", err))
    }

    fn execute(&self, options: &RunOptions) -> Result<RunSummary> {
        let name = corpus::corpus_name(&options.reference);
        let store = ArtifactStore::new(&self.config.scratch_dir, &name);
        let _lock = store.lock()?;
        let mut summary = RunSummary::new(&name);

        let copy = corpus::acquire(
            &options.reference,
            &self.config.scratch_dir,
            !options.force_clone,
        )?;
        summary.stage = Stage::Acquired;

        let records = if store.has_dedup() && !options.force_lint {
            info!(
                "Found existing deduplicated results: {}",
                store.dedup_path().display()
            );
            info!("Skipping lint run. Use --force-vale to run Vale again.");
            store.load_dedup()?
        } else {
            if store.has_dedup() {
                info!("Forcing new lint run (--force-vale specified)");
            }
            let records = self.lint(&copy, &store)?;
            summary.stage = Stage::Linted;
            store.save_dedup(&records)?;
            info!(
                "Saved deduplicated results to: {}",
                store.dedup_path().display()
            );
            records
        };
        summary.stage = Stage::Deduped;
        summary.unique_findings = finding_count(&records);

        if summary.unique_findings == 0 {
            info!("No errors found. Nothing to review.");
            summary.stage = Stage::Done;
            return Ok(summary);
        }

        let layout = RuleLayout::new(
            &self.config.rules_repo,
            &self.config.styles_root,
            &self.config.fixtures_root,
            &self.config.namespace,
        );
        let repair = RepairLoop::new(
            layout,
            self.collaborators.agent.as_ref(),
            self.config.max_findings_in_prompt,
        );
        let review = repair.review_all(&records);
        summary.rules_reviewed = review.outcomes.len();
        summary.rules_modified = review.modified_count();
        summary.rules_skipped = review.skipped.len();
        store.save_review(&review.outcomes)?;
        summary.stage = Stage::Reviewed;

        if !options.publish {
            info!("Skipping pull request (--no-publish)");
            return Ok(summary);
        }

        let publisher = Publisher::new(
            &self.config.rules_repo,
            &self.config.namespace,
            self.config.rules_dir(),
            self.config.namespace_fixtures_dir(),
            &self.config.remote,
            &self.config.base_branch,
            self.collaborators.host.as_ref(),
        );
        if let PublishReport::Published { url, .. } = publisher.publish(&copy.name)? {
            info!("Pull request: {}", url);
            summary.proposal_url = Some(url);
        }
        summary.stage = Stage::Published;
        Ok(summary)
    }

    /// Lint the working copy and deduplicate, persisting the merged raw output.
    fn lint(&self, copy: &WorkingCopy, store: &ArtifactStore) -> Result<RuleRecords> {
        let docs = corpus::find_documents(&copy.path, &self.config.file_types);
        info!(
            "Found {} files with extensions {}",
            docs.len(),
            self.config.file_types.join(", ")
        );
        info!("Repository size: {}", corpus::repo_size(&copy.path));

        let styles = self.config.rules_repo.join(&self.config.styles_root);
        let styles = styles.canonicalize().map_err(|e| {
            Error::config(format!(
                "Styles directory {} is not usable: {}",
                styles.display(),
                e
            ))
        })?;
        let engine_config = write_engine_config(
            &store.engine_config_path(&self.config.namespace),
            &styles,
            &self.config.namespace,
        )?;

        let runner = BatchLintRunner::new(
            self.config.worker_count(),
            Duration::from_secs(self.config.batch_timeout_secs),
            store.dir(),
        );
        let merged = runner.run(
            &copy.path,
            &docs,
            Arc::clone(&self.collaborators.engine),
            &engine_config,
        )?;
        let raw = store.save_raw(&merged)?;
        info!("Merged lint results saved to: {}", raw.display());

        let merged = store.load_raw()?;
        info!("Parsing and deduplicating errors...");
        let records = deduplicate(&merged);
        info!("Total errors: {}", diagnostic_count(&merged));
        info!("Unique errors: {}", finding_count(&records));
        info!("Rules with errors: {}", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_ops::test_support::{git, rules_repo};
    use crate::lint::{Diagnostic, DiagnosticMap};
    use crate::lint::dedup::CanonicalFinding;
    use crate::review::agent::AgentReply;
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Flags every file with the same TermsErrors finding.
    struct EchoEngine;

    impl LintEngine for EchoEngine {
        fn check(&self, _config: &Path, files: &[PathBuf], _timeout: Duration) -> Result<DiagnosticMap> {
            Ok(files
                .iter()
                .map(|file| {
                    (
                        file.display().to_string(),
                        vec![Diagnostic {
                            check: "RedHat.TermsErrors".to_string(),
                            message: "Use 'OpenShift' rather than 'Openshift'.".to_string(),
                            matched_text: "Openshift".to_string(),
                            severity: "error".to_string(),
                            line: 1,
                            ..Default::default()
                        }],
                    )
                })
                .collect())
        }
    }

    struct SilentEngine;

    impl LintEngine for SilentEngine {
        fn check(&self, _config: &Path, _files: &[PathBuf], _timeout: Duration) -> Result<DiagnosticMap> {
            Ok(DiagnosticMap::new())
        }
    }

    /// Reports nothing and counts how often it was asked.
    struct CountingEngine {
        calls: Arc<AtomicUsize>,
    }

    impl LintEngine for CountingEngine {
        fn check(&self, _config: &Path, _files: &[PathBuf], _timeout: Duration) -> Result<DiagnosticMap> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DiagnosticMap::new())
        }
    }

    struct UnreachableEngine;

    impl LintEngine for UnreachableEngine {
        fn check(&self, _config: &Path, _files: &[PathBuf], _timeout: Duration) -> Result<DiagnosticMap> {
            panic!("lint must not run when results are cached");
        }
    }

    /// Records prompts and optionally rewrites the rule file.
    struct EditingAgent {
        rule_file: Option<PathBuf>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl ReviewAgent for EditingAgent {
        fn review(&self, prompt: &str) -> Result<AgentReply> {
            self.prompts.borrow_mut().push(prompt.to_string());
            if let Some(rule_file) = &self.rule_file {
                fs::write(rule_file, "extends: substitution\nswap:\n  '(?<!Red Hat )Openshift': OpenShift\n")
                    .unwrap();
            }
            Ok(AgentReply {
                exit_code: Some(0),
                transcript: "Narrowed the swap pattern.".to_string(),
                stderr: String::new(),
            })
        }
    }

    struct UnreachableAgent;

    impl ReviewAgent for UnreachableAgent {
        fn review(&self, _prompt: &str) -> Result<AgentReply> {
            panic!("agent must not be called");
        }
    }

    struct RecordingHost {
        heads: Rc<RefCell<Vec<String>>>,
    }

    impl ProposalHost for RecordingHost {
        fn open_proposal(&self, _base: &str, head: &str, _title: &str, _body: &str) -> anyhow::Result<String> {
            self.heads.borrow_mut().push(head.to_string());
            Ok("https://github.com/org/rules/pull/1".to_string())
        }
    }

    struct UnreachableHost;

    impl ProposalHost for UnreachableHost {
        fn open_proposal(&self, _base: &str, _head: &str, _title: &str, _body: &str) -> anyhow::Result<String> {
            panic!("host must not be called");
        }
    }

    /// A committed documentation repo with two pages and a stray engine config.
    fn docs_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-b", "main"]);
        git(root, &["config", "user.email", "docs@example.com"]);
        git(root, &["config", "user.name", "Docs"]);
        fs::write(root.join("install.adoc"), "Install Openshift.\n").unwrap();
        fs::write(root.join("upgrade.adoc"), "Upgrade Openshift.\n").unwrap();
        fs::write(root.join(".vale.ini"), "StylesPath = styles\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "docs"]);
        dir
    }

    fn config(rules: &Path, scratch: &Path) -> Config {
        Config {
            scratch_dir: scratch.to_path_buf(),
            rules_repo: rules.to_path_buf(),
            jobs: Some(2),
            ..Config::default()
        }
    }

    fn options(reference: &Path, publish: bool) -> RunOptions {
        RunOptions {
            reference: reference.display().to_string(),
            force_lint: false,
            force_clone: false,
            publish,
        }
    }

    #[test]
    fn test_empty_findings_stop_before_review() {
        let rules = rules_repo();
        let docs = docs_repo();
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(rules.path(), scratch.path()),
            Collaborators {
                engine: Arc::new(SilentEngine),
                agent: Box::new(UnreachableAgent),
                host: Box::new(UnreachableHost),
            },
        );

        let summary = pipeline.run(&options(docs.path(), true)).unwrap();
        assert_eq!(summary.stage, Stage::Done);
        assert_eq!(summary.unique_findings, 0);
        assert_eq!(summary.rules_reviewed, 0);

        let store = ArtifactStore::new(scratch.path(), &summary.corpus);
        assert!(store.has_dedup());
        assert!(store.raw_path().is_file());
        assert!(store.engine_config_path("RedHat").is_file());
    }

    #[test]
    fn test_full_run_lints_reviews_and_publishes() {
        let rules = rules_repo();
        let remote = tempfile::tempdir().unwrap();
        git(remote.path(), &["init", "--bare"]);
        git(
            rules.path(),
            &["remote", "add", "origin", &remote.path().to_string_lossy()],
        );
        let docs = docs_repo();
        let scratch = tempfile::tempdir().unwrap();
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let heads = Rc::new(RefCell::new(Vec::new()));
        let pipeline = Pipeline::new(
            config(rules.path(), scratch.path()),
            Collaborators {
                engine: Arc::new(EchoEngine),
                agent: Box::new(EditingAgent {
                    rule_file: Some(rules.path().join(".vale/styles/RedHat/TermsErrors.yml")),
                    prompts: Rc::clone(&prompts),
                }),
                host: Box::new(RecordingHost {
                    heads: Rc::clone(&heads),
                }),
            },
        );

        let summary = pipeline.run(&options(docs.path(), true)).unwrap();
        let branch = format!("vale-rule-improvements-{}", summary.corpus);
        assert_eq!(summary.stage, Stage::Published);
        // Both pages share one (check, message, match, severity) key.
        assert_eq!(summary.unique_findings, 1);
        assert_eq!(summary.rules_reviewed, 1);
        assert_eq!(summary.rules_modified, 1);
        assert_eq!(
            summary.proposal_url.as_deref(),
            Some("https://github.com/org/rules/pull/1")
        );
        assert_eq!(prompts.borrow().len(), 1);
        assert!(prompts.borrow()[0].contains("Rule: RedHat.TermsErrors"));
        assert_eq!(*heads.borrow(), vec![branch.clone()]);

        let copy = scratch.path().join(&summary.corpus);
        assert!(copy.join(".vale.ini").is_file());
        assert!(ArtifactStore::new(scratch.path(), &summary.corpus)
            .review_path()
            .is_file());
        git(remote.path(), &["rev-parse", "--verify", &format!("refs/heads/{}", branch)]);
    }

    #[test]
    fn test_cached_results_skip_lint() {
        let rules = rules_repo();
        let docs = docs_repo();
        let scratch = tempfile::tempdir().unwrap();
        let corpus = corpus::corpus_name(&docs.path().display().to_string());
        ArtifactStore::new(scratch.path(), &corpus)
            .save_dedup(&RuleRecords::from([(
                "RedHat.TermsErrors".to_string(),
                vec![CanonicalFinding {
                    message: "Use 'OpenShift' rather than 'Openshift'.".to_string(),
                    matched_text: "Openshift".to_string(),
                    severity: "error".to_string(),
                    link: String::new(),
                    example_file: "install.adoc".to_string(),
                    line: 1,
                }],
            )]))
            .unwrap();

        let prompts = Rc::new(RefCell::new(Vec::new()));
        let pipeline = Pipeline::new(
            config(rules.path(), scratch.path()),
            Collaborators {
                engine: Arc::new(UnreachableEngine),
                agent: Box::new(EditingAgent {
                    rule_file: None,
                    prompts: Rc::clone(&prompts),
                }),
                host: Box::new(UnreachableHost),
            },
        );

        let summary = pipeline.run(&options(docs.path(), false)).unwrap();
        assert_eq!(summary.stage, Stage::Reviewed);
        assert_eq!(summary.rules_reviewed, 1);
        assert_eq!(summary.rules_modified, 0);
        assert_eq!(prompts.borrow().len(), 1);
    }

    #[test]
    fn test_force_lint_ignores_cached_results() {
        let rules = rules_repo();
        let docs = docs_repo();
        let scratch = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            config(rules.path(), scratch.path()),
            Collaborators {
                engine: Arc::new(CountingEngine {
                    calls: Arc::clone(&calls),
                }),
                agent: Box::new(UnreachableAgent),
                host: Box::new(UnreachableHost),
            },
        );

        let first = pipeline.run(&options(docs.path(), false)).unwrap();
        assert_eq!(first.stage, Stage::Done);
        let linted = calls.load(Ordering::SeqCst);
        assert!(linted > 0);

        pipeline.run(&options(docs.path(), false)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), linted);

        let forced = RunOptions {
            force_lint: true,
            ..options(docs.path(), false)
        };
        let summary = pipeline.run(&forced).unwrap();
        assert_eq!(summary.stage, Stage::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 2 * linted);
    }

    #[test]
    fn test_unchanged_rules_publish_nothing() {
        let rules = rules_repo();
        let docs = docs_repo();
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(rules.path(), scratch.path()),
            Collaborators {
                engine: Arc::new(EchoEngine),
                agent: Box::new(EditingAgent {
                    rule_file: None,
                    prompts: Rc::new(RefCell::new(Vec::new())),
                }),
                host: Box::new(UnreachableHost),
            },
        );

        let summary = pipeline.run(&options(docs.path(), true)).unwrap();
        assert_eq!(summary.stage, Stage::Published);
        assert_eq!(summary.proposal_url, None);
        assert_eq!(
            crate::git_ops::current_branch(rules.path()).unwrap(),
            "main"
        );
    }

    #[test]
    fn test_acquisition_failure_ends_the_run() {
        let rules = rules_repo();
        let scratch = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(rules.path(), scratch.path()),
            Collaborators {
                engine: Arc::new(UnreachableEngine),
                agent: Box::new(UnreachableAgent),
                host: Box::new(UnreachableHost),
            },
        );
        let missing = elsewhere.path().join("no-such-docs");
        let err = pipeline.run(&options(&missing, true)).unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Published.to_string(), "published");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}
