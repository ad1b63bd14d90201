use anyhow::{Context, Result};
use clap::Parser;
use rulemend::config::{parse_file_types, Config};
use rulemend::github::GitHubHost;
use rulemend::lint::engine::ValeCli;
use rulemend::pipeline::{Collaborators, Pipeline, RunOptions, RunSummary, Stage};
use rulemend::review::agent::CliAgent;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rulemend",
    about = "Find false positives in Vale rules against a real documentation corpus and propose fixes",
    version
)]
struct Args {
    /// Repository URL or local path of the documentation to lint
    repo: String,

    /// Parallel lint workers (default: min(16, CPU count))
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Comma-separated file extensions to lint, e.g. "adoc,md"
    #[arg(short = 't', long)]
    file_types: Option<String>,

    /// Run Vale again even if deduplicated results exist
    #[arg(long)]
    force_vale: bool,

    /// Re-clone the repository even if a clone exists
    #[arg(long)]
    force_clone: bool,

    /// Review rules but do not create a branch or pull request
    #[arg(long)]
    no_publish: bool,

    /// Per-batch lint timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file (default: ./rulemend.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(jobs) = args.jobs {
        anyhow::ensure!(jobs > 0, "--jobs must be at least 1");
        config.jobs = Some(jobs);
    }
    if let Some(raw) = &args.file_types {
        let file_types = parse_file_types(raw);
        anyhow::ensure!(!file_types.is_empty(), "--file-types lists no extensions");
        config.file_types = file_types;
    }
    if let Some(timeout) = args.timeout {
        anyhow::ensure!(timeout > 0, "--timeout must be at least 1 second");
        config.batch_timeout_secs = timeout;
    }
    Ok(config)
}

/// Closing lines for a finished run, or `None` when it failed.
///
/// Pipeline failures are already logged by the pipeline itself.
fn final_report(outcome: &rulemend::error::Result<RunSummary>) -> Option<String> {
    let summary = outcome.as_ref().ok()?;
    let mut report = match summary.stage {
        Stage::Done => format!("{}: no findings, nothing to review", summary.corpus),
        _ => format!(
            "{}: {} unique findings, {}/{} rules modified, {} skipped (stage: {})",
            summary.corpus,
            summary.unique_findings,
            summary.rules_modified,
            summary.rules_reviewed,
            summary.rules_skipped,
            summary.stage
        ),
    };
    if let Some(url) = &summary.proposal_url {
        report.push_str(&format!("\nPull request: {}", url));
    }
    Some(report)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = load_config(&args)?;
    let collaborators = Collaborators {
        engine: Arc::new(ValeCli::new(&config.lint_program)),
        agent: Box::new(CliAgent::new(
            &config.agent_program,
            config.agent_args.clone(),
            &config.rules_repo,
        )),
        host: Box::new(GitHubHost::new(&config.rules_repo, &config.remote)),
    };
    let options = RunOptions {
        reference: args.repo.clone(),
        force_lint: args.force_vale,
        force_clone: args.force_clone,
        publish: !args.no_publish,
    };

    let outcome = Pipeline::new(config, collaborators).run(&options);
    match final_report(&outcome) {
        Some(report) => {
            println!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulemend::error::Error;

    fn summary(stage: Stage) -> RunSummary {
        RunSummary {
            corpus: "openshift-docs".to_string(),
            stage,
            unique_findings: 12,
            rules_reviewed: 4,
            rules_modified: 1,
            rules_skipped: 0,
            proposal_url: None,
        }
    }

    #[test]
    fn test_failed_run_prints_nothing_more() {
        let outcome = Err(Error::acquisition("git clone failed"));
        assert_eq!(final_report(&outcome), None);
    }

    #[test]
    fn test_report_without_findings() {
        let outcome = Ok(RunSummary {
            unique_findings: 0,
            rules_reviewed: 0,
            rules_modified: 0,
            ..summary(Stage::Done)
        });
        assert_eq!(
            final_report(&outcome).as_deref(),
            Some("openshift-docs: no findings, nothing to review")
        );
    }

    #[test]
    fn test_report_with_pull_request() {
        let outcome = Ok(RunSummary {
            proposal_url: Some("https://github.com/org/rules/pull/7".to_string()),
            ..summary(Stage::Published)
        });
        let report = final_report(&outcome).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            lines,
            vec![
                "openshift-docs: 12 unique findings, 1/4 rules modified, 0 skipped (stage: published)",
                "Pull request: https://github.com/org/rules/pull/7",
            ]
        );
    }
}
