//! Batched parallel lint execution
//!
//! The corpus is cut into contiguous batches, one per worker. Each worker
//! drives its own engine process and reports back over a channel; the
//! calling thread is the only place progress and results are accumulated.

use super::engine::{HiddenConfigs, LintEngine};
use super::{diagnostic_count, merge_into, DiagnosticMap};
use crate::error::{Error, Result};
use crate::util::format_minutes;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Split `items` into contiguous batches so that the batch count is about `workers`.
///
/// Batch size is `max(1, len / workers)`, so a remainder produces one extra
/// short batch at the end.
pub fn partition<T>(items: &[T], workers: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    let batch_size = (items.len() / workers.max(1)).max(1);
    items.chunks(batch_size).collect()
}

/// What a worker sends back when its batch is done.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: usize,
    pub file_count: usize,
    pub elapsed: Duration,
    pub outcome: Result<DiagnosticMap>,
}

/// Running completion/ETA bookkeeping, owned by the collecting thread.
#[derive(Debug, Default)]
struct Progress {
    total: usize,
    completed: usize,
    busy_time: Duration,
}

impl Progress {
    fn record(&mut self, elapsed: Duration) {
        self.completed += 1;
        self.busy_time += elapsed;
    }

    fn average_secs(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.busy_time.as_secs_f64() / self.completed as f64
    }

    fn eta_secs(&self) -> f64 {
        self.average_secs() * self.total.saturating_sub(self.completed) as f64
    }

    fn line(&self) -> String {
        let percent = if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        };
        let eta = self.eta_secs();
        let eta = if eta > 0.0 {
            format_minutes(eta)
        } else {
            "calculating...".to_string()
        };
        format!(
            "Progress: {}/{} batches ({:.1}%) | Avg: {:.1}s/batch | ETA: {}",
            self.completed,
            self.total,
            percent,
            self.average_secs(),
            eta
        )
    }
}

#[derive(Debug, Clone)]
pub struct BatchLintRunner {
    pub workers: usize,
    pub batch_timeout: Duration,
    /// Where per-batch file lists are written
    pub scratch_dir: PathBuf,
    pub poll_interval: Duration,
}

impl BatchLintRunner {
    pub fn new(workers: usize, batch_timeout: Duration, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers: workers.max(1),
            batch_timeout,
            scratch_dir: scratch_dir.into(),
            poll_interval: PROGRESS_POLL_INTERVAL,
        }
    }

    /// Where batch `batch_id` records its file list while it runs.
    ///
    /// The engine receives the files as arguments. The list only lets an
    /// operator see what a slow or stuck batch is working on, and it is removed
    /// once the batch finishes.
    pub fn batch_list_path(&self, batch_id: usize) -> PathBuf {
        self.scratch_dir
            .join(format!("vale-files-batch-{}.txt", batch_id))
    }

    /// Lint `files` (all under `root`) and return the merged diagnostics.
    ///
    /// Engine configs inside `root` are hidden for the duration of the run.
    /// A batch that fails or times out contributes nothing; the run as a
    /// whole only fails when the worker pool cannot be set up.
    pub fn run(
        &self,
        root: &Path,
        files: &[PathBuf],
        engine: Arc<dyn LintEngine>,
        engine_config: &Path,
    ) -> Result<DiagnosticMap> {
        let _hidden = HiddenConfigs::hide(root)?;

        if files.is_empty() {
            error!("No documentation files found");
            return Ok(DiagnosticMap::new());
        }

        let batches = partition(files, self.workers);
        info!(
            "Processing {} files in {} batches with {} workers...",
            files.len(),
            batches.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("lint-worker-{}", i))
            .build()
            .map_err(|e| Error::engine(format!("Failed to start lint workers: {}", e)))?;

        let started = Instant::now();
        let (tx, rx) = mpsc::channel::<BatchReport>();
        for (batch_id, batch) in batches.iter().enumerate() {
            let batch = batch.to_vec();
            let tx = tx.clone();
            let engine = Arc::clone(&engine);
            let config = engine_config.to_path_buf();
            let list_path = self.batch_list_path(batch_id);
            let timeout = self.batch_timeout;
            pool.spawn(move || {
                let report = run_batch(engine.as_ref(), &config, batch_id, &batch, &list_path, timeout);
                let _ = tx.send(report);
            });
        }
        drop(tx);

        let mut merged = DiagnosticMap::new();
        let mut progress = Progress {
            total: batches.len(),
            ..Default::default()
        };
        let mut last_logged = 0;
        while progress.completed < progress.total {
            match rx.recv_timeout(self.poll_interval) {
                Ok(report) => {
                    progress.record(report.elapsed);
                    collect(&mut merged, report);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    error!(
                        "Lint workers exited with {} batches unreported",
                        progress.total - progress.completed
                    );
                    break;
                }
            }
            if progress.completed > last_logged {
                info!("{}", progress.line());
                last_logged = progress.completed;
            }
        }

        info!("Total files with errors: {}", merged.len());
        info!(
            "Total processing time: {}",
            format_minutes(started.elapsed().as_secs_f64())
        );
        Ok(merged)
    }
}

fn collect(merged: &mut DiagnosticMap, report: BatchReport) {
    match report.outcome {
        Ok(diagnostics) => {
            info!(
                "Batch {}: Completed in {:.1}s, found {} files with errors ({} diagnostics)",
                report.batch_id,
                report.elapsed.as_secs_f64(),
                diagnostics.len(),
                diagnostic_count(&diagnostics)
            );
            merge_into(merged, diagnostics);
        }
        Err(err) => {
            error!(
                "Batch {}: {} files skipped: {}",
                report.batch_id, report.file_count, err
            );
        }
    }
}

fn run_batch(
    engine: &dyn LintEngine,
    config: &Path,
    batch_id: usize,
    batch: &[PathBuf],
    list_path: &Path,
    timeout: Duration,
) -> BatchReport {
    let start = Instant::now();
    info!("Processing batch {} ({} files)...", batch_id, batch.len());

    let listing: String = batch
        .iter()
        .map(|path| format!("{}\n", path.display()))
        .collect();
    if let Err(err) = fs::write(list_path, listing) {
        error!(
            "Batch {}: could not write file list {}: {}",
            batch_id,
            list_path.display(),
            err
        );
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| engine.check(config, batch, timeout)))
        .unwrap_or_else(|_| Err(Error::engine("lint worker panicked")));

    if list_path.exists() {
        let _ = fs::remove_file(list_path);
    }

    BatchReport {
        batch_id,
        file_count: batch.len(),
        elapsed: start.elapsed(),
        outcome,
    }
}
