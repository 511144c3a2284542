//! Main runner: pre statements, every file in order, post statements

use std::time::{Duration, Instant};

use graphingest_core::{GraphStore, ProgressContext, fmt_num};

use crate::config::IngestConfig;
use crate::dispatch::DispatchSettings;
use crate::error::IngestError;
use crate::statements::{Phase, StatementRunner};
use crate::worker;

/// Run execution summary
#[derive(Debug, Default)]
pub struct Summary {
    pub total_files: usize,
    pub completed_files: usize,
    /// Files that stopped early or finished with failed batches
    pub failed_files: usize,
    /// Files marked `skip_file` or with an unsupported format/codec
    pub skipped_files: usize,
    pub total_batches: usize,
    pub total_records: u64,
    pub failed_batches: usize,
    pub elapsed: Duration,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed_files == 0
    }

    pub fn log(&self) {
        log::info!("=== Ingest Summary ===");
        log::info!(
            "Files: {}/{} completed ({} failed, {} skipped)",
            self.completed_files,
            self.total_files,
            self.failed_files,
            self.skipped_files
        );
        log::info!(
            "Batches: {} written, {} failed",
            fmt_num(self.total_batches as u64),
            self.failed_batches
        );
        log::info!("Records: {}", fmt_num(self.total_records));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.total_records > 0 && !self.elapsed.is_zero() {
            let rate = self.total_records as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {rate:.0} records/sec");
        }
    }
}

/// Run a whole ingest against `store`.
///
/// Pre/post statement failures are returned as errors. Per-file failures are
/// logged and counted in the summary; the remaining files still run.
pub fn run<G: GraphStore>(
    config: &IngestConfig,
    store: &G,
    progress: &ProgressContext,
) -> Result<Summary, IngestError> {
    let start = Instant::now();
    let statements = StatementRunner::new(store);
    statements.run(Phase::Pre, &config.pre_ingest)?;

    let settings = DispatchSettings {
        policy: config.write_policy(),
        on_failure: config.on_batch_failure,
    };
    let mut summary = Summary {
        total_files: config.files.len(),
        ..Default::default()
    };

    for job in config.jobs() {
        let job = match job {
            Ok(job) => job,
            Err(e) if e.is_skip() => {
                log::warn!("{e}; skipping file");
                summary.skipped_files += 1;
                continue;
            }
            Err(e) => {
                log::error!("{e}");
                summary.failed_files += 1;
                continue;
            }
        };
        if job.skip {
            log::info!("{}: skip_file set, skipping", job.url);
            summary.skipped_files += 1;
            continue;
        }

        let pb = progress.file_line(&job.url);
        match worker::process_file(store, &job, &settings, &pb) {
            Ok(report) => {
                summary.total_batches += report.batches;
                summary.total_records += report.records;
                summary.failed_batches += report.failed_batches.len();
                if let Some(e) = &report.error {
                    log::error!("{e}");
                }
                if report.is_complete() {
                    summary.completed_files += 1;
                } else {
                    summary.failed_files += 1;
                }
            }
            Err(e) if e.is_skip() => {
                log::warn!("{e}; skipping file");
                summary.skipped_files += 1;
            }
            Err(e) => {
                log::error!("{e}");
                summary.failed_files += 1;
            }
        }
        pb.finish_and_clear();
    }

    statements.run(Phase::Post, &config.post_ingest)?;

    summary.elapsed = start.elapsed();
    summary.log();
    Ok(summary)
}
