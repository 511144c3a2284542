//! Ingest of a single file: open, decode, batch, dispatch

use std::time::{Duration, Instant};

use graphingest_core::progress::show_counts;
use graphingest_core::{GraphStore, fmt_num, stream};
use indicatif::ProgressBar;

use crate::batch::Batcher;
use crate::config::FileJob;
use crate::decode::RecordDecoder;
use crate::dispatch::{DispatchCoordinator, DispatchSettings};
use crate::error::IngestError;

/// Result of one file whose sessions were acquired
#[derive(Debug)]
pub struct FileReport {
    pub url: String,
    pub batches: usize,
    pub records: u64,
    /// Indexes of batches that failed after all attempts
    pub failed_batches: Vec<usize>,
    /// Delimited lines skipped as malformed
    pub malformed_lines: u64,
    /// Decode error or aborting write that stopped the file early
    pub error: Option<IngestError>,
    pub elapsed: Duration,
}

impl FileReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty() && self.error.is_none()
    }
}

/// Ingest one file.
///
/// The source is opened and its header or prefix section read before any
/// session is acquired; failures up to that point are returned as `Err`.
/// After that the file always yields a report. A decode error mid-file stops
/// reading, but batches already handed to the dispatcher are still written.
pub fn process_file<G: GraphStore>(
    store: &G,
    job: &FileJob,
    settings: &DispatchSettings,
    pb: &ProgressBar,
) -> Result<FileReport, IngestError> {
    let start = Instant::now();
    log::info!(
        "{}: ingesting as {} ({}), batch size {}, concurrency {}",
        job.url,
        job.format,
        job.compression,
        job.batch_size,
        job.concurrency
    );
    pb.set_message("opening");

    let source = stream::open(&job.url, job.compression).map_err(|source| {
        IngestError::SourceUnavailable {
            url: job.url.clone(),
            source,
        }
    })?;
    let decoder = RecordDecoder::open(job, source).map_err(|source| IngestError::Decode {
        url: job.url.clone(),
        source,
    })?;

    let mut dispatch = DispatchCoordinator::new(store, job, settings)?;
    let mut batcher = Batcher::new(decoder, job);
    let mut error = None;
    for batch in &mut batcher {
        let result = match batch {
            Ok(batch) => dispatch.dispatch(batch).map_err(IngestError::Write),
            Err(source) => Err(IngestError::Decode {
                url: job.url.clone(),
                source,
            }),
        };
        if let Err(e) = result {
            error = Some(e);
            break;
        }
        let outcome = dispatch.outcome();
        show_counts(pb, outcome.batches_written, outcome.records_written);
    }

    // An aborted file leaves its queued batches unwritten
    if !matches!(error, Some(IngestError::Write(_))) {
        if let Err(e) = dispatch.flush() {
            match error {
                Some(_) => log::error!("{e}"),
                None => error = Some(IngestError::Write(e)),
            }
        }
    }
    let outcome = dispatch.close();
    show_counts(pb, outcome.batches_written, outcome.records_written);

    let report = FileReport {
        url: job.url.clone(),
        batches: outcome.batches_written,
        records: outcome.records_written,
        failed_batches: outcome.failed_batches,
        malformed_lines: batcher.malformed_lines(),
        error,
        elapsed: start.elapsed(),
    };
    if report.malformed_lines > 0 {
        log::warn!(
            "{}: {} malformed line(s) skipped",
            report.url,
            fmt_num(report.malformed_lines)
        );
    }
    log::info!(
        "{}: {} batches, {} records in {:.1}s{}",
        report.url,
        fmt_num(report.batches as u64),
        fmt_num(report.records),
        report.elapsed.as_secs_f64(),
        if report.failed_batches.is_empty() {
            String::new()
        } else {
            format!(", {} failed batch(es)", report.failed_batches.len())
        }
    );
    Ok(report)
}
