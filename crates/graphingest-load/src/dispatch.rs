//! Batch dispatch across store sessions
//!
//! Sequential mode (degree 1) writes every batch on one session in order.
//! Concurrent mode (degree N) routes batch `i` to session `i % N`, issues a
//! full group of N writes at once on a dedicated pool and waits for all of
//! them before the next group. A trailing partial group is written
//! sequentially on the primary session.

use graphingest_core::{
    Batch, GraphStore, Session, SessionSlots, WritePolicy, fmt_num, retry_write,
};
use serde::Deserialize;

use crate::config::FileJob;
use crate::error::{IngestError, WriteError};

/// What a failed batch does to the rest of its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the file at the first failed batch
    Abort,
    /// Record the failure and keep writing
    Continue,
}

impl FailurePolicy {
    /// Policy when none is configured: sequential files abort, concurrent files continue
    pub fn default_for(concurrency: usize) -> Self {
        if concurrency > 1 {
            Self::Continue
        } else {
            Self::Abort
        }
    }
}

/// Write settings shared by every file of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchSettings {
    pub policy: WritePolicy,
    pub on_failure: Option<FailurePolicy>,
}

/// Totals for one file's dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub batches_written: usize,
    pub records_written: u64,
    /// Indexes of batches that failed after all attempts
    pub failed_batches: Vec<usize>,
}

pub struct DispatchCoordinator<S: Session> {
    url: String,
    statement: String,
    slots: SessionSlots<S>,
    policy: WritePolicy,
    on_failure: FailurePolicy,
    /// Present in concurrent mode only, one thread per session
    pool: Option<rayon::ThreadPool>,
    group: Vec<Batch>,
    outcome: DispatchOutcome,
}

/// Write one batch with retry, attributing a failure to its session slot
fn write_batch<S: Session>(
    session: &mut S,
    slot: usize,
    batch: &Batch,
    url: &str,
    statement: &str,
    policy: &WritePolicy,
) -> Result<(), WriteError> {
    let label = format!("{url} batch {} (session {slot})", batch.index());
    retry_write(&label, policy, || session.execute(statement, batch)).map_err(|e| WriteError {
        url: url.to_string(),
        batch: batch.index(),
        session: slot,
        first_record: batch.first_record(),
        records: batch.len(),
        attempts: e.attempts,
        source: e.error,
    })
}

impl<S: Session> DispatchCoordinator<S> {
    /// Acquire the file's sessions: one per slot of its concurrency degree.
    pub fn new<G>(
        store: &G,
        job: &FileJob,
        settings: &DispatchSettings,
    ) -> Result<Self, IngestError>
    where
        G: GraphStore<Session = S>,
    {
        let degree = job.concurrency.max(1);
        let slots =
            SessionSlots::acquire(store, degree, &job.url).map_err(|source| IngestError::Session {
                url: job.url.clone(),
                source,
            })?;
        let pool = if degree > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(degree)
                .thread_name(|i| format!("dispatch-{i}"))
                .build()
                .map_err(|e| {
                    IngestError::Configuration(format!("failed to create dispatch pool: {e}"))
                })?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            url: job.url.clone(),
            statement: job.statement.clone(),
            slots,
            policy: settings.policy,
            on_failure: settings
                .on_failure
                .unwrap_or_else(|| FailurePolicy::default_for(degree)),
            pool,
            group: Vec::with_capacity(degree),
            outcome: DispatchOutcome::default(),
        })
    }

    pub fn degree(&self) -> usize {
        self.slots.len()
    }

    pub fn outcome(&self) -> &DispatchOutcome {
        &self.outcome
    }

    /// Deliver one batch.
    ///
    /// Sequential mode writes it before returning. Concurrent mode queues it
    /// and, once N batches are queued, writes the whole group and waits for it.
    /// An `Err` means the file must stop: the failure policy is `Abort`.
    pub fn dispatch(&mut self, batch: Batch) -> Result<(), WriteError> {
        if self.pool.is_none() {
            let result = write_batch(
                self.slots.primary(),
                0,
                &batch,
                &self.url,
                &self.statement,
                &self.policy,
            );
            return self.settle(&batch, result);
        }
        self.group.push(batch);
        if self.group.len() == self.slots.len() {
            self.run_group()?;
        }
        Ok(())
    }

    /// Issue the queued group in parallel and wait for every write (the barrier).
    fn run_group(&mut self) -> Result<(), WriteError> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(());
        };
        let group = std::mem::take(&mut self.group);
        let degree = self.slots.len();
        let mut results: Vec<Option<Result<(), WriteError>>> =
            group.iter().map(|_| None).collect();
        let (url, statement, policy) = (self.url.as_str(), self.statement.as_str(), &self.policy);
        let sessions = self.slots.as_mut_slice();
        log::debug!(
            "{url}: writing group of {} batches starting at {}",
            group.len(),
            group.first().map_or(0, Batch::index)
        );
        pool.scope(|scope| {
            for ((session, batch), result) in
                sessions.iter_mut().zip(&group).zip(results.iter_mut())
            {
                let slot = batch.index() % degree;
                scope.spawn(move |_| {
                    *result = Some(write_batch(session, slot, batch, url, statement, policy));
                });
            }
        });

        let mut first_err = None;
        for (batch, result) in group.iter().zip(results) {
            let result = result.unwrap_or(Ok(()));
            if let Err(e) = self.settle(batch, result) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn settle(&mut self, batch: &Batch, result: Result<(), WriteError>) -> Result<(), WriteError> {
        match result {
            Ok(()) => {
                self.outcome.batches_written += 1;
                self.outcome.records_written += batch.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.outcome.failed_batches.push(batch.index());
                match self.on_failure {
                    FailurePolicy::Abort => Err(e),
                    FailurePolicy::Continue => {
                        log::error!("{e}; continuing with the next batch");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Write a trailing partial group sequentially on the primary session.
    pub fn flush(&mut self) -> Result<(), WriteError> {
        let trailing = std::mem::take(&mut self.group);
        if !trailing.is_empty() {
            log::debug!(
                "{}: flushing {} trailing batch(es) on the primary session",
                self.url,
                trailing.len()
            );
        }
        for batch in &trailing {
            let result = write_batch(
                self.slots.primary(),
                0,
                batch,
                &self.url,
                &self.statement,
                &self.policy,
            );
            self.settle(batch, result)?;
        }
        Ok(())
    }

    /// Release every session and hand back what was written.
    ///
    /// Batches still queued are dropped unwritten; call [`flush`](Self::flush)
    /// first unless the file was aborted.
    pub fn close(self) -> DispatchOutcome {
        if !self.group.is_empty() {
            log::warn!(
                "{}: {} queued batch(es) dropped unwritten",
                self.url,
                self.group.len()
            );
        }
        if let Err(e) = self.slots.release() {
            log::warn!("{}: releasing sessions failed: {e}", self.url);
        }
        let outcome = self.outcome;
        log::debug!(
            "{}: {} batches / {} records written, {} failed",
            self.url,
            fmt_num(outcome.batches_written as u64),
            fmt_num(outcome.records_written),
            outcome.failed_batches.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Format, JsonNumbers};
    use graphingest_core::{Compression, StoreError, text_record};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start { session: usize, batch: usize },
        End { session: usize, batch: usize },
        Closed { session: usize },
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        sessions: AtomicUsize,
        /// Batch index -> number of leading attempts that fail
        failures: Mutex<Vec<(usize, usize)>>,
    }

    struct RecordingStore(Arc<Recorder>);

    struct RecordingSession {
        id: usize,
        recorder: Arc<Recorder>,
    }

    impl Session for RecordingSession {
        fn execute(&mut self, _: &str, batch: &Batch) -> Result<(), StoreError> {
            let r = &self.recorder;
            r.events.lock().unwrap().push(Event::Start {
                session: self.id,
                batch: batch.index(),
            });
            let now = r.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            r.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            r.in_flight.fetch_sub(1, Ordering::SeqCst);
            r.events.lock().unwrap().push(Event::End {
                session: self.id,
                batch: batch.index(),
            });

            let mut failures = r.failures.lock().unwrap();
            let pending = failures
                .iter_mut()
                .find(|(b, n)| *b == batch.index() && *n > 0);
            if let Some(entry) = pending {
                entry.1 -= 1;
                return Err(StoreError::Http {
                    status: Some(503),
                    message: "busy".into(),
                });
            }
            Ok(())
        }

        fn run(&mut self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }

        fn close(self) -> Result<(), StoreError> {
            self.recorder
                .events
                .lock()
                .unwrap()
                .push(Event::Closed { session: self.id });
            Ok(())
        }
    }

    impl GraphStore for RecordingStore {
        type Session = RecordingSession;

        fn begin_session(&self) -> Result<RecordingSession, StoreError> {
            Ok(RecordingSession {
                id: self.0.sessions.fetch_add(1, Ordering::SeqCst),
                recorder: self.0.clone(),
            })
        }
    }

    fn job(concurrency: usize) -> FileJob {
        FileJob {
            url: "test.csv".into(),
            format: Format::Delimited,
            compression: Compression::None,
            statement: "UNWIND $dict.rows AS row RETURN row".into(),
            skip_records: 0,
            skip_chunks: 0,
            batch_size: 1,
            field_separator: ",".into(),
            concurrency,
            skip: false,
            json_numbers: JsonNumbers::Text,
        }
    }

    fn batch(index: usize) -> Batch {
        Batch::new(index, index as u64 + 1, vec![text_record([("id", "x")])])
    }

    fn ends(events: &[Event]) -> Vec<(usize, usize)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::End { session, batch } => Some((*session, *batch)),
                _ => None,
            })
            .collect()
    }

    fn position(events: &[Event], wanted: &Event) -> usize {
        events.iter().position(|e| e == wanted).unwrap()
    }

    #[test]
    fn sequential_writes_in_order_on_one_session() {
        let recorder = Arc::new(Recorder::default());
        let store = RecordingStore(recorder.clone());
        let mut dispatch =
            DispatchCoordinator::new(&store, &job(1), &DispatchSettings::default()).unwrap();
        for i in 0..4 {
            dispatch.dispatch(batch(i)).unwrap();
        }
        dispatch.flush().unwrap();
        let outcome = dispatch.close();
        assert_eq!(outcome.batches_written, 4);
        assert_eq!(outcome.records_written, 4);

        let events = recorder.events.lock().unwrap();
        assert_eq!(ends(&events), [(0, 0), (0, 1), (0, 2), (0, 3)]);
        assert_eq!(events.last(), Some(&Event::Closed { session: 0 }));
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn groups_of_three_with_barrier_and_sequential_tail() {
        let recorder = Arc::new(Recorder::default());
        let store = RecordingStore(recorder.clone());
        let mut dispatch =
            DispatchCoordinator::new(&store, &job(3), &DispatchSettings::default()).unwrap();
        assert_eq!(dispatch.degree(), 3);
        for i in 0..7 {
            dispatch.dispatch(batch(i)).unwrap();
        }
        dispatch.flush().unwrap();
        let outcome = dispatch.close();
        assert_eq!(outcome.batches_written, 7);
        assert!(outcome.failed_batches.is_empty());

        let events = recorder.events.lock().unwrap();
        // slot = index % 3, batch 6 on the primary session
        let mut written = ends(&events);
        written.sort_by_key(|&(_, batch)| batch);
        assert_eq!(
            written,
            [(0, 0), (1, 1), (2, 2), (0, 3), (1, 4), (2, 5), (0, 6)]
        );

        // barrier: every write of a group ends before the next group starts
        for (group, next) in [(0..3, 3..6), (3..6, 6..7)] {
            let last_end = group
                .map(|b| position(&events, &Event::End { session: b % 3, batch: b }))
                .max()
                .unwrap();
            let first_start = next
                .map(|b| position(&events, &Event::Start { session: b % 3, batch: b }))
                .min()
                .unwrap();
            assert!(last_end < first_start);
        }

        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 3);
        let closed = events
            .iter()
            .filter(|e| matches!(e, Event::Closed { .. }))
            .count();
        assert_eq!(closed, 3);
    }

    #[test]
    fn failed_write_is_retried_once() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.lock().unwrap().push((1, 1));
        let store = RecordingStore(recorder.clone());
        let mut dispatch =
            DispatchCoordinator::new(&store, &job(1), &DispatchSettings::default()).unwrap();
        for i in 0..3 {
            dispatch.dispatch(batch(i)).unwrap();
        }
        dispatch.flush().unwrap();
        let outcome = dispatch.close();
        assert_eq!(outcome.batches_written, 3);
        let events = recorder.events.lock().unwrap();
        assert_eq!(ends(&events), [(0, 0), (0, 1), (0, 1), (0, 2)]);
    }

    #[test]
    fn sequential_failure_aborts_and_releases() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.lock().unwrap().push((1, 5));
        let store = RecordingStore(recorder.clone());
        let mut dispatch =
            DispatchCoordinator::new(&store, &job(1), &DispatchSettings::default()).unwrap();
        dispatch.dispatch(batch(0)).unwrap();
        let err = dispatch.dispatch(batch(1)).unwrap_err();
        assert_eq!(err.batch, 1);
        assert_eq!(err.attempts, 2);
        assert_eq!(err.first_record, 2);

        let outcome = dispatch.close();
        assert_eq!(outcome.batches_written, 1);
        assert_eq!(outcome.records_written, 1);
        assert_eq!(outcome.failed_batches, [1]);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.last(), Some(&Event::Closed { session: 0 }));
    }

    #[test]
    fn trailing_group_waits_for_flush() {
        let recorder = Arc::new(Recorder::default());
        let store = RecordingStore(recorder.clone());
        let mut dispatch =
            DispatchCoordinator::new(&store, &job(3), &DispatchSettings::default()).unwrap();
        for i in 0..2 {
            dispatch.dispatch(batch(i)).unwrap();
        }
        assert_eq!(dispatch.outcome().batches_written, 0);
        dispatch.flush().unwrap();
        assert_eq!(dispatch.outcome().batches_written, 2);
        assert_eq!(
            ends(&recorder.events.lock().unwrap()),
            [(0, 0), (0, 1)]
        );
    }

    #[test]
    fn concurrent_failure_is_isolated() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.lock().unwrap().push((1, 5));
        let store = RecordingStore(recorder.clone());
        let mut dispatch =
            DispatchCoordinator::new(&store, &job(2), &DispatchSettings::default()).unwrap();
        for i in 0..4 {
            dispatch.dispatch(batch(i)).unwrap();
        }
        dispatch.flush().unwrap();
        let outcome = dispatch.close();
        assert_eq!(outcome.batches_written, 3);
        assert_eq!(outcome.failed_batches, [1]);
    }

    #[test]
    fn concurrent_abort_still_waits_for_siblings() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.lock().unwrap().push((0, 5));
        let store = RecordingStore(recorder.clone());
        let settings = DispatchSettings {
            on_failure: Some(FailurePolicy::Abort),
            ..Default::default()
        };
        let mut dispatch = DispatchCoordinator::new(&store, &job(2), &settings).unwrap();
        dispatch.dispatch(batch(0)).unwrap();
        let err = dispatch.dispatch(batch(1)).unwrap_err();
        assert_eq!(err.batch, 0);
        assert_eq!(dispatch.outcome().batches_written, 1);
        assert_eq!(dispatch.outcome().failed_batches, [0]);
    }

    #[test]
    fn default_failure_policy_by_mode() {
        assert_eq!(FailurePolicy::default_for(1), FailurePolicy::Abort);
        assert_eq!(FailurePolicy::default_for(4), FailurePolicy::Continue);
    }
}
