//! Skip and batch-size policy over any decoder

use graphingest_core::Batch;

use crate::config::FileJob;
use crate::decode::RecordDecoder;
use crate::error::DecodeError;
use crate::turtle::ParserState;

/// Lazy sequence of batches over one file.
///
/// `skip_records` drops leading records of record formats; `skip_chunks`
/// drops leading whole chunks of triple documents. Emitted batches are
/// indexed from 0 and never empty.
pub struct Batcher {
    decoder: RecordDecoder,
    state: ParserState,
    batch_size: usize,
    skip_records: u64,
    skip_chunks: u64,
    /// Records pulled from the decoder so far, skipped ones included
    consumed: u64,
    chunks_read: u64,
    next_index: usize,
    /// Error that cut a chunk short, reported after that chunk
    deferred: Option<DecodeError>,
    started: bool,
    done: bool,
}

impl Batcher {
    pub fn new(decoder: RecordDecoder, job: &FileJob) -> Self {
        Self::with_policy(decoder, job.batch_size, job.skip_records, job.skip_chunks)
    }

    pub fn with_policy(
        decoder: RecordDecoder,
        batch_size: usize,
        skip_records: u64,
        skip_chunks: u64,
    ) -> Self {
        Self {
            decoder,
            state: ParserState::default(),
            batch_size: batch_size.max(1),
            skip_records,
            skip_chunks,
            consumed: 0,
            chunks_read: 0,
            next_index: 0,
            deferred: None,
            started: false,
            done: false,
        }
    }

    /// Lines the decoder skipped as malformed
    pub fn malformed_lines(&self) -> u64 {
        self.decoder.malformed_lines()
    }

    fn start(&mut self) -> Result<(), DecodeError> {
        self.started = true;
        let format = self.decoder.format();
        if self.decoder.is_chunked() {
            if self.skip_records > 0 {
                log::warn!("skip_records is ignored for {format} files, use skip_chunks");
            }
            return Ok(());
        }
        if self.skip_chunks > 0 {
            log::warn!("skip_chunks is ignored for {format} files, use skip_records");
        }
        if self.skip_records > 0 {
            let skipped = self
                .decoder
                .skip_records(&mut self.state, self.skip_records)?;
            self.consumed += skipped;
            log::debug!("skipped {skipped} leading record(s)");
        }
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>, DecodeError> {
        if !self.started {
            self.start()?;
        }
        loop {
            if let Some(e) = self.deferred.take() {
                return Err(e);
            }
            let mut records = Vec::with_capacity(self.batch_size);
            if let Err(e) = self
                .decoder
                .read_chunk(&mut self.state, self.batch_size, &mut records)
            {
                if records.is_empty() {
                    return Err(e);
                }
                self.deferred = Some(e);
            }
            if records.is_empty() {
                return Ok(None);
            }
            let first_record = self.consumed + 1;
            self.consumed += records.len() as u64;
            self.chunks_read += 1;

            if self.decoder.is_chunked() && self.chunks_read <= self.skip_chunks {
                log::debug!(
                    "skipped chunk {} ({} triples)",
                    self.chunks_read,
                    records.len()
                );
                continue;
            }

            let batch = Batch::new(self.next_index, first_record, records);
            self.next_index += 1;
            return Ok(Some(batch));
        }
    }
}

impl Iterator for Batcher {
    type Item = Result<Batch, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_batch().transpose();
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}
