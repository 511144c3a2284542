//! Triple-notation decoder
//!
//! A document is a prefix section (`@prefix` lines) followed by statement
//! groups. Triples are read in chunks that never split a group: a chunk closes
//! only once it is full and the next triple starts a different subject.

mod parser;

pub use parser::{ParserState, PrefixBinding, expand_name, parse_line, parse_prefix};

use std::collections::VecDeque;
use std::io::BufRead;

use graphingest_core::{ByteStream, Record};
use serde_json::Value;

use crate::error::DecodeError;

pub struct TurtleDecoder {
    reader: ByteStream,
    prefixes: Vec<PrefixBinding>,
    /// Triples parsed but not yet handed out, including a held-back boundary triple
    pending: VecDeque<Record>,
    /// First data line, read while scanning the prefix section
    held_line: Option<String>,
    buf: Vec<u8>,
    line_no: u64,
    exhausted: bool,
}

impl TurtleDecoder {
    /// Read the prefix section, stopping at the first data line.
    pub fn new(reader: ByteStream) -> Result<Self, DecodeError> {
        let mut decoder = Self {
            reader,
            prefixes: Vec::new(),
            pending: VecDeque::new(),
            held_line: None,
            buf: Vec::new(),
            line_no: 0,
            exhausted: false,
        };
        while let Some(line) = decoder.read_line()? {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_prefix(trimmed) {
                Some(binding) => {
                    log::debug!("prefix {} -> {}", binding.alias, binding.expansion);
                    decoder.prefixes.push(binding);
                }
                None => {
                    decoder.held_line = Some(line);
                    break;
                }
            }
        }
        Ok(decoder)
    }

    pub fn prefixes(&self) -> &[PrefixBinding] {
        &self.prefixes
    }

    /// Raw line without its line ending; `None` at end of stream
    fn read_line(&mut self) -> Result<Option<String>, DecodeError> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        match std::str::from_utf8(&self.buf) {
            Ok(line) => Ok(Some(line.trim_end_matches(['\n', '\r']).to_string())),
            Err(e) => Err(DecodeError::InvalidDocument {
                line: self.line_no,
                text: String::from_utf8_lossy(&self.buf).trim_end().to_string(),
                reason: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
            }),
        }
    }

    fn next_data_line(&mut self) -> Result<Option<String>, DecodeError> {
        match self.held_line.take() {
            Some(line) => Ok(Some(line)),
            None => self.read_line(),
        }
    }

    /// Next triple in document order.
    pub fn next_triple(&mut self, state: &mut ParserState) -> Result<Option<Record>, DecodeError> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            let Some(line) = self.next_data_line()? else {
                self.exhausted = true;
                if let ParserState::ExpectingContinuation { subject } = state {
                    log::warn!(
                        "line {}: document ends inside the statement group of {subject}",
                        self.line_no
                    );
                }
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(binding) = parse_prefix(trimmed) {
                log::debug!(
                    "line {}: late prefix {} -> {}",
                    self.line_no,
                    binding.alias,
                    binding.expansion
                );
                self.prefixes.push(binding);
                continue;
            }
            parse_line(
                trimmed,
                self.line_no,
                state,
                &self.prefixes,
                &mut self.pending,
            )?;
        }
    }

    /// Read the next chunk of triples; empty at end of stream.
    ///
    /// Triples accumulate until at least `size` are buffered and the next
    /// triple names a different subject. That triple is held back and opens
    /// the following chunk, so a chunk may exceed `size` to finish a group.
    pub fn read_chunk(
        &mut self,
        state: &mut ParserState,
        size: usize,
    ) -> Result<Vec<Record>, DecodeError> {
        let mut chunk = Vec::with_capacity(size);
        self.fill_chunk(state, size, &mut chunk)?;
        Ok(chunk)
    }

    /// [`read_chunk`](Self::read_chunk) into `chunk`, which keeps the triples
    /// decoded before an error.
    pub fn fill_chunk(
        &mut self,
        state: &mut ParserState,
        size: usize,
        chunk: &mut Vec<Record>,
    ) -> Result<(), DecodeError> {
        while let Some(record) = self.next_triple(state)? {
            if chunk.len() >= size && subject(chunk.last()) != subject(Some(&record)) {
                self.pending.push_front(record);
                break;
            }
            chunk.push(record);
        }
        Ok(())
    }
}

fn subject(record: Option<&Record>) -> Option<&str> {
    record?.get("subject").and_then(Value::as_str)
}
