//! Error taxonomy for an ingest run
//!
//! Every variant carries enough context (URL, line/record ordinal, batch and
//! session index) to resume a run with `skip_records` / `skip_chunks`.

use std::fmt;
use std::io;

use graphingest_core::{StoreError, StreamError};

use crate::statements::Phase;

/// Error decoding a byte stream into records.
#[derive(Debug)]
pub enum DecodeError {
    Io(io::Error),
    /// Malformed JSON document; `record` is the 1-based element being read
    Json { record: u64, message: String },
    /// Triple-notation grammar violation at a 1-based line
    InvalidDocument {
        line: u64,
        text: String,
        reason: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Json { record, message } => {
                write!(f, "malformed JSON at element {record}: {message}")
            }
            Self::InvalidDocument { line, text, reason } => {
                write!(f, "invalid triple document at line {line} ({reason}): {text}")
            }
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A batch write that failed after its allowed attempts.
#[derive(Debug)]
pub struct WriteError {
    pub url: String,
    pub batch: usize,
    pub session: usize,
    /// 1-based ordinal of the batch's first record in the file
    pub first_record: u64,
    pub records: usize,
    pub attempts: u32,
    pub source: StoreError,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: batch {} (records {}..{}) failed on session {} after {} attempt(s): {}",
            self.url,
            self.batch,
            self.first_record,
            self.first_record + self.records.saturating_sub(1) as u64,
            self.session,
            self.attempts,
            self.source
        )
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Error from any stage of an ingest run.
#[derive(Debug)]
pub enum IngestError {
    /// Invalid configuration; fatal before ingestion starts
    Configuration(String),
    /// Source could not be opened; fatal for that file
    SourceUnavailable { url: String, source: StreamError },
    /// Unknown compression codec; file skipped
    UnsupportedCompression { url: String, codec: String },
    /// Unknown file format; file skipped
    UnsupportedFormat { url: String, format: String },
    /// Malformed document; aborts that file
    Decode { url: String, source: DecodeError },
    Write(WriteError),
    /// Store session could not be begun
    Session { url: String, source: StoreError },
    /// Pre/post statement failed; always fatal
    Statement {
        phase: Phase,
        index: usize,
        source: StoreError,
    },
}

impl IngestError {
    /// Errors that mean "this file was not attempted" rather than "this file failed".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCompression { .. } | Self::UnsupportedFormat { .. }
        )
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::SourceUnavailable { url, source } => {
                write!(f, "{url}: source unavailable: {source}")
            }
            Self::UnsupportedCompression { url, codec } => {
                write!(f, "{url}: unsupported compression '{codec}'")
            }
            Self::UnsupportedFormat { url, format } => {
                write!(f, "{url}: unsupported format '{format}'")
            }
            Self::Decode { url, source } => write!(f, "{url}: {source}"),
            Self::Write(e) => write!(f, "{e}"),
            Self::Session { url, source } => write!(f, "{url}: cannot begin session: {source}"),
            Self::Statement {
                phase,
                index,
                source,
            } => write!(f, "{phase} statement {index} failed: {source}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SourceUnavailable { source, .. } => Some(source),
            Self::Decode { source, .. } => Some(source),
            Self::Write(e) => Some(e),
            Self::Session { source, .. } | Self::Statement { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<WriteError> for IngestError {
    fn from(e: WriteError) -> Self {
        Self::Write(e)
    }
}
