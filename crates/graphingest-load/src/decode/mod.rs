//! Format-polymorphic record decoding
//!
//! One [`RecordDecoder`] is selected per file from its [`Format`]. Delimited
//! text and JSON arrays yield one record at a time; triple documents are read
//! in subject-aligned chunks (see [`crate::turtle`]).

mod delimited;
mod json;

pub use delimited::DelimitedDecoder;
pub use json::{JsonArrayDecoder, JsonNumbers};

use graphingest_core::{ByteStream, Record};

use crate::config::FileJob;
use crate::error::DecodeError;
use crate::turtle::{ParserState, TurtleDecoder};

/// Source file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Header line plus separated fields (`csv`, `txt`)
    Delimited,
    /// A single array of objects
    Json,
    /// Prefixed triple notation (`ttl`)
    Turtle,
}

/// Compression suffixes ignored when inferring the format
const COMPRESSION_SUFFIXES: [&str; 4] = [".gz", ".gzip", ".bz2", ".zip"];

impl Format {
    /// Parse the configured `type` (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Delimited),
            "json" => Some(Self::Json),
            "ttl" => Some(Self::Turtle),
            _ => None,
        }
    }

    /// Infer from the URL suffix, ignoring compression suffixes; defaults to delimited text
    pub fn infer(url: &str) -> Self {
        let mut path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        while let Some(suffix) = COMPRESSION_SUFFIXES.iter().find(|s| path.ends_with(*s)) {
            path.truncate(path.len() - suffix.len());
        }
        if path.ends_with(".json") {
            Self::Json
        } else if path.ends_with(".ttl") {
            Self::Turtle
        } else {
            Self::Delimited
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Delimited => "csv",
            Self::Json => "json",
            Self::Turtle => "ttl",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lazy, single-pass decoder over one file.
pub enum RecordDecoder {
    Delimited(DelimitedDecoder),
    Json(JsonArrayDecoder),
    Turtle(TurtleDecoder),
}

impl RecordDecoder {
    /// Build the decoder for `job`, consuming any header or prefix section.
    pub fn open(job: &FileJob, stream: ByteStream) -> Result<Self, DecodeError> {
        Ok(match job.format {
            Format::Delimited => {
                Self::Delimited(DelimitedDecoder::new(stream, &job.field_separator)?)
            }
            Format::Json => Self::Json(JsonArrayDecoder::new(stream, job.json_numbers)),
            Format::Turtle => Self::Turtle(TurtleDecoder::new(stream)?),
        })
    }

    pub fn format(&self) -> Format {
        match self {
            Self::Delimited(_) => Format::Delimited,
            Self::Json(_) => Format::Json,
            Self::Turtle(_) => Format::Turtle,
        }
    }

    /// Lines skipped without aborting the file; only delimited text skips lines
    pub fn malformed_lines(&self) -> u64 {
        match self {
            Self::Delimited(d) => d.malformed_lines(),
            Self::Json(_) | Self::Turtle(_) => 0,
        }
    }

    /// Whether chunks follow statement groups rather than a fixed record count
    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Turtle(_))
    }

    /// Append the next chunk to `out`; nothing is appended at end of stream.
    ///
    /// Record formats append at most `size` records. Triple documents follow
    /// [`TurtleDecoder::read_chunk`] and may append more. On error `out` keeps
    /// the records decoded before it.
    pub fn read_chunk(
        &mut self,
        state: &mut ParserState,
        size: usize,
        out: &mut Vec<Record>,
    ) -> Result<(), DecodeError> {
        match self {
            Self::Delimited(d) => take_records(d, size, out),
            Self::Json(d) => take_records(d, size, out),
            Self::Turtle(d) => d.fill_chunk(state, size, out),
        }
    }

    /// Drop up to `count` leading records, returning how many were dropped.
    pub fn skip_records(
        &mut self,
        state: &mut ParserState,
        count: u64,
    ) -> Result<u64, DecodeError> {
        let mut skipped = 0;
        while skipped < count {
            let next = match self {
                Self::Delimited(d) => d.next().transpose()?,
                Self::Json(d) => d.next().transpose()?,
                Self::Turtle(d) => d.next_triple(state)?,
            };
            if next.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}

fn take_records<I>(decoder: &mut I, size: usize, out: &mut Vec<Record>) -> Result<(), DecodeError>
where
    I: Iterator<Item = Result<Record, DecodeError>>,
{
    for record in decoder.by_ref().take(size) {
        out.push(record?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names() {
        assert_eq!(Format::from_name("CSV"), Some(Format::Delimited));
        assert_eq!(Format::from_name("txt"), Some(Format::Delimited));
        assert_eq!(Format::from_name("json"), Some(Format::Json));
        assert_eq!(Format::from_name("ttl"), Some(Format::Turtle));
        assert_eq!(Format::from_name("xml"), None);
    }

    #[test]
    fn format_inferred_through_compression_suffix() {
        assert_eq!(Format::infer("/data/a.ttl.gz"), Format::Turtle);
        assert_eq!(Format::infer("https://x.org/a.json.bz2?sig=1"), Format::Json);
        assert_eq!(Format::infer("a.json.zip"), Format::Json);
        assert_eq!(Format::infer("a.csv"), Format::Delimited);
        assert_eq!(Format::infer("no-suffix"), Format::Delimited);
    }
}
