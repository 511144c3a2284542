//! Delimited text with a header line

use std::io::BufRead;

use graphingest_core::{ByteStream, Record};
use serde_json::Value;

use crate::error::DecodeError;

/// Decodes separated-value lines into records keyed by the header fields.
///
/// All values stay text. A line that cannot be split against the header is
/// logged and skipped; it never aborts the file.
pub struct DelimitedDecoder {
    reader: ByteStream,
    separator: String,
    header: Vec<String>,
    buf: Vec<u8>,
    line_no: u64,
    malformed: u64,
}

impl DelimitedDecoder {
    /// Read the header line. An empty stream yields a decoder with no records.
    pub fn new(reader: ByteStream, separator: &str) -> Result<Self, DecodeError> {
        let mut decoder = Self {
            reader,
            separator: separator.to_string(),
            header: Vec::new(),
            buf: Vec::new(),
            line_no: 0,
            malformed: 0,
        };
        if let Some(line) = decoder.next_line()? {
            let line = line.strip_prefix('\u{feff}').unwrap_or(&line);
            let separator = decoder.separator.as_str();
            decoder.header = split_fields(line, separator)
                .unwrap_or_else(|| line.split(separator).map(String::from).collect())
                .into_iter()
                .map(|name| name.trim().to_string())
                .collect();
        }
        Ok(decoder)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Lines skipped so far: invalid UTF-8 or not matching the header
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }

    /// Next non-blank line without its line ending; `None` at end of stream.
    ///
    /// Lines that are not valid UTF-8 count as malformed and are skipped.
    fn next_line(&mut self) -> Result<Option<String>, DecodeError> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let Ok(line) = std::str::from_utf8(&self.buf) else {
                self.malformed += 1;
                log::warn!("skipping line {}: invalid UTF-8", self.line_no);
                continue;
            };
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    fn to_record(&self, fields: Vec<String>) -> Record {
        let mut values = fields.into_iter();
        self.header
            .iter()
            .map(|name| {
                let value = values.next().unwrap_or_default();
                (name.clone(), Value::String(value))
            })
            .collect()
    }
}

impl Iterator for DelimitedDecoder {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.header.is_empty() {
            return None;
        }
        loop {
            let line = match self.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            match split_fields(&line, &self.separator) {
                Some(fields) if fields.len() <= self.header.len() => {
                    return Some(Ok(self.to_record(fields)));
                }
                Some(fields) => {
                    self.malformed += 1;
                    log::debug!(
                        "skipping line {}: {} fields, header has {}",
                        self.line_no,
                        fields.len(),
                        self.header.len()
                    );
                }
                None => {
                    self.malformed += 1;
                    log::debug!("skipping line {}: unterminated quote", self.line_no);
                }
            }
        }
    }
}

/// Split one line into fields. `None` when a quoted field is never closed.
///
/// A field starting with `"` runs to the matching quote, with `""` standing
/// for a literal quote; anything between the closing quote and the next
/// separator is kept as written.
fn split_fields(line: &str, separator: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = line;
    loop {
        let (field, tail) = match rest.strip_prefix('"') {
            Some(quoted) => {
                let (mut value, after) = take_quoted(quoted)?;
                match after.find(separator) {
                    Some(i) => {
                        value.push_str(&after[..i]);
                        (value, Some(&after[i + separator.len()..]))
                    }
                    None => {
                        value.push_str(after);
                        (value, None)
                    }
                }
            }
            None => match rest.find(separator) {
                Some(i) => (rest[..i].to_string(), Some(&rest[i + separator.len()..])),
                None => (rest.to_string(), None),
            },
        };
        fields.push(field);
        match tail {
            Some(tail) => rest = tail,
            None => return Some(fields),
        }
    }
}

/// Quoted value up to its closing quote, and the text after it
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            value.push(c);
        } else if chars.peek().is_some_and(|&(_, next)| next == '"') {
            chars.next();
            value.push('"');
        } else {
            return Some((value, &s[i + 1..]));
        }
    }
    None
}
