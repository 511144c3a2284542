//! JSON array of objects, decoded one element at a time
//!
//! The scanner copies exactly one element's bytes out of the stream and hands
//! them to `serde_json`; the array itself is never held in memory.

use std::io::BufRead;

use graphingest_core::{ByteStream, Record};
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::error::DecodeError;

/// How numeric literals are represented in decoded records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonNumbers {
    /// Decimal text (integers exactly, other numbers in shortest round-trip form)
    #[default]
    Text,
    /// IEEE double
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// Before the opening `[`
    Start,
    /// After `[`: an element or `]`
    First,
    /// After an element: `,` or `]`
    Next,
    /// After `,`: an element
    Element,
    Done,
}

pub struct JsonArrayDecoder {
    reader: ByteStream,
    numbers: JsonNumbers,
    state: ArrayState,
    element: Vec<u8>,
    /// 1-based ordinal of the element being read
    position: u64,
}

impl JsonArrayDecoder {
    pub fn new(reader: ByteStream, numbers: JsonNumbers) -> Self {
        Self {
            reader,
            numbers,
            state: ArrayState::Start,
            element: Vec::new(),
            position: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::Json {
            record: self.position,
            message: message.into(),
        }
    }

    fn unexpected(&self, found: Option<u8>, expected: &str) -> DecodeError {
        let found = match found {
            Some(b) => format!("'{}'", b.escape_ascii()),
            None => "end of document".to_string(),
        };
        self.error(format!("expected {expected}, found {found}"))
    }

    /// Skip whitespace and peek at the next byte without consuming it
    fn peek_significant(&mut self) -> Result<Option<u8>, DecodeError> {
        loop {
            let (skip, next) = {
                let buf = self.reader.fill_buf()?;
                if buf.is_empty() {
                    return Ok(None);
                }
                let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
                (skip, buf.get(skip).copied())
            };
            self.reader.consume(skip);
            if next.is_some() {
                return Ok(next);
            }
        }
    }

    /// Copy one `{...}` object into `self.element`; the stream sits on its `{`
    fn read_object(&mut self) -> Result<(), DecodeError> {
        self.element.clear();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        loop {
            let (used, complete) = {
                let buf = self.reader.fill_buf()?;
                if buf.is_empty() {
                    return Err(self.error("document ends inside an element"));
                }
                let mut used = 0;
                let mut complete = false;
                for &b in buf {
                    used += 1;
                    if in_string {
                        if escaped {
                            escaped = false;
                        } else if b == b'\\' {
                            escaped = true;
                        } else if b == b'"' {
                            in_string = false;
                        }
                        continue;
                    }
                    match b {
                        b'"' => in_string = true,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                complete = true;
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                self.element.extend_from_slice(&buf[..used]);
                (used, complete)
            };
            self.reader.consume(used);
            if complete {
                return Ok(());
            }
        }
    }

    fn parse_element(&self) -> Result<Record, DecodeError> {
        let record: Record =
            serde_json::from_slice(&self.element).map_err(|e| self.error(e.to_string()))?;
        Ok(record
            .into_iter()
            .map(|(key, value)| (key, convert_numbers(value, self.numbers)))
            .collect())
    }

    fn next_record(&mut self) -> Result<Option<Record>, DecodeError> {
        loop {
            match self.state {
                ArrayState::Done => return Ok(None),
                ArrayState::Start => match self.peek_significant()? {
                    Some(b'[') => {
                        self.reader.consume(1);
                        self.state = ArrayState::First;
                    }
                    found => return Err(self.unexpected(found, "'['")),
                },
                ArrayState::First | ArrayState::Next => {
                    match (self.state, self.peek_significant()?) {
                        (_, Some(b']')) => {
                            self.reader.consume(1);
                            self.state = ArrayState::Done;
                            return match self.peek_significant()? {
                                None => Ok(None),
                                Some(b) => Err(self.error(format!(
                                    "trailing '{}' after the closing ']'",
                                    b.escape_ascii()
                                ))),
                            };
                        }
                        (ArrayState::Next, Some(b',')) => {
                            self.reader.consume(1);
                            self.state = ArrayState::Element;
                        }
                        (ArrayState::First, _) => self.state = ArrayState::Element,
                        (_, found) => return Err(self.unexpected(found, "',' or ']'")),
                    }
                }
                ArrayState::Element => {
                    self.position += 1;
                    match self.peek_significant()? {
                        Some(b'{') => {}
                        found => return Err(self.unexpected(found, "an object")),
                    }
                    self.read_object()?;
                    let record = self.parse_element()?;
                    self.state = ArrayState::Next;
                    return Ok(Some(record));
                }
            }
        }
    }
}

impl Iterator for JsonArrayDecoder {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.state = ArrayState::Done;
                Some(Err(e))
            }
        }
    }
}

fn convert_numbers(value: Value, numbers: JsonNumbers) -> Value {
    match value {
        Value::Number(n) => match numbers {
            JsonNumbers::Text => Value::String(n.to_string()),
            JsonNumbers::Float => match n.as_f64().and_then(Number::from_f64) {
                Some(f) => Value::Number(f),
                None => Value::Number(n),
            },
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| convert_numbers(v, numbers))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, convert_numbers(v, numbers)))
                .collect(),
        ),
        other => other,
    }
}
