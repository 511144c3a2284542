//! Decoded records and the batches they are dispatched in

use serde_json::{Map, Value};

/// One decoded record: ordered field name → value mapping.
pub type Record = Map<String, Value>;

/// Ordered group of records dispatched as a single write.
///
/// Immutable once formed; never split or merged downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    index: usize,
    first_record: u64,
    records: Vec<Record>,
}

impl Batch {
    /// Build a batch; an empty record list is a caller bug.
    pub fn new(index: usize, first_record: u64, records: Vec<Record>) -> Self {
        debug_assert!(!records.is_empty(), "batch {index} has no records");
        Self {
            index,
            first_record,
            records,
        }
    }

    /// 0-based position among the batches emitted for one file
    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based ordinal of the first record within the file, counting skipped records
    pub fn first_record(&self) -> u64 {
        self.first_record
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ordinal of the last record within the file
    pub fn last_record(&self) -> u64 {
        self.first_record + self.records.len() as u64 - 1
    }

}

/// Build a record from `(field, text)` pairs, keeping their order.
pub fn text_record<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Record {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
