//! Fixed statements run once before and once after all files

use std::fmt;

use graphingest_core::{GraphStore, Session, SessionSlots};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre_ingest"),
            Self::Post => f.write_str("post_ingest"),
        }
    }
}

/// Runs parameterless statements in order on a single session.
///
/// No batching, no concurrency, no retry: the first failure is returned.
pub struct StatementRunner<'a, G: GraphStore> {
    store: &'a G,
}

impl<'a, G: GraphStore> StatementRunner<'a, G> {
    pub fn new(store: &'a G) -> Self {
        Self { store }
    }

    pub fn run(&self, phase: Phase, statements: &[String]) -> Result<(), IngestError> {
        if statements.is_empty() {
            return Ok(());
        }
        let label = phase.to_string();
        let mut slots =
            SessionSlots::acquire(self.store, 1, &label).map_err(|source| IngestError::Session {
                url: label.clone(),
                source,
            })?;

        let total = statements.len();
        for (i, statement) in statements.iter().enumerate() {
            let index = i + 1;
            log::info!("{phase} [{index}/{total}]: {statement}");
            slots
                .primary()
                .run(statement)
                .map_err(|source| IngestError::Statement {
                    phase,
                    index,
                    source,
                })?;
        }

        if let Err(e) = slots.release() {
            log::warn!("{phase}: releasing session failed: {e}");
        }
        Ok(())
    }
}
