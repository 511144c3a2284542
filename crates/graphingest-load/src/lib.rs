//! graphingest load - streaming file ingestion into a graph store
//!
//! Decodes delimited text, JSON arrays and prefixed triple documents lazily,
//! groups records into bounded batches and writes each batch with a
//! parameterized statement, optionally across concurrent sessions.
//!
//! # Example
//!
//! ```ignore
//! use graphingest_load::{IngestConfig, run};
//!
//! let config = IngestConfig::from_file("graphingest.toml".as_ref())?;
//! let summary = run(&config, &store, &ProgressContext::hidden())?;
//! println!("Wrote {} records", summary.total_records);
//! ```

pub mod batch;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod runner;
pub mod statements;
pub mod turtle;
pub mod worker;

// Re-exports
pub use batch::Batcher;
pub use config::{FileJob, FileSpec, IngestConfig};
pub use decode::{Format, JsonNumbers, RecordDecoder};
pub use dispatch::{DispatchCoordinator, DispatchOutcome, DispatchSettings, FailurePolicy};
pub use error::{DecodeError, IngestError, WriteError};
pub use runner::{Summary, run};
pub use statements::{Phase, StatementRunner};
pub use turtle::{ParserState, PrefixBinding, TurtleDecoder};
pub use worker::{FileReport, process_file};
