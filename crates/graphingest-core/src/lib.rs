//! graphingest core - shared infrastructure for streaming graph ingestion
//!
//! Byte sources with decompression, the record/batch model, the graph store
//! session traits, bounded write retry, and logging/progress plumbing.

pub mod error;
pub mod logging;
pub mod progress;
pub mod record;
pub mod retry;
pub mod store;
pub mod stream;

// Re-exports for convenience
pub use error::StoreError;
pub use logging::{SpinnerSafeLogger, init_logging};
pub use progress::{ProgressContext, fmt_num};
pub use record::{Batch, Record, text_record};
pub use retry::{Exhausted, WritePolicy, retry_write};
pub use store::{GraphStore, Session, SessionSlots};
pub use stream::{ByteStream, Compression, SHARED_RUNTIME, StreamError, http_client};
