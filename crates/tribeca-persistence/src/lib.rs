//! Durable storage for trades and quoting-parameter versions.
//!
//! Records are kept as JSON Lines, one file per collection, so a write
//! interrupted mid-line only loses that line. Failures are reported to
//! the caller, which logs them and keeps operating from memory.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{PersistenceError, PersistenceResult};
pub use memory::MemoryStore;
pub use store::{JsonLinesStore, Persister, Repository};
