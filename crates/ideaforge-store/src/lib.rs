//! Durable ledger of project records and scheduler state.
//!
//! The [`HistoryStore`] is the only shared mutable state of the pipeline and
//! its source of truth: dedup and crash resumption both read from it.
//!
//! # Main types
//!
//! - [`HistoryStore`] — Async storage contract (get / upsert / list + schedule state).
//! - [`FileHistoryStore`] — One pretty-printed JSON file per fingerprint, atomic renames.
//! - [`InMemoryHistoryStore`] — Same contract in memory, for tests and dry runs.

/// JSON-file backed store.
pub mod file;
/// Per-fingerprint async locks.
pub mod locks;
/// In-memory store.
pub mod memory;
/// The storage trait.
pub mod store;

pub use file::FileHistoryStore;
pub use memory::InMemoryHistoryStore;
pub use store::HistoryStore;
