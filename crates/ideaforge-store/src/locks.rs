use ideaforge_core::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of per-fingerprint async locks.
///
/// The outer map is only held long enough to clone the entry; the returned
/// lock is what serializes writers of one key.
///
/// Entries are never evicted. The map grows by one small entry per
/// fingerprint ever written, so it is bounded by the number of records in
/// the store.
#[derive(Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    /// Empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock serializing writers of `key`.
    pub fn for_key(&self, key: &Fingerprint) -> Arc<tokio::sync::Mutex<()>> {
        self.inner.lock().entry(key.clone()).or_default().clone()
    }

    /// Keys seen so far.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
