//! Deduplicating result accumulator
//!
//! Identifier set and record list live behind a single lock so they can never
//! disagree. Every public operation is one critical section.

use crate::site::RawRecord;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<String>,
    records: Vec<RawRecord>,
    duplicates: u64,
}

/// Thread-safe, capped, deduplicated record store
#[derive(Debug)]
pub struct DedupStore {
    cap: usize,
    inner: Mutex<Inner>,
}

impl DedupStore {
    /// Creates an empty store that will never hold more than `cap` records
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a batch of records discovered by the partition `label`
    ///
    /// Records whose identifier is already present are counted as duplicates
    /// and dropped. Insertion stops as soon as the cap is reached, even
    /// mid-batch.
    ///
    /// # Returns
    ///
    /// The number of records actually added
    pub fn add_records(&self, records: Vec<RawRecord>, label: &str) -> usize {
        let mut inner = self.lock();
        let mut added = 0;

        for mut record in records {
            if inner.records.len() >= self.cap {
                break;
            }

            if inner.seen.contains(&record.id) {
                inner.duplicates += 1;
                continue;
            }

            inner.seen.insert(record.id.clone());
            record.label = label.to_string();
            inner.records.push(record);
            added += 1;
        }

        added
    }

    /// Number of distinct records held
    pub fn size(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether the store has reached its cap
    pub fn is_full(&self) -> bool {
        self.size() >= self.cap
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Records remaining before the cap is reached
    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.size())
    }

    /// Duplicate identifiers observed so far
    pub fn duplicates(&self) -> u64 {
        self.lock().duplicates
    }

    /// Consumes the store, yielding records in insertion order
    pub fn into_records(self) -> Vec<RawRecord> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .records
    }

    /// Copies the current records out without consuming the store
    pub fn snapshot(&self) -> Vec<RawRecord> {
        self.lock().records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn records(ids: &[&str]) -> Vec<RawRecord> {
        ids.iter()
            .map(|id| RawRecord::new(*id, json!({ "id": id })))
            .collect()
    }

    #[test]
    fn test_add_records_labels_and_counts() {
        let store = DedupStore::new(10);
        let added = store.add_records(records(&["a", "b", "c"]), "rust/region=taipei");

        assert_eq!(added, 3);
        assert_eq!(store.size(), 3);
        assert!(!store.is_full());
        assert!(store
            .snapshot()
            .iter()
            .all(|r| r.label == "rust/region=taipei"));
    }

    #[test]
    fn test_duplicates_are_dropped_and_counted() {
        let store = DedupStore::new(10);
        store.add_records(records(&["a", "b"]), "first");
        let added = store.add_records(records(&["b", "c", "a", "c"]), "second");

        assert_eq!(added, 1);
        assert_eq!(store.size(), 3);
        assert_eq!(store.duplicates(), 3);

        // The first partition to see a record keeps the provenance
        let kept = store.into_records();
        assert_eq!(kept[1].id, "b");
        assert_eq!(kept[1].label, "first");
    }

    #[test]
    fn test_cap_stops_mid_batch() {
        let store = DedupStore::new(2);
        let added = store.add_records(records(&["a", "b", "c", "d"]), "root");

        assert_eq!(added, 2);
        assert!(store.is_full());
        assert_eq!(store.remaining(), 0);
        assert_eq!(store.add_records(records(&["e"]), "root"), 0);
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_zero_cap_store_is_full() {
        let store = DedupStore::new(0);
        assert!(store.is_full());
        assert_eq!(store.add_records(records(&["a"]), "root"), 0);
    }

    #[test]
    fn test_concurrent_adds_never_duplicate() {
        let store = Arc::new(DedupStore::new(1_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let ids: Vec<String> = (0..200).map(|i| format!("id-{}", i)).collect();
                    let batch = ids
                        .iter()
                        .map(|id| RawRecord::new(id.as_str(), json!(null)))
                        .collect();
                    store.add_records(batch, "worker")
                })
            })
            .collect();

        let total_added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total_added, 200);
        assert_eq!(store.size(), 200);
        assert_eq!(store.duplicates(), 7 * 200);
    }
}
