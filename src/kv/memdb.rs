//! In-memory ordered transactional store.
//!
//! A [`MemDb`] implements the [`Database`] / [`Transaction`] traits with
//! optimistic concurrency over a `BTreeMap`: transactions buffer writes
//! and record what they read; commit validates the read set against the
//! per-key modification versions and either applies every buffered write
//! atomically or fails with a retryable [`KvError::Conflict`].
//!
//! Semantics the higher layers rely on:
//! - reads observe the transaction's own buffered writes
//! - snapshot reads skip read-set recording, so they never make this
//!   transaction conflict with later writers
//! - clears record modification versions too, so a cleared key conflicts
//!   with concurrent readers of that key
//! - a dropped, uncommitted transaction has no effect

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::slice::Slice;

use super::{CancelToken, Database, KvError, Transaction};

#[derive(Default)]
struct Store {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Commit version of the last write (set or clear) to each key.
    write_versions: BTreeMap<Vec<u8>, u64>,
    version: u64,
}

/// Shared in-memory database handle.  Clones refer to the same store.
#[derive(Clone, Default)]
pub struct MemDb {
    store: Arc<Mutex<Store>>,
}

impl MemDb {
    pub fn new() -> MemDb {
        MemDb::default()
    }

    /// Number of committed entries.  Test aid.
    pub fn entry_count(&self) -> usize {
        self.store.lock().unwrap().data.len()
    }
}

impl Database for MemDb {
    type Tx = MemTx;

    fn begin(&self, cancel: &CancelToken) -> Result<MemTx, KvError> {
        cancel.checkpoint()?;
        let read_version = self.store.lock().unwrap().version;
        Ok(MemTx {
            store: Arc::clone(&self.store),
            cancel: cancel.clone(),
            read_version,
            read_keys: Vec::new(),
            read_ranges: Vec::new(),
            writes: BTreeMap::new(),
            done: false,
        })
    }
}

/// One optimistic transaction against a [`MemDb`].
pub struct MemTx {
    store: Arc<Mutex<Store>>,
    cancel: CancelToken,
    read_version: u64,
    read_keys: Vec<Vec<u8>>,
    read_ranges: Vec<(Vec<u8>, Vec<u8>)>,
    /// Buffered writes: `Some` is a set, `None` is a clear.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    done: bool,
}

impl MemTx {
    /// Every operation is a suspension point: cancellation is observed
    /// here, and a committed transaction refuses further use.
    fn check_open(&self) -> Result<(), KvError> {
        if self.done {
            return Err(KvError::Closed);
        }
        self.cancel.checkpoint()
    }

    /// Point read through the write overlay.
    fn read_one(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(buffered) = self.writes.get(key) {
            return buffered.clone();
        }
        self.store.lock().unwrap().data.get(key).cloned()
    }

    /// Range read `[begin, end)` merging committed entries with the write
    /// overlay.  `limit` of 0 means no limit; `reverse` takes entries from
    /// the high end first.
    fn read_range(
        &self,
        begin: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> Vec<(Slice, Slice)> {
        if begin >= end {
            return Vec::new();
        }
        let bounds = (Bound::Included(begin), Bound::Excluded(end));
        let store = self.store.lock().unwrap();
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = store
            .data
            .range::<[u8], _>(bounds)
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        for (k, v) in self.writes.range::<[u8], _>(bounds) {
            merged.insert(k.clone(), v.clone());
        }
        let present = merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (Slice::from_vec(k), Slice::from_vec(v))));
        let mut out: Vec<(Slice, Slice)> = present.collect();
        if reverse {
            out.reverse();
        }
        if limit > 0 {
            out.truncate(limit);
        }
        out
    }
}

impl Transaction for MemTx {
    fn get(&mut self, key: &Slice) -> Result<Option<Slice>, KvError> {
        self.check_open()?;
        self.read_keys.push(key.as_bytes().to_vec());
        Ok(self.read_one(key.as_bytes()).map(Slice::from_vec))
    }

    fn get_range(
        &mut self,
        begin: &Slice,
        end: &Slice,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Slice, Slice)>, KvError> {
        self.check_open()?;
        self.read_ranges
            .push((begin.as_bytes().to_vec(), end.as_bytes().to_vec()));
        Ok(self.read_range(begin.as_bytes(), end.as_bytes(), limit, reverse))
    }

    fn snapshot_get(&mut self, key: &Slice) -> Result<Option<Slice>, KvError> {
        self.check_open()?;
        Ok(self.read_one(key.as_bytes()).map(Slice::from_vec))
    }

    fn snapshot_get_range(
        &mut self,
        begin: &Slice,
        end: &Slice,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Slice, Slice)>, KvError> {
        self.check_open()?;
        Ok(self.read_range(begin.as_bytes(), end.as_bytes(), limit, reverse))
    }

    fn set(&mut self, key: &Slice, value: &Slice) {
        self.writes
            .insert(key.as_bytes().to_vec(), Some(value.as_bytes().to_vec()));
    }

    fn clear(&mut self, key: &Slice) {
        self.writes.insert(key.as_bytes().to_vec(), None);
    }

    fn commit(&mut self) -> Result<(), KvError> {
        self.check_open()?;
        self.done = true;
        let mut store = self.store.lock().unwrap();

        // Validate: anything this transaction read must be unchanged since
        // its read version.
        let stale = |version: &u64| *version > self.read_version;
        for key in &self.read_keys {
            if store.write_versions.get(key).is_some_and(stale) {
                trace!(key = %Slice::copy_of(key), "point-read conflict");
                return Err(KvError::Conflict);
            }
        }
        for (begin, end) in &self.read_ranges {
            if begin >= end {
                continue;
            }
            let bounds = (Bound::Included(begin.as_slice()), Bound::Excluded(end.as_slice()));
            if store
                .write_versions
                .range::<[u8], _>(bounds)
                .any(|(_, version)| stale(version))
            {
                trace!(
                    begin = %Slice::copy_of(begin),
                    end = %Slice::copy_of(end),
                    "range-read conflict"
                );
                return Err(KvError::Conflict);
            }
        }

        // Apply every buffered write atomically under the new version.
        store.version += 1;
        let version = store.version;
        for (key, value) in std::mem::take(&mut self.writes) {
            match value {
                Some(v) => {
                    store.data.insert(key.clone(), v);
                }
                None => {
                    store.data.remove(&key);
                }
            }
            store.write_versions.insert(key, version);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Slice {
        Slice::copy_of(s.as_bytes())
    }

    fn put(db: &MemDb, key: &str, value: &str) {
        let cancel = CancelToken::new();
        let mut tx = db.begin(&cancel).unwrap();
        tx.set(&k(key), &k(value));
        tx.commit().unwrap();
    }

    // ── Visibility ───────────────────────────────────────────────────────────

    #[test]
    fn committed_writes_become_visible() {
        let db = MemDb::new();
        put(&db, "a", "1");
        let cancel = CancelToken::new();
        let mut tx = db.begin(&cancel).unwrap();
        assert_eq!(tx.get(&k("a")).unwrap(), Some(k("1")));
        assert_eq!(tx.get(&k("missing")).unwrap(), None);
    }

    #[test]
    fn uncommitted_writes_are_invisible_and_dropped() {
        let db = MemDb::new();
        {
            let cancel = CancelToken::new();
            let mut tx = db.begin(&cancel).unwrap();
            tx.set(&k("a"), &k("1"));
            // dropped without commit
        }
        assert_eq!(db.entry_count(), 0);
    }

    #[test]
    fn reads_observe_own_writes() {
        let db = MemDb::new();
        put(&db, "a", "old");
        let cancel = CancelToken::new();
        let mut tx = db.begin(&cancel).unwrap();
        tx.set(&k("a"), &k("new"));
        tx.clear(&k("a"));
        assert_eq!(tx.get(&k("a")).unwrap(), None);
        tx.set(&k("a"), &k("newer"));
        assert_eq!(tx.get(&k("a")).unwrap(), Some(k("newer")));
    }

    // ── Range reads ──────────────────────────────────────────────────────────

    #[test]
    fn range_merges_overlay_orders_limits_reverses() {
        let db = MemDb::new();
        put(&db, "b", "2");
        put(&db, "d", "4");
        let cancel = CancelToken::new();
        let mut tx = db.begin(&cancel).unwrap();
        tx.set(&k("a"), &k("1"));
        tx.set(&k("c"), &k("3"));
        tx.clear(&k("d"));

        let all = tx.get_range(&k("a"), &k("z"), 0, false).unwrap();
        let keys: Vec<_> = all.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(keys, vec![k("a"), k("b"), k("c")]);

        let last_two = tx.get_range(&k("a"), &k("z"), 2, true).unwrap();
        let keys: Vec<_> = last_two.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(keys, vec![k("c"), k("b")]);

        // Inverted bounds read as empty rather than failing.
        assert!(tx.get_range(&k("z"), &k("a"), 0, false).unwrap().is_empty());
    }

    // ── Conflict detection ───────────────────────────────────────────────────

    #[test]
    fn write_after_read_conflicts() {
        let db = MemDb::new();
        put(&db, "a", "1");
        let cancel = CancelToken::new();

        let mut reader = db.begin(&cancel).unwrap();
        reader.get(&k("a")).unwrap();

        put(&db, "a", "2"); // interleaved writer

        reader.set(&k("b"), &k("x"));
        assert_eq!(reader.commit(), Err(KvError::Conflict));
        // The failed transaction applied nothing.
        assert_eq!(db.entry_count(), 1);
    }

    #[test]
    fn range_read_conflicts_with_clear_inside_it() {
        let db = MemDb::new();
        put(&db, "m1", "1");
        let cancel = CancelToken::new();

        let mut reader = db.begin(&cancel).unwrap();
        reader.get_range(&k("m"), &k("n"), 0, false).unwrap();

        // Interleaved clear inside the scanned range.
        let mut writer = db.begin(&cancel).unwrap();
        writer.clear(&k("m1"));
        writer.commit().unwrap();

        reader.set(&k("out"), &k("x"));
        assert_eq!(reader.commit(), Err(KvError::Conflict));
    }

    #[test]
    fn snapshot_reads_do_not_conflict() {
        let db = MemDb::new();
        put(&db, "a", "1");
        let cancel = CancelToken::new();

        let mut reader = db.begin(&cancel).unwrap();
        reader.snapshot_get(&k("a")).unwrap();
        reader.snapshot_get_range(&k("a"), &k("z"), 0, false).unwrap();

        put(&db, "a", "2");

        reader.set(&k("b"), &k("x"));
        assert_eq!(reader.commit(), Ok(()));
    }

    #[test]
    fn blind_writes_never_conflict() {
        let db = MemDb::new();
        let cancel = CancelToken::new();
        let mut a = db.begin(&cancel).unwrap();
        let mut b = db.begin(&cancel).unwrap();
        a.set(&k("k1"), &k("1"));
        b.set(&k("k2"), &k("2"));
        a.commit().unwrap();
        b.commit().unwrap();
        assert_eq!(db.entry_count(), 2);
    }

    // ── Cancellation and lifecycle ───────────────────────────────────────────

    #[test]
    fn cancellation_takes_effect_at_next_operation() {
        let db = MemDb::new();
        let cancel = CancelToken::new();
        let mut tx = db.begin(&cancel).unwrap();
        tx.set(&k("a"), &k("1"));
        cancel.cancel();
        assert_eq!(tx.get(&k("a")), Err(KvError::Cancelled));
        assert_eq!(tx.commit(), Err(KvError::Cancelled));
        assert_eq!(db.entry_count(), 0);
        assert!(matches!(db.begin(&cancel), Err(KvError::Cancelled)));
    }

    #[test]
    fn committed_transaction_is_closed() {
        let db = MemDb::new();
        let cancel = CancelToken::new();
        let mut tx = db.begin(&cancel).unwrap();
        tx.set(&k("a"), &k("1"));
        tx.commit().unwrap();
        assert_eq!(tx.get(&k("a")), Err(KvError::Closed));
        assert_eq!(tx.commit(), Err(KvError::Closed));
    }
}
