// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared maps.
//!
//! Every key is a slot holding a chain of items; the rightmost one is the
//! current value. Concurrent writes to the same key are ordered by the same
//! integration rules as list inserts, so the winner is deterministic.

use std::sync::Arc;

use super::In;
use super::Out;
use super::SharedRef;
use super::map_delete;
use super::map_entries;
use super::map_get;
use super::map_set;
use super::map_to_json;
use crate::encoding::any::Any;
use crate::transaction::ReadTxn;
use crate::transaction::Transaction;

super::shared_ref!(MapRef);

impl MapRef {
    /// Number of live entries.
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return map_entries(txn.store(), self.ptr()).len() as u32;
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    pub fn insert<V: Into<In>>(&self, txn: &mut Transaction<'_>, key: &str, value: V) {
        map_set(txn, self.ptr(), Arc::from(key), value.into());
    }

    /// Remove a key. Returns the removed value.
    pub fn remove(&self, txn: &mut Transaction<'_>, key: &str) -> Option<Out> {
        let previous = map_get(txn.store(), self.ptr(), key);
        map_delete(txn, self.ptr(), key);
        return previous;
    }

    pub fn get<T: ReadTxn>(&self, txn: &T, key: &str) -> Option<Out> {
        return map_get(txn.store(), self.ptr(), key);
    }

    pub fn contains_key<T: ReadTxn>(&self, txn: &T, key: &str) -> bool {
        return map_get(txn.store(), self.ptr(), key).is_some();
    }

    /// Live keys, sorted.
    pub fn keys<T: ReadTxn>(&self, txn: &T) -> Vec<Arc<str>> {
        return map_entries(txn.store(), self.ptr()).into_iter().map(|(key, _)| key).collect();
    }

    /// Live entries, sorted by key.
    pub fn iter<T: ReadTxn>(&self, txn: &T) -> std::vec::IntoIter<(Arc<str>, Out)> {
        return map_entries(txn.store(), self.ptr()).into_iter();
    }

    /// Remove every entry.
    pub fn clear(&self, txn: &mut Transaction<'_>) {
        for key in self.keys(txn) {
            map_delete(txn, self.ptr(), &key);
        }
    }

    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        return map_to_json(txn, self.ptr());
    }
}
