// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared arrays.

use super::In;
use super::Out;
use super::SharedRef;
use super::list_delete;
use super::list_get;
use super::list_insert;
use super::list_values;
use crate::encoding::any::Any;
use crate::error::Result;
use crate::transaction::ReadTxn;
use crate::transaction::Transaction;

super::shared_ref!(ArrayRef);

impl ArrayRef {
    /// Number of visible elements.
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.ptr()).map(|b| b.block_len).unwrap_or(0);
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    pub fn insert<V: Into<In>>(&self, txn: &mut Transaction<'_>, index: u32, value: V) -> Result<()> {
        return list_insert(txn, self.ptr(), index, vec![value.into()]);
    }

    /// Insert several values at once; plain values end up in one item.
    pub fn insert_range(&self, txn: &mut Transaction<'_>, index: u32, values: Vec<In>) -> Result<()> {
        return list_insert(txn, self.ptr(), index, values);
    }

    pub fn push_back<V: Into<In>>(&self, txn: &mut Transaction<'_>, value: V) -> Result<()> {
        let len = self.len(txn);
        return self.insert(txn, len, value);
    }

    pub fn push_front<V: Into<In>>(&self, txn: &mut Transaction<'_>, value: V) -> Result<()> {
        return self.insert(txn, 0, value);
    }

    pub fn remove(&self, txn: &mut Transaction<'_>, index: u32) -> Result<()> {
        return list_delete(txn, self.ptr(), index, 1);
    }

    pub fn remove_range(&self, txn: &mut Transaction<'_>, index: u32, len: u32) -> Result<()> {
        return list_delete(txn, self.ptr(), index, len);
    }

    pub fn get<T: ReadTxn>(&self, txn: &T, index: u32) -> Option<Out> {
        return list_get(txn.store(), self.ptr(), index);
    }

    pub fn iter<T: ReadTxn>(&self, txn: &T) -> std::vec::IntoIter<Out> {
        return list_values(txn.store(), self.ptr()).into_iter();
    }

    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        let values: Vec<Any> = list_values(txn.store(), self.ptr()).iter().map(|v| v.to_json(txn)).collect();
        return Any::from(values);
    }
}
