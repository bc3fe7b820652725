// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::Schema;
use crate::error::{StorageResult, TracedStorageError};
use crate::row::{Arena, Row, RowBlock, RowDelta, RowRef};
use crate::types::DataType;

/// The mutable, ordered, in-memory side of a tablet.
///
/// Rows are fixed-width records keyed by their encoded key; indirect data
/// lives in a store-wide arena. Updates rewrite records in place — there is
/// no versioning — so a scan concurrent with an update observes the pre- or
/// post-update value for rows it has not yielded yet. The tablet serializes
/// writers; readers only take the read side of the lock.
#[derive(Debug)]
pub struct MemStore {
    schema: Schema,
    inner: RwLock<MemStoreInner>,
}

#[derive(Default, Debug)]
struct MemStoreInner {
    rows: BTreeMap<Vec<u8>, Vec<u8>>,
    arena: Arena,
}

impl MemStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            inner: RwLock::new(MemStoreInner::default()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Insert a row under its encoded key.
    pub fn insert(&self, key: Vec<u8>, row: &Row) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let MemStoreInner { rows, arena } = &mut *inner;
        if rows.contains_key(&key) {
            return Err(TracedStorageError::already_present(String::from_utf8_lossy(
                &key,
            )));
        }
        let record = row.to_record(arena);
        rows.insert(key, record);
        Ok(())
    }

    /// Apply a delta to the row at `key`, in place.
    pub fn update_row(&self, key: &[u8], delta: &RowDelta) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let MemStoreInner { rows, arena } = &mut *inner;
        let record = rows.get_mut(key).ok_or_else(|| {
            TracedStorageError::not_found("row", String::from_utf8_lossy(key))
        })?;
        delta.apply(&self.schema, record, arena);
        Ok(())
    }

    pub fn check_row_present(&self, key: &[u8]) -> bool {
        self.inner.read().rows.contains_key(key)
    }

    /// Ordinal of `key` among the current entries, or `None` if absent.
    /// Linear in the number of preceding keys; used by scans that resume.
    pub fn find_row(&self, key: &[u8]) -> Option<usize> {
        let inner = self.inner.read();
        if !inner.rows.contains_key(key) {
            return None;
        }
        Some(
            inner
                .rows
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
                .count(),
        )
    }

    /// An ascending-key scan in `projection`.
    pub fn iter(self: &Arc<Self>, projection: Schema) -> StorageResult<MemStoreIterator> {
        let mapping = projection.project_from(&self.schema)?;
        Ok(MemStoreIterator {
            store: self.clone(),
            projection,
            mapping,
            lower: Bound::Unbounded,
        })
    }
}

/// A restartable ascending scan over a memstore.
///
/// Each batch re-enters the map after the last yielded key, so the iterator
/// never holds the store lock between batches and a concurrent writer is
/// never blocked for longer than one batch copy.
#[derive(Debug)]
pub struct MemStoreIterator {
    store: Arc<MemStore>,
    projection: Schema,
    mapping: Vec<usize>,
    lower: Bound<Vec<u8>>,
}

impl MemStoreIterator {
    pub fn schema(&self) -> &Schema {
        &self.projection
    }

    /// Position at the first row with key `>= key`; an empty key means the
    /// start. Returns whether the key is present right now.
    pub fn seek_at_or_after(&mut self, key: &[u8]) -> bool {
        if key.is_empty() {
            self.lower = Bound::Unbounded;
            return false;
        }
        self.lower = Bound::Included(key.to_vec());
        self.store.check_row_present(key)
    }

    pub fn has_next(&self) -> bool {
        let inner = self.store.inner.read();
        inner
            .rows
            .range((self.lower.clone(), Bound::Unbounded))
            .next()
            .is_some()
    }

    /// Copy up to `block.capacity()` rows into `block`, and their encoded
    /// keys into `keys` when asked for. Returns the row count; 0 means the
    /// scan is exhausted.
    pub fn next_batch(&mut self, block: &mut RowBlock, mut keys: Option<&mut Vec<Vec<u8>>>) -> usize {
        block.reset();
        if let Some(keys) = keys.as_deref_mut() {
            keys.clear();
        }
        let inner = self.store.inner.read();
        let mut copied = 0;
        let mut last_key: Option<Vec<u8>> = None;
        for (key, record) in inner.rows.range((self.lower.clone(), Bound::Unbounded)) {
            if copied == block.capacity() {
                break;
            }
            let row = RowRef::new(self.store.schema(), record, &inner.arena);
            for (dst_col, &src_col) in self.mapping.iter().enumerate() {
                match self.projection.column(dst_col).datatype() {
                    DataType::UInt32 => block.set_u32(copied, dst_col, row.get_u32(src_col)),
                    DataType::UInt64 => block.set_u64(copied, dst_col, row.get_u64(src_col)),
                    DataType::Bytes => block.set_bytes(copied, dst_col, row.get_bytes(src_col)),
                }
            }
            if let Some(keys) = keys.as_deref_mut() {
                keys.push(key.clone());
            }
            last_key = Some(key.clone());
            copied += 1;
        }
        drop(inner);
        block.set_row_count(copied);
        if let Some(last) = last_key {
            self.lower = Bound::Excluded(last);
        }
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn test_schema() -> Schema {
        Schema::new(
            vec![
                DataType::Bytes.to_column("key"),
                DataType::UInt32.to_column("val"),
            ],
            1,
        )
        .unwrap()
    }

    fn insert_row(store: &MemStore, key: &str, val: u32) -> StorageResult<()> {
        let schema = store.schema().clone();
        let row = Row::new(&schema, vec![key.into(), val.into()]).unwrap();
        let encoded = schema.encode_key(&[key.into()]).unwrap();
        store.insert(encoded, &row)
    }

    #[test]
    fn test_insert_duplicate() {
        let store = MemStore::new(test_schema());
        insert_row(&store, "hello world", 12345).unwrap();
        assert!(insert_row(&store, "hello world", 12345)
            .unwrap_err()
            .is_already_present());
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_update_row() {
        let schema = test_schema();
        let store = MemStore::new(schema.clone());
        insert_row(&store, "a", 1).unwrap();

        let key = schema.encode_key(&["a".into()]).unwrap();
        let mut delta = RowDelta::new(&schema);
        delta.update_column(&schema, 1, 10u32.into()).unwrap();
        store.update_row(&key, &delta).unwrap();

        let missing = schema.encode_key(&["b".into()]).unwrap();
        assert!(store.update_row(&missing, &delta).unwrap_err().is_not_found());
    }

    #[test]
    fn test_find_row() {
        let schema = test_schema();
        let store = MemStore::new(schema.clone());
        for key in ["b", "d", "f"] {
            insert_row(&store, key, 0).unwrap();
        }
        let encoded = |k: &str| schema.encode_key(&[k.into()]).unwrap();
        assert_eq!(store.find_row(&encoded("b")), Some(0));
        assert_eq!(store.find_row(&encoded("d")), Some(1));
        assert_eq!(store.find_row(&encoded("f")), Some(2));
        assert_eq!(store.find_row(&encoded("c")), None);
    }

    #[test]
    fn test_scan_is_ordered_and_restartable() {
        let schema = test_schema();
        let store = Arc::new(MemStore::new(schema.clone()));
        // insert out of order
        for (i, key) in ["delta", "alpha", "echo", "charlie", "bravo"]
            .iter()
            .enumerate()
        {
            insert_row(&store, key, i as u32).unwrap();
        }

        let mut iter = store.iter(schema.clone()).unwrap();
        let mut block = RowBlock::new(schema.clone(), 2);
        let mut seen = vec![];
        loop {
            let n = iter.next_batch(&mut block, None);
            if n == 0 {
                break;
            }
            for i in 0..n {
                seen.push(String::from_utf8(block.row(i).get_bytes(0).to_vec()).unwrap());
            }
            // rows inserted mid-scan behind the cursor must not show up
            let _ = insert_row(&store, "aaaa", 99);
        }
        assert_eq!(seen, ["alpha", "bravo", "charlie", "delta", "echo"]);
    }

    #[test]
    fn test_seek_at_or_after() {
        let schema = test_schema();
        let store = Arc::new(MemStore::new(schema.clone()));
        for key in ["a", "c", "e"] {
            insert_row(&store, key, 0).unwrap();
        }
        let mut iter = store.iter(schema.clone()).unwrap();
        let mut block = RowBlock::new(schema.clone(), 10);

        assert!(!iter.seek_at_or_after(&schema.encode_key(&["b".into()]).unwrap()));
        let n = iter.next_batch(&mut block, None);
        assert_eq!(n, 2);
        assert_eq!(block.row(0).get_bytes(0), b"c");

        assert!(iter.seek_at_or_after(&schema.encode_key(&["c".into()]).unwrap()));
        let n = iter.next_batch(&mut block, None);
        assert_eq!(n, 2);
        assert_eq!(block.row(0).get_bytes(0), b"c");
    }
}
