// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::cmp::Ordering;

use super::layer_iterator::DiskLayerIterator;
use super::memstore::MemStoreIterator;
use crate::catalog::Schema;
use crate::error::StorageResult;
use crate::row::RowBlock;

const MERGE_BATCH_SIZE: usize = 1024;

/// One input of a merge: the live memstore or any layer variant. A
/// keys-flushed layer serves rows from its retired memstore, so it shows up
/// here as a memstore scan too.
#[derive(Debug)]
pub enum SourceIterator {
    Mem(MemStoreIterator),
    Disk(DiskLayerIterator),
}

impl SourceIterator {
    pub async fn next_batch(
        &mut self,
        block: &mut RowBlock,
        keys: &mut Vec<Vec<u8>>,
    ) -> StorageResult<usize> {
        match self {
            SourceIterator::Mem(iter) => Ok(iter.next_batch(block, Some(keys))),
            SourceIterator::Disk(iter) => iter.next_batch(block, keys).await,
        }
    }

    pub async fn seek_at_or_after(&mut self, key: &[u8]) -> StorageResult<bool> {
        match self {
            SourceIterator::Mem(iter) => Ok(iter.seek_at_or_after(key)),
            SourceIterator::Disk(iter) => iter.seek_at_or_after(key).await,
        }
    }

    pub fn has_next(&self) -> bool {
        match self {
            SourceIterator::Mem(iter) => iter.has_next(),
            SourceIterator::Disk(iter) => iter.has_next(),
        }
    }
}

/// Buffered batch of one source.
#[derive(Debug)]
struct SourceBatch {
    block: RowBlock,
    keys: Vec<Vec<u8>>,
}

/// Merges the memstore and every layer into one ascending-key stream.
///
/// Sources are ordered newest first: the live memstore, then layers from
/// newest to oldest. Every key in the union is emitted exactly once; on a
/// key collision the source with the smallest index wins and the older
/// duplicates are skipped.
#[derive(Debug)]
pub struct MergeIterator {
    sources: Vec<SourceIterator>,
    projection: Schema,

    /// Buffered batch per source; `None` when drained or not yet fetched.
    buffers: Vec<Option<SourceBatch>>,

    /// Sources that have returned an empty batch.
    has_finished: Vec<bool>,

    /// Min-heap of `(source_idx, row_in_batch)` ordered by (encoded key,
    /// source index), holding at most one entry per buffered source. The
    /// compare logic is custom, so the heap is hand-rolled.
    pending_heap: Vec<(usize, usize)>,
}

impl MergeIterator {
    pub fn new(sources: Vec<SourceIterator>, projection: Schema) -> Self {
        Self {
            buffers: sources.iter().map(|_| None).collect(),
            has_finished: vec![false; sources.len()],
            sources,
            projection,
            pending_heap: vec![],
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.projection
    }

    pub fn has_next(&self) -> bool {
        !self.pending_heap.is_empty()
            || self
                .sources
                .iter()
                .zip(&self.has_finished)
                .any(|(source, finished)| !finished && source.has_next())
    }

    /// Seek every source to the first key `>= key` and drop all buffered
    /// state. Returns whether any source has the key right now.
    pub async fn seek_at_or_after(&mut self, key: &[u8]) -> StorageResult<bool> {
        let mut exact = false;
        for source in &mut self.sources {
            exact |= source.seek_at_or_after(key).await?;
        }
        for buffer in &mut self.buffers {
            *buffer = None;
        }
        for finished in &mut self.has_finished {
            *finished = false;
        }
        self.pending_heap.clear();
        Ok(exact)
    }

    fn key_of(&self, (source_idx, row_idx): (usize, usize)) -> &[u8] {
        &self.buffers[source_idx].as_ref().unwrap().keys[row_idx]
    }

    fn compare_entries(&self, left: &(usize, usize), right: &(usize, usize)) -> Ordering {
        self.key_of(*left)
            .cmp(self.key_of(*right))
            .then(left.0.cmp(&right.0))
    }

    fn compare_in_heap(&self, left_idx: usize, right_idx: usize) -> Ordering {
        self.compare_entries(&self.pending_heap[left_idx], &self.pending_heap[right_idx])
    }

    /// Add an entry to the pending heap: append at the end, then sift up.
    /// (parent of child `c` is `(c - 1) / 2`)
    fn add_pending_data(&mut self, entry: (usize, usize)) {
        self.pending_heap.push(entry);
        let mut current = self.pending_heap.len() - 1;
        while current > 0 {
            let parent = (current - 1) / 2;
            if self.compare_in_heap(parent, current) == Ordering::Greater {
                self.pending_heap.swap(parent, current);
                current = parent;
            } else {
                break;
            }
        }
    }

    fn peek_pending_data(&self) -> (usize, usize) {
        self.pending_heap[0]
    }

    /// Pop the top entry and insert a new one in a single sift down.
    ///
    /// When sources overlap only lightly, the replacement usually stays at
    /// the root (its key follows the popped one in the same source), so
    /// this beats a pop followed by a push.
    fn replace_pending_data(&mut self, entry: (usize, usize)) -> (usize, usize) {
        let popped = std::mem::replace(&mut self.pending_heap[0], entry);
        let mut current = 0;
        loop {
            let left = current * 2 + 1;
            if left >= self.pending_heap.len() {
                break;
            }
            let right = current * 2 + 2;
            let mut child = left;
            if right < self.pending_heap.len()
                && self.compare_in_heap(left, right) == Ordering::Greater
            {
                child = right;
            }
            if self.compare_in_heap(current, child) != Ordering::Greater {
                break;
            }
            self.pending_heap.swap(current, child);
            current = child;
        }
        popped
    }

    fn pop_pending_data(&mut self) -> (usize, usize) {
        let last = self.pending_heap.pop().unwrap();
        if self.pending_heap.is_empty() {
            last
        } else {
            self.replace_pending_data(last)
        }
    }

    /// Fetch a batch for source `idx`. Returns whether anything arrived.
    async fn request_fill_buffer(&mut self, idx: usize) -> StorageResult<bool> {
        if self.has_finished[idx] {
            return Ok(false);
        }
        let mut block = RowBlock::new(self.projection.clone(), MERGE_BATCH_SIZE);
        let mut keys = vec![];
        let n = self.sources[idx].next_batch(&mut block, &mut keys).await?;
        if n == 0 {
            self.has_finished[idx] = true;
            return Ok(false);
        }
        self.buffers[idx] = Some(SourceBatch { block, keys });
        Ok(true)
    }

    /// Advance the heap entry of one source past its current row. Returns
    /// `false` when that source's buffer is drained (its heap entry is
    /// popped and the buffer dropped).
    fn advance_source(&mut self) -> bool {
        let (source_idx, row_idx) = self.peek_pending_data();
        let batch_len = self.buffers[source_idx].as_ref().unwrap().keys.len();
        if row_idx + 1 < batch_len {
            self.replace_pending_data((source_idx, row_idx + 1));
            true
        } else {
            self.pop_pending_data();
            self.buffers[source_idx] = None;
            false
        }
    }

    /// Fill `dst` with the next merged rows (and their encoded keys when
    /// asked for). Returns the row count; 0 means the merge is exhausted.
    ///
    /// Except for the first call, a call drains buffered rows until either
    /// the block is full or one source's buffer runs out, so it incurs at
    /// most one batch fetch per source.
    pub async fn next_batch(
        &mut self,
        dst: &mut RowBlock,
        mut keys: Option<&mut Vec<Vec<u8>>>,
    ) -> StorageResult<usize> {
        dst.reset();
        if let Some(keys) = keys.as_deref_mut() {
            keys.clear();
        }

        // make sure every live source has a buffered batch in the heap
        for idx in 0..self.sources.len() {
            if self.buffers[idx].is_none() && self.request_fill_buffer(idx).await? {
                self.add_pending_data((idx, 0));
            }
        }

        let mut copied = 0;
        'fill: while copied < dst.capacity() && !self.pending_heap.is_empty() {
            // the heap top is the next key overall; with ties it is the
            // newest source holding that key
            let (source_idx, row_idx) = self.peek_pending_data();
            let batch = self.buffers[source_idx].as_ref().unwrap();
            dst.copy_row(copied, batch.block.row(row_idx));
            let winner_key = batch.keys[row_idx].clone();
            if let Some(keys) = keys.as_deref_mut() {
                keys.push(winner_key.clone());
            }
            copied += 1;

            let mut drained = !self.advance_source();

            // skip the same key in every older source
            while !self.pending_heap.is_empty()
                && self.key_of(self.peek_pending_data()) == winner_key.as_slice()
            {
                drained |= !self.advance_source();
            }

            // a drained buffer invalidates the "all live sources are
            // buffered" invariant; stop and refill on the next call
            if drained {
                break 'fill;
            }
        }

        dst.set_row_count(copied);
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::row::Row;
    use crate::tablet::memstore::MemStore;
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

    fn store_with(schema: &Schema, rows: &[(&str, u32)]) -> Arc<MemStore> {
        let store = Arc::new(MemStore::new(schema.clone()));
        for (key, val) in rows {
            let row = Row::new(schema, vec![(*key).into(), (*val).into()]).unwrap();
            let encoded = schema.encode_key(&[(*key).into()]).unwrap();
            store.insert(encoded, &row).unwrap();
        }
        store
    }

    async fn collect(merge: &mut MergeIterator, schema: &Schema) -> Vec<(String, u32)> {
        // a tiny destination block forces multi-batch merges
        let mut block = RowBlock::new(schema.clone(), 3);
        let mut out = vec![];
        loop {
            let n = merge.next_batch(&mut block, None).await.unwrap();
            if n == 0 {
                break;
            }
            for i in 0..n {
                let row = block.row(i);
                out.push((
                    String::from_utf8(row.get_bytes(0).to_vec()).unwrap(),
                    row.get_u32(1),
                ));
            }
        }
        out
    }

    #[tokio::test]
    async fn test_merge_disjoint_sources() {
        let schema = test_schema();
        let a = store_with(&schema, &[("b", 1), ("d", 2)]);
        let b = store_with(&schema, &[("a", 3), ("c", 4), ("e", 5)]);
        let sources = vec![
            SourceIterator::Mem(a.iter(schema.clone()).unwrap()),
            SourceIterator::Mem(b.iter(schema.clone()).unwrap()),
        ];
        let mut merge = MergeIterator::new(sources, schema.clone());
        assert!(merge.has_next());
        let rows = collect(&mut merge, &schema).await;
        assert_eq!(
            rows,
            vec![
                ("a".into(), 3),
                ("b".into(), 1),
                ("c".into(), 4),
                ("d".into(), 2),
                ("e".into(), 5)
            ]
        );
        assert!(!merge.has_next());
    }

    #[tokio::test]
    async fn test_merge_newest_wins() {
        let schema = test_schema();
        // source 0 is the newest; its value for "c" must win, and the
        // value in both older sources must be skipped exactly once
        let newest = store_with(&schema, &[("c", 100)]);
        let middle = store_with(&schema, &[("b", 2), ("c", 200)]);
        let oldest = store_with(&schema, &[("a", 1), ("c", 300), ("d", 4)]);
        let sources = vec![
            SourceIterator::Mem(newest.iter(schema.clone()).unwrap()),
            SourceIterator::Mem(middle.iter(schema.clone()).unwrap()),
            SourceIterator::Mem(oldest.iter(schema.clone()).unwrap()),
        ];
        let mut merge = MergeIterator::new(sources, schema.clone());
        let rows = collect(&mut merge, &schema).await;
        assert_eq!(
            rows,
            vec![
                ("a".into(), 1),
                ("b".into(), 2),
                ("c".into(), 100),
                ("d".into(), 4)
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_seek() {
        let schema = test_schema();
        let a = store_with(&schema, &[("a", 1), ("c", 3)]);
        let b = store_with(&schema, &[("b", 2), ("d", 4)]);
        let sources = vec![
            SourceIterator::Mem(a.iter(schema.clone()).unwrap()),
            SourceIterator::Mem(b.iter(schema.clone()).unwrap()),
        ];
        let mut merge = MergeIterator::new(sources, schema.clone());
        let exact = merge
            .seek_at_or_after(&schema.encode_key(&["b".into()]).unwrap())
            .await
            .unwrap();
        assert!(exact);
        let rows = collect(&mut merge, &schema).await;
        assert_eq!(
            rows,
            vec![("b".into(), 2), ("c".into(), 3), ("d".into(), 4)]
        );
    }
}
