// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use super::layer::DiskLayer;
use super::PackedVec;
use crate::catalog::Schema;
use crate::cfile::CFileIterator;
use crate::error::StorageResult;
use crate::row::RowBlock;

/// Combined, projected row iterator over one disk layer.
///
/// One column iterator per projected column plus the key iterator, all
/// advancing in lockstep: the i-th row of a batch is assembled from the
/// i-th value of every column, with indirect bytes copied into the target
/// block's arena. Holds cloned file handles, so it does not borrow the
/// layer itself.
#[derive(Debug)]
pub struct DiskLayerIterator {
    projection: Schema,
    key_iter: CFileIterator,
    col_iters: PackedVec<CFileIterator>,
}

impl DiskLayerIterator {
    pub(crate) fn new(layer: &DiskLayer, projection: Schema) -> StorageResult<Self> {
        let mapping = projection.project_from(layer.schema())?;
        Ok(Self {
            projection,
            key_iter: layer.key_reader().new_iterator(),
            col_iters: mapping
                .iter()
                .map(|&src| layer.column(src).new_iterator())
                .collect(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.projection
    }

    pub fn has_next(&self) -> bool {
        self.key_iter.has_next()
    }

    pub fn seek_to_ordinal(&mut self, ordinal: u32) {
        self.key_iter.seek_to_ordinal(ordinal);
        for iter in &mut self.col_iters {
            iter.seek_to_ordinal(ordinal);
        }
    }

    /// Position at the first row with key `>= key`. The empty key means the
    /// start of the layer; a non-empty key resolves through the key file
    /// and then ordinal-aligns every column. Returns whether the match is
    /// exact.
    pub async fn seek_at_or_after(&mut self, key: &[u8]) -> StorageResult<bool> {
        if key.is_empty() {
            self.seek_to_ordinal(0);
            return Ok(false);
        }
        match self.key_iter.reader().find_at_or_after(key).await? {
            Some((ordinal, exact)) => {
                self.seek_to_ordinal(ordinal);
                Ok(exact)
            }
            None => {
                // past the end of the layer
                self.seek_to_ordinal(self.key_iter.reader().row_count() as u32);
                Ok(false)
            }
        }
    }

    /// Fill `block` with the next rows and `keys` with their encoded keys.
    /// Returns the row count; 0 means the iterator is exhausted.
    pub async fn next_batch(
        &mut self,
        block: &mut RowBlock,
        keys: &mut Vec<Vec<u8>>,
    ) -> StorageResult<usize> {
        block.reset();
        keys.clear();
        if !self.has_next() {
            return Ok(0);
        }

        let mut key_values = Vec::with_capacity(block.capacity());
        let n = self
            .key_iter
            .next_bytes_batch(block.capacity(), &mut key_values)
            .await?;
        for key in &key_values {
            keys.push(key.to_vec());
        }

        for (col, iter) in self.col_iters.iter_mut().enumerate() {
            let copied = iter.copy_next_values(n, block, col).await?;
            assert_eq!(copied, n, "column iterators out of lockstep");
        }
        block.set_row_count(n);
        Ok(n)
    }
}
