// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::marker::PhantomData;

use super::{Block, BlockBuilder, PrimitiveFixedWidthEncode};

/// Encodes fixed-width values one after another into a block.
pub struct PlainPrimitiveBlockBuilder<T: PrimitiveFixedWidthEncode> {
    data: Vec<u8>,
    target_size: usize,
    _phantom: PhantomData<T>,
}

impl<T: PrimitiveFixedWidthEncode> PlainPrimitiveBlockBuilder<T> {
    pub fn new(target_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(target_size),
            target_size,
            _phantom: PhantomData,
        }
    }
}

impl<T: PrimitiveFixedWidthEncode> BlockBuilder<T> for PlainPrimitiveBlockBuilder<T> {
    fn append(&mut self, item: &T) {
        item.encode(&mut self.data);
    }

    fn estimated_size(&self) -> usize {
        self.data.len()
    }

    fn should_finish(&self, _next_item: &T) -> bool {
        !self.data.is_empty() && self.estimated_size() + T::WIDTH > self.target_size
    }

    fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Scans values from a plain primitive block pre-loaded in memory.
pub struct PlainPrimitiveBlockIterator<T: PrimitiveFixedWidthEncode> {
    block: Block,
    row_count: usize,
    next_row: usize,
    _phantom: PhantomData<T>,
}

impl<T: PrimitiveFixedWidthEncode> PlainPrimitiveBlockIterator<T> {
    pub fn new(block: Block, row_count: usize) -> Self {
        Self {
            block,
            row_count,
            next_row: 0,
            _phantom: PhantomData,
        }
    }

    /// Decode up to `expected_size` values (all remaining when `None`).
    pub fn next_batch(&mut self, expected_size: Option<usize>) -> Vec<T> {
        let mut values = vec![];
        loop {
            if let Some(expected_size) = expected_size {
                if values.len() >= expected_size {
                    break;
                }
            }
            if self.next_row >= self.row_count {
                break;
            }
            let mut buf = &self.block[self.next_row * T::WIDTH..];
            values.push(T::decode(&mut buf));
            self.next_row += 1;
        }
        values
    }

    pub fn skip(&mut self, cnt: usize) {
        self.next_row += cnt;
    }

    pub fn remaining_items(&self) -> usize {
        self.row_count - self.next_row
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_build_u32() {
        let mut builder = PlainPrimitiveBlockBuilder::<u32>::new(16);
        builder.append(&1);
        builder.append(&2);
        builder.append(&3);
        assert_eq!(builder.estimated_size(), 12);
        assert!(!builder.should_finish(&4));
        builder.append(&4);
        assert!(builder.should_finish(&5));
        assert_eq!(builder.finish().len(), 16);
    }

    #[test]
    fn test_scan_u32() {
        let mut builder = PlainPrimitiveBlockBuilder::<u32>::new(128);
        for v in [1u32, 2, 3, 4, 5] {
            builder.append(&v);
        }
        let block = Bytes::from(builder.finish());

        let mut iter = PlainPrimitiveBlockIterator::<u32>::new(block.clone(), 5);
        assert_eq!(iter.next_batch(Some(2)), vec![1, 2]);
        assert_eq!(iter.remaining_items(), 3);
        assert_eq!(iter.next_batch(None), vec![3, 4, 5]);
        assert!(iter.next_batch(None).is_empty());

        let mut iter = PlainPrimitiveBlockIterator::<u32>::new(block, 5);
        iter.skip(3);
        assert_eq!(iter.next_batch(None), vec![4, 5]);
    }
}
