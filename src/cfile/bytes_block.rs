// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use bytes::BufMut;

use super::{Block, BlockBuilder};

/// Encodes variable-length byte strings into a block. The layout is
/// ```plain
/// | offset (u32) | offset | offset | data | data | data |
/// ```
/// where each offset is the end position of the corresponding value.
pub struct PlainBytesBlockBuilder {
    data: Vec<u8>,
    offsets: Vec<u32>,
    target_size: usize,
}

impl PlainBytesBlockBuilder {
    pub fn new(target_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(target_size),
            offsets: vec![],
            target_size,
        }
    }
}

impl BlockBuilder<[u8]> for PlainBytesBlockBuilder {
    fn append(&mut self, item: &[u8]) {
        self.data.extend_from_slice(item);
        self.offsets.push(self.data.len() as u32);
    }

    fn estimated_size(&self) -> usize {
        self.data.len() + self.offsets.len() * std::mem::size_of::<u32>()
    }

    fn should_finish(&self, next_item: &[u8]) -> bool {
        !self.data.is_empty()
            && self.estimated_size() + next_item.len() + std::mem::size_of::<u32>()
                > self.target_size
    }

    fn finish(self) -> Vec<u8> {
        let mut encoded_data = vec![];
        for offset in self.offsets {
            encoded_data.put_u32_le(offset);
        }
        encoded_data.extend(self.data);
        encoded_data
    }
}

/// Scans byte strings from a plain bytes block pre-loaded in memory. Values
/// are yielded as cheap sub-slices of the block.
pub struct PlainBytesBlockIterator {
    block: Block,
    row_count: usize,
    next_row: usize,
}

impl PlainBytesBlockIterator {
    pub fn new(block: Block, row_count: usize) -> Self {
        Self {
            block,
            row_count,
            next_row: 0,
        }
    }

    fn offset_at(&self, row: usize) -> usize {
        let pos = row * std::mem::size_of::<u32>();
        u32::from_le_bytes(self.block[pos..pos + 4].try_into().unwrap()) as usize
    }

    /// Decode up to `expected_size` values (all remaining when `None`).
    pub fn next_batch(&mut self, expected_size: Option<usize>) -> Vec<Block> {
        let offsets_length = self.row_count * std::mem::size_of::<u32>();
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
            let from = if self.next_row == 0 {
                0
            } else {
                self.offset_at(self.next_row - 1)
            };
            let to = self.offset_at(self.next_row);
            values.push(self.block.slice(offsets_length + from..offsets_length + to));
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
    fn test_build_bytes() {
        let mut builder = PlainBytesBlockBuilder::new(32);
        builder.append(b"233");
        builder.append(b"23333");
        builder.append(b"2333333");
        assert_eq!(builder.estimated_size(), 15 + 4 * 3);
        assert!(builder.should_finish(b"2333333333"));
        assert_eq!(builder.finish().len(), 15 + 4 * 3);
    }

    #[test]
    fn test_scan_bytes() {
        let mut builder = PlainBytesBlockBuilder::new(128);
        builder.append(b"hello");
        builder.append(b"");
        builder.append(b"world");
        let block = Bytes::from(builder.finish());

        let mut iter = PlainBytesBlockIterator::new(block.clone(), 3);
        let values = iter.next_batch(Some(2));
        assert_eq!(values[0].as_ref(), b"hello");
        assert_eq!(values[1].as_ref(), b"");
        assert_eq!(iter.remaining_items(), 1);
        assert_eq!(iter.next_batch(None)[0].as_ref(), b"world");

        let mut iter = PlainBytesBlockIterator::new(block, 3);
        iter.skip(2);
        assert_eq!(iter.next_batch(None)[0].as_ref(), b"world");
    }
}
