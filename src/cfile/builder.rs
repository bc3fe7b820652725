// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use super::{
    build_checksum, BlockBuilder, BlockHeader, BlockIndexEntry, ChecksumType, IndexBuilder,
    PlainBytesBlockBuilder, PlainPrimitiveBlockBuilder, BLOCK_HEADER_SIZE,
};
use crate::options::StorageOptions;
use crate::types::{DataType, Value};

/// Options for building column files.
#[derive(Clone)]
pub struct CFileOptions {
    pub target_block_size: usize,
    pub checksum_type: ChecksumType,
}

impl CFileOptions {
    pub fn from_storage_options(options: &StorageOptions) -> Self {
        Self {
            target_block_size: options.target_block_size,
            checksum_type: ChecksumType::Crc32,
        }
    }

    pub fn default_for_test() -> Self {
        Self {
            target_block_size: 128,
            checksum_type: ChecksumType::Crc32,
        }
    }
}

enum BlockBuilderImpl {
    UInt32(PlainPrimitiveBlockBuilder<u32>),
    UInt64(PlainPrimitiveBlockBuilder<u64>),
    Bytes(PlainBytesBlockBuilder),
}

/// Builds one self-describing column file.
///
/// Appended values are chunked into checksummed blocks; the block index is
/// maintained alongside, and [`finish`](CFileBuilder::finish) yields the
/// complete file content, ready to be written to disk as a unit.
pub struct CFileBuilder {
    options: CFileOptions,
    datatype: DataType,
    /// Record the first key of every block. Only for the key file, where
    /// values are encoded keys in ascending order.
    index_keys: bool,
    data: Vec<u8>,
    entries: Vec<BlockIndexEntry>,
    block: Option<BlockBuilderImpl>,
    block_first_key: Vec<u8>,
    block_first_row: u32,
    block_row_count: u32,
    next_row_id: u32,
}

impl CFileBuilder {
    pub fn new(datatype: DataType, options: CFileOptions, index_keys: bool) -> Self {
        assert!(!index_keys || datatype == DataType::Bytes);
        Self {
            options,
            datatype,
            index_keys,
            data: vec![],
            entries: vec![],
            block: None,
            block_first_key: vec![],
            block_first_row: 0,
            block_row_count: 0,
            next_row_id: 0,
        }
    }

    pub fn row_count(&self) -> u32 {
        self.next_row_id
    }

    pub fn append_u32(&mut self, item: u32) {
        debug_assert_eq!(self.datatype, DataType::UInt32);
        if let Some(BlockBuilderImpl::UInt32(builder)) = &self.block {
            if builder.should_finish(&item) {
                self.cut_block();
            }
        }
        if self.block.is_none() {
            self.open_block(None);
        }
        match self.block.as_mut().unwrap() {
            BlockBuilderImpl::UInt32(builder) => builder.append(&item),
            _ => unreachable!(),
        }
        self.block_row_count += 1;
        self.next_row_id += 1;
    }

    pub fn append_u64(&mut self, item: u64) {
        debug_assert_eq!(self.datatype, DataType::UInt64);
        if let Some(BlockBuilderImpl::UInt64(builder)) = &self.block {
            if builder.should_finish(&item) {
                self.cut_block();
            }
        }
        if self.block.is_none() {
            self.open_block(None);
        }
        match self.block.as_mut().unwrap() {
            BlockBuilderImpl::UInt64(builder) => builder.append(&item),
            _ => unreachable!(),
        }
        self.block_row_count += 1;
        self.next_row_id += 1;
    }

    pub fn append_bytes(&mut self, item: &[u8]) {
        debug_assert_eq!(self.datatype, DataType::Bytes);
        if let Some(BlockBuilderImpl::Bytes(builder)) = &self.block {
            if builder.should_finish(item) {
                self.cut_block();
            }
        }
        if self.block.is_none() {
            self.open_block(Some(item));
        }
        match self.block.as_mut().unwrap() {
            BlockBuilderImpl::Bytes(builder) => builder.append(item),
            _ => unreachable!(),
        }
        self.block_row_count += 1;
        self.next_row_id += 1;
    }

    pub fn append_value(&mut self, value: &Value) {
        match value {
            Value::UInt32(v) => self.append_u32(*v),
            Value::UInt64(v) => self.append_u64(*v),
            Value::Bytes(v) => self.append_bytes(v),
        }
    }

    fn open_block(&mut self, first_item: Option<&[u8]>) {
        self.block_first_row = self.next_row_id;
        if self.index_keys {
            self.block_first_key = first_item.unwrap().to_vec();
        }
        self.block = Some(match self.datatype {
            DataType::UInt32 => BlockBuilderImpl::UInt32(PlainPrimitiveBlockBuilder::new(
                self.options.target_block_size,
            )),
            DataType::UInt64 => BlockBuilderImpl::UInt64(PlainPrimitiveBlockBuilder::new(
                self.options.target_block_size,
            )),
            DataType::Bytes => {
                BlockBuilderImpl::Bytes(PlainBytesBlockBuilder::new(self.options.target_block_size))
            }
        });
    }

    fn cut_block(&mut self) {
        let Some(builder) = self.block.take() else {
            return;
        };
        let block_data = match builder {
            BlockBuilderImpl::UInt32(builder) => builder.finish(),
            BlockBuilderImpl::UInt64(builder) => builder.finish(),
            BlockBuilderImpl::Bytes(builder) => builder.finish(),
        };
        let header = BlockHeader {
            checksum_type: self.options.checksum_type,
            checksum: build_checksum(self.options.checksum_type, &block_data),
        };
        let offset = self.data.len() as u64;
        header.encode(&mut self.data);
        self.data.extend_from_slice(&block_data);
        self.entries.push(BlockIndexEntry {
            first_row_id: self.block_first_row,
            row_count: self.block_row_count,
            offset,
            length: (BLOCK_HEADER_SIZE + block_data.len()) as u64,
            first_key: std::mem::take(&mut self.block_first_key),
        });
        self.block_row_count = 0;
    }

    /// Finish the file: cut the open block and append the index and footer.
    pub fn finish(mut self) -> Vec<u8> {
        self.cut_block();
        let mut index = IndexBuilder::new(self.datatype, self.options.checksum_type);
        for entry in std::mem::take(&mut self.entries) {
            index.append(entry);
        }
        let mut file = std::mem::take(&mut self.data);
        file.extend(index.finish());
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfile::{FileIndex, Footer, FOOTER_SIZE};

    fn decode_index(file: &[u8]) -> FileIndex {
        let footer = Footer::decode(&file[file.len() - FOOTER_SIZE..]).unwrap();
        let index_end = file.len() - FOOTER_SIZE;
        let index_start = index_end - footer.index_length as usize;
        FileIndex::decode(&footer, &file[index_start..index_end]).unwrap()
    }

    #[test]
    fn test_multi_block_file() {
        let mut builder =
            CFileBuilder::new(DataType::UInt32, CFileOptions::default_for_test(), false);
        for v in 0..100u32 {
            builder.append_u32(v);
        }
        assert_eq!(builder.row_count(), 100);
        let file = builder.finish();

        let index = decode_index(&file);
        assert_eq!(index.datatype(), DataType::UInt32);
        assert_eq!(index.row_count(), 100);
        // 128-byte blocks hold 32 values each
        assert!(index.len() > 1);
        assert_eq!(index.entry(0).first_row_id, 0);
        assert_eq!(
            index.entries().iter().map(|e| e.row_count).sum::<u32>(),
            100
        );
    }

    #[test]
    fn test_key_file_records_first_keys() {
        let mut builder =
            CFileBuilder::new(DataType::Bytes, CFileOptions::default_for_test(), true);
        let keys: Vec<String> = (0..50).map(|i| format!("key {:04}", i)).collect();
        for key in &keys {
            builder.append_bytes(key.as_bytes());
        }
        let file = builder.finish();

        let index = decode_index(&file);
        assert!(index.len() > 1);
        for entry in index.entries() {
            assert_eq!(entry.first_key, keys[entry.first_row_id as usize].as_bytes());
        }
    }
}
