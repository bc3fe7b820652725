// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use bytes::{Buf, BufMut};

use super::{build_checksum, verify_checksum, ChecksumType};
use crate::error::{StorageResult, TracedStorageError};
use crate::types::DataType;

pub const CFILE_MAGIC: u32 = 0x7462_4c54;

/// magic + datatype + entry count + row count + index length
/// + checksum type + checksum
pub const FOOTER_SIZE: usize = 4 + 4 + 8 + 8 + 8 + 4 + 8;

fn datatype_to_tag(datatype: DataType) -> i32 {
    match datatype {
        DataType::UInt32 => 0,
        DataType::UInt64 => 1,
        DataType::Bytes => 2,
    }
}

fn datatype_from_tag(tag: i32) -> Option<DataType> {
    match tag {
        0 => Some(DataType::UInt32),
        1 => Some(DataType::UInt64),
        2 => Some(DataType::Bytes),
        _ => None,
    }
}

/// Location and key range of one block inside a column file.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockIndexEntry {
    pub first_row_id: u32,
    pub row_count: u32,
    /// Byte offset of the block (including its header) in the file.
    pub offset: u64,
    /// Byte length of the block, including its header.
    pub length: u64,
    /// First encoded key in the block; empty except in the key file.
    pub first_key: Vec<u8>,
}

impl BlockIndexEntry {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.first_row_id);
        buf.put_u32(self.row_count);
        buf.put_u64(self.offset);
        buf.put_u64(self.length);
        buf.put_u32(self.first_key.len() as u32);
        buf.put_slice(&self.first_key);
    }

    pub fn decode(buf: &mut impl Buf) -> StorageResult<Self> {
        if buf.remaining() < 4 + 4 + 8 + 8 + 4 {
            return Err(TracedStorageError::decode("index entry truncated"));
        }
        let first_row_id = buf.get_u32();
        let row_count = buf.get_u32();
        let offset = buf.get_u64();
        let length = buf.get_u64();
        let key_len = buf.get_u32() as usize;
        if buf.remaining() < key_len {
            return Err(TracedStorageError::decode("index entry key truncated"));
        }
        let mut first_key = vec![0; key_len];
        buf.copy_to_slice(&mut first_key);
        Ok(Self {
            first_row_id,
            row_count,
            offset,
            length,
            first_key,
        })
    }
}

/// The fixed-size tail of a column file.
#[derive(Debug, Clone)]
pub struct Footer {
    pub datatype: DataType,
    pub entry_count: u64,
    pub row_count: u64,
    pub index_length: u64,
    pub checksum_type: ChecksumType,
    pub checksum: u64,
}

impl Footer {
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(TracedStorageError::decode("footer truncated"));
        }
        let mut buf = data;
        if buf.get_u32() != CFILE_MAGIC {
            return Err(TracedStorageError::decode(
                "failed to decode column file: invalid magic",
            ));
        }
        let datatype = datatype_from_tag(buf.get_i32())
            .ok_or_else(|| TracedStorageError::decode("invalid datatype tag"))?;
        let entry_count = buf.get_u64();
        let row_count = buf.get_u64();
        let index_length = buf.get_u64();
        let checksum_type = ChecksumType::from_i32(buf.get_i32())
            .ok_or_else(|| TracedStorageError::decode("invalid checksum type"))?;
        let checksum = buf.get_u64();
        Ok(Self {
            datatype,
            entry_count,
            row_count,
            index_length,
            checksum_type,
            checksum,
        })
    }
}

/// The decoded index and footer of one column file.
#[derive(Clone)]
pub struct FileIndex {
    entries: Arc<[BlockIndexEntry]>,
    datatype: DataType,
    row_count: u64,
}

impl FileIndex {
    pub fn decode(footer: &Footer, index_data: &[u8]) -> StorageResult<Self> {
        verify_checksum(footer.checksum_type, index_data, footer.checksum)?;
        let mut buf = index_data;
        let mut entries = vec![];
        for _ in 0..footer.entry_count {
            entries.push(BlockIndexEntry::decode(&mut buf)?);
        }
        Ok(Self {
            entries: entries.into(),
            datatype: footer.datatype,
            row_count: footer.row_count,
        })
    }

    pub fn entry(&self, block_id: u32) -> &BlockIndexEntry {
        &self.entries[block_id as usize]
    }

    pub fn entries(&self) -> &[BlockIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Find the block containing `rowid`.
    ///
    /// A row is in block `i` iff `first_row_id[i] <= rowid <
    /// first_row_id[i + 1]`, so partition the blocks by `first_row_id <=
    /// rowid` and take the block just before the partition point.
    pub fn block_of_row(&self, rowid: u32) -> u32 {
        let pp = self
            .entries
            .partition_point(|entry| entry.first_row_id <= rowid) as u32;
        assert!(pp > 0, "row id out of range");
        pp - 1
    }

    /// Find the block that may contain `key`: the last block whose first
    /// key is not greater than it. Only meaningful for the key file.
    pub fn block_of_key(&self, key: &[u8]) -> u32 {
        let pp = self
            .entries
            .partition_point(|entry| entry.first_key.as_slice() <= key) as u32;
        pp.saturating_sub(1)
    }
}

/// Builds the tail (index + footer) of a column file.
pub struct IndexBuilder {
    data: Vec<u8>,
    entry_count: u64,
    row_count: u64,
    datatype: DataType,
    checksum_type: ChecksumType,
}

impl IndexBuilder {
    pub fn new(datatype: DataType, checksum_type: ChecksumType) -> Self {
        Self {
            data: vec![],
            entry_count: 0,
            row_count: 0,
            datatype,
            checksum_type,
        }
    }

    pub fn append(&mut self, entry: BlockIndexEntry) {
        self.entry_count += 1;
        self.row_count += entry.row_count as u64;
        entry.encode(&mut self.data);
    }

    pub fn finish(self) -> Vec<u8> {
        let mut data = self.data;
        let index_length = data.len() as u64;
        let checksum = build_checksum(self.checksum_type, &data);

        data.put_u32(CFILE_MAGIC);
        data.put_i32(datatype_to_tag(self.datatype));
        data.put_u64(self.entry_count);
        data.put_u64(self.row_count);
        data.put_u64(index_length);
        data.put_i32(self.checksum_type.to_i32());
        data.put_u64(checksum);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FileIndex {
        let mut builder = IndexBuilder::new(DataType::Bytes, ChecksumType::Crc32);
        builder.append(BlockIndexEntry {
            first_row_id: 0,
            row_count: 10,
            offset: 0,
            length: 100,
            first_key: b"apple".to_vec(),
        });
        builder.append(BlockIndexEntry {
            first_row_id: 10,
            row_count: 10,
            offset: 100,
            length: 80,
            first_key: b"mango".to_vec(),
        });
        let tail = builder.finish();
        let footer = Footer::decode(&tail[tail.len() - FOOTER_SIZE..]).unwrap();
        FileIndex::decode(&footer, &tail[..tail.len() - FOOTER_SIZE]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let index = sample_index();
        assert_eq!(index.len(), 2);
        assert_eq!(index.row_count(), 20);
        assert_eq!(index.datatype(), DataType::Bytes);
        assert_eq!(index.entry(1).offset, 100);
        assert_eq!(index.entry(1).first_key, b"mango");
    }

    #[test]
    fn test_block_of_row() {
        let index = sample_index();
        assert_eq!(index.block_of_row(0), 0);
        assert_eq!(index.block_of_row(9), 0);
        assert_eq!(index.block_of_row(10), 1);
        assert_eq!(index.block_of_row(19), 1);
    }

    #[test]
    fn test_block_of_key() {
        let index = sample_index();
        assert_eq!(index.block_of_key(b"aardvark"), 0);
        assert_eq!(index.block_of_key(b"apple"), 0);
        assert_eq!(index.block_of_key(b"banana"), 0);
        assert_eq!(index.block_of_key(b"mango"), 1);
        assert_eq!(index.block_of_key(b"zebra"), 1);
    }

    #[test]
    fn test_corrupt_footer() {
        let mut builder = IndexBuilder::new(DataType::UInt32, ChecksumType::Crc32);
        builder.append(BlockIndexEntry {
            first_row_id: 0,
            row_count: 1,
            offset: 0,
            length: 16,
            first_key: vec![],
        });
        let mut tail = builder.finish();
        let flip = tail.len() - FOOTER_SIZE - 1;
        tail[flip] ^= 0xff;
        let footer = Footer::decode(&tail[tail.len() - FOOTER_SIZE..]).unwrap();
        assert!(FileIndex::decode(&footer, &tail[..tail.len() - FOOTER_SIZE]).is_err());
    }
}
