// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

//! The columnar file format.
//!
//! Every column of a layer is one self-describing file:
//!
//! ```plain
//! | block | block | ... | index | footer |
//! ```
//!
//! Each block is a checksummed run of encoded values:
//!
//! ```plain
//! | cksum_type | cksum  |    data     |
//! |     4B     |   8B   |  variable   |
//! ```
//!
//! The index maps blocks to their first row id, byte range and (for the key
//! file) first key; the fixed-size footer carries the datatype tag, row
//! count and the index location, so a reader needs nothing but the file.
//! Files are written once: builders encode the whole column in memory and
//! the result is flushed to disk as a unit.

mod builder;
mod bytes_block;
mod encode;
mod index;
mod primitive_block;
mod reader;

pub use builder::*;
pub use bytes_block::*;
pub use encode::*;
pub use index::*;
pub use primitive_block::*;
pub use reader::*;

use bytes::{Buf, BufMut, Bytes};

use crate::error::{StorageResult, TracedStorageError};

/// A loaded block is simply a [`Bytes`] array.
pub type Block = Bytes;

/// A key in the block cache: layer, column file within the layer, block.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct BlockCacheKey {
    pub layer_id: u64,
    pub file_id: u32,
    pub block_id: u32,
}

impl BlockCacheKey {
    pub fn layer(mut self, layer_id: u64) -> Self {
        self.layer_id = layer_id;
        self
    }

    pub fn file(mut self, file_id: u32) -> Self {
        self.file_id = file_id;
        self
    }

    pub fn block(mut self, block_id: u32) -> Self {
        self.block_id = block_id;
        self
    }
}

/// The block cache shared by all column files of a tablet.
pub type BlockCache = moka::future::Cache<BlockCacheKey, Block>;

/// Checksum algorithms for blocks and index footers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumType {
    None,
    #[default]
    Crc32,
}

impl ChecksumType {
    pub(crate) fn to_i32(self) -> i32 {
        match self {
            ChecksumType::None => 0,
            ChecksumType::Crc32 => 1,
        }
    }

    pub(crate) fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(ChecksumType::None),
            1 => Some(ChecksumType::Crc32),
            _ => None,
        }
    }
}

pub fn build_checksum(checksum_type: ChecksumType, data: &[u8]) -> u64 {
    match checksum_type {
        ChecksumType::None => 0,
        ChecksumType::Crc32 => crc32fast::hash(data) as u64,
    }
}

pub fn verify_checksum(
    checksum_type: ChecksumType,
    data: &[u8],
    checksum: u64,
) -> StorageResult<()> {
    let found = build_checksum(checksum_type, data);
    if found != checksum {
        return Err(TracedStorageError::checksum(found, checksum));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct BlockHeader {
    pub checksum_type: ChecksumType,
    pub checksum: u64,
}

pub const BLOCK_HEADER_SIZE: usize = 4 + 8;

impl BlockHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.checksum_type.to_i32());
        buf.put_u64(self.checksum);
    }

    pub fn decode(&mut self, buf: &mut impl Buf) -> StorageResult<()> {
        if buf.remaining() < BLOCK_HEADER_SIZE {
            return Err(TracedStorageError::decode("expected 12 bytes"));
        }
        self.checksum_type = ChecksumType::from_i32(buf.get_i32())
            .ok_or_else(|| TracedStorageError::decode("expected valid checksum type"))?;
        self.checksum = buf.get_u64();
        Ok(())
    }
}

/// Builds one encoded block. Implementors follow the same protocol: values
/// are appended until [`should_finish`](BlockBuilder::should_finish) says
/// the block is full, then [`finish`](BlockBuilder::finish) yields the
/// encoded data.
pub trait BlockBuilder<T: ?Sized> {
    /// Append one value to the block.
    fn append(&mut self, item: &T);

    /// Estimated size of the encoded block so far.
    fn estimated_size(&self) -> usize;

    /// Whether the block should be cut before appending `next_item`. An
    /// empty builder must accept at least one value.
    fn should_finish(&self, next_item: &T) -> bool;

    /// Finish the block and return the encoded data.
    fn finish(self) -> Vec<u8>;
}
