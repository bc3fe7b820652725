// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::io::{Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{
    verify_checksum, Block, BlockCache, BlockCacheKey, BlockHeader, FileIndex, Footer,
    PlainBytesBlockIterator, PlainPrimitiveBlockIterator, BLOCK_HEADER_SIZE, FOOTER_SIZE,
};
use crate::error::{StorageResult, TracedStorageError};
use crate::row::RowBlock;
use crate::types::DataType;

/// How blocks are read back: positioned reads on a shared handle where the
/// platform has them, seek-then-read behind a mutex otherwise.
#[derive(Clone)]
pub enum ReadableFile {
    #[cfg(unix)]
    PositionedRead(Arc<std::fs::File>),
    NormalRead(Arc<Mutex<std::fs::File>>),
}

impl ReadableFile {
    fn from_std(file: std::fs::File) -> Self {
        #[cfg(unix)]
        return ReadableFile::PositionedRead(Arc::new(file));
        #[cfg(not(unix))]
        ReadableFile::NormalRead(Arc::new(Mutex::new(file)))
    }

    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut data = vec![0; len];
        match self {
            #[cfg(unix)]
            ReadableFile::PositionedRead(file) => file.read_exact_at(&mut data, offset)?,
            ReadableFile::NormalRead(file) => {
                let mut file = file.lock().unwrap();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut data)?;
            }
        }
        Ok(data)
    }
}

/// A handle to one open column file: decoded index, shared file handle and
/// the tablet's block cache. Cheap to clone; every iterator holds its own.
#[derive(Clone, Debug)]
pub struct CFileReader {
    index: FileIndex,
    file: ReadableFile,
    cache: BlockCache,
    base_key: BlockCacheKey,
}

impl CFileReader {
    /// Open a column file, reading and validating its footer and index.
    pub async fn open(
        path: impl AsRef<Path>,
        cache: BlockCache,
        base_key: BlockCacheKey,
    ) -> StorageResult<Self> {
        let mut file = OpenOptions::new().read(true).open(path.as_ref()).await?;
        let file_len = file.metadata().await?.len();
        if file_len < FOOTER_SIZE as u64 {
            return Err(TracedStorageError::decode("column file too short"));
        }
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64))).await?;
        let mut footer_data = vec![0; FOOTER_SIZE];
        file.read_exact(&mut footer_data).await?;
        let footer = Footer::decode(&footer_data)?;

        if footer.index_length + FOOTER_SIZE as u64 > file_len {
            return Err(TracedStorageError::decode("column file index out of bounds"));
        }
        let tail = FOOTER_SIZE as i64 + footer.index_length as i64;
        file.seek(SeekFrom::End(-tail)).await?;
        let mut index_data = vec![0; footer.index_length as usize];
        file.read_exact(&mut index_data).await?;
        let index = FileIndex::decode(&footer, &index_data)?;

        Ok(Self {
            index,
            file: ReadableFile::from_std(file.into_std().await),
            cache,
            base_key,
        })
    }

    pub fn datatype(&self) -> DataType {
        self.index.datatype()
    }

    pub fn row_count(&self) -> u64 {
        self.index.row_count()
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn new_iterator(&self) -> CFileIterator {
        CFileIterator::new(self.clone())
    }

    /// Fetch one block through the cache, header stripped. The checksum is
    /// verified when the block first comes off the disk.
    pub async fn get_block(&self, block_id: u32) -> StorageResult<Block> {
        let key = self.base_key.clone().block(block_id);
        if let Some(block) = self.cache.get(&key) {
            return Ok(block.slice(BLOCK_HEADER_SIZE..));
        }

        let file = self.file.clone();
        let entry = self.index.entry(block_id).clone();
        let data =
            tokio::task::spawn_blocking(move || file.read_at(entry.offset, entry.length as usize))
                .await
                .unwrap()?;
        let block = Bytes::from(data);

        let mut header = BlockHeader::default();
        let mut buf = &block[..BLOCK_HEADER_SIZE];
        header.decode(&mut buf)?;
        verify_checksum(
            header.checksum_type,
            &block[BLOCK_HEADER_SIZE..],
            header.checksum,
        )?;

        self.cache.insert(key, block.clone()).await;
        Ok(block.slice(BLOCK_HEADER_SIZE..))
    }

    /// At-or-after lookup on the key file: the ordinal of the first value
    /// `>= key` and whether it matches exactly. `None` when every value in
    /// the file is smaller. Comparison is bit-exact on the encoded form.
    pub async fn find_at_or_after(&self, key: &[u8]) -> StorageResult<Option<(u32, bool)>> {
        debug_assert_eq!(self.datatype(), DataType::Bytes);
        if self.index.is_empty() {
            return Ok(None);
        }
        let block_id = self.index.block_of_key(key);
        let entry = self.index.entry(block_id).clone();
        let block = self.get_block(block_id).await?;
        let mut iter = PlainBytesBlockIterator::new(block, entry.row_count as usize);
        let values = iter.next_batch(None);
        for (idx, value) in values.iter().enumerate() {
            if value.as_ref() >= key {
                return Ok(Some((
                    entry.first_row_id + idx as u32,
                    value.as_ref() == key,
                )));
            }
        }
        // every value in this block is smaller, so the answer is the first
        // value of the next block, which is strictly greater
        let next = block_id + 1;
        if (next as usize) < self.index.len() {
            Ok(Some((self.index.entry(next).first_row_id, false)))
        } else {
            Ok(None)
        }
    }

    /// Exact-match ordinal of `key` in the key file.
    pub async fn find_row(&self, key: &[u8]) -> StorageResult<Option<u32>> {
        Ok(self
            .find_at_or_after(key)
            .await?
            .and_then(|(ordinal, exact)| exact.then_some(ordinal)))
    }
}

#[derive(Debug)]
enum BlockIteratorImpl {
    UInt32(PlainPrimitiveBlockIterator<u32>),
    UInt64(PlainPrimitiveBlockIterator<u64>),
    Bytes(PlainBytesBlockIterator),
}

impl BlockIteratorImpl {
    fn remaining_items(&self) -> usize {
        match self {
            BlockIteratorImpl::UInt32(iter) => iter.remaining_items(),
            BlockIteratorImpl::UInt64(iter) => iter.remaining_items(),
            BlockIteratorImpl::Bytes(iter) => iter.remaining_items(),
        }
    }

    fn skip(&mut self, cnt: usize) {
        match self {
            BlockIteratorImpl::UInt32(iter) => iter.skip(cnt),
            BlockIteratorImpl::UInt64(iter) => iter.skip(cnt),
            BlockIteratorImpl::Bytes(iter) => iter.skip(cnt),
        }
    }
}

/// Iterates one column file in ordinal order, loading blocks on demand.
#[derive(Debug)]
pub struct CFileIterator {
    reader: CFileReader,
    block_iter: Option<BlockIteratorImpl>,
    next_row: u32,
}

impl CFileIterator {
    pub fn new(reader: CFileReader) -> Self {
        Self {
            reader,
            block_iter: None,
            next_row: 0,
        }
    }

    pub fn reader(&self) -> &CFileReader {
        &self.reader
    }

    pub fn has_next(&self) -> bool {
        (self.next_row as u64) < self.reader.row_count()
    }

    /// Number of values that can be copied without further I/O. Zero once
    /// the current block is exhausted.
    pub fn fetch_hint(&self) -> usize {
        self.block_iter
            .as_ref()
            .map(|iter| iter.remaining_items())
            .unwrap_or(0)
    }

    /// Position at the `ordinal`-th value. Seeking at or past the end
    /// simply exhausts the iterator.
    pub fn seek_to_ordinal(&mut self, ordinal: u32) {
        self.next_row = ordinal;
        self.block_iter = None;
    }

    async fn load_block(&mut self) -> StorageResult<()> {
        let block_id = self.reader.index.block_of_row(self.next_row);
        let entry = self.reader.index.entry(block_id).clone();
        let block = self.reader.get_block(block_id).await?;
        let mut iter = match self.reader.datatype() {
            DataType::UInt32 => BlockIteratorImpl::UInt32(PlainPrimitiveBlockIterator::new(
                block,
                entry.row_count as usize,
            )),
            DataType::UInt64 => BlockIteratorImpl::UInt64(PlainPrimitiveBlockIterator::new(
                block,
                entry.row_count as usize,
            )),
            DataType::Bytes => BlockIteratorImpl::Bytes(PlainBytesBlockIterator::new(
                block,
                entry.row_count as usize,
            )),
        };
        iter.skip((self.next_row - entry.first_row_id) as usize);
        self.block_iter = Some(iter);
        Ok(())
    }

    /// Decode up to `max` values into column `col` of `block`, filling rows
    /// `[0, n)`. Indirect bytes land in the block's arena. Returns `n`.
    pub async fn copy_next_values(
        &mut self,
        max: usize,
        block: &mut RowBlock,
        col: usize,
    ) -> StorageResult<usize> {
        let mut copied = 0;
        while copied < max && self.has_next() {
            if self.fetch_hint() == 0 {
                self.load_block().await?;
            }
            match self.block_iter.as_mut().unwrap() {
                BlockIteratorImpl::UInt32(iter) => {
                    for v in iter.next_batch(Some(max - copied)) {
                        block.set_u32(copied, col, v);
                        copied += 1;
                        self.next_row += 1;
                    }
                }
                BlockIteratorImpl::UInt64(iter) => {
                    for v in iter.next_batch(Some(max - copied)) {
                        block.set_u64(copied, col, v);
                        copied += 1;
                        self.next_row += 1;
                    }
                }
                BlockIteratorImpl::Bytes(iter) => {
                    for v in iter.next_batch(Some(max - copied)) {
                        block.set_bytes(copied, col, &v);
                        copied += 1;
                        self.next_row += 1;
                    }
                }
            }
        }
        Ok(copied)
    }

    /// Decode up to `max` values of a bytes file, appending them to `out`.
    /// Used for the key file, whose values never enter a row block.
    pub async fn next_bytes_batch(
        &mut self,
        max: usize,
        out: &mut Vec<Block>,
    ) -> StorageResult<usize> {
        debug_assert_eq!(self.reader.datatype(), DataType::Bytes);
        let mut copied = 0;
        while copied < max && self.has_next() {
            if self.fetch_hint() == 0 {
                self.load_block().await?;
            }
            match self.block_iter.as_mut().unwrap() {
                BlockIteratorImpl::Bytes(iter) => {
                    for v in iter.next_batch(Some(max - copied)) {
                        out.push(v);
                        copied += 1;
                        self.next_row += 1;
                    }
                }
                _ => unreachable!(),
            }
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use moka::future::Cache;
    use tempfile::TempDir;

    use super::*;
    use crate::catalog::Schema;
    use crate::cfile::{CFileBuilder, CFileOptions};

    async fn write_u32_file(tempdir: &TempDir, values: impl Iterator<Item = u32>) -> CFileReader {
        let mut builder =
            CFileBuilder::new(DataType::UInt32, CFileOptions::default_for_test(), false);
        for v in values {
            builder.append_u32(v);
        }
        let path = tempdir.path().join("000.col");
        tokio::fs::write(&path, builder.finish()).await.unwrap();
        CFileReader::open(&path, Cache::new(16), BlockCacheKey::default())
            .await
            .unwrap()
    }

    async fn write_key_file(tempdir: &TempDir, keys: &[&[u8]]) -> CFileReader {
        let mut builder =
            CFileBuilder::new(DataType::Bytes, CFileOptions::default_for_test(), true);
        for key in keys {
            builder.append_bytes(key);
        }
        let path = tempdir.path().join("key.cf");
        tokio::fs::write(&path, builder.finish()).await.unwrap();
        CFileReader::open(&path, Cache::new(16), BlockCacheKey::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scan_and_seek() {
        let tempdir = tempfile::tempdir().unwrap();
        let reader = write_u32_file(&tempdir, 0..1000).await;
        assert_eq!(reader.row_count(), 1000);

        let schema = Schema::new(vec![DataType::UInt32.to_column("v")], 0).unwrap();
        let mut block = RowBlock::new(schema, 100);

        let mut iter = reader.new_iterator();
        let n = iter.copy_next_values(100, &mut block, 0).await.unwrap();
        assert_eq!(n, 100);
        block.set_row_count(n);
        assert_eq!(block.row(0).get_u32(0), 0);
        assert_eq!(block.row(99).get_u32(0), 99);

        iter.seek_to_ordinal(997);
        block.reset();
        let n = iter.copy_next_values(100, &mut block, 0).await.unwrap();
        assert_eq!(n, 3);
        block.set_row_count(n);
        assert_eq!(block.row(0).get_u32(0), 997);
        assert!(!iter.has_next());

        iter.seek_to_ordinal(1000);
        assert!(!iter.has_next());
    }

    #[tokio::test]
    async fn test_find_at_or_after() {
        let tempdir = tempfile::tempdir().unwrap();
        let keys: Vec<String> = (0..100).map(|i| format!("key {:04}", i * 2)).collect();
        let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
        let reader = write_key_file(&tempdir, &refs).await;

        // exact hit
        assert_eq!(
            reader.find_at_or_after(b"key 0010").await.unwrap(),
            Some((5, true))
        );
        assert_eq!(reader.find_row(b"key 0010").await.unwrap(), Some(5));
        // between two keys
        assert_eq!(
            reader.find_at_or_after(b"key 0011").await.unwrap(),
            Some((6, false))
        );
        assert_eq!(reader.find_row(b"key 0011").await.unwrap(), None);
        // before the first key
        assert_eq!(
            reader.find_at_or_after(b"aaa").await.unwrap(),
            Some((0, false))
        );
        // past the last key
        assert_eq!(reader.find_at_or_after(b"zzz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_block_detected() {
        let tempdir = tempfile::tempdir().unwrap();
        let mut builder =
            CFileBuilder::new(DataType::UInt32, CFileOptions::default_for_test(), false);
        for v in 0..10u32 {
            builder.append_u32(v);
        }
        let mut file = builder.finish();
        // flip one byte inside the first block's data
        file[BLOCK_HEADER_SIZE] ^= 0xff;
        let path = tempdir.path().join("000.col");
        tokio::fs::write(&path, file).await.unwrap();

        let reader = CFileReader::open(&path, Cache::new(16), BlockCacheKey::default())
            .await
            .unwrap();
        assert!(reader.get_block(0).await.is_err());
    }
}
