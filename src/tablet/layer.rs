// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::path::PathBuf;
use std::sync::Arc;

use super::layer_builder::{path_of_column_file, path_of_key_file};
use super::layer_iterator::DiskLayerIterator;
use super::memstore::MemStore;
use super::merge_iterator::SourceIterator;
use crate::catalog::Schema;
use crate::cfile::{BlockCache, BlockCacheKey, CFileReader};
use crate::error::{StorageResult, TracedStorageError};
use crate::row::RowDelta;
use crate::types::DataType;

/// An immutable snapshot of a memstore at some flush instant.
///
/// Both variants expose the same operations with different capabilities;
/// the tablet never assumes a concrete variant.
pub enum Layer {
    /// Flush handoff: the key file is on disk, row data is still served
    /// from the retired memstore.
    KeysFlushed(KeysFlushedLayer),
    /// Steady state: one immutable column file per column.
    Disk(DiskLayer),
}

impl Layer {
    /// Whether updates can be applied to rows resident in this layer.
    /// Neither variant supports it; [`find_row`](Layer::find_row) is
    /// supported instead.
    pub fn is_updatable_in_place(&self) -> bool {
        false
    }

    pub fn update_row(&self, _key: &[u8], _delta: &RowDelta) -> StorageResult<()> {
        Err(TracedStorageError::not_supported(
            "update of a row in an immutable layer",
        ))
    }

    pub fn layer_id(&self) -> u64 {
        match self {
            Layer::KeysFlushed(layer) => layer.layer_id,
            Layer::Disk(layer) => layer.layer_id,
        }
    }

    pub fn count_rows(&self) -> usize {
        match self {
            Layer::KeysFlushed(layer) => layer.memstore.entry_count(),
            Layer::Disk(layer) => layer.key_reader.row_count() as usize,
        }
    }

    /// Ordinal of the row with the given encoded key, resolved through the
    /// persisted key index.
    pub async fn find_row(&self, key: &[u8]) -> StorageResult<Option<u32>> {
        let key_reader = match self {
            Layer::KeysFlushed(layer) => &layer.key_reader,
            Layer::Disk(layer) => &layer.key_reader,
        };
        key_reader.find_row(key).await
    }

    pub async fn check_row_present(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.find_row(key).await?.is_some())
    }

    /// An ascending-key row iterator in `projection`.
    pub fn iter(&self, projection: Schema) -> StorageResult<SourceIterator> {
        match self {
            Layer::KeysFlushed(layer) => {
                Ok(SourceIterator::Mem(layer.memstore.iter(projection)?))
            }
            Layer::Disk(layer) => Ok(SourceIterator::Disk(DiskLayerIterator::new(
                layer, projection,
            )?)),
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::KeysFlushed(layer) => {
                write!(f, "memstore-backed layer {}", layer.layer_id)
            }
            Layer::Disk(layer) => {
                write!(f, "cfile layer {} in {}", layer.layer_id, layer.dir.display())
            }
        }
    }
}

/// The transitional layer installed mid-flush: key lookups go to the
/// persisted key index while row data still lives in the retired memstore.
/// Readers can use the on-disk index before the data columns finish
/// writing.
pub struct KeysFlushedLayer {
    layer_id: u64,
    key_reader: CFileReader,
    memstore: Arc<MemStore>,
}

impl KeysFlushedLayer {
    pub(crate) fn new(layer_id: u64, key_reader: CFileReader, memstore: Arc<MemStore>) -> Self {
        Self {
            layer_id,
            key_reader,
            memstore,
        }
    }
}

/// Base data made up of one immutable column file per column, plus the key
/// file carrying the value index.
pub struct DiskLayer {
    layer_id: u64,
    schema: Schema,
    dir: PathBuf,
    key_reader: CFileReader,
    columns: Vec<CFileReader>,
}

impl DiskLayer {
    /// Open every column reader and validate the files against the schema:
    /// per-file datatype and a row count shared by all files.
    pub async fn open(
        dir: PathBuf,
        schema: Schema,
        layer_id: u64,
        cache: BlockCache,
    ) -> StorageResult<Self> {
        let base_key = BlockCacheKey::default().layer(layer_id);
        let key_reader = CFileReader::open(
            path_of_key_file(&dir),
            cache.clone(),
            base_key.clone().file(0),
        )
        .await?;
        if key_reader.datatype() != DataType::Bytes {
            return Err(TracedStorageError::decode(format!(
                "key file of layer {} has type {}",
                layer_id,
                key_reader.datatype()
            )));
        }
        let row_count = key_reader.row_count();

        let mut columns = vec![];
        for (idx, col) in schema.columns().iter().enumerate() {
            let reader = CFileReader::open(
                path_of_column_file(&dir, idx),
                cache.clone(),
                base_key.clone().file(idx as u32 + 1),
            )
            .await?;
            if reader.datatype() != col.datatype() {
                return Err(TracedStorageError::decode(format!(
                    "column {} of layer {} has type {} on disk, schema says {}",
                    col.name(),
                    layer_id,
                    reader.datatype(),
                    col.datatype()
                )));
            }
            if reader.row_count() != row_count {
                return Err(TracedStorageError::decode(format!(
                    "column {} of layer {} has {} rows, key file has {}",
                    col.name(),
                    layer_id,
                    reader.row_count(),
                    row_count
                )));
            }
            columns.push(reader);
        }

        Ok(Self {
            layer_id,
            schema,
            dir,
            key_reader,
            columns,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub(crate) fn key_reader(&self) -> &CFileReader {
        &self.key_reader
    }

    pub(crate) fn column(&self, idx: usize) -> &CFileReader {
        &self.columns[idx]
    }
}
