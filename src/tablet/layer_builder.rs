// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::catalog::Schema;
use crate::cfile::{CFileBuilder, CFileOptions};
use crate::error::StorageResult;
use crate::row::RowRef;
use crate::types::DataType;

pub fn path_of_key_file(dir: &Path) -> PathBuf {
    dir.join("key.cf")
}

pub fn path_of_column_file(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("{:03}.col", idx))
}

/// A fully encoded layer: the key file plus one file per column, ready to
/// be written to a directory as a unit.
pub struct EncodedLayer {
    pub key: Vec<u8>,
    pub columns: Vec<Vec<u8>>,
}

/// Encodes every column of a layer in memory.
///
/// Rows must be appended in ascending key order; the key file gets a value
/// index so the layer supports keyed seeks.
pub struct LayerBuilder {
    key_builder: CFileBuilder,
    column_builders: Vec<CFileBuilder>,
    #[cfg(debug_assertions)]
    last_key: Vec<u8>,
}

impl LayerBuilder {
    pub fn new(schema: &Schema, options: CFileOptions) -> Self {
        Self {
            key_builder: CFileBuilder::new(DataType::Bytes, options.clone(), true),
            column_builders: schema
                .columns()
                .iter()
                .map(|col| CFileBuilder::new(col.datatype(), options.clone(), false))
                .collect(),
            #[cfg(debug_assertions)]
            last_key: vec![],
        }
    }

    /// Append one row under its encoded key.
    pub fn append(&mut self, key: &[u8], row: RowRef<'_>) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(self.last_key.as_slice() < key, "keys must be ascending");
            self.last_key = key.to_vec();
        }
        self.key_builder.append_bytes(key);
        for (idx, builder) in self.column_builders.iter_mut().enumerate() {
            match row.schema().column(idx).datatype() {
                DataType::UInt32 => builder.append_u32(row.get_u32(idx)),
                DataType::UInt64 => builder.append_u64(row.get_u64(idx)),
                DataType::Bytes => builder.append_bytes(row.get_bytes(idx)),
            }
        }
    }

    pub fn row_count(&self) -> u32 {
        self.key_builder.row_count()
    }

    pub fn finish(self) -> EncodedLayer {
        EncodedLayer {
            key: self.key_builder.finish(),
            columns: self
                .column_builders
                .into_iter()
                .map(|builder| builder.finish())
                .collect(),
        }
    }
}

/// Writes an encoded layer into a directory, file by file.
///
/// The key file is written separately from the data files so that a flush
/// can publish the key index before the data columns hit the disk.
pub struct LayerWriter {
    dir: PathBuf,
    enable_fsync: bool,
}

impl LayerWriter {
    pub fn new(dir: impl AsRef<Path>, enable_fsync: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            enable_fsync,
        }
    }

    pub async fn write_key_file(&self, encoded: &EncodedLayer) -> StorageResult<()> {
        self.write_file(&path_of_key_file(&self.dir), &encoded.key)
            .await
    }

    pub async fn write_data_files(&self, encoded: &EncodedLayer) -> StorageResult<()> {
        for (idx, column) in encoded.columns.iter().enumerate() {
            self.write_file(&path_of_column_file(&self.dir, idx), column)
                .await?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(data).await?;
        if self.enable_fsync {
            file.sync_all().await?;
        }
        Ok(())
    }
}
