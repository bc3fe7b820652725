// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

/// Options for a [`Tablet`](crate::tablet::Tablet).
#[derive(Clone)]
pub struct StorageOptions {
    /// Target size of one encoded block inside a column file.
    pub target_block_size: usize,

    /// Capacity of the shared block cache, in entries.
    pub cache_size: u64,

    /// fsync column files and the manifest after writing them.
    pub enable_fsync: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            target_block_size: 4096,
            cache_size: 1024,
            enable_fsync: true,
        }
    }
}

impl StorageOptions {
    /// Tiny blocks so that multi-block code paths are exercised by small
    /// data sets, and no fsync.
    pub fn default_for_test() -> Self {
        Self {
            target_block_size: 128,
            cache_size: 1024,
            enable_fsync: false,
        }
    }
}
