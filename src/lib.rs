// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

//! Tablite is a single-tablet columnar storage engine.
//!
//! A [`Tablet`](tablet::Tablet) absorbs inserts and updates into an ordered
//! in-memory [`MemStore`](tablet::MemStore), periodically freezes the
//! memstore into an immutable on-disk layer (one column file per column),
//! and merges layers through compaction. Readers get a
//! [`TabletIterator`](tablet::TabletIterator): a consistent, key-ordered
//! union of the memstore and every layer, projected onto a requested subset
//! of columns.

#![deny(unused_must_use)]

pub mod catalog;
pub mod cfile;
mod error;
mod options;
pub mod row;
pub mod tablet;
pub mod types;

pub use self::error::{StorageError, StorageResult, TracedStorageError};
pub use self::options::StorageOptions;
