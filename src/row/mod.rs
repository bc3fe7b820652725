// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

//! Row representation: fixed-width records plus arena-backed indirect data.
//!
//! A row of a schema is a fixed-width record. Fixed-width columns are stored
//! inline (little-endian); a variable-length column is an `(offset, len)`
//! cell resolving into an [`Arena`]. [`RowBlock`] batches records together
//! with the arena that owns their indirect data; [`RowRef`] is a zero-copy
//! view of one record.

mod arena;
mod block;
mod delta;
mod row;

pub use arena::Arena;
pub use block::{RowBlock, RowRef};
pub use delta::RowDelta;
pub use row::Row;
