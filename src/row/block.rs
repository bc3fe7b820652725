// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use super::row::{read_indirect, read_u32, read_u64, write_indirect, write_u32, write_u64};
use super::Arena;
use crate::catalog::{keycode, Schema};
use crate::types::{DataType, Value};

/// A fixed-capacity batch of rows in one projection schema.
///
/// Rows live in a row-major fixed-width slab; indirect data lives in the
/// block's own arena, whose lifetime bounds every [`RowRef`] handed out.
#[derive(Debug)]
pub struct RowBlock {
    schema: Schema,
    data: Vec<u8>,
    arena: Arena,
    capacity: usize,
    nrows: usize,
}

impl RowBlock {
    pub fn new(schema: Schema, capacity: usize) -> Self {
        let byte_size = schema.byte_size();
        Self {
            data: vec![0; capacity * byte_size],
            arena: Arena::new(),
            schema,
            capacity,
            nrows: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn row_count(&self) -> usize {
        self.nrows
    }

    /// Clear all rows and reclaim the arena.
    pub fn reset(&mut self) {
        self.nrows = 0;
        self.arena.reset();
    }

    pub fn set_row_count(&mut self, nrows: usize) {
        assert!(nrows <= self.capacity);
        self.nrows = nrows;
    }

    pub fn row(&self, idx: usize) -> RowRef<'_> {
        assert!(idx < self.nrows);
        let byte_size = self.schema.byte_size();
        RowRef {
            schema: &self.schema,
            record: &self.data[idx * byte_size..(idx + 1) * byte_size],
            arena: &self.arena,
        }
    }

    fn cell(&mut self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.capacity);
        row * self.schema.byte_size() + self.schema.column_offset(col)
    }

    pub fn set_u32(&mut self, row: usize, col: usize, v: u32) {
        debug_assert_eq!(self.schema.column(col).datatype(), DataType::UInt32);
        let pos = self.cell(row, col);
        write_u32(&mut self.data, pos, v);
    }

    pub fn set_u64(&mut self, row: usize, col: usize, v: u64) {
        debug_assert_eq!(self.schema.column(col).datatype(), DataType::UInt64);
        let pos = self.cell(row, col);
        write_u64(&mut self.data, pos, v);
    }

    pub fn set_bytes(&mut self, row: usize, col: usize, bytes: &[u8]) {
        debug_assert_eq!(self.schema.column(col).datatype(), DataType::Bytes);
        let pos = self.cell(row, col);
        let offset = self.arena.append(bytes);
        write_indirect(&mut self.data, pos, offset, bytes.len() as u32);
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: &Value) {
        match value {
            Value::UInt32(v) => self.set_u32(row, col, *v),
            Value::UInt64(v) => self.set_u64(row, col, *v),
            Value::Bytes(v) => self.set_bytes(row, col, v),
        }
    }

    /// Copy `row` into slot `idx`, re-homing indirect cells into this
    /// block's arena. Both sides must be in the same projection schema.
    pub fn copy_row(&mut self, idx: usize, row: RowRef<'_>) {
        debug_assert_eq!(self.schema.num_columns(), row.schema.num_columns());
        for col in 0..self.schema.num_columns() {
            match self.schema.column(col).datatype() {
                DataType::UInt32 => self.set_u32(idx, col, row.get_u32(col)),
                DataType::UInt64 => self.set_u64(idx, col, row.get_u64(col)),
                DataType::Bytes => self.set_bytes(idx, col, row.get_bytes(col)),
            }
        }
    }
}

/// A zero-copy view of one fixed-width record and its arena.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    schema: &'a Schema,
    record: &'a [u8],
    arena: &'a Arena,
}

impl<'a> RowRef<'a> {
    pub fn new(schema: &'a Schema, record: &'a [u8], arena: &'a Arena) -> Self {
        debug_assert_eq!(record.len(), schema.byte_size());
        Self {
            schema,
            record,
            arena,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn get_u32(&self, col: usize) -> u32 {
        debug_assert_eq!(self.schema.column(col).datatype(), DataType::UInt32);
        read_u32(self.record, self.schema.column_offset(col))
    }

    pub fn get_u64(&self, col: usize) -> u64 {
        debug_assert_eq!(self.schema.column(col).datatype(), DataType::UInt64);
        read_u64(self.record, self.schema.column_offset(col))
    }

    pub fn get_bytes(&self, col: usize) -> &'a [u8] {
        debug_assert_eq!(self.schema.column(col).datatype(), DataType::Bytes);
        let (offset, len) = read_indirect(self.record, self.schema.column_offset(col));
        self.arena.get(offset, len)
    }

    pub fn value(&self, col: usize) -> Value {
        match self.schema.column(col).datatype() {
            DataType::UInt32 => Value::UInt32(self.get_u32(col)),
            DataType::UInt64 => Value::UInt64(self.get_u64(col)),
            DataType::Bytes => Value::Bytes(self.get_bytes(col).to_vec()),
        }
    }

    /// Encode this row's key prefix into the canonical key form. Only valid
    /// when the view's schema carries the key columns.
    pub fn encode_key(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.schema.key_byte_size());
        for col in 0..self.schema.num_key_columns() {
            match self.schema.column(col).datatype() {
                DataType::UInt32 => keycode::encode_u32(self.get_u32(col), &mut buf),
                DataType::UInt64 => keycode::encode_u64(self.get_u64(col), &mut buf),
                DataType::Bytes => keycode::encode_bytes(self.get_bytes(col), &mut buf),
            }
        }
        buf
    }
}

/// Debug formatting in the form `(bytes key=hello, uint32 val=3)`.
impl std::fmt::Display for RowRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (idx, col) in self.schema.columns().iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}=", col.datatype(), col.name())?;
            match col.datatype() {
                DataType::UInt32 => write!(f, "{}", self.get_u32(idx))?,
                DataType::UInt64 => write!(f, "{}", self.get_u64(idx))?,
                DataType::Bytes => {
                    write!(f, "{}", String::from_utf8_lossy(self.get_bytes(idx)))?
                }
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn test_schema() -> Schema {
        Schema::new(
            vec![
                DataType::Bytes.to_column("key"),
                DataType::UInt32.to_column("val"),
            ],
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_fill_and_read() {
        let schema = test_schema();
        let mut block = RowBlock::new(schema, 4);
        block.set_bytes(0, 0, b"a");
        block.set_u32(0, 1, 1);
        block.set_bytes(1, 0, b"b");
        block.set_u32(1, 1, 2);
        block.set_row_count(2);

        assert_eq!(block.row(0).get_bytes(0), b"a");
        assert_eq!(block.row(1).get_u32(1), 2);
        assert_eq!(block.row(1).to_string(), "(bytes key=b, uint32 val=2)");
    }

    #[test]
    fn test_copy_row_rehomes_arena() {
        let schema = test_schema();
        let mut src = RowBlock::new(schema.clone(), 1);
        src.set_bytes(0, 0, b"hello");
        src.set_u32(0, 1, 7);
        src.set_row_count(1);

        let mut dst = RowBlock::new(schema, 1);
        dst.copy_row(0, src.row(0));
        dst.set_row_count(1);
        drop(src);
        assert_eq!(dst.row(0).get_bytes(0), b"hello");
        assert_eq!(dst.row(0).get_u32(1), 7);
    }

    #[test]
    fn test_encode_key_matches_schema_encoding() {
        let schema = test_schema();
        let mut block = RowBlock::new(schema.clone(), 1);
        block.set_bytes(0, 0, b"hello");
        block.set_u32(0, 1, 3);
        block.set_row_count(1);
        assert_eq!(
            block.row(0).encode_key(),
            schema.encode_key(&["hello".into()]).unwrap()
        );
    }
}
