// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use super::Arena;
use crate::catalog::Schema;
use crate::error::{StorageResult, TracedStorageError};
use crate::types::Value;

/// An owned row: a tuple of values checked against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Build a row, validating arity and column types.
    pub fn new(schema: &Schema, values: Vec<Value>) -> StorageResult<Self> {
        if values.len() != schema.num_columns() {
            return Err(TracedStorageError::invalid_argument(format!(
                "row has {} values, schema has {} columns",
                values.len(),
                schema.num_columns()
            )));
        }
        for (value, col) in values.iter().zip(schema.columns()) {
            if value.datatype() != col.datatype() {
                return Err(TracedStorageError::invalid_argument(format!(
                    "column {} has type {}, got {}",
                    col.name(),
                    col.datatype(),
                    value.datatype()
                )));
            }
        }
        Ok(Row { values })
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The key prefix of this row.
    pub fn key_values(&self, schema: &Schema) -> &[Value] {
        &self.values[..schema.num_key_columns()]
    }

    /// Serialize into a fixed-width record; indirect bytes go to `arena`.
    pub fn to_record(&self, arena: &mut Arena) -> Vec<u8> {
        let mut record = Vec::new();
        for value in &self.values {
            match value {
                Value::UInt32(v) => record.extend_from_slice(&v.to_le_bytes()),
                Value::UInt64(v) => record.extend_from_slice(&v.to_le_bytes()),
                Value::Bytes(v) => {
                    let offset = arena.append(v);
                    record.extend_from_slice(&offset.to_le_bytes());
                    record.extend_from_slice(&(v.len() as u32).to_le_bytes());
                }
            }
        }
        record
    }
}

pub(crate) fn read_u32(record: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes(record[pos..pos + 4].try_into().unwrap())
}

pub(crate) fn write_u32(record: &mut [u8], pos: usize, v: u32) {
    record[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn read_u64(record: &[u8], pos: usize) -> u64 {
    u64::from_le_bytes(record[pos..pos + 8].try_into().unwrap())
}

pub(crate) fn write_u64(record: &mut [u8], pos: usize, v: u64) {
    record[pos..pos + 8].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn read_indirect(record: &[u8], pos: usize) -> (u32, u32) {
    (read_u32(record, pos), read_u32(record, pos + 4))
}

pub(crate) fn write_indirect(record: &mut [u8], pos: usize, offset: u32, len: u32) {
    write_u32(record, pos, offset);
    write_u32(record, pos + 4, len);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnDesc;
    use crate::row::RowRef;
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
    fn test_row_type_check() {
        let schema = test_schema();
        assert!(Row::new(&schema, vec!["hello".into(), 3u32.into()]).is_ok());
        assert!(Row::new(&schema, vec!["hello".into()])
            .unwrap_err()
            .is_invalid_argument());
        assert!(Row::new(&schema, vec![3u32.into(), "hello".into()])
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_record_round_trip() {
        let schema = test_schema();
        let row = Row::new(&schema, vec!["hello".into(), 42u32.into()]).unwrap();
        let mut arena = Arena::new();
        let record = row.to_record(&mut arena);
        assert_eq!(record.len(), schema.byte_size());

        let view = RowRef::new(&schema, &record, &arena);
        assert_eq!(view.get_bytes(0), b"hello");
        assert_eq!(view.get_u32(1), 42);
    }

    #[test]
    fn test_key_values() {
        let schema = Schema::new(
            vec![
                ColumnDesc::new("a", DataType::Bytes),
                ColumnDesc::new("b", DataType::UInt64),
                ColumnDesc::new("c", DataType::UInt32),
            ],
            2,
        )
        .unwrap();
        let row = Row::new(&schema, vec!["k".into(), 7u64.into(), 1u32.into()]).unwrap();
        assert_eq!(row.key_values(&schema), &["k".into(), 7u64.into()]);
    }
}
