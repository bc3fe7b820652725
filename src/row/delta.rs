// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use bitvec::prelude::{bitvec, BitVec};

use super::row::{write_indirect, write_u32, write_u64};
use super::Arena;
use crate::catalog::Schema;
use crate::error::{StorageResult, TracedStorageError};
use crate::types::Value;

/// A sparse update to the non-key columns of one row: a bitmap of changed
/// columns plus their new values. Key columns can never be part of a delta.
pub struct RowDelta {
    changed: BitVec,
    values: Vec<Option<Value>>,
}

impl RowDelta {
    pub fn new(schema: &Schema) -> Self {
        Self {
            changed: bitvec![0; schema.num_columns()],
            values: vec![None; schema.num_columns()],
        }
    }

    /// Record a new value for a non-key column.
    pub fn update_column(
        &mut self,
        schema: &Schema,
        idx: usize,
        value: Value,
    ) -> StorageResult<()> {
        if idx >= schema.num_columns() {
            return Err(TracedStorageError::invalid_argument(format!(
                "column index {} out of range",
                idx
            )));
        }
        let col = schema.column(idx);
        if schema.is_key_column(idx) {
            return Err(TracedStorageError::invalid_argument(format!(
                "cannot update key column {}",
                col.name()
            )));
        }
        if value.datatype() != col.datatype() {
            return Err(TracedStorageError::invalid_argument(format!(
                "column {} has type {}, got {}",
                col.name(),
                col.datatype(),
                value.datatype()
            )));
        }
        self.changed.set(idx, true);
        self.values[idx] = Some(value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        !self.changed.any()
    }

    /// Rewrite the changed cells of `record` in place; indirect bytes for
    /// new values go to `arena`.
    pub fn apply(&self, schema: &Schema, record: &mut [u8], arena: &mut Arena) {
        debug_assert_eq!(record.len(), schema.byte_size());
        for idx in self.changed.iter_ones() {
            let pos = schema.column_offset(idx);
            match self.values[idx].as_ref().unwrap() {
                Value::UInt32(v) => write_u32(record, pos, *v),
                Value::UInt64(v) => write_u64(record, pos, *v),
                Value::Bytes(v) => {
                    let offset = arena.append(v);
                    write_indirect(record, pos, offset, v.len() as u32);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{Row, RowRef};
    use crate::types::DataType;

    fn test_schema() -> Schema {
        Schema::new(
            vec![
                DataType::Bytes.to_column("key"),
                DataType::UInt32.to_column("val"),
                DataType::Bytes.to_column("note"),
            ],
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_key_column() {
        let schema = test_schema();
        let mut delta = RowDelta::new(&schema);
        assert!(delta
            .update_column(&schema, 0, "nope".into())
            .unwrap_err()
            .is_invalid_argument());
        assert!(delta
            .update_column(&schema, 1, "mistyped".into())
            .unwrap_err()
            .is_invalid_argument());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_apply() {
        let schema = test_schema();
        let row = Row::new(&schema, vec!["k".into(), 1u32.into(), "old".into()]).unwrap();
        let mut arena = Arena::new();
        let mut record = row.to_record(&mut arena);

        let mut delta = RowDelta::new(&schema);
        delta.update_column(&schema, 1, 10001u32.into()).unwrap();
        delta
            .update_column(&schema, 2, "new and longer".into())
            .unwrap();
        delta.apply(&schema, &mut record, &mut arena);

        let view = RowRef::new(&schema, &record, &arena);
        assert_eq!(view.get_bytes(0), b"k");
        assert_eq!(view.get_u32(1), 10001);
        assert_eq!(view.get_bytes(2), b"new and longer");
    }
}
