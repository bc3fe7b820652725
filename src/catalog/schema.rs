// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{keycode, ColumnDesc};
use crate::error::{StorageResult, TracedStorageError};
use crate::types::Value;

/// An ordered list of columns whose first `key_columns` entries form the
/// composite primary key.
///
/// A schema with `key_columns == 0` is a plain projection: it can be read
/// through, but cannot be the schema of a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDesc>,
    key_columns: usize,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDesc>, key_columns: usize) -> StorageResult<Self> {
        if columns.is_empty() {
            return Err(TracedStorageError::invalid_argument("schema has no columns"));
        }
        if key_columns > columns.len() {
            return Err(TracedStorageError::invalid_argument(format!(
                "schema has {} columns but a {}-column key prefix",
                columns.len(),
                key_columns
            )));
        }
        if columns.iter().map(|c| c.name()).duplicates().next().is_some() {
            return Err(TracedStorageError::invalid_argument(
                "schema has duplicate column names",
            ));
        }
        Ok(Schema {
            columns,
            key_columns,
        })
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_key_columns(&self) -> usize {
        self.key_columns
    }

    pub fn column(&self, idx: usize) -> &ColumnDesc {
        &self.columns[idx]
    }

    pub fn column_by_name(&self, name: &str) -> Option<(usize, &ColumnDesc)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, col)| col.name() == name)
    }

    pub fn is_key_column(&self, idx: usize) -> bool {
        idx < self.key_columns
    }

    /// Total width of one fixed-width record of this schema.
    pub fn byte_size(&self) -> usize {
        self.columns
            .iter()
            .map(|col| col.datatype().fixed_size())
            .sum()
    }

    /// Width of the key prefix of a record.
    pub fn key_byte_size(&self) -> usize {
        self.columns[..self.key_columns]
            .iter()
            .map(|col| col.datatype().fixed_size())
            .sum()
    }

    /// Byte offset of column `idx` inside a record.
    pub fn column_offset(&self, idx: usize) -> usize {
        self.columns[..idx]
            .iter()
            .map(|col| col.datatype().fixed_size())
            .sum()
    }

    /// Resolve this schema as a projection of `source`: for each column the
    /// index of the same-named column in `source`.
    pub fn project_from(&self, source: &Schema) -> StorageResult<Vec<usize>> {
        self.columns
            .iter()
            .map(|col| {
                let (idx, src) = source.column_by_name(col.name()).ok_or_else(|| {
                    TracedStorageError::invalid_argument(format!(
                        "projection column {} is not in the source schema",
                        col.name()
                    ))
                })?;
                if src.datatype() != col.datatype() {
                    return Err(TracedStorageError::invalid_argument(format!(
                        "projection column {} has type {}, source has {}",
                        col.name(),
                        col.datatype(),
                        src.datatype()
                    )));
                }
                Ok(idx)
            })
            .try_collect()
    }

    /// Encode a key tuple into the canonical order-preserving form.
    ///
    /// The tuple must supply exactly one value per key column; anything
    /// shorter or longer is an invalid argument.
    pub fn encode_key(&self, values: &[Value]) -> StorageResult<Vec<u8>> {
        if values.len() != self.key_columns {
            return Err(TracedStorageError::invalid_argument(format!(
                "key has {} values, schema has {} key columns",
                values.len(),
                self.key_columns
            )));
        }
        let mut buf = Vec::with_capacity(self.key_byte_size());
        for (value, col) in values.iter().zip(&self.columns) {
            if value.datatype() != col.datatype() {
                return Err(TracedStorageError::invalid_argument(format!(
                    "key column {} has type {}, got {}",
                    col.name(),
                    col.datatype(),
                    value.datatype()
                )));
            }
            keycode::encode_value(value, &mut buf);
        }
        Ok(buf)
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
                DataType::UInt64.to_column("seq"),
            ],
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_widths() {
        let schema = test_schema();
        assert_eq!(schema.byte_size(), 8 + 4 + 8);
        assert_eq!(schema.key_byte_size(), 8);
        assert_eq!(schema.column_offset(1), 8);
        assert_eq!(schema.column_offset(2), 12);
    }

    #[test]
    fn test_project() {
        let schema = test_schema();
        let projection = Schema::new(
            vec![
                DataType::UInt32.to_column("val"),
                DataType::Bytes.to_column("key"),
            ],
            0,
        )
        .unwrap();
        assert_eq!(projection.project_from(&schema).unwrap(), vec![1, 0]);

        let missing = Schema::new(vec![DataType::UInt32.to_column("nope")], 0).unwrap();
        assert!(missing
            .project_from(&schema)
            .unwrap_err()
            .is_invalid_argument());

        let mistyped = Schema::new(vec![DataType::UInt64.to_column("val")], 0).unwrap();
        assert!(mistyped
            .project_from(&schema)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_encode_key_arity() {
        let schema = test_schema();
        assert!(schema.encode_key(&["hello".into()]).is_ok());
        assert!(schema.encode_key(&[]).unwrap_err().is_invalid_argument());
        assert!(schema
            .encode_key(&[1u32.into()])
            .unwrap_err()
            .is_invalid_argument());
    }
}
