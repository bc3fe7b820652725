// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// A descriptor of a column: a stable name and a primitive type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    name: String,
    datatype: DataType,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        ColumnDesc {
            name: name.into(),
            datatype,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl DataType {
    pub fn to_column(self, name: impl Into<String>) -> ColumnDesc {
        ColumnDesc::new(name, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_desc() {
        let col = DataType::UInt32.to_column("val");
        assert_eq!(col.name(), "val");
        assert_eq!(col.datatype(), DataType::UInt32);
        assert_eq!(col.datatype().fixed_size(), 4);
    }
}
