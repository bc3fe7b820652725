// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

/// Primitive types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    UInt32,
    UInt64,
    Bytes,
}

impl DataType {
    /// Width of one cell of this type inside a fixed-width record.
    ///
    /// Variable-length data is stored out of line: a `Bytes` cell is an
    /// `(offset: u32, len: u32)` pair into an arena.
    pub const fn fixed_size(&self) -> usize {
        match self {
            DataType::UInt32 => 4,
            DataType::UInt64 => 8,
            DataType::Bytes => 8,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::UInt32 => write!(f, "uint32"),
            DataType::UInt64 => write!(f, "uint64"),
            DataType::Bytes => write!(f, "bytes"),
        }
    }
}

/// An owned value of one of the supported types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    UInt32(u32),
    UInt64(u64),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn datatype(&self) -> DataType {
        match self {
            Value::UInt32(_) => DataType::UInt32,
            Value::UInt64(_) => DataType::UInt64,
            Value::Bytes(_) => DataType::Bytes,
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}
