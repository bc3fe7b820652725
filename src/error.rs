// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use std::backtrace::Backtrace;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("row already present: {0}")]
    AlreadyPresent(String),
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid checksum: found {0}, expected {1}")]
    Checksum(u64, u64),
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
}

impl From<std::io::Error> for TracedStorageError {
    #[inline]
    fn from(e: std::io::Error) -> TracedStorageError {
        StorageError::Io(e.into()).into()
    }
}

impl From<serde_json::Error> for TracedStorageError {
    #[inline]
    fn from(e: serde_json::Error) -> TracedStorageError {
        StorageError::JsonDecode(e).into()
    }
}

/// [`StorageError`] with backtrace.
pub struct TracedStorageError {
    source: StorageError,
    backtrace: Backtrace,
}

impl From<StorageError> for TracedStorageError {
    fn from(source: StorageError) -> Self {
        TracedStorageError {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl std::fmt::Display for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}\n{}", self.source, self.backtrace)
    }
}

impl std::error::Error for TracedStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl std::fmt::Debug for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl TracedStorageError {
    pub fn already_present(key: impl ToString) -> Self {
        StorageError::AlreadyPresent(key.to_string()).into()
    }

    pub fn not_found(ty: &'static str, item: impl ToString) -> Self {
        StorageError::NotFound(ty, item.to_string()).into()
    }

    pub fn not_supported(what: &'static str) -> Self {
        StorageError::NotSupported(what).into()
    }

    pub fn invalid_argument(message: impl ToString) -> Self {
        StorageError::InvalidArgument(message.to_string()).into()
    }

    pub fn decode(message: impl ToString) -> Self {
        StorageError::Decode(message.to_string()).into()
    }

    pub fn checksum(found: u64, expected: u64) -> Self {
        StorageError::Checksum(found, expected).into()
    }

    /// The untraced error kind, for callers that branch on it.
    pub fn kind(&self) -> &StorageError {
        &self.source
    }

    pub fn is_already_present(&self) -> bool {
        matches!(self.source, StorageError::AlreadyPresent(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.source, StorageError::NotFound(..))
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self.source, StorageError::NotSupported(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.source, StorageError::InvalidArgument(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, TracedStorageError>;
