use std::path::PathBuf;

use thiserror::Error;

use super::types::Residency;

/// Database error types
#[derive(Error, Debug)]
pub enum PicoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration value out of range: {0}")]
    ConfigOutOfRange(String),

    #[error("database not initialized at {0:?}; run `picodb init` first")]
    NotInitialized(PathBuf),

    #[error("access denied: {0:?}")]
    AccessDenied(PathBuf),

    #[error("database directory {0:?} already exists (pass --overwrite to replace it)")]
    AlreadyExists(PathBuf),

    #[error("page size mismatch: buffer is {actual} bytes, page size is {expected}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("buffer pool overflow: all pages in {0} are pinned")]
    BufferPoolOverflow(Residency),

    #[error("I/O queue error: {0}")]
    IoQueue(String),
}

pub type Result<T> = std::result::Result<T, PicoError>;
