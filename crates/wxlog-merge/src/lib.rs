//! Merge-upsert writer
//!
//! Turns a source's raw records into observations, dropping the ones that
//! cannot be decoded or merged, and hands the rest to a storage backend as
//! one batch.

pub mod batch;
pub mod writer;

pub use batch::*;
pub use writer::*;

use thiserror::Error;
use wxlog_core::StorageError;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type WriterResult<T> = Result<T, WriterError>;
