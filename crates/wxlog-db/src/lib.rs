//! PostgreSQL storage for merged observation rows
//!
//! Tables are keyed by a unique `TIMESTAMPTZ` column; every batch is
//! written in one transaction with the per-column merge policies of a
//! [`wxlog_core::MergePlan`].

pub mod client;
pub mod queries;
pub mod schema;

pub use client::*;
pub use schema::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid observation: {0}")]
    Merge(#[from] wxlog_core::MergeError),
}

pub type DbResult<T> = Result<T, DbError>;
