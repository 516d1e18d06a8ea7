//! Job orchestration for the `wxlog` binary
//!
//! Each configured source runs as one linear pass: resolve the fetch
//! window, fetch, decode, and write the batch through a
//! [`wxlog_merge::MergeWriter`].

pub mod config;
pub mod job;

pub use config::*;
pub use job::*;
