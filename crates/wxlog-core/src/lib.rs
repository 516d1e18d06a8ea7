//! Core data types and merge rules for wxlog
//!
//! This crate holds everything the ingestion jobs agree on: the observation
//! model, timestamp normalization, field extraction, per-column merge
//! policies and the traits that fetchers and storage backends implement.

pub mod decode;
pub mod extract;
pub mod merge;
pub mod pipeline;
pub mod policy;
pub mod sql;
pub mod timestamp;
pub mod types;

pub use decode::*;
pub use extract::*;
pub use merge::*;
pub use pipeline::*;
pub use policy::*;
pub use timestamp::*;
pub use types::*;
