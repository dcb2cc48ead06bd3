//! Export orchestration.
//!
//! [`export::Exporter`] drives one unit of work through
//! request -> poll -> download. [`batch`] fans units out over a bounded
//! set of tasks; [`paginated`] exports page batches concurrently and
//! merges them into one document with [`merge`].

pub mod batch;
pub mod error;
pub mod export;
pub mod merge;
pub mod paginated;
