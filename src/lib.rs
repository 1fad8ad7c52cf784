//! Weight-balanced splitting of large delimited-record files.
//!
//! The pipeline has three stages:
//!
//! 1. [`streaming::scan_metadata`] reads the file once and keeps only the
//!    ordinal and declared weight of every record.
//! 2. [`partition::greedy_partition`] assigns records to buckets, heaviest
//!    first, always into the currently lightest bucket.
//! 3. [`streaming::write_buckets`] re-reads the file and streams each record
//!    to its bucket's output through one writer task per bucket.
//!
//! [`commands::split`] and [`commands::inspect`] wire the stages together.

pub mod commands;
pub mod config;
pub mod error;
pub mod partition;
pub mod report;
pub mod streaming;

pub use config::SplitOptions;
pub use error::SplitError;
