//! Weight-balanced assignment of records to output buckets.
//!
//! [`greedy_partition`] decides which bucket every record goes to, and
//! [`OrdinalBucketIndex`] turns that decision into a constant-time lookup
//! for the write pass.

mod greedy;
mod index;

pub use greedy::{greedy_partition, validate_bucket_count, Bucket};
pub use index::OrdinalBucketIndex;
