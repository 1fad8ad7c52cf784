//! Greedy largest-first assignment of records to buckets.
//!
//! Records are taken heaviest first and each one goes to the bucket with
//! the smallest running total. This is the longest-processing-time rule
//! for multiprocessor scheduling: the heaviest bucket ends up within 4/3 of
//! the optimum.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use roaring::RoaringTreemap;
use tracing::{debug, info};

use crate::error::SplitError;
use crate::streaming::RecordMeta;

/// One output partition: its accumulated weight and the ordinals it holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    pub total_weight: u64,
    pub members: RoaringTreemap,
}

impl Bucket {
    /// Number of records assigned to the bucket.
    pub fn len(&self) -> u64 {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn assign(&mut self, meta: &RecordMeta) {
        self.total_weight += meta.weight;
        self.members.insert(meta.ordinal);
    }
}

/// Converts a caller-supplied bucket count into a usable one.
///
/// # Errors
///
/// Returns `SplitError::InvalidBucketCount` for zero or negative counts.
pub fn validate_bucket_count(count: i64) -> Result<usize, SplitError> {
    if count <= 0 {
        return Err(SplitError::InvalidBucketCount(count));
    }
    usize::try_from(count).map_err(|_| SplitError::InvalidBucketCount(count))
}

/// Assigns every record in `metas` to one of `bucket_count` buckets.
///
/// Records are visited by weight descending, ordinal ascending. Each goes to
/// the bucket with the lowest total, the lowest index winning ties, so the
/// result is fully determined by the input.
///
/// # Errors
///
/// Returns `SplitError::InvalidBucketCount` if `bucket_count` is zero.
pub fn greedy_partition(metas: &[RecordMeta], bucket_count: usize) -> Result<Vec<Bucket>, SplitError> {
    if bucket_count == 0 {
        return Err(SplitError::InvalidBucketCount(0));
    }

    let start = Instant::now();
    info!(records = metas.len(), buckets = bucket_count, "[binpack] sorting records by weight");

    let mut order: Vec<&RecordMeta> = metas.iter().collect();
    order.sort_unstable_by(|a, b| b.weight.cmp(&a.weight).then(a.ordinal.cmp(&b.ordinal)));

    let mut buckets = vec![Bucket::default(); bucket_count];

    // Min-heap on (total, index): popping yields the lightest bucket and,
    // among equally light ones, the lowest index.
    let mut lightest: BinaryHeap<Reverse<(u64, usize)>> =
        (0..bucket_count).map(|i| Reverse((0, i))).collect();

    for meta in order {
        let Some(Reverse((_, index))) = lightest.pop() else {
            return Err(SplitError::Internal("bucket heap is empty".into()));
        };
        let bucket = &mut buckets[index];
        bucket.assign(meta);
        lightest.push(Reverse((bucket.total_weight, index)));
    }

    info!(elapsed = ?start.elapsed(), "[binpack] assignment finished");
    for (i, bucket) in buckets.iter().enumerate() {
        debug!(
            bucket = i + 1,
            total_weight = bucket.total_weight,
            records = bucket.len(),
            "[binpack] bucket"
        );
    }

    Ok(buckets)
}
