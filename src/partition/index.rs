use crate::error::SplitError;

use super::Bucket;

const UNASSIGNED: u32 = u32::MAX;

/// Ordinal → bucket lookup used while routing records.
///
/// Ordinals are dense (1..=records), so the index is a flat vector keyed by
/// ordinal. Skipped records leave holes marked as unassigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrdinalBucketIndex {
    slots: Vec<u32>,
    assigned: u64,
    buckets: usize,
}

impl OrdinalBucketIndex {
    /// Builds the index from partitioned buckets in O(total ordinals).
    ///
    /// # Errors
    ///
    /// Returns `SplitError::DuplicateOrdinal` if an ordinal belongs to more
    /// than one bucket.
    pub fn from_buckets(buckets: &[Bucket]) -> Result<Self, SplitError> {
        if u32::try_from(buckets.len()).map_or(true, |n| n == UNASSIGNED) {
            return Err(SplitError::InvalidBucketCount(buckets.len() as i64));
        }

        let max_ordinal = buckets.iter().filter_map(|b| b.members.max()).max().unwrap_or(0);
        let len = usize::try_from(max_ordinal)
            .ok()
            .and_then(|m| m.checked_add(1))
            .ok_or_else(|| SplitError::Internal(format!("ordinal {} is too large to index", max_ordinal)))?;

        let mut index = Self {
            slots: vec![UNASSIGNED; len],
            assigned: 0,
            buckets: buckets.len(),
        };

        for (bucket_index, bucket) in buckets.iter().enumerate() {
            for ordinal in bucket.members.iter() {
                index.insert(ordinal, bucket_index)?;
            }
        }

        Ok(index)
    }

    /// Records `ordinal` as belonging to `bucket`.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::DuplicateOrdinal` if the ordinal is already mapped.
    pub fn insert(&mut self, ordinal: u64, bucket: usize) -> Result<(), SplitError> {
        let slot = usize::try_from(ordinal)
            .map_err(|_| SplitError::Internal(format!("ordinal {} is too large to index", ordinal)))?;
        let value = u32::try_from(bucket)
            .ok()
            .filter(|&v| v != UNASSIGNED)
            .ok_or_else(|| SplitError::Internal(format!("bucket {} is too large to index", bucket)))?;

        if slot >= self.slots.len() {
            let len = slot
                .checked_add(1)
                .ok_or_else(|| SplitError::Internal(format!("ordinal {} is too large to index", ordinal)))?;
            self.slots.resize(len, UNASSIGNED);
        }

        let existing = self.slots[slot];
        if existing != UNASSIGNED {
            return Err(SplitError::DuplicateOrdinal {
                ordinal,
                first: existing as usize,
                second: bucket,
            });
        }

        self.slots[slot] = value;
        self.assigned += 1;
        self.buckets = self.buckets.max(bucket + 1);
        Ok(())
    }

    /// Bucket holding `ordinal`, or `None` if the ordinal was never assigned.
    pub fn get(&self, ordinal: u64) -> Option<usize> {
        let slot = usize::try_from(ordinal).ok()?;
        match self.slots.get(slot) {
            Some(&value) if value != UNASSIGNED => Some(value as usize),
            _ => None,
        }
    }

    /// Number of ordinals in the index.
    pub fn len(&self) -> u64 {
        self.assigned
    }

    pub fn is_empty(&self) -> bool {
        self.assigned == 0
    }

    /// Number of buckets the index refers to.
    pub fn bucket_count(&self) -> usize {
        self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(ordinals: &[u64]) -> Bucket {
        let mut bucket = Bucket::default();
        for &ordinal in ordinals {
            bucket.members.insert(ordinal);
        }
        bucket
    }

    #[test]
    fn test_lookup_covers_every_member_once() {
        let buckets = vec![bucket(&[1, 4]), bucket(&[2]), bucket(&[3, 6])];
        let index = OrdinalBucketIndex::from_buckets(&buckets).unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(index.bucket_count(), 3);
        assert_eq!(index.get(1), Some(0));
        assert_eq!(index.get(2), Some(1));
        assert_eq!(index.get(3), Some(2));
        assert_eq!(index.get(4), Some(0));
        assert_eq!(index.get(6), Some(2));
    }

    #[test]
    fn test_holes_and_out_of_bounds_are_missing() {
        let index = OrdinalBucketIndex::from_buckets(&[bucket(&[1, 3])]).unwrap();
        assert_eq!(index.get(0), None);
        assert_eq!(index.get(2), None);
        assert_eq!(index.get(4), None);
        assert_eq!(index.get(u64::MAX), None);
    }

    #[test]
    fn test_duplicate_ordinal_is_rejected() {
        let buckets = vec![bucket(&[1, 2]), bucket(&[2, 3])];
        match OrdinalBucketIndex::from_buckets(&buckets) {
            Err(SplitError::DuplicateOrdinal {
                ordinal: 2,
                first: 0,
                second: 1,
            }) => {}
            other => panic!("Expected DuplicateOrdinal, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_buckets() {
        let index = OrdinalBucketIndex::from_buckets(&[bucket(&[]), bucket(&[])]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.get(1), None);
    }

    #[test]
    fn test_manual_insert_extends_bucket_count() {
        let mut index = OrdinalBucketIndex::default();
        index.insert(1, 0).unwrap();
        index.insert(2, 4).unwrap();
        assert_eq!(index.bucket_count(), 5);
        assert_eq!(index.get(2), Some(4));
    }

    #[test]
    fn test_insert_rejects_unindexable_ordinal() {
        let mut index = OrdinalBucketIndex::default();
        match index.insert(u64::MAX, 0) {
            Err(SplitError::Internal(msg)) => assert!(msg.contains("too large")),
            other => panic!("Expected Internal, got {:?}", other),
        }
        assert!(index.is_empty());
        assert_eq!(index.get(u64::MAX), None);
    }
}
