use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::SplitOptions;
use crate::error::SplitError;
use crate::partition::{greedy_partition, validate_bucket_count, Bucket};
use crate::report::{BucketReport, SplitSummary};
use crate::streaming::{scan_file, write_buckets, ScanResult, ScanStats, WriteResult};

/// Splits `input` into `bucket_count` weight-balanced files named
/// `<prefix><n>.<ext>`.
///
/// The file is read twice: a metadata scan feeding the greedy partitioner,
/// then a concurrent write pass. Only the assignment is kept in memory
/// between the two.
///
/// # Errors
///
/// Returns `SplitError::InvalidBucketCount` before touching the file system
/// if `bucket_count` is not positive, and any fatal error of the scan or
/// write pass otherwise.
pub async fn split(
    input: &Path,
    bucket_count: i64,
    prefix: &str,
    options: &SplitOptions,
) -> Result<SplitSummary, SplitError> {
    let bucket_count = validate_bucket_count(bucket_count)?;
    options.validate()?;

    let start = Instant::now();

    let scan_input = input.to_path_buf();
    let scan_options = options.clone();
    let (stats, buckets) = tokio::task::spawn_blocking(move || {
        let ScanResult { metas, stats, .. } = scan_file(&scan_input, &scan_options)?;
        let buckets = greedy_partition(&metas, bucket_count)?;
        Ok::<(ScanStats, Vec<Bucket>), SplitError>((stats, buckets))
    })
    .await
    .map_err(|e| SplitError::Internal(format!("Scan task failed: {}", e)))??;

    let written = write_buckets(input, prefix, &buckets, options).await?;
    let anomalies = cross_check(&stats, &buckets, &written);

    let reports: Vec<BucketReport> = buckets
        .iter()
        .zip(&written.outputs)
        .map(|(bucket, output)| BucketReport {
            bucket: output.bucket,
            path: output.path.clone(),
            total_weight: bucket.total_weight,
            records: output.records,
        })
        .collect();

    info!(
        input = %input.display(),
        buckets = bucket_count,
        elapsed = ?start.elapsed(),
        "Split finished"
    );

    Ok(SplitSummary {
        input: input.to_path_buf(),
        prefix: prefix.to_string(),
        records_scanned: stats.records_seen,
        records_skipped: stats.skipped.len() as u64,
        total_weight: stats.total_weight,
        balance_ratio: SplitSummary::balance_of(&reports),
        buckets: reports,
        anomalies,
    })
}

/// Compares what the write pass saw with what the scan promised.
///
/// A mismatch means the input changed between the passes.
fn cross_check(stats: &ScanStats, buckets: &[Bucket], written: &WriteResult) -> Vec<String> {
    let mut anomalies = Vec::new();

    if written.records_read != stats.records_seen {
        anomalies.push(format!(
            "write pass read {} records, scan read {}",
            written.records_read, stats.records_seen
        ));
    }

    let skipped = stats.skipped.len() as u64;
    if written.records_unassigned != skipped {
        anomalies.push(format!(
            "{} records had no bucket, {} were skipped by the scan",
            written.records_unassigned, skipped
        ));
    }

    for (bucket, output) in buckets.iter().zip(&written.outputs) {
        if bucket.len() != output.records {
            anomalies.push(format!(
                "bucket {} was assigned {} records but {} were written",
                output.bucket,
                bucket.len(),
                output.records
            ));
        }
    }

    for anomaly in &anomalies {
        warn!("{}", anomaly);
    }
    anomalies
}
