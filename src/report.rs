//! Summaries handed back to callers, with text and JSON renderings.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

const MIB: u64 = 1024 * 1024;

/// Formats `n` with a comma between every group of three digits.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Per-bucket line of a split summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketReport {
    /// 1-based bucket number.
    pub bucket: usize,
    pub path: PathBuf,
    pub total_weight: u64,
    pub records: u64,
}

/// Result of a `split` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitSummary {
    pub input: PathBuf,
    pub prefix: String,
    /// Data records seen by the scan, including skipped ones.
    pub records_scanned: u64,
    /// Records left out because their weight did not parse.
    pub records_skipped: u64,
    pub total_weight: u64,
    pub buckets: Vec<BucketReport>,
    /// Heaviest bucket divided by the mean bucket weight; 1.0 is perfect.
    pub balance_ratio: f64,
    /// Disagreements between the scan and write passes.
    pub anomalies: Vec<String>,
}

impl SplitSummary {
    /// Computes the heaviest-to-mean ratio of `buckets`.
    pub fn balance_of(buckets: &[BucketReport]) -> f64 {
        let total: u64 = buckets.iter().map(|b| b.total_weight).sum();
        if buckets.is_empty() || total == 0 {
            return 1.0;
        }
        let max = buckets.iter().map(|b| b.total_weight).max().unwrap_or(0);
        max as f64 / (total as f64 / buckets.len() as f64)
    }

    /// Renders the summary as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Split {} into {} files with prefix {}",
            self.input.display(),
            self.buckets.len(),
            self.prefix
        )?;
        writeln!(
            f,
            "Records: {} ({} skipped), total weight: {}, balance: {:.3}",
            format_number(self.records_scanned),
            format_number(self.records_skipped),
            format_number(self.total_weight),
            self.balance_ratio
        )?;
        for bucket in &self.buckets {
            writeln!(
                f,
                "Bucket {}: Total Weight = {}, Records = {}, File = {}",
                bucket.bucket,
                format_number(bucket.total_weight),
                format_number(bucket.records),
                bucket.path.display()
            )?;
        }
        for anomaly in &self.anomalies {
            writeln!(f, "Warning: {}", anomaly)?;
        }
        Ok(())
    }
}

/// Result of an `inspect` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectSummary {
    pub input: PathBuf,
    /// Data records, including the ones whose weight did not parse.
    pub records: u64,
    pub records_skipped: u64,
    pub total_weight: u64,
    pub max_weight: u64,
}

impl InspectSummary {
    /// Total weight in whole mebibytes.
    pub fn total_weight_mib(&self) -> u64 {
        self.total_weight / MIB
    }

    /// Renders the summary as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for InspectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total records: {}, Total weight: {}MB ({} bytes)",
            format_number(self.records),
            format_number(self.total_weight_mib()),
            format_number(self.total_weight)
        )?;
        writeln!(
            f,
            "Largest record: {}, Skipped records: {}",
            format_number(self.max_weight),
            format_number(self.records_skipped)
        )
    }
}
