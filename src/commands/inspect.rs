use std::path::Path;

use crate::config::SplitOptions;
use crate::error::SplitError;
use crate::report::InspectSummary;
use crate::streaming::scan_file_totals;

/// Counts the data records of `input` and sums their weights.
///
/// Runs the same pass as the metadata scan but keeps no per-record state.
pub async fn inspect(input: &Path, options: &SplitOptions) -> Result<InspectSummary, SplitError> {
    options.validate()?;

    let path = input.to_path_buf();
    let scan_options = options.clone();
    let stats = tokio::task::spawn_blocking(move || scan_file_totals(&path, &scan_options))
        .await
        .map_err(|e| SplitError::Internal(format!("Scan task failed: {}", e)))??;

    Ok(InspectSummary {
        input: input.to_path_buf(),
        records: stats.records_seen,
        records_skipped: stats.skipped.len() as u64,
        total_weight: stats.total_weight,
        max_weight: stats.max_weight,
    })
}
