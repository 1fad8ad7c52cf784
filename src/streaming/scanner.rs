//! Metadata scan: one forward pass collecting `(ordinal, weight)` pairs.
//!
//! Only the per-record metadata is retained, so the scan stays cheap even
//! for files whose content is far larger than memory. Records whose weight
//! field does not parse are counted for ordinal purposes but left out of
//! the metadata and the weight totals.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use csv::ByteRecord;
use serde::Serialize;
use tracing::{info, warn};

use super::{csv_reader, read_header, BUFFER_SIZE};
use crate::config::SplitOptions;
use crate::error::SplitError;

/// Weight metadata for one data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordMeta {
    /// 1-based position among data records (the header is ordinal 0).
    pub ordinal: u64,
    /// Declared weight of the record.
    pub weight: u64,
}

/// A data record that was excluded from weight accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub ordinal: u64,
    pub reason: String,
}

/// Counters collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Data records read, including the ones that were skipped.
    pub records_seen: u64,
    /// Sum of all parsed weights.
    pub total_weight: u64,
    /// Largest parsed weight.
    pub max_weight: u64,
    /// Records whose weight could not be parsed.
    pub skipped: Vec<SkippedRecord>,
}

impl ScanStats {
    /// Number of records that contributed a weight.
    pub fn parsed_records(&self) -> u64 {
        self.records_seen - self.skipped.len() as u64
    }
}

/// Result of a metadata scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// The header record, verbatim.
    pub header: ByteRecord,
    /// Metadata of every parsed data record, in input order.
    pub metas: Vec<RecordMeta>,
    pub stats: ScanStats,
}

/// Scans `source` and returns the metadata of every data record.
///
/// # Errors
///
/// Returns `SplitError::CsvInvalid` if the header is missing or too short to
/// hold the weight column, and `SplitError::SourceRead` on I/O failure or a
/// structurally malformed record. Unparseable weights are not errors.
pub fn scan_metadata<R: Read>(source: R, options: &SplitOptions) -> Result<ScanResult, SplitError> {
    let mut metas = Vec::new();
    let (header, stats) = scan_with(source, options, |meta| metas.push(meta))?;
    Ok(ScanResult {
        header,
        metas,
        stats,
    })
}

/// Scans `source` for its totals only, without retaining per-record metadata.
pub fn scan_totals<R: Read>(source: R, options: &SplitOptions) -> Result<ScanStats, SplitError> {
    let (_, stats) = scan_with(source, options, |_| {})?;
    Ok(stats)
}

/// Opens `path` and runs [`scan_metadata`] over it.
pub fn scan_file(path: &Path, options: &SplitOptions) -> Result<ScanResult, SplitError> {
    scan_metadata(open_source(path)?, options)
}

/// Opens `path` and runs [`scan_totals`] over it.
pub fn scan_file_totals(path: &Path, options: &SplitOptions) -> Result<ScanStats, SplitError> {
    scan_totals(open_source(path)?, options)
}

pub(crate) fn open_source(path: &Path) -> Result<BufReader<File>, SplitError> {
    let file = File::open(path).map_err(|e| SplitError::SourceOpen {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufReader::with_capacity(BUFFER_SIZE, file))
}

fn scan_with<R, F>(
    source: R,
    options: &SplitOptions,
    mut sink: F,
) -> Result<(ByteRecord, ScanStats), SplitError>
where
    R: Read,
    F: FnMut(RecordMeta),
{
    let start = Instant::now();
    info!("[meta scan] scanning records for weights");

    let mut reader = csv_reader(source, options);
    let header = read_header(&mut reader, options)?;

    let mut stats = ScanStats::default();
    let mut record = ByteRecord::new();

    loop {
        let more = reader.read_byte_record(&mut record).map_err(|e| {
            SplitError::SourceRead(format!("record {}: {}", stats.records_seen + 1, e))
        })?;
        if !more {
            break;
        }

        stats.records_seen += 1;
        let ordinal = stats.records_seen;

        match parse_weight(&record, options.weight_column) {
            Ok(weight) => {
                stats.total_weight = stats.total_weight.checked_add(weight).ok_or_else(|| {
                    SplitError::CsvInvalid(format!(
                        "total weight overflows at record {}",
                        ordinal
                    ))
                })?;
                stats.max_weight = stats.max_weight.max(weight);
                sink(RecordMeta { ordinal, weight });
            }
            Err(reason) => {
                warn!(ordinal, reason = reason.as_str(), "Skipping record with unparseable weight");
                stats.skipped.push(SkippedRecord { ordinal, reason });
            }
        }

        if ordinal % options.progress_interval == 0 {
            info!(records = ordinal, "[meta scan] progress");
        }
    }

    info!(
        records = stats.records_seen,
        skipped = stats.skipped.len(),
        total_weight = stats.total_weight,
        elapsed = ?start.elapsed(),
        "[meta scan] finished"
    );

    Ok((header, stats))
}

/// Parses the weight field of `record` as a non-negative integer.
fn parse_weight(record: &ByteRecord, column: usize) -> Result<u64, String> {
    let field = record
        .get(column)
        .ok_or_else(|| format!("no field at column {}", column))?;
    let text = std::str::from_utf8(field).map_err(|_| "weight is not valid UTF-8".to_string())?;
    text.parse::<u64>()
        .map_err(|e| format!("invalid weight {:?}: {}", text, e))
}
