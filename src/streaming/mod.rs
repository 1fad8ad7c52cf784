//! Streaming passes over the input file.
//!
//! The input is read twice: once by the scanner to collect per-record
//! weights, and once by the bucket writer to route every record to its
//! output. Both passes share the reader configuration below so that they
//! agree on what a record is.

mod bucket_writer;
mod part_file;
mod scanner;

pub use bucket_writer::{output_paths, route_records, write_buckets, BucketOutput, WriteResult};
pub use part_file::{ClosedPart, PartFile};
pub use scanner::{
    scan_file, scan_file_totals, scan_metadata, scan_totals, RecordMeta, ScanResult, ScanStats,
    SkippedRecord,
};

use std::io::Read;

use csv::{ByteRecord, Reader, ReaderBuilder};

use crate::config::SplitOptions;
use crate::error::SplitError;

/// Buffer size for reading and writing (64 KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Builds the record reader used by both passes.
///
/// The reader is strict about field counts, so a record with a different
/// number of fields than the header is a read error rather than a silently
/// shifted weight column.
fn csv_reader<R: Read>(source: R, options: &SplitOptions) -> Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .delimiter(options.delimiter)
        .from_reader(source)
}

/// Reads the header and checks that it can hold the weight column.
fn read_header<R: Read>(
    reader: &mut Reader<R>,
    options: &SplitOptions,
) -> Result<ByteRecord, SplitError> {
    let header = reader
        .byte_headers()
        .map_err(|e| SplitError::SourceRead(format!("Failed to read CSV header: {}", e)))?
        .clone();

    if header.is_empty() {
        return Err(SplitError::CsvInvalid("CSV file has no header row".to_string()));
    }

    if header.len() <= options.weight_column {
        return Err(SplitError::CsvInvalid(format!(
            "header has {} fields, weight column {} is out of range",
            header.len(),
            options.weight_column
        )));
    }

    Ok(header)
}
