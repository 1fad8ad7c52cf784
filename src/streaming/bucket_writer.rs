//! Concurrent write pass: re-reads the input and routes each record to the
//! output of its bucket.
//!
//! One producer on a blocking thread reads the source and pushes records
//! into per-bucket bounded queues. Every bucket has its own writer task that
//! is the only consumer of its queue and the only owner of its output, so
//! no state is shared between writers. A full queue blocks the producer,
//! which bounds memory no matter how far a writer falls behind.
//!
//! Outputs are written as part files and published only after every writer
//! has finished cleanly; any fatal error removes all of them.

use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use csv::{ByteRecord, WriterBuilder};
use serde::Serialize;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::part_file::{ClosedPart, PartFile};
use super::scanner::open_source;
use super::{csv_reader, read_header, BUFFER_SIZE, UTF8_BOM};
use crate::config::SplitOptions;
use crate::error::SplitError;
use crate::partition::{Bucket, OrdinalBucketIndex};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// A published output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketOutput {
    /// 1-based bucket number, as used in the file name.
    pub bucket: usize,
    pub path: PathBuf,
    /// Data records written, excluding the header.
    pub records: u64,
}

/// Outcome of a write pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    /// One entry per bucket, in bucket order.
    pub outputs: Vec<BucketOutput>,
    /// Data records read during the pass.
    pub records_read: u64,
    /// Records handed to a writer.
    pub records_routed: u64,
    /// Records whose ordinal was not in the index.
    pub records_unassigned: u64,
}

/// Counters kept by the producer.
#[derive(Debug, Default)]
struct RouteStats {
    records_read: u64,
    records_routed: u64,
    records_unassigned: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Returns `<prefix><n>.<extension>` for n in 1..=bucket_count.
pub fn output_paths(prefix: &str, bucket_count: usize, extension: &str) -> Vec<PathBuf> {
    (1..=bucket_count)
        .map(|n| PathBuf::from(format!("{}{}.{}", prefix, n, extension)))
        .collect()
}

/// Writes one output per bucket, each holding the header followed by the
/// bucket's records in input order.
///
/// # Errors
///
/// See [`route_records`]. Additionally returns `SplitError::DuplicateOrdinal`
/// if the buckets overlap.
pub async fn write_buckets(
    input: &Path,
    prefix: &str,
    buckets: &[Bucket],
    options: &SplitOptions,
) -> Result<WriteResult, SplitError> {
    let index = OrdinalBucketIndex::from_buckets(buckets)?;
    let outputs = output_paths(prefix, buckets.len(), &options.extension);
    route_records(input, index, outputs, options).await
}

/// Re-reads `input` and routes every data record to `outputs[index.get(ordinal)]`.
///
/// Records whose ordinal is not in `index` are skipped with a warning.
///
/// # Errors
///
/// - `SplitError::SourceOpen` / `SourceRead` / `CsvInvalid` if the input
///   cannot be read.
/// - `SplitError::OutputCreate` / `OutputWrite` if an output fails.
/// - `SplitError::BucketOutOfRange` if the index names a bucket without an
///   output.
///
/// On error no output file is left under its final name.
pub async fn route_records(
    input: &Path,
    index: OrdinalBucketIndex,
    outputs: Vec<PathBuf>,
    options: &SplitOptions,
) -> Result<WriteResult, SplitError> {
    options.validate()?;
    if outputs.is_empty() {
        return Err(SplitError::InvalidBucketCount(0));
    }

    let start = Instant::now();
    info!(buckets = outputs.len(), "[write] writing output files");

    // Open the source before creating anything on disk.
    let mut source = open_source(input)?;

    // The reader drops a leading BOM from the header; the outputs keep it.
    let bom = source
        .fill_buf()
        .map(|head| head.starts_with(UTF8_BOM))
        .map_err(|e| SplitError::SourceRead(format!("Failed to read input: {}", e)))?;

    let mut parts = Vec::with_capacity(outputs.len());
    for path in &outputs {
        parts.push(PartFile::create(path).await?);
    }

    let (senders, receivers): (Vec<Sender<ByteRecord>>, Vec<Receiver<ByteRecord>>) =
        outputs.iter().map(|_| mpsc::channel(options.queue_capacity)).unzip();

    let writers: Vec<JoinHandle<Result<(ClosedPart, u64), SplitError>>> = parts
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(bucket, (part, rx))| {
            tokio::spawn(run_writer(bucket, part, rx, options.delimiter, bom))
        })
        .collect();

    // The producer owns every sender; when it returns, all queues close.
    let producer_options = options.clone();
    let producer = tokio::task::spawn_blocking(move || {
        produce(source, &index, &senders, &producer_options)
    });

    let produced = match producer.await {
        Ok(result) => result,
        Err(e) => Err(SplitError::Internal(format!("Reader task failed: {}", e))),
    };

    let mut finished: Vec<(ClosedPart, u64)> = Vec::with_capacity(outputs.len());
    let mut writer_error: Option<SplitError> = None;
    for (bucket, handle) in writers.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(done)) => finished.push(done),
            Ok(Err(e)) => {
                writer_error.get_or_insert(e);
            }
            Err(e) => {
                writer_error.get_or_insert(SplitError::Internal(format!(
                    "Writer task for bucket {} failed: {}",
                    bucket + 1,
                    e
                )));
            }
        }
    }

    // A closed queue on the producer side is only a symptom; prefer the
    // writer's own error when there is one.
    let stats = match (produced, writer_error) {
        (Err(SplitError::WriterClosed { .. }), Some(e)) | (Ok(_), Some(e)) => {
            return abort(finished, e).await;
        }
        (Err(e), _) => return abort(finished, e).await,
        (Ok(stats), None) => stats,
    };

    let mut published: Vec<BucketOutput> = Vec::with_capacity(finished.len());
    let mut pending = finished.into_iter().enumerate();
    while let Some((bucket, (closed, records))) = pending.next() {
        match closed.commit().await {
            Ok(path) => published.push(BucketOutput {
                bucket: bucket + 1,
                path,
                records,
            }),
            Err(e) => {
                for (_, (rest, _)) in pending.by_ref() {
                    rest.discard().await;
                }
                for output in &published {
                    let _ = tokio::fs::remove_file(&output.path).await;
                }
                return Err(e);
            }
        }
    }

    info!(
        records = stats.records_routed,
        unassigned = stats.records_unassigned,
        elapsed = ?start.elapsed(),
        "[write] all files written"
    );

    Ok(WriteResult {
        outputs: published,
        records_read: stats.records_read,
        records_routed: stats.records_routed,
        records_unassigned: stats.records_unassigned,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Producer (blocking)
// ─────────────────────────────────────────────────────────────────────────────

/// Reads the source and feeds every queue. The header goes to every queue
/// before any data record.
fn produce<R: Read>(
    source: R,
    index: &OrdinalBucketIndex,
    senders: &[Sender<ByteRecord>],
    options: &SplitOptions,
) -> Result<RouteStats, SplitError> {
    let mut reader = csv_reader(source, options);
    let header = read_header(&mut reader, options)?;

    for (bucket, tx) in senders.iter().enumerate() {
        tx.blocking_send(header.clone())
            .map_err(|_| SplitError::WriterClosed { bucket })?;
    }

    let mut stats = RouteStats::default();
    loop {
        let mut record = ByteRecord::new();
        let more = reader.read_byte_record(&mut record).map_err(|e| {
            SplitError::SourceRead(format!("record {}: {}", stats.records_read + 1, e))
        })?;
        if !more {
            break;
        }

        stats.records_read += 1;
        let ordinal = stats.records_read;

        match index.get(ordinal) {
            None => {
                warn!(ordinal, "Record is not assigned to any bucket, skipping");
                stats.records_unassigned += 1;
            }
            Some(bucket) => {
                let tx = senders.get(bucket).ok_or(SplitError::BucketOutOfRange {
                    ordinal,
                    bucket,
                    buckets: senders.len(),
                })?;
                tx.blocking_send(record)
                    .map_err(|_| SplitError::WriterClosed { bucket })?;
                stats.records_routed += 1;
            }
        }

        if ordinal % options.progress_interval == 0 {
            info!(records = ordinal, "[write] progress");
        }
    }

    Ok(stats)
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Drains one queue into one output. The first record on every queue is the
/// header; the returned count excludes it. With `bom` set the output starts
/// with a UTF-8 byte order mark.
async fn run_writer(
    bucket: usize,
    mut part: PartFile,
    mut rx: Receiver<ByteRecord>,
    delimiter: u8,
    bom: bool,
) -> Result<(ClosedPart, u64), SplitError> {
    let mut buf: Vec<u8> = Vec::with_capacity(BUFFER_SIZE);
    if bom {
        buf.extend_from_slice(UTF8_BOM);
    }
    let mut written: u64 = 0;

    while let Some(record) = rx.recv().await {
        serialize_record_into(&record, delimiter, &mut buf).map_err(|e| {
            SplitError::OutputWrite {
                path: part.final_path().to_path_buf(),
                message: format!("Failed to encode record: {}", e),
            }
        })?;
        written += 1;

        if buf.len() >= BUFFER_SIZE {
            part.write_all(&buf).await?;
            buf.clear();
        }
    }

    part.write_all(&buf).await?;
    let closed = part.close().await?;

    let records = written.saturating_sub(1);
    debug!(bucket = bucket + 1, records, "[write] bucket finished");
    Ok((closed, records))
}

/// Appends one encoded record to `buf`.
fn serialize_record_into(
    record: &ByteRecord,
    delimiter: u8,
    buf: &mut Vec<u8>,
) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .from_writer(buf);
    writer.write_byte_record(record)?;
    writer.flush()?;
    Ok(())
}

/// Discards every finished part and returns `error`.
async fn abort(finished: Vec<(ClosedPart, u64)>, error: SplitError) -> Result<WriteResult, SplitError> {
    warn!("[write] aborting, removing partial outputs: {}", error);
    for (closed, _) in finished {
        closed.discard().await;
    }
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Helper to create a test CSV file and return its path.
    fn create_test_csv(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("input.csv");
        fs::write(&path, content).expect("Failed to write test CSV");
        path
    }

    fn prefix(dir: &TempDir) -> String {
        format!("{}/part", dir.path().display())
    }

    fn bucket(ordinals: &[u64]) -> Bucket {
        let mut bucket = Bucket::default();
        for &ordinal in ordinals {
            bucket.members.insert(ordinal);
        }
        bucket
    }

    fn entries(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    const INPUT: &str = "id,name,size\n1,a,5\n2,b,3\n3,c,9\n4,d,1\n5,e,2\n";

    #[test]
    fn test_output_paths() {
        let paths = output_paths("out/part_", 3, "csv");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("out/part_1.csv"),
                PathBuf::from("out/part_2.csv"),
                PathBuf::from("out/part_3.csv"),
            ]
        );
    }

    #[tokio::test]
    async fn test_routes_records_in_input_order() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(&dir, INPUT);
        let buckets = vec![bucket(&[5, 1, 3]), bucket(&[4, 2])];

        let result = write_buckets(&input, &prefix(&dir), &buckets, &SplitOptions::default())
            .await
            .expect("write failed");

        assert_eq!(result.records_read, 5);
        assert_eq!(result.records_routed, 5);
        assert_eq!(result.records_unassigned, 0);
        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.outputs[0].bucket, 1);
        assert_eq!(result.outputs[0].records, 3);
        assert_eq!(result.outputs[1].records, 2);

        assert_eq!(
            fs::read_to_string(&result.outputs[0].path).unwrap(),
            "id,name,size\n1,a,5\n3,c,9\n5,e,2\n"
        );
        assert_eq!(
            fs::read_to_string(&result.outputs[1].path).unwrap(),
            "id,name,size\n2,b,3\n4,d,1\n"
        );
        assert_eq!(entries(&dir), vec!["input.csv", "part1.csv", "part2.csv"]);
    }

    #[tokio::test]
    async fn test_empty_bucket_gets_header_only() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(&dir, INPUT);
        let buckets = vec![bucket(&[1, 2, 3, 4, 5]), bucket(&[]), bucket(&[])];

        let result = write_buckets(&input, &prefix(&dir), &buckets, &SplitOptions::default())
            .await
            .expect("write failed");

        for output in &result.outputs[1..] {
            assert_eq!(output.records, 0);
            assert_eq!(fs::read_to_string(&output.path).unwrap(), "id,name,size\n");
        }
    }

    #[tokio::test]
    async fn test_unassigned_ordinals_are_skipped() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(&dir, INPUT);
        let buckets = vec![bucket(&[1, 3]), bucket(&[5])];

        let result = write_buckets(&input, &prefix(&dir), &buckets, &SplitOptions::default())
            .await
            .expect("write failed");

        assert_eq!(result.records_read, 5);
        assert_eq!(result.records_routed, 3);
        assert_eq!(result.records_unassigned, 2);
        assert_eq!(
            fs::read_to_string(&result.outputs[1].path).unwrap(),
            "id,name,size\n5,e,2\n"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_bucket_is_fatal_and_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(&dir, INPUT);

        let mut index = OrdinalBucketIndex::default();
        for ordinal in 1..=5 {
            index.insert(ordinal, if ordinal == 4 { 2 } else { 0 }).unwrap();
        }
        let outputs = output_paths(&prefix(&dir), 2, "csv");

        match route_records(&input, index, outputs, &SplitOptions::default()).await {
            Err(SplitError::BucketOutOfRange {
                ordinal: 4,
                bucket: 2,
                buckets: 2,
            }) => {}
            other => panic!("Expected BucketOutOfRange, got {:?}", other),
        }
        assert_eq!(entries(&dir), vec!["input.csv"]);
    }

    #[tokio::test]
    async fn test_malformed_record_aborts_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(&dir, "id,name,size\n1,a,5\n2,b\n");
        let buckets = vec![bucket(&[1]), bucket(&[2])];

        match write_buckets(&input, &prefix(&dir), &buckets, &SplitOptions::default()).await {
            Err(SplitError::SourceRead(msg)) => assert!(msg.contains("record 2")),
            other => panic!("Expected SourceRead, got {:?}", other),
        }
        assert_eq!(entries(&dir), vec!["input.csv"]);
    }

    #[tokio::test]
    async fn test_missing_input_creates_no_outputs() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.csv");

        let result =
            write_buckets(&missing, &prefix(&dir), &[bucket(&[1])], &SplitOptions::default()).await;
        assert!(matches!(result, Err(SplitError::SourceOpen { .. })));
        assert!(entries(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_output_directory() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(&dir, INPUT);
        let prefix = format!("{}/no/such/dir/part", dir.path().display());

        let result =
            write_buckets(&input, &prefix, &[bucket(&[1, 2, 3, 4, 5])], &SplitOptions::default())
                .await;
        assert!(matches!(result, Err(SplitError::OutputCreate { .. })));
    }

    #[tokio::test]
    async fn test_backpressure_with_tiny_queues() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("id,name,size\n");
        for i in 1..=2_000 {
            content.push_str(&format!("{},row{},{}\n", i, i, i % 13));
        }
        let input = create_test_csv(&dir, &content);

        let buckets: Vec<Bucket> = (0..3u64)
            .map(|r| bucket(&(1..=2_000u64).filter(|o| o % 3 == r).collect::<Vec<u64>>()))
            .collect();
        let options = SplitOptions::default().queue_capacity(1);

        let result = write_buckets(&input, &prefix(&dir), &buckets, &options)
            .await
            .expect("write failed");

        assert_eq!(result.records_routed, 2_000);
        let total: u64 = result.outputs.iter().map(|o| o.records).sum();
        assert_eq!(total, 2_000);
        for (i, output) in result.outputs.iter().enumerate() {
            let mut reader = csv::Reader::from_path(&output.path).unwrap();
            let ids: Vec<u64> = reader
                .records()
                .map(|r| r.unwrap()[0].parse().unwrap())
                .collect();
            assert!(ids.windows(2).all(|w| w[0] < w[1]), "bucket {} out of order", i + 1);
            assert_eq!(ids.len() as u64, output.records);
            assert!(ids.iter().all(|id| id % 3 == i as u64));
        }
    }

    #[tokio::test]
    async fn test_byte_order_mark_precedes_each_header() {
        let dir = TempDir::new().unwrap();
        let content = "\u{feff}id,name,size\n1,a,5\n2,b,3\n";
        let input = create_test_csv(&dir, content);
        let buckets = vec![bucket(&[1, 2]), bucket(&[])];

        let result = write_buckets(&input, &prefix(&dir), &buckets, &SplitOptions::default())
            .await
            .expect("write failed");

        assert_eq!(fs::read(&result.outputs[0].path).unwrap(), content.as_bytes());
        assert_eq!(
            fs::read(&result.outputs[1].path).unwrap(),
            b"\xEF\xBB\xBFid,name,size\n".to_vec()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_writer_reports_its_own_error_and_cleans_up() {
        let full = std::path::Path::new("/dev/full");
        if !full.exists() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let mut content = String::from("id,name,size\n");
        for i in 1..=20_000 {
            content.push_str(&format!("{},{:0>40},{}\n", i, i, i % 7));
        }
        let input = create_test_csv(&dir, &content);

        // Every write to the second output fails with ENOSPC.
        std::os::unix::fs::symlink(full, dir.path().join("part2.csv.part")).unwrap();

        let buckets: Vec<Bucket> = (0..3u64)
            .map(|r| bucket(&(1..=20_000u64).filter(|o| o % 3 == r).collect::<Vec<u64>>()))
            .collect();
        let options = SplitOptions::default().queue_capacity(2);

        match write_buckets(&input, &prefix(&dir), &buckets, &options).await {
            Err(SplitError::OutputWrite { path, .. }) => {
                assert_eq!(path, dir.path().join("part2.csv"));
            }
            other => panic!("Expected OutputWrite, got {:?}", other),
        }
        assert_eq!(entries(&dir), vec!["input.csv"]);
    }

    #[tokio::test]
    async fn test_quoted_fields_survive_routing() {
        let dir = TempDir::new().unwrap();
        let input = create_test_csv(
            &dir,
            "id,note,size\n1,\"a, b\",4\n2,\"line1\nline2\",6\n3,\"say \"\"hi\"\"\",1\n",
        );
        let buckets = vec![bucket(&[1, 2, 3])];

        let result = write_buckets(&input, &prefix(&dir), &buckets, &SplitOptions::default())
            .await
            .expect("write failed");

        let mut reader = csv::Reader::from_path(&result.outputs[0].path).unwrap();
        let notes: Vec<String> = reader.records().map(|r| r.unwrap()[1].to_string()).collect();
        assert_eq!(notes, vec!["a, b", "line1\nline2", "say \"hi\""]);
    }
}
