use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Broad classes of failure, used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Source or output could not be opened, read or written.
    Io,
    /// Invalid invocation parameters; raised before any I/O.
    Config,
    /// The source is not a well-formed delimited-record file.
    Structure,
    /// An internal invariant was violated during the write pass.
    Consistency,
    /// Task failure or other unexpected condition.
    Internal,
}

/// User-friendly error presentation for the command line.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Pipeline-wide error type.
///
/// Only fatal conditions are represented here. Per-record problems (an
/// unparseable weight, an ordinal missing from the index) are logged and
/// counted by the stage that hits them, never returned as errors.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Source / output I/O ──────────────────────────────────────────────────
    #[error("Failed to open {}: {}", .path.display(), .source)]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read source: {0}")]
    SourceRead(String),

    #[error("Failed to create {}: {}", .path.display(), .source)]
    OutputCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {}", .path.display(), .message)]
    OutputWrite { path: PathBuf, message: String },

    #[error("Writer for bucket {bucket} stopped accepting records")]
    WriterClosed { bucket: usize },

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("Invalid bucket count {0}: must be at least 1")]
    InvalidBucketCount(i64),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    // ── Structure ────────────────────────────────────────────────────────────
    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    // ── Consistency ──────────────────────────────────────────────────────────
    #[error("Record {ordinal} maps to bucket {bucket}, but only {buckets} outputs exist")]
    BucketOutOfRange {
        ordinal: u64,
        bucket: usize,
        buckets: usize,
    },

    #[error("Record {ordinal} is assigned to both bucket {first} and bucket {second}")]
    DuplicateOrdinal {
        ordinal: u64,
        first: usize,
        second: usize,
    },

    // ── Generic fallback ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SplitError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::SourceOpen { .. }
            | SplitError::SourceRead(_)
            | SplitError::OutputCreate { .. }
            | SplitError::OutputWrite { .. }
            | SplitError::WriterClosed { .. } => ErrorKind::Io,
            SplitError::InvalidBucketCount(_) | SplitError::InvalidOption(_) => ErrorKind::Config,
            SplitError::CsvInvalid(_) => ErrorKind::Structure,
            SplitError::BucketOutOfRange { .. } | SplitError::DuplicateOrdinal { .. } => {
                ErrorKind::Consistency
            }
            SplitError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Process exit code for the CLI. Every error reaching the caller is fatal.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Converts the error into a presentation suitable for terminal output.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Source / output I/O ──────────────────────────────────────────
            SplitError::SourceOpen { path, source } => ErrorPresentation {
                title: "Cannot Open Input".into(),
                message: format!("{} could not be opened: {}", path.display(), source),
                action: Some("Check that the file exists and is readable".into()),
            },

            SplitError::SourceRead(msg) => ErrorPresentation {
                title: "Read Failed".into(),
                message: format!("The input could not be read: {}", msg),
                action: Some("Check the file for truncation or malformed records".into()),
            },

            SplitError::OutputCreate { path, source } => ErrorPresentation {
                title: "Cannot Create Output".into(),
                message: format!("{} could not be created: {}", path.display(), source),
                action: Some("Check that the output directory exists and is writable".into()),
            },

            SplitError::OutputWrite { path, message } => ErrorPresentation {
                title: "Write Failed".into(),
                message: format!("Writing {} failed: {}", path.display(), message),
                action: Some("Check free disk space and try again".into()),
            },

            SplitError::WriterClosed { bucket } => ErrorPresentation {
                title: "Write Failed".into(),
                message: format!("The writer for output {} stopped unexpectedly.", bucket + 1),
                action: Some("Check free disk space and try again".into()),
            },

            // ── Configuration ────────────────────────────────────────────────
            SplitError::InvalidBucketCount(n) => ErrorPresentation {
                title: "Invalid Bucket Count".into(),
                message: format!("Cannot split into {} parts.", n),
                action: Some("Pass a bucket count of 1 or more".into()),
            },

            SplitError::InvalidOption(msg) => ErrorPresentation {
                title: "Invalid Option".into(),
                message: msg.clone(),
                action: Some("Run with --help to see accepted values".into()),
            },

            // ── Structure ────────────────────────────────────────────────────
            SplitError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a formatting problem: {}", msg),
                action: Some("Fix the CSV file and try again".into()),
            },

            // ── Consistency ──────────────────────────────────────────────────
            SplitError::BucketOutOfRange { .. } | SplitError::DuplicateOrdinal { .. } => {
                ErrorPresentation {
                    title: "Internal Consistency Fault".into(),
                    message: format!("{}. No output files were kept.", self),
                    action: None,
                }
            }

            // ── Generic ──────────────────────────────────────────────────────
            SplitError::Internal(msg) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: msg.clone(),
                action: Some("Try again".into()),
            },
        }
    }
}
