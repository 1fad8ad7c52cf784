//! Options shared by the scan and write passes.

use crate::error::SplitError;

/// Zero-based column holding the record weight.
pub const DEFAULT_WEIGHT_COLUMN: usize = 2;

/// Records buffered per output before the reader blocks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Records between two progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Extension appended to every output file name.
pub const DEFAULT_EXTENSION: &str = "csv";

/// Configuration for a split or inspect run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    /// Zero-based index of the weight field.
    pub weight_column: usize,
    /// Field delimiter, for both reading and writing.
    pub delimiter: u8,
    /// Capacity of each per-output queue.
    pub queue_capacity: usize,
    /// Emit a progress line every this many records.
    pub progress_interval: u64,
    /// Output file extension, without the leading dot.
    pub extension: String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            weight_column: DEFAULT_WEIGHT_COLUMN,
            delimiter: b',',
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl SplitOptions {
    /// Sets the weight column.
    pub fn weight_column(mut self, column: usize) -> Self {
        self.weight_column = column;
        self
    }

    /// Sets the field delimiter.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the per-output queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the progress interval.
    pub fn progress_interval(mut self, records: u64) -> Self {
        self.progress_interval = records;
        self
    }

    /// Sets the output extension. A leading dot is stripped.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Checks that the options describe a usable configuration.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::InvalidOption` naming the first offending value.
    pub fn validate(&self) -> Result<(), SplitError> {
        if self.queue_capacity == 0 {
            return Err(SplitError::InvalidOption(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(SplitError::InvalidOption(
                "progress interval must be at least 1".into(),
            ));
        }
        if self.extension.is_empty() {
            return Err(SplitError::InvalidOption(
                "output extension must not be empty".into(),
            ));
        }
        if matches!(self.delimiter, b'"' | b'\n' | b'\r') {
            return Err(SplitError::InvalidOption(format!(
                "{:?} cannot be used as a delimiter",
                self.delimiter as char
            )));
        }
        Ok(())
    }
}
