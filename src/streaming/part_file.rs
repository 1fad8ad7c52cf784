//! Output files that only appear under their final name once complete.
//!
//! Data is written to `<final>.part` next to the destination. Closing the
//! writer yields a [`ClosedPart`] that is either committed (renamed into
//! place) or discarded. Anything dropped before commit removes its part
//! file, so a failed run never leaves half-written outputs behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::BUFFER_SIZE;
use crate::error::SplitError;

/// An output file being written under a temporary `.part` name.
pub struct PartFile {
    writer: BufWriter<File>,
    part: Option<PathBuf>,
    final_path: PathBuf,
}

impl PartFile {
    /// Creates `<final_path>.part`, truncating any leftover from an earlier run.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::OutputCreate` if the part file cannot be created.
    pub async fn create(final_path: impl AsRef<Path>) -> Result<Self, SplitError> {
        let final_path = final_path.as_ref().to_path_buf();
        let part_path = part_path_for(&final_path);

        let file = File::create(&part_path)
            .await
            .map_err(|e| SplitError::OutputCreate {
                path: part_path.clone(),
                source: e,
            })?;

        Ok(Self {
            writer: BufWriter::with_capacity(BUFFER_SIZE, file),
            part: Some(part_path),
            final_path,
        })
    }

    /// Path the file will have once committed.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Appends `bytes` to the part file.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SplitError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| self.write_error(e))
    }

    /// Flushes all buffered data and closes the file handle.
    ///
    /// The data stays under the `.part` name until [`ClosedPart::commit`].
    pub async fn close(mut self) -> Result<ClosedPart, SplitError> {
        self.writer.flush().await.map_err(|e| self.write_error(e))?;
        self.writer
            .get_mut()
            .sync_all()
            .await
            .map_err(|e| self.write_error(e))?;

        Ok(ClosedPart {
            part: self.part.take(),
            final_path: self.final_path.clone(),
        })
    }

    fn write_error(&self, e: std::io::Error) -> SplitError {
        SplitError::OutputWrite {
            path: self.final_path.clone(),
            message: e.to_string(),
        }
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if let Some(part) = self.part.take() {
            let _ = std::fs::remove_file(part);
        }
    }
}

/// A fully written part file awaiting commit or discard.
#[derive(Debug)]
pub struct ClosedPart {
    part: Option<PathBuf>,
    final_path: PathBuf,
}

impl ClosedPart {
    /// Renames the part file to its final name and returns that name.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::OutputWrite` if the rename fails; the part file
    /// is removed in that case.
    pub async fn commit(mut self) -> Result<PathBuf, SplitError> {
        if let Some(part) = self.part.take() {
            if let Err(e) = tokio::fs::rename(&part, &self.final_path).await {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(SplitError::OutputWrite {
                    path: self.final_path.clone(),
                    message: format!("Failed to move part file into place: {}", e),
                });
            }
        }
        Ok(self.final_path.clone())
    }

    /// Removes the part file without publishing it.
    pub async fn discard(mut self) {
        if let Some(part) = self.part.take() {
            let _ = tokio::fs::remove_file(part).await;
        }
    }
}

impl Drop for ClosedPart {
    fn drop(&mut self) {
        if let Some(part) = self.part.take() {
            let _ = std::fs::remove_file(part);
        }
    }
}

/// Returns `<path>.part`.
fn part_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
