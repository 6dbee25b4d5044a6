//! Still-image file writer.

use chrono::{DateTime, Duration, Local};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::exif::stamp_orientation;
use crate::orientation::ExifOrientation;

/// Number of millisecond slots tried before giving up on a unique name.
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// Errors that can occur while persisting a capture.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("buffer is not a JPEG stream")]
    NotJpeg,
    #[error("JPEG header is truncated")]
    Truncated,
    #[error("no unique file name available in {0}")]
    NameExhausted(PathBuf),
}

/// Formats the capture file name for a wall-clock instant.
pub fn capture_file_name(at: &DateTime<Local>) -> String {
    format!("IMG_{}.jpg", at.format("%Y_%m_%d_%H_%M_%S_%3f"))
}

/// Writes encoded stills into a directory and stamps their orientation.
#[derive(Debug, Clone)]
pub struct StillCaptureFileWriter {
    output_dir: PathBuf,
}

impl StillCaptureFileWriter {
    /// Creates a writer targeting `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the target directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `buffer` to a new `IMG_<timestamp>.jpg` and stamps `orientation`.
    ///
    /// On failure no file is left behind.
    pub fn write(&self, buffer: &[u8], orientation: ExifOrientation) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.output_dir)?;

        let (path, file) = self.create_unique(Local::now())?;
        if let Err(e) = fill(&path, file, buffer, orientation) {
            if let Err(cleanup) = fs::remove_file(&path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "Failed to remove partial capture"
                );
            }
            return Err(e);
        }

        tracing::debug!(
            path = %path.display(),
            bytes = buffer.len(),
            orientation = ?orientation,
            "Still capture written"
        );
        Ok(path)
    }

    /// Creates the file exclusively, stepping forward a millisecond on collision.
    fn create_unique(&self, now: DateTime<Local>) -> Result<(PathBuf, fs::File), StorageError> {
        for offset in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .output_dir
                .join(capture_file_name(&(now + Duration::milliseconds(offset))));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NameExhausted(self.output_dir.clone()))
    }
}

/// Writes the raw bytes, then patches the orientation in a second pass.
fn fill(
    path: &Path,
    mut file: fs::File,
    buffer: &[u8],
    orientation: ExifOrientation,
) -> Result<(), StorageError> {
    file.write_all(buffer)?;
    file.sync_all()?;
    drop(file);

    let written = fs::read(path)?;
    let stamped = stamp_orientation(&written, orientation)?;
    fs::write(path, stamped)?;
    Ok(())
}
