//! Disk I/O for destination files.
//!
//! Attempts write straight to `saved_dir/<effective filename>`. A paused or
//! failed-but-resumable task leaves its partial data there; the next attempt
//! measures it and appends.

mod writer;

pub use writer::DestinationWriter;

use std::io;
use std::path::Path;

/// Length of existing partial data, or `None` if there is no file.
pub fn partial_len(path: &Path) -> io::Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether there is non-empty data to continue from.
pub fn has_partial(path: &Path) -> io::Result<bool> {
    Ok(matches!(partial_len(path)?, Some(len) if len > 0))
}

/// Remove partial or complete data. A missing file is not an error.
/// Returns whether a file was removed.
pub fn discard(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
