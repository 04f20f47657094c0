//! Sequential writer for a task's destination file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writer for the destination file of one attempt. Chunks are appended in
/// arrival order; a fresh attempt truncates, a resumed one appends.
pub struct DestinationWriter {
    file: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl DestinationWriter {
    /// Create (or truncate) the destination for a fresh attempt. Creates parent dirs.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_file(file, path))
    }

    /// Open the destination for appending after the existing partial data.
    pub fn append(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options().append(true).create(true).open(path)?;
        Ok(Self::from_file(file, path))
    }

    fn from_file(file: File, path: &Path) -> Self {
        Self {
            file: BufWriter::with_capacity(64 * 1024, file),
            path: path.to_path_buf(),
            written: 0,
        }
    }

    /// Write one whole chunk. Returns only after every byte was handed to the file.
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written through this writer (excludes pre-existing partial data).
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered data and sync it to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()
    }
}
