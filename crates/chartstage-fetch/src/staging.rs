//! All-or-nothing file writes
//!
//! Downloads are written to a temporary file next to the destination and
//! renamed over it on commit. Dropping an uncommitted [`StagedFile`] removes
//! the temporary file, so a failed transfer never leaves a partial file at
//! the destination.

use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{FetchError, Result};

pub struct StagedFile {
    tmp: NamedTempFile,
    file: tokio::fs::File,
    dest: PathBuf,
    written: u64,
}

impl StagedFile {
    /// Start a write that will land at `dest`
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| FetchError::io(&dir, e))?;

        let tmp = tempfile::Builder::new()
            .prefix(".chartstage-")
            .tempfile_in(&dir)
            .map_err(|e| FetchError::io(&dir, e))?;
        let handle = tmp.as_file().try_clone().map_err(|e| FetchError::io(tmp.path(), e))?;

        Ok(Self {
            tmp,
            file: tokio::fs::File::from_std(handle),
            dest: dest.to_path_buf(),
            written: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| FetchError::io(self.tmp.path(), e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and move the file into place, returning the bytes written
    pub async fn commit(mut self) -> Result<u64> {
        self.file
            .flush()
            .await
            .map_err(|e| FetchError::io(self.tmp.path(), e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| FetchError::io(self.tmp.path(), e))?;
        drop(self.file);
        self.tmp
            .persist(&self.dest)
            .map_err(|e| FetchError::io(&self.dest, e.error))?;
        Ok(self.written)
    }
}
