//! Positioned reads over a backend that only offers byte-range slicing.

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::backend::FileEntry;
use crate::error::{ErrorKind, FsError};
use crate::filesystem::FileSystem;
use crate::{Result, SeekOrigin, DEFAULT_BUFFER_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Initial position.
    pub offset: u64,
    /// Bytes asked for by a read with no size hint.
    pub buffer_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Read cursor over one file.
///
/// The backend file object is bound on the first read and cached for the
/// stream's lifetime; `close` drops it and a later read reacquires. A
/// stream is a single cursor; the `&mut self` receivers serialize its
/// use.
pub struct ReadStream {
    fs: FileSystem,
    path: String,
    position: u64,
    buffer_size: usize,
    entry: Option<Arc<dyn FileEntry>>,
}

impl ReadStream {
    pub(crate) fn new(fs: FileSystem, path: String, options: ReadOptions) -> Self {
        Self {
            fs,
            path,
            position: options.offset,
            buffer_size: options.buffer_size,
            entry: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    async fn entry(&mut self) -> Result<Arc<dyn FileEntry>> {
        if let Some(entry) = &self.entry {
            return Ok(entry.clone());
        }
        let volume = self.fs.volume().await?;
        let entry = volume
            .get_file(&self.fs.full_path(&self.path), false)
            .await
            .map_err(|err| self.fs.translate(&self.path, err))?;
        self.entry = Some(entry.clone());
        Ok(entry)
    }

    /// Read up to `size` bytes (the stream's buffer size when `None`) from
    /// the current position. The backend clamps the range at end-of-file;
    /// reading past it yields an empty buffer, not an error.
    pub async fn read(&mut self, size: Option<usize>) -> Result<Bytes> {
        let entry = self.entry().await?;
        let want = size.unwrap_or(self.buffer_size) as u64;
        let data = entry
            .slice(self.position, self.position + want)
            .await
            .map_err(|err| self.fs.translate(&self.path, err))?;
        self.position += data.len() as u64;
        trace!(path = %self.path, len = data.len(), "read slice");
        Ok(data)
    }

    /// Move the cursor. Touches nothing on the backend; the new position
    /// takes effect on the next read. `End` needs a size lookup.
    pub async fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let base = match origin {
            SeekOrigin::Begin => 0,
            SeekOrigin::Current => self.position as i64,
            SeekOrigin::End => {
                let stats = self.fs.head(&self.path).await?;
                stats.size.unwrap_or(0) as i64
            }
        };
        let target = base + offset;
        if target < 0 {
            return Err(FsError::new(
                self.fs.repository(),
                &self.path,
                ErrorKind::Syntax,
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Release the cached file object. Idempotent; fine to call without a
    /// prior read.
    pub fn close(&mut self) {
        self.entry = None;
    }
}
