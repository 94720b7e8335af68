//! Transactional writes over the backend's single sequential writer.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::backend::{Completion, SequentialWriter};
use crate::error::{ErrorKind, FsError};
use crate::filesystem::FileSystem;
use crate::{Result, SeekOrigin};

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Keep existing content and start writing at end-of-file. The default
    /// is truncate mode, which discards prior content before the first
    /// write is accepted.
    pub append: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for WriteOptions {
    fn default() -> Self {
        Self { append: false }
    }
}

enum WriterState {
    Unopened,
    Ready(Box<dyn SequentialWriter>),
    Closed,
}

/// Write cursor over one file.
///
/// The stream moves through `Unopened -> Ready -> Closed`. The writer is
/// acquired by the first operation: append mode positions it at the
/// current end-of-file, truncate mode discards existing content and only
/// accepts writes once that truncation has completed. `Closed` is
/// terminal; a new stream must be opened to resume writing.
pub struct WriteStream {
    fs: FileSystem,
    path: String,
    options: WriteOptions,
    position: u64,
    state: WriterState,
}

impl WriteStream {
    pub(crate) fn new(fs: FileSystem, path: String, options: WriteOptions) -> Self {
        Self {
            fs,
            path,
            options,
            position: 0,
            state: WriterState::Unopened,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write `data` at the current position; advances the position by the
    /// bytes written.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_ready().await?;
        let writer = self.writer()?;
        // The stream position is authoritative; a preceding truncate may
        // have left the backend writer's cursor elsewhere.
        writer.seek(self.position);
        let completion = writer.write(Bytes::copy_from_slice(data));
        complete(self.fs.repository(), &self.path, completion).await?;
        self.position += data.len() as u64;
        trace!(path = %self.path, len = data.len(), "wrote");
        Ok(data.len())
    }

    /// Change the file length. On success the position is reset to 0:
    /// truncation always re-bases further writes at the start of the file.
    pub async fn truncate(&mut self, size: u64) -> Result<()> {
        self.ensure_ready().await?;
        let writer = self.writer()?;
        let completion = writer.truncate(size);
        complete(self.fs.repository(), &self.path, completion).await?;
        self.position = 0;
        Ok(())
    }

    /// Reposition the backend writer, then mirror the resulting offset.
    pub async fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        self.ensure_ready().await?;
        let writer = self.writer()?;
        let base = match origin {
            SeekOrigin::Begin => 0,
            SeekOrigin::Current => self.position as i64,
            SeekOrigin::End => writer.length() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(FsError::new(
                self.fs.repository(),
                &self.path,
                ErrorKind::Syntax,
            ));
        }
        let position = writer.seek(target as u64);
        self.position = position;
        Ok(position)
    }

    /// Release the writer. Idempotent, safe with no operation pending, and
    /// terminal: later writes fail with `InvalidState`.
    pub fn close(&mut self) {
        self.state = WriterState::Closed;
        self.position = 0;
    }

    fn writer(&self) -> Result<&dyn SequentialWriter> {
        match &self.state {
            WriterState::Ready(writer) => Ok(writer.as_ref()),
            _ => Err(FsError::new(
                self.fs.repository(),
                &self.path,
                ErrorKind::InvalidState,
            )),
        }
    }

    async fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            WriterState::Ready(_) => Ok(()),
            WriterState::Closed => Err(FsError::new(
                self.fs.repository(),
                &self.path,
                ErrorKind::InvalidState,
            )),
            WriterState::Unopened => {
                let volume = self.fs.volume().await?;
                let entry = volume
                    .get_file(&self.fs.full_path(&self.path), true)
                    .await
                    .map_err(|err| self.fs.translate(&self.path, err))?;
                let writer = entry
                    .create_writer()
                    .await
                    .map_err(|err| self.fs.translate(&self.path, err))?;
                if self.options.append {
                    let meta = entry
                        .metadata()
                        .await
                        .map_err(|err| self.fs.translate(&self.path, err))?;
                    writer.seek(meta.size);
                    self.position = meta.size;
                } else {
                    // The writer is not ready until the truncation has
                    // actually completed.
                    let completion = writer.truncate(0);
                    complete(self.fs.repository(), &self.path, completion).await?;
                    self.position = 0;
                }
                debug!(path = %self.path, append = self.options.append, "writer acquired");
                self.state = WriterState::Ready(writer);
                Ok(())
            }
        }
    }
}

/// Await one operation's one-shot result slot. A dropped sender means the
/// backend abandoned the operation.
async fn complete(repository: &str, path: &str, completion: Completion) -> Result<()> {
    match completion.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(FsError::translate(repository, path, err)),
        Err(_) => Err(FsError::new(repository, path, ErrorKind::Abort)),
    }
}
