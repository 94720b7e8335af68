//! File handles.

use crate::filesystem::FileSystem;
use crate::read_stream::{ReadOptions, ReadStream};
use crate::write_stream::{WriteOptions, WriteStream};
use crate::{Metadata, Result};

/// Path handle for a file. Constructing one performs no I/O.
#[derive(Clone)]
pub struct File {
    fs: FileSystem,
    path: String,
}

impl File {
    pub(crate) fn new(fs: FileSystem, path: String) -> Self {
        Self { fs, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn stat(&self) -> Result<Metadata> {
        self.fs.head(&self.path).await
    }

    pub async fn remove(&self) -> Result<()> {
        let volume = self.fs.volume().await?;
        let entry = volume
            .get_file(&self.fs.full_path(&self.path), false)
            .await
            .map_err(|err| self.fs.translate(&self.path, err))?;
        entry
            .remove()
            .await
            .map_err(|err| self.fs.translate(&self.path, err))
    }

    /// Positioned read stream over this file. The backend file object is
    /// bound lazily on the first read.
    pub fn read_stream(&self, options: ReadOptions) -> ReadStream {
        ReadStream::new(self.fs.clone(), self.path.clone(), options)
    }

    /// Write stream over this file. The writer is acquired by the first
    /// operation; in the default truncate mode any prior content is
    /// discarded before the first write is accepted.
    pub fn write_stream(&self, options: WriteOptions) -> WriteStream {
        WriteStream::new(self.fs.clone(), self.path.clone(), options)
    }

    /// Read the whole file.
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        let mut stream = self.read_stream(ReadOptions::default());
        let mut out = Vec::new();
        loop {
            let chunk = stream.read(None).await?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        stream.close();
        Ok(out)
    }

    /// Replace the file's contents with `data`, creating the file if it
    /// does not exist yet.
    pub async fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut stream = self.write_stream(WriteOptions::default());
        stream.write(data).await?;
        stream.close();
        Ok(())
    }
}
