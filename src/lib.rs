//! File system adapter over sandboxed, quota-limited storage volumes.
//!
//! The storage backends this crate targets expose a callback-oriented API
//! with no unified stat primitive, byte-range reads only, and a single
//! sequential writer per file. [`FileSystem`] turns such a volume into a
//! directory/file/stream interface with typed errors and resilient
//! recursive operations.

pub mod backend;
mod dir;
mod error;
mod file;
mod filesystem;
pub mod mem;
pub mod path;
mod read_stream;
mod volume;
mod write_stream;

pub use dir::{CopyOptions, Directory};
pub use error::{ErrorKind, FsError};
pub use file::File;
pub use filesystem::{FileSystem, UrlKind};
pub use read_stream::{ReadOptions, ReadStream};
pub use write_stream::{WriteOptions, WriteStream};

pub type Result<T> = std::result::Result<T, FsError>;

/// How many bytes a read with no size hint asks the backend for.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Origin against which a seek offset is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Begin,
    Current,
    End,
}

/// What a successful `stat` reports.
///
/// Directories never carry a size, which is how a directory is told apart
/// from a zero-byte file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    /// Byte length for files, `None` for directories.
    pub size: Option<u64>,
    /// Last modification time in Unix milliseconds, when the backend
    /// reports one.
    pub modified: Option<u64>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.size.is_none()
    }

    pub fn is_file(&self) -> bool {
        self.size.is_some()
    }
}
