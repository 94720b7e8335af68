//! The sandboxed storage backend the adapter is written against.
//!
//! The backend model mirrors what sandboxed storage volumes actually offer:
//! two independent lookup primitives instead of a unified stat, byte-range
//! reads, a single sequential writer per file whose operations complete
//! through one-shot result slots, and native recursive removal.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

/// Error codes a backend can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCode {
    NotFound,
    Security,
    Abort,
    NotReadable,
    Encoding,
    NoModificationAllowed,
    InvalidState,
    InvalidModification,
    Syntax,
    QuotaExceeded,
    TypeMismatch,
    PathExists,
    /// Backend-internal failure with no dedicated code.
    Internal,
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("{code:?}: {message}")]
pub struct NativeError {
    pub code: NativeCode,
    pub message: String,
}

impl NativeError {
    pub fn new(code: NativeCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One-shot result slot for a writer operation.
///
/// Exactly one completion is delivered per operation; a dropped sender
/// means the backend abandoned the operation and is reported as an abort.
pub type Completion = oneshot::Receiver<Result<(), NativeError>>;

/// Quota negotiation protocols, primary first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaProtocol {
    Persistent,
    StorageInfo,
    LegacyStorageInfo,
}

/// Fixed fallback order for quota negotiation.
pub const QUOTA_PROTOCOLS: [QuotaProtocol; 3] = [
    QuotaProtocol::Persistent,
    QuotaProtocol::StorageInfo,
    QuotaProtocol::LegacyStorageInfo,
];

/// Entry point to a sandboxed storage environment.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Whether the environment offers the given negotiation protocol.
    fn supports_protocol(&self, protocol: QuotaProtocol) -> bool;

    /// Negotiate a storage grant of `bytes`; returns the granted ceiling.
    async fn request_quota(
        &self,
        protocol: QuotaProtocol,
        bytes: u64,
    ) -> Result<u64, NativeError>;

    /// Request the volume handle with the given size ceiling.
    async fn request_volume(&self, bytes: u64) -> Result<Arc<dyn Volume>, NativeError>;
}

/// The long-lived capability object granting access to the storage volume.
#[async_trait]
pub trait Volume: Send + Sync {
    /// Look the path up as a file, optionally creating it.
    ///
    /// Fails with `TypeMismatch` when the path denotes a directory and with
    /// `NotFound` when it is absent and `create` is false. Creation
    /// requires the parent directory to exist.
    async fn get_file(
        &self,
        full_path: &str,
        create: bool,
    ) -> Result<Arc<dyn FileEntry>, NativeError>;

    /// Look the path up as a directory, optionally creating one level.
    async fn get_directory(
        &self,
        full_path: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryEntry>, NativeError>;
}

#[cfg(test)]
impl std::fmt::Debug for dyn Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Volume")
    }
}

#[cfg(test)]
impl std::fmt::Debug for dyn FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FileEntry").field(&self.full_path()).finish()
    }
}

#[cfg(test)]
impl std::fmt::Debug for dyn DirectoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DirectoryEntry")
            .field(&self.full_path())
            .finish()
    }
}

/// Size and modification time as the backend reports them.
///
/// Backends report a size for every entry; whether it is meaningful for
/// directories is the adapter's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub size: u64,
    /// Unix milliseconds.
    pub modified: u64,
}

/// A backend-native handle to a file or directory.
#[async_trait]
pub trait Entry: Send + Sync {
    /// Volume-absolute path of the entry.
    fn full_path(&self) -> String;

    async fn metadata(&self) -> Result<EntryMetadata, NativeError>;

    /// Remove the entry. Directories must be empty.
    async fn remove(&self) -> Result<(), NativeError>;

    /// Read-access URL for the entry.
    fn url(&self) -> String;
}

#[async_trait]
pub trait FileEntry: Entry {
    /// Byte-range read; the backend clamps the range at end-of-file.
    async fn slice(&self, start: u64, end: u64) -> Result<Bytes, NativeError>;

    /// Acquire the file's sequential writer.
    ///
    /// The backend supports one writer abstraction per file; the returned
    /// writer is exclusively owned by the caller.
    async fn create_writer(&self) -> Result<Box<dyn SequentialWriter>, NativeError>;
}

#[async_trait]
pub trait DirectoryEntry: Entry {
    /// Volume-absolute paths of the immediate children, unsorted.
    async fn read_entries(&self) -> Result<Vec<String>, NativeError>;

    /// The backend's native recursive delete.
    async fn remove_recursively(&self) -> Result<(), NativeError>;
}

/// The backend's single truncate-or-append writer for one file.
///
/// `write` and `truncate` are asynchronous on the backend side; each call
/// hands back a fresh [`Completion`] owned by that operation alone, so a
/// completion can never be observed by an unrelated, later operation.
pub trait SequentialWriter: Send + Sync {
    /// Current length of the file as seen by this writer.
    fn length(&self) -> u64;

    /// Reposition the writer, clamped to the file length. Returns the
    /// resulting offset.
    fn seek(&self, offset: u64) -> u64;

    /// Write `data` at the writer's current position.
    fn write(&self, data: Bytes) -> Completion;

    /// Change the file length to `size`, zero-padding when extending.
    fn truncate(&self, size: u64) -> Completion;
}
