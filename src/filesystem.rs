//! The adapter type itself.

use std::sync::Arc;

use futures::future::{self, Either};
use futures::pin_mut;
use tracing::{debug, trace};

use crate::backend::{DirectoryEntry, FileEntry, StorageBackend, Volume};
use crate::dir::{CopyOptions, Directory};
use crate::error::{ErrorKind, FsError};
use crate::file::File;
use crate::volume::VolumeManager;
use crate::{path, Metadata, Result};

/// Kinds of URL an entry can be turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Read,
    Write,
    Delete,
}

/// A resolved backend entry, tagged with what the path turned out to be.
#[cfg_attr(test, derive(Debug))]
pub(crate) enum EntryKind {
    File(Arc<dyn FileEntry>),
    Directory(Arc<dyn DirectoryEntry>),
}

struct FsInner {
    repository: String,
    volumes: VolumeManager,
}

/// File system view over one sandboxed storage volume.
///
/// All paths are repository-relative; the repository root is fixed at
/// construction. Cloning is cheap and clones share the volume handle.
#[derive(Clone)]
pub struct FileSystem {
    inner: Arc<FsInner>,
}

impl FileSystem {
    /// Create an adapter rooted at `root`, asking the backend for a volume
    /// of at most `quota` bytes. No backend call happens here; the volume
    /// is acquired lazily by the first operation that needs it.
    pub fn new(backend: impl StorageBackend, root: &str, quota: u64) -> Self {
        let repository = path::normalize(root);
        let backend: Arc<dyn StorageBackend> = Arc::new(backend);
        let volumes = VolumeManager::new(backend, repository.clone(), quota);
        Self {
            inner: Arc::new(FsInner {
                repository,
                volumes,
            }),
        }
    }

    pub fn repository(&self) -> &str {
        &self.inner.repository
    }

    /// Path handle for a file. Cheap; performs no I/O.
    pub fn get_file(&self, path: &str) -> File {
        File::new(self.clone(), path::normalize(path))
    }

    /// Path handle for a directory. Cheap; performs no I/O.
    pub fn get_directory(&self, path: &str) -> Directory {
        Directory::new(self.clone(), path::normalize(path))
    }

    /// Stats for whatever the path denotes.
    pub async fn head(&self, path: &str) -> Result<Metadata> {
        let path = path::normalize(path);
        match self.resolve_entry(&path).await? {
            EntryKind::File(entry) => {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|err| self.translate(&path, err))?;
                Ok(Metadata {
                    size: Some(meta.size),
                    modified: Some(meta.modified),
                })
            }
            EntryKind::Directory(entry) => {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|err| self.translate(&path, err))?;
                // A directory never reports a size; that is what tells it
                // apart from an empty file.
                Ok(Metadata {
                    size: None,
                    modified: Some(meta.modified),
                })
            }
        }
    }

    pub async fn stat(&self, path: &str) -> Result<Metadata> {
        self.head(path).await
    }

    /// The backend has no metadata mutation primitive.
    pub async fn patch(&self, path: &str, _metadata: Metadata) -> Result<()> {
        Err(FsError::new(
            self.repository(),
            &path::normalize(path),
            ErrorKind::NotSupported,
        ))
    }

    /// Single-level listing; repository-relative child paths, unsorted.
    pub async fn list(&self, path: &str) -> Result<Vec<String>> {
        self.get_directory(path).list().await
    }

    /// Read a whole file.
    pub async fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        self.get_file(path).read_all().await
    }

    /// Replace a file's contents with `data`, creating it if needed.
    pub async fn write_all(&self, path: &str, data: &[u8]) -> Result<()> {
        self.get_file(path).write_all(data).await
    }

    /// Remove whatever the path denotes.
    ///
    /// A non-empty directory is only removed when `recursive` is set;
    /// otherwise the backend rejects it and the error surfaces as
    /// `InvalidState`.
    pub async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let path = path::normalize(path);
        match self.resolve_entry(&path).await? {
            EntryKind::File(_) => self.get_file(&path).remove().await,
            EntryKind::Directory(_) => self.get_directory(&path).remove(recursive).await,
        }
    }

    /// Recursive copy; returns the per-entry failures instead of aborting
    /// on the first one. An empty list means full success.
    pub async fn copy(&self, src: &str, dst: &str, options: CopyOptions) -> Vec<FsError> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        match self.resolve_entry(&src).await {
            Ok(EntryKind::File(_)) => {
                match crate::dir::copy_file(self, &src, &dst, options.force).await {
                    Ok(()) => Vec::new(),
                    Err(err) => vec![err],
                }
            }
            Ok(EntryKind::Directory(_)) => {
                self.get_directory(&src)
                    .copy_to(&self.get_directory(&dst), options)
                    .await
            }
            Err(err) => vec![err],
        }
    }

    /// Move an entry. A file move is copy-then-remove of that file; a
    /// directory move is a recursive copy followed by recursive removal of
    /// the source, with the same error-aggregation contract.
    pub async fn move_entry(&self, src: &str, dst: &str) -> Vec<FsError> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        debug!(%src, %dst, "moving entry");
        match self.resolve_entry(&src).await {
            Ok(EntryKind::File(_)) => {
                let mut errors = Vec::new();
                if let Err(err) = crate::dir::copy_file(self, &src, &dst, false).await {
                    errors.push(err);
                    return errors;
                }
                if let Err(err) = self.get_file(&src).remove().await {
                    errors.push(err);
                }
                errors
            }
            Ok(EntryKind::Directory(_)) => {
                self.get_directory(&src)
                    .move_to(&self.get_directory(&dst))
                    .await
            }
            Err(err) => vec![err],
        }
    }

    /// URL for an entry. Only the read-access kind is supported.
    pub async fn to_url(&self, path: &str, kind: UrlKind) -> Result<String> {
        let path = path::normalize(path);
        if kind != UrlKind::Read {
            return Err(FsError::new(
                self.repository(),
                &path,
                ErrorKind::NotSupported,
            ));
        }
        match self.resolve_entry(&path).await? {
            EntryKind::File(entry) => Ok(entry.url()),
            EntryKind::Directory(entry) => Ok(entry.url()),
        }
    }

    pub(crate) async fn volume(&self) -> Result<Arc<dyn Volume>> {
        self.inner.volumes.volume().await
    }

    pub(crate) fn full_path(&self, path: &str) -> String {
        path::join(&self.inner.repository, path)
    }

    pub(crate) fn translate(&self, path: &str, err: crate::backend::NativeError) -> FsError {
        FsError::translate(self.repository(), path, err)
    }

    /// Work out whether a path denotes a file or a directory.
    ///
    /// The backend has no unified stat, only independent file and directory
    /// lookups, so both are raced against the same path. The first success
    /// wins immediately; a path cannot legitimately be both. A first
    /// failure is only remembered; the resolution fails once the second
    /// lookup has also failed, and it is the second failure that surfaces.
    pub(crate) async fn resolve_entry(&self, path: &str) -> Result<EntryKind> {
        let volume = self.volume().await?;
        let full = self.full_path(path);

        let file = volume.get_file(&full, false);
        let directory = volume.get_directory(&full, false);
        pin_mut!(file, directory);

        match future::select(file, directory).await {
            Either::Left((Ok(entry), _)) => Ok(EntryKind::File(entry)),
            Either::Right((Ok(entry), _)) => Ok(EntryKind::Directory(entry)),
            Either::Left((Err(first), directory)) => match directory.await {
                Ok(entry) => Ok(EntryKind::Directory(entry)),
                Err(second) => {
                    trace!(path, ?first, "both lookups failed");
                    Err(self.translate(path, second))
                }
            },
            Either::Right((Err(first), file)) => match file.await {
                Ok(entry) => Ok(EntryKind::File(entry)),
                Err(second) => {
                    trace!(path, ?first, "both lookups failed");
                    Err(self.translate(path, second))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Entry, EntryMetadata, NativeCode, NativeError, QuotaProtocol};
    use async_trait::async_trait;
    use std::result::Result;

    /// Volume whose file lookup never completes and whose directory lookup
    /// answers immediately, or whose lookups fail in a controlled way.
    struct StubVolume {
        file: LookupOutcome,
        directory: LookupOutcome,
    }

    #[derive(Clone, Copy)]
    enum LookupOutcome {
        Hang,
        Fail(NativeCode),
        SucceedDirectory,
    }

    struct StubDirectory;

    #[async_trait]
    impl Entry for StubDirectory {
        fn full_path(&self) -> String {
            "/stub".to_string()
        }

        async fn metadata(&self) -> Result<EntryMetadata, NativeError> {
            Ok(EntryMetadata {
                size: 0,
                modified: 0,
            })
        }

        async fn remove(&self) -> Result<(), NativeError> {
            Ok(())
        }

        fn url(&self) -> String {
            String::new()
        }
    }

    #[async_trait]
    impl crate::backend::DirectoryEntry for StubDirectory {
        async fn read_entries(&self) -> Result<Vec<String>, NativeError> {
            Ok(Vec::new())
        }

        async fn remove_recursively(&self) -> Result<(), NativeError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Volume for StubVolume {
        async fn get_file(
            &self,
            _full_path: &str,
            _create: bool,
        ) -> Result<Arc<dyn FileEntry>, NativeError> {
            match self.file {
                LookupOutcome::Hang => future::pending().await,
                LookupOutcome::Fail(code) => Err(NativeError::new(code, "file lookup")),
                LookupOutcome::SucceedDirectory => unreachable!("stub never yields files"),
            }
        }

        async fn get_directory(
            &self,
            _full_path: &str,
            _create: bool,
        ) -> Result<Arc<dyn DirectoryEntry>, NativeError> {
            match self.directory {
                LookupOutcome::Hang => future::pending().await,
                LookupOutcome::Fail(code) => Err(NativeError::new(code, "directory lookup")),
                LookupOutcome::SucceedDirectory => Ok(Arc::new(StubDirectory)),
            }
        }
    }

    struct StubBackend {
        volume: Arc<StubVolume>,
    }

    #[async_trait]
    impl StorageBackend for StubBackend {
        fn supports_protocol(&self, _protocol: QuotaProtocol) -> bool {
            false
        }

        async fn request_quota(
            &self,
            _protocol: QuotaProtocol,
            bytes: u64,
        ) -> Result<u64, NativeError> {
            Ok(bytes)
        }

        async fn request_volume(&self, _bytes: u64) -> Result<Arc<dyn Volume>, NativeError> {
            Ok(self.volume.clone())
        }
    }

    fn stub_fs(file: LookupOutcome, directory: LookupOutcome) -> FileSystem {
        FileSystem::new(
            StubBackend {
                volume: Arc::new(StubVolume { file, directory }),
            },
            "/",
            1024,
        )
    }

    #[tokio::test]
    async fn directory_success_resolves_while_file_lookup_pends() {
        let fs = stub_fs(LookupOutcome::Hang, LookupOutcome::SucceedDirectory);
        let resolved = fs.resolve_entry("/known-dir").await.unwrap();
        assert!(matches!(resolved, EntryKind::Directory(_)));
    }

    #[tokio::test]
    async fn second_failure_is_the_one_surfaced() {
        // The file lookup is polled first and fails first; the directory
        // lookup's failure arrives second and wins.
        let fs = stub_fs(
            LookupOutcome::Fail(NativeCode::NotFound),
            LookupOutcome::Fail(NativeCode::Security),
        );
        let err = fs.resolve_entry("/gone").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Security);
    }
}
