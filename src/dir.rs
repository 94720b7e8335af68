//! Directory handles and recursive tree operations.

use tracing::debug;

use crate::error::{ErrorKind, FsError};
use crate::filesystem::{EntryKind, FileSystem};
use crate::{path, Metadata, Result};

/// Options for recursive copy and move.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Overwrite existing destinations instead of recording `PathExists`.
    pub force: bool,
    /// Descend into subdirectories.
    pub recursive: bool,
}

/// Path handle for a directory. Constructing one performs no I/O; the
/// backend entry is re-resolved by each operation.
#[derive(Clone)]
pub struct Directory {
    fs: FileSystem,
    path: String,
}

impl Directory {
    pub(crate) fn new(fs: FileSystem, path: String) -> Self {
        Self { fs, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn stat(&self) -> Result<Metadata> {
        self.fs.head(&self.path).await
    }

    /// Immediate children as repository-relative paths, unsorted.
    ///
    /// Listing a missing path fails with `NotFound`; listing a file fails
    /// with `TypeMismatch`, never an empty result.
    pub async fn list(&self) -> Result<Vec<String>> {
        let entry = match self.fs.resolve_entry(&self.path).await? {
            EntryKind::Directory(entry) => entry,
            EntryKind::File(_) => {
                return Err(FsError::new(
                    self.fs.repository(),
                    &self.path,
                    ErrorKind::TypeMismatch,
                ))
            }
        };
        let children = entry
            .read_entries()
            .await
            .map_err(|err| self.fs.translate(&self.path, err))?;
        Ok(children
            .iter()
            .map(|full| path::strip_repository(self.fs.repository(), full).to_string())
            .collect())
    }

    /// Create this directory. The parent must already exist.
    pub async fn create(&self) -> Result<()> {
        let volume = self.fs.volume().await?;
        volume
            .get_directory(&self.fs.full_path(&self.path), true)
            .await
            .map_err(|err| self.fs.translate(&self.path, err))?;
        Ok(())
    }

    /// Remove this directory.
    ///
    /// Without `recursive` the backend rejects non-empty directories. With
    /// it, the backend's native recursive delete is requested in a single
    /// call rather than walking the tree here.
    pub async fn remove(&self, recursive: bool) -> Result<()> {
        let volume = self.fs.volume().await?;
        let entry = volume
            .get_directory(&self.fs.full_path(&self.path), false)
            .await
            .map_err(|err| self.fs.translate(&self.path, err))?;
        let result = if recursive {
            entry.remove_recursively().await
        } else {
            entry.remove().await
        };
        result.map_err(|err| self.fs.translate(&self.path, err))
    }

    /// Copy this directory's tree under `dst`.
    ///
    /// Every entry is attempted independently; failures are recorded and
    /// siblings keep being processed. An empty list means full success.
    pub async fn copy_to(&self, dst: &Directory, options: CopyOptions) -> Vec<FsError> {
        let mut errors = Vec::new();
        self.copy_into(dst, options, &mut errors).await;
        errors
    }

    /// Move this directory: recursive copy, then recursive removal of the
    /// source once the copy reported no failures.
    pub async fn move_to(&self, dst: &Directory) -> Vec<FsError> {
        let mut errors = self
            .copy_to(
                dst,
                CopyOptions {
                    force: false,
                    recursive: true,
                },
            )
            .await;
        if errors.is_empty() {
            if let Err(err) = self.remove(true).await {
                errors.push(err);
            }
        }
        errors
    }

    async fn copy_into(&self, dst: &Directory, options: CopyOptions, errors: &mut Vec<FsError>) {
        debug!(src = %self.path, dst = %dst.path, "copying directory");
        if !options.force && self.fs.head(&dst.path).await.is_ok() {
            errors.push(FsError::new(
                self.fs.repository(),
                &dst.path,
                ErrorKind::PathExists,
            ));
            return;
        }
        if let Err(err) = dst.create().await {
            errors.push(err);
            return;
        }
        let children = match self.list().await {
            Ok(children) => children,
            Err(err) => {
                errors.push(err);
                return;
            }
        };
        for child in children {
            let target = path::join(&dst.path, path::file_name(&child));
            match self.fs.resolve_entry(&child).await {
                Ok(EntryKind::File(_)) => {
                    if let Err(err) = copy_file(&self.fs, &child, &target, options.force).await {
                        errors.push(err);
                    }
                }
                Ok(EntryKind::Directory(_)) => {
                    if options.recursive {
                        let src_sub = self.fs.get_directory(&child);
                        let dst_sub = self.fs.get_directory(&target);
                        Box::pin(src_sub.copy_into(&dst_sub, options, errors)).await;
                    }
                }
                Err(err) => errors.push(err),
            }
        }
    }
}

/// Copy one file. With `force` unset an existing destination is rejected
/// with `PathExists` instead of being overwritten.
pub(crate) async fn copy_file(
    fs: &FileSystem,
    src: &str,
    dst: &str,
    force: bool,
) -> Result<()> {
    if !force && fs.head(dst).await.is_ok() {
        return Err(FsError::new(fs.repository(), dst, ErrorKind::PathExists));
    }
    let data = fs.get_file(src).read_all().await?;
    fs.get_file(dst).write_all(&data).await
}
