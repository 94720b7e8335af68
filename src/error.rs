use std::fmt;
use std::sync::Arc;

use crate::backend::{NativeCode, NativeError};

/// Error taxonomy for adapter operations.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("entry not found")]
    NotFound,
    #[error("security violation")]
    Security,
    #[error("operation aborted")]
    Abort,
    #[error("entry not readable")]
    NotReadable,
    #[error("encoding error")]
    Encoding,
    #[error("no modification allowed")]
    NoModificationAllowed,
    #[error("invalid state")]
    InvalidState,
    #[error("syntax error")]
    Syntax,
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("path already exists")]
    PathExists,
    #[error("operation not supported")]
    NotSupported,
}

/// An operation failure bound to the repository and path it happened on.
///
/// When the failure originated in the backend, the native error is kept as
/// the cause for diagnostics. The record is immutable once constructed and
/// cheap to clone, so a memoized acquisition failure can be replayed to
/// every caller.
#[derive(Debug, Clone)]
pub struct FsError {
    pub repository: String,
    pub path: String,
    pub kind: ErrorKind,
    cause: Option<Arc<NativeError>>,
}

impl FsError {
    pub fn new(repository: &str, path: &str, kind: ErrorKind) -> Self {
        Self {
            repository: repository.to_string(),
            path: path.to_string(),
            kind,
            cause: None,
        }
    }

    /// Translate a native backend error into the typed taxonomy.
    ///
    /// Total: codes without a dedicated kind degrade to
    /// [`ErrorKind::NotSupported`] rather than being dropped. Both
    /// `InvalidState` and `InvalidModification` collapse to
    /// [`ErrorKind::InvalidState`].
    pub fn translate(repository: &str, path: &str, err: NativeError) -> Self {
        let kind = match err.code {
            NativeCode::NotFound => ErrorKind::NotFound,
            NativeCode::Security => ErrorKind::Security,
            NativeCode::Abort => ErrorKind::Abort,
            NativeCode::NotReadable => ErrorKind::NotReadable,
            NativeCode::Encoding => ErrorKind::Encoding,
            NativeCode::NoModificationAllowed => ErrorKind::NoModificationAllowed,
            NativeCode::InvalidState => ErrorKind::InvalidState,
            NativeCode::InvalidModification => ErrorKind::InvalidState,
            NativeCode::Syntax => ErrorKind::Syntax,
            NativeCode::QuotaExceeded => ErrorKind::QuotaExceeded,
            NativeCode::TypeMismatch => ErrorKind::TypeMismatch,
            NativeCode::PathExists => ErrorKind::PathExists,
            _ => ErrorKind::NotSupported,
        };
        Self {
            repository: repository.to_string(),
            path: path.to_string(),
            kind,
            cause: Some(Arc::new(err)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn cause(&self) -> Option<&NativeError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (repository={}, path={})",
            self.kind, self.repository, self.path
        )
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}
