//! In-memory sandboxed storage backend.
//!
//! Implements the backend traits over a volatile node store, with the same
//! surface quirks as real sandboxed volumes: independent file/directory
//! lookups, a quota ceiling fixed when the volume is requested, and one
//! sequential writer per file. The test suite runs on top of this module.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use slab::Slab;
use tokio::sync::oneshot;

use crate::backend::{
    Completion, DirectoryEntry, Entry, EntryMetadata, FileEntry, NativeCode, NativeError,
    QuotaProtocol, SequentialWriter, StorageBackend, Volume,
};
use crate::path;

type Inode = usize;

#[derive(Debug)]
struct FileNode {
    name: String,
    parent: Inode,
    data: Vec<u8>,
    modified: u64,
}

#[derive(Debug)]
struct DirectoryNode {
    name: String,
    parent: Option<Inode>,
    children: Vec<Inode>,
    modified: u64,
}

#[derive(Debug)]
enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Self::File(FileNode { name, .. }) => name,
            Self::Directory(DirectoryNode { name, .. }) => name,
        }
    }

    fn modified(&self) -> u64 {
        match self {
            Self::File(FileNode { modified, .. }) => *modified,
            Self::Directory(DirectoryNode { modified, .. }) => *modified,
        }
    }
}

struct Inner {
    storage: Slab<Node>,
    root: Inode,
    quota: u64,
    used: u64,
}

impl Inner {
    fn new() -> Self {
        let mut storage = Slab::new();
        let root = storage.insert(Node::Directory(DirectoryNode {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            modified: now_millis(),
        }));
        Self {
            storage,
            root,
            quota: u64::MAX,
            used: 0,
        }
    }

    fn lookup(&self, full_path: &str) -> Result<Inode, NativeError> {
        let mut current = self.root;
        for component in full_path.split('/').filter(|c| !c.is_empty()) {
            let children = match self.storage.get(current) {
                Some(Node::Directory(DirectoryNode { children, .. })) => children,
                _ => return Err(not_found(full_path)),
            };
            current = children
                .iter()
                .copied()
                .find(|inode| {
                    self.storage
                        .get(*inode)
                        .map(|node| node.name() == component)
                        .unwrap_or(false)
                })
                .ok_or_else(|| not_found(full_path))?;
        }
        Ok(current)
    }

    /// Parent inode and final component of a non-root path. The parent
    /// must already exist as a directory.
    fn lookup_parent(&self, full_path: &str) -> Result<(Inode, String), NativeError> {
        let split = full_path.rfind('/').unwrap_or(0);
        let (parent_path, name) = if split == 0 {
            ("/", &full_path[1..])
        } else {
            (&full_path[..split], &full_path[split + 1..])
        };
        let parent = self.lookup(parent_path)?;
        match self.storage.get(parent) {
            Some(Node::Directory(_)) => Ok((parent, name.to_string())),
            _ => Err(not_found(parent_path)),
        }
    }

    fn detach(&mut self, parent: Inode, inode: Inode) {
        if let Some(Node::Directory(dir)) = self.storage.get_mut(parent) {
            dir.children.retain(|child| *child != inode);
            dir.modified = now_millis();
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn not_found(path: &str) -> NativeError {
    NativeError::new(NativeCode::NotFound, format!("no entry at {path}"))
}

fn type_mismatch(path: &str, wanted: &str) -> NativeError {
    NativeError::new(
        NativeCode::TypeMismatch,
        format!("{path} is not a {wanted}"),
    )
}

fn stale_entry(path: &str) -> NativeError {
    NativeError::new(
        NativeCode::InvalidState,
        format!("entry at {path} no longer exists"),
    )
}

type Shared = Arc<RwLock<Inner>>;

fn read_lock(inner: &Shared) -> Result<RwLockReadGuard<'_, Inner>, NativeError> {
    inner
        .read()
        .map_err(|_| NativeError::new(NativeCode::Internal, "storage lock poisoned"))
}

fn write_lock(inner: &Shared) -> Result<RwLockWriteGuard<'_, Inner>, NativeError> {
    inner
        .write()
        .map_err(|_| NativeError::new(NativeCode::Internal, "storage lock poisoned"))
}

struct BackendState {
    protocols: Vec<QuotaProtocol>,
    deny_access: bool,
    volume_requests: AtomicUsize,
    negotiations: Mutex<Vec<QuotaProtocol>>,
}

/// A volatile sandboxed storage environment.
///
/// Clones share the same store, so a test can keep one clone for
/// assertions while the adapter owns another.
#[derive(Clone)]
pub struct SandboxBackend {
    inner: Shared,
    state: Arc<BackendState>,
}

impl SandboxBackend {
    pub fn new() -> Self {
        Self::with_protocols(vec![QuotaProtocol::Persistent])
    }

    /// Environment offering exactly the given negotiation protocols.
    pub fn with_protocols(protocols: Vec<QuotaProtocol>) -> Self {
        Self::build(protocols, false)
    }

    /// Environment that refuses to hand out a volume.
    pub fn deny_access() -> Self {
        Self::build(vec![QuotaProtocol::Persistent], true)
    }

    fn build(protocols: Vec<QuotaProtocol>, deny_access: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new())),
            state: Arc::new(BackendState {
                protocols,
                deny_access,
                volume_requests: AtomicUsize::new(0),
                negotiations: Mutex::new(Vec::new()),
            }),
        }
    }

    /// How many times a volume handle was requested.
    pub fn volume_requests(&self) -> usize {
        self.state.volume_requests.load(Ordering::SeqCst)
    }

    /// Protocols that were used for quota negotiation, in order.
    pub fn negotiations(&self) -> Vec<QuotaProtocol> {
        self.state
            .negotiations
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Default for SandboxBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for SandboxBackend {
    fn supports_protocol(&self, protocol: QuotaProtocol) -> bool {
        self.state.protocols.contains(&protocol)
    }

    async fn request_quota(
        &self,
        protocol: QuotaProtocol,
        bytes: u64,
    ) -> Result<u64, NativeError> {
        if let Ok(mut negotiations) = self.state.negotiations.lock() {
            negotiations.push(protocol);
        }
        Ok(bytes)
    }

    async fn request_volume(&self, bytes: u64) -> Result<Arc<dyn Volume>, NativeError> {
        self.state.volume_requests.fetch_add(1, Ordering::SeqCst);
        if self.state.deny_access {
            return Err(NativeError::new(
                NativeCode::Security,
                "storage access denied",
            ));
        }
        write_lock(&self.inner)?.quota = bytes;
        Ok(Arc::new(SandboxVolume {
            inner: self.inner.clone(),
        }))
    }
}

struct SandboxVolume {
    inner: Shared,
}

#[async_trait]
impl Volume for SandboxVolume {
    async fn get_file(
        &self,
        full_path: &str,
        create: bool,
    ) -> Result<Arc<dyn FileEntry>, NativeError> {
        let full_path = path::normalize(full_path);
        let mut inner = write_lock(&self.inner)?;
        let inode = match inner.lookup(&full_path) {
            Ok(inode) => inode,
            Err(err) => {
                if !create {
                    return Err(err);
                }
                let (parent, name) = inner.lookup_parent(&full_path)?;
                let inode = inner.storage.insert(Node::File(FileNode {
                    name,
                    parent,
                    data: Vec::new(),
                    modified: now_millis(),
                }));
                if let Some(Node::Directory(dir)) = inner.storage.get_mut(parent) {
                    dir.children.push(inode);
                    dir.modified = now_millis();
                }
                inode
            }
        };
        match inner.storage.get(inode) {
            Some(Node::File(_)) => Ok(Arc::new(MemFileEntry {
                inner: self.inner.clone(),
                inode,
                full_path,
            })),
            _ => Err(type_mismatch(&full_path, "file")),
        }
    }

    async fn get_directory(
        &self,
        full_path: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryEntry>, NativeError> {
        let full_path = path::normalize(full_path);
        let mut inner = write_lock(&self.inner)?;
        let inode = match inner.lookup(&full_path) {
            Ok(inode) => inode,
            Err(err) => {
                if !create {
                    return Err(err);
                }
                let (parent, name) = inner.lookup_parent(&full_path)?;
                let inode = inner.storage.insert(Node::Directory(DirectoryNode {
                    name,
                    parent: Some(parent),
                    children: Vec::new(),
                    modified: now_millis(),
                }));
                if let Some(Node::Directory(dir)) = inner.storage.get_mut(parent) {
                    dir.children.push(inode);
                    dir.modified = now_millis();
                }
                inode
            }
        };
        match inner.storage.get(inode) {
            Some(Node::Directory(_)) => Ok(Arc::new(MemDirectoryEntry {
                inner: self.inner.clone(),
                inode,
                full_path,
            })),
            _ => Err(type_mismatch(&full_path, "directory")),
        }
    }
}

struct MemFileEntry {
    inner: Shared,
    inode: Inode,
    full_path: String,
}

#[async_trait]
impl Entry for MemFileEntry {
    fn full_path(&self) -> String {
        self.full_path.clone()
    }

    async fn metadata(&self) -> Result<EntryMetadata, NativeError> {
        let inner = read_lock(&self.inner)?;
        match inner.storage.get(self.inode) {
            Some(Node::File(file)) => Ok(EntryMetadata {
                size: file.data.len() as u64,
                modified: file.modified,
            }),
            _ => Err(stale_entry(&self.full_path)),
        }
    }

    async fn remove(&self) -> Result<(), NativeError> {
        let mut inner = write_lock(&self.inner)?;
        let (parent, len) = match inner.storage.get(self.inode) {
            Some(Node::File(file)) => (file.parent, file.data.len() as u64),
            _ => return Err(stale_entry(&self.full_path)),
        };
        inner.detach(parent, self.inode);
        inner.storage.remove(self.inode);
        inner.used -= len;
        Ok(())
    }

    fn url(&self) -> String {
        format!("sandbox:{}", self.full_path)
    }
}

#[async_trait]
impl FileEntry for MemFileEntry {
    async fn slice(&self, start: u64, end: u64) -> Result<Bytes, NativeError> {
        let inner = read_lock(&self.inner)?;
        match inner.storage.get(self.inode) {
            Some(Node::File(file)) => {
                let len = file.data.len() as u64;
                let start = start.min(len) as usize;
                let end = end.min(len) as usize;
                Ok(Bytes::copy_from_slice(&file.data[start..end]))
            }
            _ => Err(stale_entry(&self.full_path)),
        }
    }

    async fn create_writer(&self) -> Result<Box<dyn SequentialWriter>, NativeError> {
        let inner = read_lock(&self.inner)?;
        match inner.storage.get(self.inode) {
            Some(Node::File(_)) => Ok(Box::new(MemWriter {
                inner: self.inner.clone(),
                inode: self.inode,
                full_path: self.full_path.clone(),
                position: AtomicU64::new(0),
            })),
            _ => Err(stale_entry(&self.full_path)),
        }
    }
}

struct MemDirectoryEntry {
    inner: Shared,
    inode: Inode,
    full_path: String,
}

#[async_trait]
impl Entry for MemDirectoryEntry {
    fn full_path(&self) -> String {
        self.full_path.clone()
    }

    async fn metadata(&self) -> Result<EntryMetadata, NativeError> {
        let inner = read_lock(&self.inner)?;
        match inner.storage.get(self.inode) {
            Some(node @ Node::Directory(_)) => Ok(EntryMetadata {
                size: 0,
                modified: node.modified(),
            }),
            _ => Err(stale_entry(&self.full_path)),
        }
    }

    async fn remove(&self) -> Result<(), NativeError> {
        let mut inner = write_lock(&self.inner)?;
        let parent = match inner.storage.get(self.inode) {
            Some(Node::Directory(dir)) => {
                if !dir.children.is_empty() {
                    return Err(NativeError::new(
                        NativeCode::InvalidModification,
                        format!("directory {} is not empty", self.full_path),
                    ));
                }
                dir.parent
            }
            _ => return Err(stale_entry(&self.full_path)),
        };
        let parent = parent.ok_or_else(|| {
            NativeError::new(
                NativeCode::NoModificationAllowed,
                "cannot remove the volume root",
            )
        })?;
        inner.detach(parent, self.inode);
        inner.storage.remove(self.inode);
        Ok(())
    }

    fn url(&self) -> String {
        format!("sandbox:{}", self.full_path)
    }
}

#[async_trait]
impl DirectoryEntry for MemDirectoryEntry {
    async fn read_entries(&self) -> Result<Vec<String>, NativeError> {
        let inner = read_lock(&self.inner)?;
        let children = match inner.storage.get(self.inode) {
            Some(Node::Directory(DirectoryNode { children, .. })) => children,
            _ => return Err(stale_entry(&self.full_path)),
        };
        Ok(children
            .iter()
            .filter_map(|inode| inner.storage.get(*inode))
            .map(|node| path::join(&self.full_path, node.name()))
            .collect())
    }

    async fn remove_recursively(&self) -> Result<(), NativeError> {
        let mut inner = write_lock(&self.inner)?;
        let parent = match inner.storage.get(self.inode) {
            Some(Node::Directory(dir)) => dir.parent,
            _ => return Err(stale_entry(&self.full_path)),
        };
        let parent = parent.ok_or_else(|| {
            NativeError::new(
                NativeCode::NoModificationAllowed,
                "cannot remove the volume root",
            )
        })?;

        // Collect the subtree first; the slab cannot be mutated while its
        // nodes are being walked.
        let mut doomed = vec![self.inode];
        let mut index = 0;
        while index < doomed.len() {
            if let Some(Node::Directory(dir)) = inner.storage.get(doomed[index]) {
                doomed.extend(dir.children.iter().copied());
            }
            index += 1;
        }
        inner.detach(parent, self.inode);
        for inode in doomed {
            if let Node::File(file) = inner.storage.remove(inode) {
                inner.used -= file.data.len() as u64;
            }
        }
        Ok(())
    }
}

struct MemWriter {
    inner: Shared,
    inode: Inode,
    full_path: String,
    position: AtomicU64,
}

impl MemWriter {
    fn apply_write(&self, data: &[u8]) -> Result<(), NativeError> {
        let mut inner = write_lock(&self.inner)?;
        let quota = inner.quota;
        let used = inner.used;
        let growth = {
            let file = match inner.storage.get_mut(self.inode) {
                Some(Node::File(file)) => file,
                _ => return Err(stale_entry(&self.full_path)),
            };
            let start = self.position.load(Ordering::SeqCst) as usize;
            let end = start + data.len();
            let growth = end.saturating_sub(file.data.len()) as u64;
            if used + growth > quota {
                return Err(NativeError::new(
                    NativeCode::QuotaExceeded,
                    format!("write of {} bytes exceeds quota of {quota}", data.len()),
                ));
            }
            if file.data.len() < end {
                file.data.resize(end, 0);
            }
            file.data[start..end].copy_from_slice(data);
            file.modified = now_millis();
            self.position.store(end as u64, Ordering::SeqCst);
            growth
        };
        inner.used += growth;
        Ok(())
    }

    fn apply_truncate(&self, size: u64) -> Result<(), NativeError> {
        let mut inner = write_lock(&self.inner)?;
        let quota = inner.quota;
        let used = inner.used;
        let delta = {
            let file = match inner.storage.get_mut(self.inode) {
                Some(Node::File(file)) => file,
                _ => return Err(stale_entry(&self.full_path)),
            };
            let len = file.data.len() as u64;
            if size > len {
                let growth = size - len;
                if used + growth > quota {
                    return Err(NativeError::new(
                        NativeCode::QuotaExceeded,
                        format!("extending to {size} bytes exceeds quota of {quota}"),
                    ));
                }
                file.data.resize(size as usize, 0);
                growth as i64
            } else {
                file.data.truncate(size as usize);
                -((len - size) as i64)
            }
        };
        if let Some(Node::File(file)) = inner.storage.get_mut(self.inode) {
            file.modified = now_millis();
        }
        if self.position.load(Ordering::SeqCst) > size {
            self.position.store(size, Ordering::SeqCst);
        }
        if delta >= 0 {
            inner.used += delta as u64;
        } else {
            inner.used -= (-delta) as u64;
        }
        Ok(())
    }

    /// Deliver a result on a fresh one-shot slot, the way the native
    /// writer fires exactly one completion event per operation.
    fn deliver(result: Result<(), NativeError>) -> Completion {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        rx
    }
}

impl SequentialWriter for MemWriter {
    fn length(&self) -> u64 {
        match self.inner.read() {
            Ok(inner) => match inner.storage.get(self.inode) {
                Some(Node::File(file)) => file.data.len() as u64,
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn seek(&self, offset: u64) -> u64 {
        let clamped = offset.min(self.length());
        self.position.store(clamped, Ordering::SeqCst);
        clamped
    }

    fn write(&self, data: Bytes) -> Completion {
        Self::deliver(self.apply_write(&data))
    }

    fn truncate(&self, size: u64) -> Completion {
        Self::deliver(self.apply_truncate(size))
    }
}
