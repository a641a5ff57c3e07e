//! Virtual filesystem rooted at a configurable directory.
//!
//! This module provides:
//! - [`Vfs`] - Path mapping and confinement over a storage backend
//! - [`Storage`] - Raw I/O backend trait with [`DiskStorage`] and [`MemoryStorage`]
//! - [`path`] - Virtual path normalization helpers
//!
//! Every virtual path goes through [`Vfs::resolve`] before touching storage,
//! and `resolve` is the only function that maps virtual paths to real ones.

pub mod path;
mod storage;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

pub use storage::{DirEntry, DiskStorage, MemoryStorage, Metadata, Storage};

/// Errors from virtual filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path would resolve outside the filesystem root.
    #[error("path escapes sandbox root: {0}")]
    PathEscape(String),
    /// The path is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// No file or directory at this path.
    #[error("{0}: No such file or directory")]
    NotFound(String),
    /// A path component is not a directory.
    #[error("{0}: Not a directory")]
    NotADirectory(String),
    /// Expected a file but found a directory.
    #[error("{0}: Is a directory")]
    IsADirectory(String),
    /// Directory still has entries.
    #[error("{0}: Directory not empty")]
    DirectoryNotEmpty(String),
    /// Any other I/O failure.
    #[error("{path}: {source}")]
    Io {
        /// Virtual path being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify an I/O error for the given virtual path.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(path),
            io::ErrorKind::IsADirectory => FsError::IsADirectory(path),
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty(path),
            _ => FsError::Io { path, source: err },
        }
    }

    /// Returns true for path confinement violations.
    pub fn is_escape(&self) -> bool {
        matches!(self, FsError::PathEscape(_))
    }
}

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// A filesystem tree rooted at a real directory.
///
/// Cloning is cheap; clones share the same storage.
#[derive(Clone)]
pub struct Vfs {
    /// Outermost real root; scoped views keep their parent's.
    base: PathBuf,
    root: PathBuf,
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for Vfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vfs")
            .field("base", &self.base)
            .field("root", &self.root)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Vfs {
    /// Create a disk-backed filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_storage(root, Arc::new(DiskStorage::new()))
    }

    /// Create an in-memory filesystem.
    pub fn in_memory() -> Self {
        Self::with_storage("/", Arc::new(MemoryStorage::new()))
    }

    /// Create a filesystem over a custom storage backend.
    pub fn with_storage(root: impl Into<PathBuf>, storage: Arc<dyn Storage>) -> Self {
        let root = root.into();
        Self {
            base: root.clone(),
            root,
            storage,
        }
    }

    /// The real root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to its real path under the root.
    ///
    /// Strips the leading `/`, folds `.` and `..`, and fails with
    /// [`FsError::PathEscape`] if the result would leave the root.
    pub fn resolve(&self, virtual_path: &str) -> FsResult<PathBuf> {
        let parts = path::components(virtual_path)?;
        let mut real = self.root.clone();
        real.extend(parts);
        Ok(real)
    }

    /// Resolve a virtual path for an actual storage access.
    ///
    /// On top of [`resolve`](Self::resolve), every existing component below
    /// the outermost root must not be a symbolic link, since storage follows
    /// links and a link could point anywhere on the host.
    async fn locate(&self, virtual_path: &str) -> FsResult<PathBuf> {
        let real = self.resolve(virtual_path)?;
        let rel = real
            .strip_prefix(&self.base)
            .map_err(|_| FsError::PathEscape(virtual_path.to_string()))?;

        let mut current = self.base.clone();
        for component in rel.components() {
            current.push(component);
            match self.storage.is_symlink(&current).await {
                Ok(true) => return Err(FsError::PathEscape(virtual_path.to_string())),
                Ok(false) => {}
                // Nothing below a missing component exists to redirect.
                Err(_) => break,
            }
        }
        Ok(real)
    }

    /// Map a real path under the root back to its virtual form.
    pub fn to_virtual(&self, real: &Path) -> FsResult<String> {
        let rel = real
            .strip_prefix(&self.root)
            .map_err(|_| FsError::PathEscape(real.display().to_string()))?;
        let joined: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        path::normalize(&joined.join("/"))
    }

    /// A view of this filesystem whose root is the virtual directory `prefix`.
    pub fn scoped(&self, prefix: &str) -> FsResult<Vfs> {
        Ok(Vfs {
            base: self.base.clone(),
            root: self.resolve(prefix)?,
            storage: Arc::clone(&self.storage),
        })
    }

    /// Read an entire file.
    pub async fn read_file(&self, virtual_path: &str) -> FsResult<Vec<u8>> {
        let real = self.locate(virtual_path).await?;
        self.storage
            .read(&real)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))
    }

    /// Write a file, creating intermediate directories as needed.
    pub async fn write_file(&self, virtual_path: &str, data: &[u8]) -> FsResult<()> {
        let real = self.locate(virtual_path).await?;
        self.storage
            .write(&real, data)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))
    }

    /// Append to a file, creating it if needed.
    pub async fn append_file(&self, virtual_path: &str, data: &[u8]) -> FsResult<()> {
        let real = self.locate(virtual_path).await?;
        self.storage
            .append(&real, data)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))
    }

    /// Whether a file or directory exists.
    ///
    /// Paths that escape the root are still an error, not `false`.
    pub async fn exists(&self, virtual_path: &str) -> FsResult<bool> {
        match self.stat(virtual_path).await {
            Ok(_) => Ok(true),
            Err(FsError::NotFound(_) | FsError::NotADirectory(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get metadata for a path.
    pub async fn stat(&self, virtual_path: &str) -> FsResult<Metadata> {
        let real = self.locate(virtual_path).await?;
        self.storage
            .stat(&real)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))
    }

    /// List a directory, sorted by name.
    pub async fn list(&self, virtual_path: &str) -> FsResult<Vec<DirEntry>> {
        let real = self.locate(virtual_path).await?;
        let mut entries = self
            .storage
            .list(&real)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Create a directory and its missing ancestors.
    pub async fn mkdir_all(&self, virtual_path: &str) -> FsResult<()> {
        let real = self.locate(virtual_path).await?;
        self.storage
            .mkdir_all(&real)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))
    }

    /// Remove a file or directory.
    pub async fn remove(&self, virtual_path: &str, recursive: bool) -> FsResult<()> {
        let real = self.locate(virtual_path).await?;
        if real == self.root {
            return Err(FsError::Io {
                path: virtual_path.to_string(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "cannot remove root"),
            });
        }
        self.storage
            .remove(&real, recursive)
            .await
            .map_err(|e| FsError::from_io(virtual_path, e))
    }

    /// Move a file or directory.
    pub async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let real_from = self.locate(from).await?;
        let real_to = self.locate(to).await?;
        self.storage
            .rename(&real_from, &real_to)
            .await
            .map_err(|e| FsError::from_io(from, e))
    }
}
