//! Storage backends for the virtual filesystem.
//!
//! Backends operate on real paths that [`Vfs::resolve`](super::Vfs::resolve)
//! has already mapped and confined; they never see virtual paths.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// File or directory metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// File size in bytes (0 for directories).
    pub size: u64,
}

/// A single directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (final path component).
    pub name: String,
    /// Entry metadata.
    pub metadata: Metadata,
}

/// Raw I/O backend for [`Vfs`](super::Vfs).
///
/// Implementations must be thread-safe for use across async tasks.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Read an entire file.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace a file's contents, creating intermediate directories.
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Append to a file, creating it (and intermediate directories) if needed.
    async fn append(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Get metadata for a file or directory.
    async fn stat(&self, path: &Path) -> io::Result<Metadata>;

    /// List a directory's immediate children.
    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Create a directory and all missing ancestors.
    async fn mkdir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file, or a directory (must be empty unless `recursive`).
    async fn remove(&self, path: &Path, recursive: bool) -> io::Result<()>;

    /// Move a file or directory.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Whether `path` itself is a symbolic link.
    ///
    /// Backends without links always answer `false`.
    async fn is_symlink(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }
}

/// Disk-backed storage using `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct DiskStorage;

impl DiskStorage {
    /// Create a new disk storage backend.
    pub fn new() -> Self {
        Self
    }
}

async fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

#[async_trait]
impl Storage for DiskStorage {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        create_parent(path).await?;
        tokio::fs::write(path, data).await
    }

    async fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        create_parent(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(data).await?;
        file.flush().await
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Metadata {
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: Metadata {
                    is_dir: meta.is_dir(),
                    size: if meta.is_dir() { 0 } else { meta.len() },
                },
            });
        }
        Ok(entries)
    }

    async fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove(&self, path: &Path, recursive: bool) -> io::Result<()> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_dir() {
            tokio::fs::remove_file(path).await
        } else if recursive {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_dir(path).await
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        create_parent(to).await?;
        tokio::fs::rename(from, to).await
    }

    async fn is_symlink(&self, path: &Path) -> io::Result<bool> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        Ok(meta.file_type().is_symlink())
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// In-memory storage. `/` always exists as a directory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_root(path: &Path) -> bool {
    path.parent().is_none()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, path.display().to_string())
}

/// Insert directory nodes for every missing ancestor of `path` (exclusive).
///
/// Nothing is inserted unless every ancestor can be a directory.
fn ensure_ancestors(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
    let mut missing = Vec::new();
    for ancestor in path
        .ancestors()
        .skip(1)
        .filter(|a| !is_root(a) && !a.as_os_str().is_empty())
    {
        match nodes.get(ancestor) {
            Some(Node::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    ancestor.display().to_string(),
                ));
            }
            Some(Node::Dir) => {}
            None => missing.push(ancestor.to_path_buf()),
        }
    }
    for ancestor in missing {
        nodes.insert(ancestor, Node::Dir);
    }
    Ok(())
}

fn has_children(nodes: &BTreeMap<PathBuf, Node>, dir: &Path) -> bool {
    nodes
        .keys()
        .any(|k| k.as_path() != dir && k.starts_with(dir))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let nodes = self.nodes.read().await;
        match nodes.get(path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            )),
            None if is_root(path) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut nodes = self.nodes.write().await;
        if is_root(path) || matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            ));
        }
        ensure_ancestors(&mut nodes, path)?;
        nodes.insert(path.to_path_buf(), Node::File(data.to_vec()));
        Ok(())
    }

    async fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(path) {
            Some(Node::File(existing)) => {
                existing.extend_from_slice(data);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            )),
            None => {
                ensure_ancestors(&mut nodes, path)?;
                nodes.insert(path.to_path_buf(), Node::File(data.to_vec()));
                Ok(())
            }
        }
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        if is_root(path) {
            return Ok(Metadata {
                is_dir: true,
                size: 0,
            });
        }
        let nodes = self.nodes.read().await;
        match nodes.get(path) {
            Some(Node::File(data)) => Ok(Metadata {
                is_dir: false,
                size: data.len() as u64,
            }),
            Some(Node::Dir) => Ok(Metadata {
                is_dir: true,
                size: 0,
            }),
            None => Err(not_found(path)),
        }
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let nodes = self.nodes.read().await;
        match nodes.get(path) {
            Some(Node::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    path.display().to_string(),
                ));
            }
            None if !is_root(path) => return Err(not_found(path)),
            _ => {}
        }

        Ok(nodes
            .iter()
            .filter(|(key, _)| key.parent() == Some(path))
            .filter_map(|(key, node)| {
                let name = key.file_name()?.to_string_lossy().into_owned();
                let metadata = match node {
                    Node::File(data) => Metadata {
                        is_dir: false,
                        size: data.len() as u64,
                    },
                    Node::Dir => Metadata {
                        is_dir: true,
                        size: 0,
                    },
                };
                Some(DirEntry { name, metadata })
            })
            .collect())
    }

    async fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        if is_root(path) {
            return Ok(());
        }
        let mut nodes = self.nodes.write().await;
        ensure_ancestors(&mut nodes, path)?;
        match nodes.get(path) {
            Some(Node::File(_)) => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                path.display().to_string(),
            )),
            Some(Node::Dir) => Ok(()),
            None => {
                nodes.insert(path.to_path_buf(), Node::Dir);
                Ok(())
            }
        }
    }

    async fn remove(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if is_root(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root",
            ));
        }
        let mut nodes = self.nodes.write().await;
        match nodes.get(path) {
            None => Err(not_found(path)),
            Some(Node::File(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => {
                if !recursive && has_children(&nodes, path) {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        path.display().to_string(),
                    ));
                }
                nodes.retain(|k, _| !k.starts_with(path));
                Ok(())
            }
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write().await;
        let source_is_dir = match nodes.get(from) {
            Some(node) => matches!(node, Node::Dir),
            None => return Err(not_found(from)),
        };
        if from == to {
            return Ok(());
        }
        if to.starts_with(from) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot move a directory into itself",
            ));
        }

        // Same rules as rename(2): a directory may only replace an empty
        // directory, and a file only a file.
        match (source_is_dir, nodes.get(to)) {
            (_, None) => {}
            (true, Some(Node::Dir)) => {
                if has_children(&nodes, to) {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        to.display().to_string(),
                    ));
                }
            }
            (true, Some(Node::File(_))) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    to.display().to_string(),
                ));
            }
            (false, Some(Node::Dir)) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    to.display().to_string(),
                ));
            }
            (false, Some(Node::File(_))) => {}
        }
        if is_root(to) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                to.display().to_string(),
            ));
        }
        ensure_ancestors(&mut nodes, to)?;
        nodes.remove(to);

        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|k| k.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let suffix = old.strip_prefix(from).map(Path::to_path_buf).unwrap_or_default();
                let new = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                nodes.insert(new, node);
            }
        }
        Ok(())
    }
}
