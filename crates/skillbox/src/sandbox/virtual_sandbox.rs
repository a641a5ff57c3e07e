//! [`Sandbox`] backed by the interpreter and a virtual filesystem.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Sandbox, SandboxError, SandboxFile, UploadReport};
use crate::limits::ResourceLimits;
use crate::shell::{CommandResult, Interpreter};
use crate::vfs::{FsError, Vfs, path};

/// Builder for a [`VirtualSandbox`].
///
/// # Example
///
/// ```rust,ignore
/// use skillbox::sandbox::{Sandbox, VirtualSandbox};
///
/// let sandbox = VirtualSandbox::builder()
///     .root("/srv/agent")
///     .prefix("/workspace")
///     .build()
///     .await?;
///
/// // Lands in /srv/agent/workspace/sales.csv on disk
/// sandbox.write_files(&[SandboxFile::new("/sales.csv", "West,apple,10\n")]).await?;
/// let result = sandbox.execute_command("cat /sales.csv").await;
/// ```
#[derive(Debug, Default)]
pub struct VirtualSandboxBuilder {
    root: Option<PathBuf>,
    prefix: Option<String>,
    working_dir: Option<String>,
    limits: Option<ResourceLimits>,
    interpreter: Option<Interpreter>,
}

impl VirtualSandboxBuilder {
    /// Back the sandbox with a real directory instead of memory.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Directory under the root that becomes the sandbox's `/`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Working directory for every command (default `/`).
    pub fn working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Default limits for every command.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Use a custom interpreter, for example one with extra builtins.
    pub fn interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Create the prefix and working directories and build the sandbox.
    ///
    /// # Errors
    ///
    /// Fails if the prefix or working directory escapes its root, or if
    /// either cannot be created.
    pub async fn build(self) -> Result<VirtualSandbox, SandboxError> {
        let base = match &self.root {
            Some(root) => Vfs::new(root),
            None => Vfs::in_memory(),
        };

        let prefix = path::normalize(self.prefix.as_deref().unwrap_or("/"))?;
        base.mkdir_all(&prefix).await?;
        let fs = base.scoped(&prefix)?;

        let working_dir = path::normalize(self.working_dir.as_deref().unwrap_or("/"))?;
        fs.mkdir_all(&working_dir).await?;

        info!(
            root = %fs.root().display(),
            working_dir = %working_dir,
            "sandbox ready"
        );

        Ok(VirtualSandbox {
            fs,
            working_dir,
            limits: self.limits.unwrap_or_default(),
            interpreter: self.interpreter.unwrap_or_default(),
            lock: Mutex::new(()),
        })
    }
}

/// Sandbox running the command interpreter over a [`Vfs`].
///
/// The prefix is folded into the filesystem's root once, at build time, so
/// every path a caller or command sees is already in sandbox coordinates.
/// Calls are serialized: a command never observes a half-finished upload.
pub struct VirtualSandbox {
    fs: Vfs,
    working_dir: String,
    limits: ResourceLimits,
    interpreter: Interpreter,
    lock: Mutex<()>,
}

impl fmt::Debug for VirtualSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualSandbox")
            .field("fs", &self.fs)
            .field("working_dir", &self.working_dir)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl VirtualSandbox {
    /// Start building a sandbox.
    pub fn builder() -> VirtualSandboxBuilder {
        VirtualSandboxBuilder::default()
    }

    /// An in-memory sandbox with default settings.
    pub async fn in_memory() -> Result<Self, SandboxError> {
        Self::builder().build().await
    }

    /// The filesystem commands run against, rooted at the prefix.
    pub fn vfs(&self) -> &Vfs {
        &self.fs
    }

    /// Working directory for commands.
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Default limits for commands.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

#[async_trait]
impl Sandbox for VirtualSandbox {
    async fn execute(&self, command: &str, timeout: Option<Duration>) -> CommandResult {
        // A caller may shorten the configured deadline, never extend it.
        let limits = match timeout {
            Some(t) => self.limits.with_timeout(t.min(self.limits.timeout)),
            None => self.limits.clone(),
        };

        let _guard = self.lock.lock().await;
        let result = self
            .interpreter
            .execute(&self.fs, command, &self.working_dir, &limits)
            .await;
        debug!(
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            "sandbox command finished"
        );
        result
    }

    async fn read_file(&self, file: &str) -> Result<Vec<u8>, FsError> {
        let _guard = self.lock.lock().await;
        let abs = path::join(&self.working_dir, file)?;
        self.fs.read_file(&abs).await
    }

    async fn write_files(&self, files: &[SandboxFile]) -> Result<UploadReport, SandboxError> {
        let _guard = self.lock.lock().await;
        let mut report = UploadReport::default();
        for file in files {
            let written = match path::join(&self.working_dir, &file.path) {
                Ok(abs) => self.fs.write_file(&abs, &file.content).await,
                Err(e) => Err(e),
            };
            if let Err(source) = written {
                return Err(SandboxError::PartialUpload {
                    written: report.written,
                    failed: file.path.clone(),
                    source,
                });
            }
            report.written.push(file.path.clone());
        }
        info!(files = report.len(), "uploaded files");
        Ok(report)
    }
}
