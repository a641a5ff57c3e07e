//! Sandbox capability contract and its virtual implementation.
//!
//! The tool layer only ever talks to a [`Sandbox`]: run a command, read a
//! file, upload a batch of files. [`VirtualSandbox`] backs that contract with
//! the [`Interpreter`](crate::Interpreter) running over a [`Vfs`](crate::Vfs).

mod config;
mod virtual_sandbox;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::SandboxConfig;
pub use virtual_sandbox::{VirtualSandbox, VirtualSandboxBuilder};

use crate::shell::CommandResult;
use crate::vfs::FsError;

/// A file to materialize inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxFile {
    /// Absolute path in sandbox coordinates.
    pub path: String,
    /// Raw content.
    pub content: Vec<u8>,
}

impl SandboxFile {
    /// Create a file entry.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Paths written by a successful upload, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Sandbox paths that were written.
    pub written: Vec<String>,
}

impl UploadReport {
    /// Number of files written.
    pub fn len(&self) -> usize {
        self.written.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

/// Errors from sandbox setup and uploads.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// An upload stopped partway through.
    ///
    /// Files in `written` are in place; `failed` and everything after it
    /// were not written.
    #[error("upload failed at {failed} after writing {} file(s): {source}", written.len())]
    PartialUpload {
        /// Paths written before the failure.
        written: Vec<String>,
        /// The path that could not be written.
        failed: String,
        /// Why it failed.
        #[source]
        source: FsError,
    },
    /// The sandbox could not be set up.
    #[error("sandbox setup failed: {0}")]
    Setup(#[from] FsError),
}

/// Command execution and file access against an isolated environment.
///
/// Per-call failures (unknown commands, missing files, timeouts) come back in
/// the [`CommandResult`]; only file access and uploads return `Err`.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run a command line, optionally with a deadline shorter than the
    /// sandbox default. Longer deadlines are clamped to the default.
    async fn execute(&self, command: &str, timeout: Option<Duration>) -> CommandResult;

    /// Run a command line with the default deadline.
    async fn execute_command(&self, command: &str) -> CommandResult {
        self.execute(command, None).await
    }

    /// Read a file by sandbox path.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Write every file, in order, stopping at the first failure.
    async fn write_files(&self, files: &[SandboxFile]) -> Result<UploadReport, SandboxError>;
}
