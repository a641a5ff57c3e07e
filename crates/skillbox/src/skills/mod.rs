//! Skill discovery.
//!
//! A skills directory holds one subdirectory per skill, each with a
//! `SKILL.md` manifest and any scripts or assets the skill needs:
//!
//! ```text
//! skills/
//! ├── csv/
//! │   ├── SKILL.md
//! │   └── filter.sh
//! └── text/
//!     └── SKILL.md
//! ```
//!
//! [`discover`] turns that into skill summaries for advertisement, the
//! instructions for each skill, and the [`SandboxFile`](crate::sandbox::SandboxFile)s
//! to upload so every skill is available under `/skills/<name>/` in the
//! sandbox.

mod manifest;
mod registry;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use manifest::{MAX_DESCRIPTION_LEN, MAX_NAME_LEN, SkillManifest, validate_name};
pub use registry::{
    DEFAULT_MOUNT, Discovery, MANIFEST_FILE, SkillRegistry, SkillSummary, discover, discover_at,
    render_index,
};

/// Errors from skill discovery. All of them are fatal to setup.
#[derive(Debug, Error)]
pub enum SkillError {
    /// A manifest could not be parsed or failed validation.
    #[error("invalid skill manifest {path}: {reason}")]
    InvalidManifest {
        /// Manifest file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Two skills declare the same name.
    #[error("ambiguous skill name '{name}': declared by {first} and {second}")]
    AmbiguousSkill {
        /// The duplicated name.
        name: String,
        /// Directory of the first skill with this name.
        first: PathBuf,
        /// Directory of the second skill with this name.
        second: PathBuf,
    },

    /// The mount point is not a valid virtual path.
    #[error("invalid skill mount point: {0}")]
    InvalidMount(String),

    /// Reading the skills directory failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The background discovery task panicked or was cancelled.
    #[error("skill discovery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
