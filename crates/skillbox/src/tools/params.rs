//! Argument types for the exposed tools.
//!
//! Each type doubles as the tool's JSON Schema (via `schemars`) and as the
//! validator for incoming arguments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Arguments for the `skill` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SkillParams {
    /// Name of the skill to load, as listed in the tool description.
    pub name: String,
}

/// Arguments for the `bash` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BashParams {
    /// The command line to run. Supports pipes, redirects, `&&`/`||`,
    /// variables, globs and running skill scripts with `sh`.
    pub command: String,

    /// Wall-clock timeout in milliseconds, capped at the sandbox limit
    /// (default: the sandbox limit).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Arguments for the `read_file` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadFileParams {
    /// Path of the file to read. Relative paths start at the working directory.
    pub path: String,
}

/// Arguments for the `write_file` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WriteFileParams {
    /// Path of the file to write. Parent directories are created.
    pub path: String,
    /// Text content of the file.
    pub content: String,
}
