//! Tool definitions and the toolbox an agent calls into.
//!
//! This module provides:
//!
//! - [`ToolDefinition`] - A tool's schema (name, description, JSON Schema parameters)
//! - [`ToolRegistry`] - Trait for listing and retrieving tool definitions
//! - [`Toolbox`] - The `skill`, `bash`, `read_file` and `write_file` tools
//!   over a [`Sandbox`](crate::sandbox::Sandbox)

mod params;
mod toolbox;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use params::{BashParams, ReadFileParams, SkillParams, WriteFileParams};
pub use toolbox::{Toolbox, ToolboxState};

use crate::sandbox::SandboxError;
use crate::shell::CommandResult;
use crate::skills::SkillError;

/// Name of the skill-loading tool.
pub const SKILL_TOOL: &str = "skill";
/// Name of the command tool.
pub const BASH_TOOL: &str = "bash";
/// Name of the file-reading tool.
pub const READ_FILE_TOOL: &str = "read_file";
/// Name of the file-writing tool.
pub const WRITE_FILE_TOOL: &str = "write_file";

/// Summary of a tool for index listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool name (unique identifier).
    pub name: String,
    /// One-line description.
    pub description: String,
}

/// Full definition of a tool including its parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Create a tool definition whose parameters are described by `P`.
    pub fn for_params<P: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(P);
        Self::new(name, description, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Get a summary of this tool.
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Trait for providing tool definitions to an agent.
///
/// Implementations must be thread-safe for use across async tasks.
pub trait ToolRegistry: Send + Sync {
    /// List all available tools (name and description only).
    fn list_tools(&self) -> Vec<ToolSummary>;

    /// Get the full definition of a specific tool.
    fn get_tool(&self, name: &str) -> Option<ToolDefinition>;

    /// Check if a tool exists.
    fn has_tool(&self, name: &str) -> bool {
        self.get_tool(name).is_some()
    }
}

/// What a tool call produced.
///
/// `is_error` marks per-turn failures (a nonzero exit, a missing file, an
/// unknown skill). The agent sees them as ordinary results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text shown to the agent.
    pub text: String,
    /// The call failed in a way the agent can react to.
    #[serde(default)]
    pub is_error: bool,
    /// Machine-readable result, when the tool has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl ToolOutput {
    /// A successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
            structured: None,
        }
    }

    /// A failed result.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
            structured: None,
        }
    }

    /// Render a command result for a model: stdout, then stderr, then the
    /// exit code if nonzero.
    pub fn from_command(result: &CommandResult) -> Self {
        let mut output = String::new();

        if !result.stdout.is_empty() {
            output.push_str(&result.stdout);
        }

        if !result.stderr.is_empty() {
            if !output.is_empty() {
                output.push_str("\n--- stderr ---\n");
            }
            output.push_str(&result.stderr);
        }

        if output.is_empty() {
            output = format!("(no output, exit code: {})", result.exit_code);
        } else if result.exit_code != 0 {
            output.push_str(&format!("\n(exit code: {})", result.exit_code));
        }

        if result.truncated {
            output.push_str("\n[output truncated]");
        }

        Self {
            text: output,
            is_error: !result.is_success(),
            structured: serde_json::to_value(result).ok(),
        }
    }
}

/// A tool call that never reached the sandbox.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The toolbox has not finished setup.
    #[error("tools are not ready; cannot call {tool}")]
    NotReady {
        /// The tool that was called.
        tool: String,
    },
    /// No tool has this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The arguments do not match the tool's schema.
    #[error("invalid arguments for {tool}: {message}")]
    Validation {
        /// The tool that was called.
        tool: String,
        /// What was wrong.
        message: String,
    },
}

/// Fatal errors while bringing the toolbox to the ready state.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Skill discovery failed.
    #[error(transparent)]
    Discovery(#[from] SkillError),
    /// Skill files could not be uploaded.
    #[error(transparent)]
    Upload(#[from] SandboxError),
    /// `initialize` was called twice.
    #[error("toolbox is already initialized")]
    AlreadyInitialized,
}
