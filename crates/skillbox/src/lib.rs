//! Skillbox: skill discovery and sandboxed execution for agents
//!
//! Skillbox turns a directory of skill bundles (a `SKILL.md` manifest plus
//! scripts) into tools an agent can call against an isolated filesystem and
//! a restricted shell:
//!
//! - [`vfs`] maps virtual paths onto a real or in-memory root and refuses
//!   anything that would escape it
//! - [`Interpreter`] runs shell-like command lines using only its builtins
//! - [`skills`] discovers skills and keeps their instructions until asked
//! - [`sandbox`] puts the interpreter and filesystem behind one contract
//! - [`tools`] publishes `skill`, `bash`, `read_file` and `write_file`
//! - [`agent`] drives an external agent against those tools

pub mod agent;
mod limits;
pub mod sandbox;
mod shell;
pub mod skills;
pub mod tools;
pub mod vfs;

pub use agent::{Agent, AgentAction, Observation, SessionError, SessionOutcome, run_session};
pub use limits::ResourceLimits;
pub use sandbox::{Sandbox, SandboxConfig, SandboxError, SandboxFile, UploadReport, VirtualSandbox};
pub use shell::{
    Builtin, CommandContext, CommandResult, EXIT_COMMAND_NOT_FOUND, EXIT_TIMEOUT, EXIT_USAGE,
    Interpreter, ParseError,
};
pub use skills::{Discovery, SkillError, SkillManifest, SkillRegistry, SkillSummary, discover};
pub use tools::{SetupError, ToolDefinition, ToolError, ToolOutput, Toolbox, ToolboxState};
pub use vfs::{FsError, Vfs};
