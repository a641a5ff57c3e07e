//! Restricted command interpreter.
//!
//! The [`Interpreter`] runs shell-like command lines against a [`Vfs`]:
//!
//! - pipelines (`|`), lists (`&&`, `||`, `;`, newlines)
//! - redirects (`<`, `>`, `>>`, `2>`, `2>>`, `2>&1`, `>&2`)
//! - variables, quoting and globbing
//! - script files run with `sh`, `bash`, `source` or a path
//!
//! Only the registered builtins can run. There is no process spawning, so the
//! builtin table is the isolation boundary.
//!
//! Every call produces a [`CommandResult`]. Syntax errors, unknown commands,
//! missing files and timeouts are all reported through the exit code and
//! stderr, never as a Rust error.
//!
//! # Example
//!
//! ```rust,ignore
//! use skillbox::{Interpreter, ResourceLimits, Vfs};
//!
//! let fs = Vfs::in_memory();
//! fs.write_file("/sales.csv", b"West,apple,10\nEast,pear,7\n").await?;
//!
//! let result = Interpreter::new()
//!     .execute(&fs, "grep West sales.csv | cut -d, -f2", "/", &ResourceLimits::default())
//!     .await;
//! assert_eq!(result.stdout, "apple\n");
//! ```

mod builtins;
mod expand;
mod parser;
mod state;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use builtins::{Builtin, CommandContext};
pub use parser::ParseError;

use crate::limits::{LimitedBuffer, ResourceLimits};
use crate::vfs::{FsError, FsResult, Vfs, path};
use parser::{Connector, Pipeline, RedirectOp, Script, SimpleCommand};
use state::ShellState;

/// Exit code for a command that is not in the whitelist.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Exit code for syntax and usage errors.
pub const EXIT_USAGE: i32 = 2;

/// Exit code for a command that ran past its deadline.
pub const EXIT_TIMEOUT: i32 = 124;

/// How deeply scripts may invoke other scripts.
const MAX_SCRIPT_DEPTH: usize = 16;

/// Commands handled by the interpreter itself rather than a builtin.
const SHELL_COMMANDS: &[&str] = &["cd", "export", "unset", "exit", "sh", "bash", "source", "."];

/// Outcome of one command line.
///
/// A nonzero exit code is a normal result the caller can act on, not a fault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status of the last command run.
    pub exit_code: i32,
    /// The deadline expired before the command line finished.
    #[serde(default)]
    pub timed_out: bool,
    /// Output was cut at the configured limit.
    #[serde(default)]
    pub truncated: bool,
}

impl CommandResult {
    /// A successful result with the given output.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed result with the given exit code and error text.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// A result for a command that hit its deadline.
    pub fn timeout(limit: std::time::Duration) -> Self {
        Self {
            stderr: timeout_message(limit),
            exit_code: EXIT_TIMEOUT,
            timed_out: true,
            ..Self::default()
        }
    }

    /// Whether the exit code is zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

fn timeout_message(limit: std::time::Duration) -> String {
    format!("skillbox: command timed out after {}ms\n", limit.as_millis())
}

/// Input and captured output of a running command, pipeline or script.
///
/// Only the outermost streams carry the output limit; per-command streams
/// are unbounded and drain into them as each command finishes.
#[derive(Debug, Default)]
struct Streams {
    stdin: Vec<u8>,
    stdout: LimitedBuffer,
    stderr: LimitedBuffer,
}

impl Streams {
    fn capped(limit: usize) -> Self {
        Self {
            stdin: Vec::new(),
            stdout: LimitedBuffer::new(limit),
            stderr: LimitedBuffer::new(limit),
        }
    }

    fn with_stdin(stdin: Vec<u8>) -> Self {
        Self {
            stdin,
            ..Self::default()
        }
    }

    fn error(&mut self, message: impl fmt::Display) -> i32 {
        // Writing to a Vec cannot fail
        let _ = writeln!(self.stderr, "skillbox: {message}");
        1
    }
}

/// Where a command's output streams end up after redirects.
#[derive(Debug, Default)]
struct Routing {
    stdout_file: Option<String>,
    stderr_file: Option<String>,
    err_to_out: bool,
    out_to_err: bool,
}

/// The command interpreter.
///
/// Cheap to clone; clones share the builtin table.
#[derive(Clone)]
pub struct Interpreter {
    builtins: HashMap<String, Arc<dyn Builtin>>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("commands", &self.command_names())
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an interpreter with the standard builtins.
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        builtins::register_builtins(&mut builtins);
        Self { builtins }
    }

    /// Add or replace a builtin.
    pub fn register(&mut self, name: impl Into<String>, builtin: impl Builtin + 'static) {
        self.builtins.insert(name.into(), Arc::new(builtin));
    }

    /// Names of every command this interpreter accepts, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .builtins
            .keys()
            .map(String::as_str)
            .chain(SHELL_COMMANDS.iter().copied())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Run `command_line` with `working_dir` as the current directory.
    ///
    /// Never fails: every problem is reported in the returned result.
    pub async fn execute(
        &self,
        fs: &Vfs,
        command_line: &str,
        working_dir: &str,
        limits: &ResourceLimits,
    ) -> CommandResult {
        let cwd = match path::normalize(working_dir) {
            Ok(cwd) => cwd,
            Err(e) => return CommandResult::failure(1, format!("skillbox: {e}\n")),
        };
        match fs.stat(&cwd).await {
            Ok(meta) if meta.is_dir => {}
            Ok(_) => {
                return CommandResult::failure(1, format!("skillbox: cd: {cwd}: Not a directory\n"));
            }
            Err(e) => return CommandResult::failure(1, format!("skillbox: cd: {e}\n")),
        }

        let script = match parser::parse(command_line) {
            Ok(script) => script,
            Err(e) => return CommandResult::failure(EXIT_USAGE, format!("skillbox: {e}\n")),
        };

        tracing::debug!(command = %command_line, cwd = %cwd, "executing command line");

        let limit = usize::try_from(limits.max_output_bytes).unwrap_or(usize::MAX);
        let mut state = ShellState::new(cwd);
        let mut streams = Streams::capped(limit);
        let finished = tokio::time::timeout(
            limits.timeout,
            self.run_script(fs, &mut state, &script, &mut streams),
        )
        .await
        .is_ok();

        let exit_code = if finished {
            state.exit.unwrap_or(state.last_status)
        } else {
            streams.stderr.push(timeout_message(limits.timeout).as_bytes());
            EXIT_TIMEOUT
        };

        let Streams { stdout, stderr, .. } = streams;
        let truncated = stdout.was_truncated() || stderr.was_truncated();

        tracing::debug!(exit_code, timed_out = !finished, truncated, "command line finished");

        CommandResult {
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            exit_code,
            timed_out: !finished,
            truncated,
        }
    }

    fn run_script<'a>(
        &'a self,
        fs: &'a Vfs,
        state: &'a mut ShellState,
        script: &'a Script,
        io: &'a mut Streams,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for list in &script.lists {
                if state.exit.is_some() {
                    break;
                }
                let mut status = self.run_pipeline(fs, state, &list.first, io).await;
                state.last_status = status;

                for (connector, pipeline) in &list.rest {
                    if state.exit.is_some() {
                        break;
                    }
                    let run = match connector {
                        Connector::And => status == 0,
                        Connector::Or => status != 0,
                    };
                    if run {
                        status = self.run_pipeline(fs, state, pipeline, io).await;
                        state.last_status = status;
                    }
                }
            }
        })
    }

    /// Run a pipeline. Stages run one after another, each fed the previous
    /// stage's complete output.
    async fn run_pipeline(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        pipeline: &Pipeline,
        io: &mut Streams,
    ) -> i32 {
        let mut status = 0;
        let mut piped = Vec::new();
        let last = pipeline.len().saturating_sub(1);

        for (i, command) in pipeline.iter().enumerate() {
            let stdin = if i == 0 {
                std::mem::take(&mut io.stdin)
            } else {
                std::mem::take(&mut piped)
            };
            let mut stage = Streams::with_stdin(stdin);

            // Stages of a multi-command pipeline cannot change the shell state
            status = if pipeline.len() == 1 {
                self.run_command(fs, state, command, &mut stage).await
            } else {
                let mut sub = state.clone();
                self.run_command(fs, &mut sub, command, &mut stage).await
            };

            io.stderr.append(&mut stage.stderr);
            if i == 0 {
                // Unread input stays available to later commands in a script
                io.stdin = stage.stdin;
            }
            if i == last {
                io.stdout.append(&mut stage.stdout);
            } else {
                piped = stage.stdout.take();
            }
        }
        status
    }

    async fn run_command(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        command: &SimpleCommand,
        io: &mut Streams,
    ) -> i32 {
        let assignments: Vec<(String, String)> = command
            .assignments
            .iter()
            .map(|(name, value)| (name.clone(), expand::expand_single(value, state)))
            .collect();
        let argv = expand::expand_words(&command.words, state, fs).await;

        let mut local = Streams::with_stdin(std::mem::take(&mut io.stdin));
        let routing = match self.prepare_redirects(fs, state, command, &mut local).await {
            Ok(routing) => routing,
            Err(status) => {
                io.stderr.append(&mut local.stderr);
                return status;
            }
        };

        let status = match argv.split_first() {
            None => {
                state.env.extend(assignments);
                0
            }
            Some((name, args)) => {
                self.dispatch(fs, state, name, args, &assignments, &mut local)
                    .await
            }
        };

        io.stdin = std::mem::take(&mut local.stdin);
        let routed = route_output(fs, routing, &mut local, io).await;
        if routed { status } else { 1 }
    }

    /// Apply input redirects and work out where output goes. File output
    /// targets are created (or truncated) up front.
    async fn prepare_redirects(
        &self,
        fs: &Vfs,
        state: &ShellState,
        command: &SimpleCommand,
        local: &mut Streams,
    ) -> Result<Routing, i32> {
        let mut routing = Routing::default();

        for redirect in &command.redirects {
            let target = redirect
                .target
                .as_ref()
                .map(|word| expand::expand_single(word, state));
            let target = match target.as_deref().map(|t| path::join(&state.cwd, t)) {
                Some(Ok(abs)) => Some(abs),
                Some(Err(e)) => return Err(local.error(e)),
                None => None,
            };

            match (redirect.op, target) {
                (RedirectOp::In, Some(abs)) => match fs.read_file(&abs).await {
                    Ok(data) => local.stdin = data,
                    Err(e) => return Err(local.error(e)),
                },
                (op @ (RedirectOp::Out | RedirectOp::Append), Some(abs)) => {
                    let append = op == RedirectOp::Append;
                    if let Err(e) = prepare_output(fs, &abs, append).await {
                        return Err(local.error(e));
                    }
                    routing.stdout_file = Some(abs);
                }
                (op @ (RedirectOp::ErrOut | RedirectOp::ErrAppend), Some(abs)) => {
                    let append = op == RedirectOp::ErrAppend;
                    if let Err(e) = prepare_output(fs, &abs, append).await {
                        return Err(local.error(e));
                    }
                    routing.stderr_file = Some(abs);
                }
                (RedirectOp::ErrToOut, _) => routing.err_to_out = true,
                (RedirectOp::OutToErr, _) => routing.out_to_err = true,
                (op, None) => return Err(local.error(format!("missing target for {op:?}"))),
            }
        }
        Ok(routing)
    }

    async fn dispatch(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        name: &str,
        args: &[String],
        assignments: &[(String, String)],
        io: &mut Streams,
    ) -> i32 {
        match name {
            "cd" => return change_dir(fs, state, args, io).await,
            "export" => return export(state, args, io),
            "unset" => {
                for arg in args {
                    state.env.remove(arg);
                }
                return 0;
            }
            "exit" => return exit(state, args, io),
            "sh" | "bash" => return self.run_sh(fs, state, name, args, assignments, io).await,
            "source" | "." => return self.run_source(fs, state, name, args, io).await,
            _ => {}
        }

        if let Some(builtin) = self.builtins.get(name).cloned() {
            let env = if assignments.is_empty() {
                Cow::Borrowed(&state.env)
            } else {
                let mut env = state.env.clone();
                env.extend(assignments.iter().cloned());
                Cow::Owned(env)
            };

            let mut ctx = CommandContext::new(
                name,
                fs,
                &state.cwd,
                &env,
                std::mem::take(&mut io.stdin),
            );
            let status = match builtin.run(&mut ctx, args).await {
                Ok(status) => status,
                Err(e) => {
                    let _ = ctx.error(e);
                    1
                }
            };
            io.stdin = ctx.stdin;
            io.stdout.push(&ctx.stdout);
            io.stderr.push(&ctx.stderr);
            return status;
        }

        if name.contains('/') {
            let mut positional = vec![name.to_string()];
            positional.extend(args.iter().cloned());
            return self
                .run_file(fs, state, name, positional, assignments, io)
                .await;
        }

        tracing::debug!(command = %name, "command not found");
        let _ = writeln!(io.stderr, "skillbox: {name}: command not found");
        EXIT_COMMAND_NOT_FOUND
    }

    /// `sh -c 'cmd' [name args...]`, `sh script [args...]`, or `sh` reading
    /// the script from stdin.
    async fn run_sh(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        name: &str,
        args: &[String],
        assignments: &[(String, String)],
        io: &mut Streams,
    ) -> i32 {
        match args.split_first() {
            Some((flag, rest)) if flag == "-c" => {
                let Some((source, params)) = rest.split_first() else {
                    let _ = writeln!(io.stderr, "{name}: -c: option requires an argument");
                    return EXIT_USAGE;
                };
                let positional = if params.is_empty() {
                    vec![name.to_string()]
                } else {
                    params.to_vec()
                };
                let mut child = state.child(positional, assignments);
                self.run_source_text(fs, &mut child, name, source, io).await
            }
            Some((script, rest)) => {
                let mut positional = vec![script.clone()];
                positional.extend(rest.iter().cloned());
                self.run_file(fs, state, script, positional, assignments, io)
                    .await
            }
            None => {
                let source = String::from_utf8_lossy(&std::mem::take(&mut io.stdin)).into_owned();
                let mut child = state.child(vec![name.to_string()], assignments);
                self.run_source_text(fs, &mut child, name, &source, io).await
            }
        }
    }

    /// Run a script file in a child state.
    async fn run_file(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        script: &str,
        positional: Vec<String>,
        assignments: &[(String, String)],
        io: &mut Streams,
    ) -> i32 {
        let source = match read_script(fs, state, script).await {
            Ok(source) => source,
            Err(e) => return script_error(io, e),
        };
        let mut child = state.child(positional, assignments);
        self.run_source_text(fs, &mut child, script, &source, io)
            .await
    }

    /// `source file [args...]`: run a script in the current state.
    async fn run_source(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        name: &str,
        args: &[String],
        io: &mut Streams,
    ) -> i32 {
        let Some((script, rest)) = args.split_first() else {
            let _ = writeln!(io.stderr, "skillbox: {name}: filename argument required");
            return EXIT_USAGE;
        };
        let source = match read_script(fs, state, script).await {
            Ok(source) => source,
            Err(e) => return script_error(io, e),
        };

        let saved = if rest.is_empty() {
            None
        } else {
            let mut positional = vec![script.clone()];
            positional.extend(rest.iter().cloned());
            Some(std::mem::replace(&mut state.positional, positional))
        };

        state.depth += 1;
        let status = self
            .run_source_text(fs, state, script, &source, io)
            .await;
        state.depth -= 1;

        if let Some(saved) = saved {
            state.positional = saved;
        }
        status
    }

    async fn run_source_text(
        &self,
        fs: &Vfs,
        state: &mut ShellState,
        origin: &str,
        source: &str,
        io: &mut Streams,
    ) -> i32 {
        if state.depth > MAX_SCRIPT_DEPTH {
            let _ = writeln!(io.stderr, "skillbox: {origin}: maximum script nesting depth exceeded");
            return EXIT_USAGE;
        }
        let script = match parser::parse(source) {
            Ok(script) => script,
            Err(e) => {
                let _ = writeln!(io.stderr, "skillbox: {origin}: {e}");
                return EXIT_USAGE;
            }
        };

        self.run_script(fs, state, &script, io).await;
        state.exit.unwrap_or(state.last_status)
    }
}

fn script_error(io: &mut Streams, err: FsError) -> i32 {
    let status = if matches!(err, FsError::NotFound(_)) {
        EXIT_COMMAND_NOT_FOUND
    } else {
        1
    };
    io.error(err);
    status
}

async fn read_script(fs: &Vfs, state: &ShellState, script: &str) -> FsResult<String> {
    let abs = path::join(&state.cwd, script)?;
    let data = fs.read_file(&abs).await?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Create or truncate an output redirect target.
async fn prepare_output(fs: &Vfs, abs: &str, append: bool) -> FsResult<()> {
    if let Ok(meta) = fs.stat(abs).await {
        if meta.is_dir {
            return Err(FsError::IsADirectory(abs.to_string()));
        }
        if append {
            return Ok(());
        }
    }
    fs.write_file(abs, b"").await
}

/// Send a command's output to files or back to the caller. Returns false if
/// a redirect target could not be written.
async fn route_output(fs: &Vfs, routing: Routing, local: &mut Streams, io: &mut Streams) -> bool {
    if routing.err_to_out {
        let err = local.stderr.take();
        local.stdout.push(&err);
    }
    if routing.out_to_err {
        let out = local.stdout.take();
        local.stderr.push(&out);
    }

    let mut ok = true;
    if let Some(abs) = routing.stdout_file {
        let data = local.stdout.take();
        if let Err(e) = fs.append_file(&abs, &data).await {
            local.error(e);
            ok = false;
        }
    }
    if let Some(abs) = routing.stderr_file {
        let data = local.stderr.take();
        if let Err(e) = fs.append_file(&abs, &data).await {
            local.error(e);
            ok = false;
        }
    }

    io.stdout.append(&mut local.stdout);
    io.stderr.append(&mut local.stderr);
    ok
}

async fn change_dir(fs: &Vfs, state: &mut ShellState, args: &[String], io: &mut Streams) -> i32 {
    let target = args.first().map(String::as_str).unwrap_or("/");
    let abs = match path::join(&state.cwd, target) {
        Ok(abs) => abs,
        Err(e) => return io.error(format_args!("cd: {e}")),
    };
    match fs.stat(&abs).await {
        Ok(meta) if meta.is_dir => {
            state.set_cwd(abs);
            0
        }
        Ok(_) => io.error(format_args!("cd: {target}: Not a directory")),
        Err(_) => io.error(format_args!("cd: {target}: No such file or directory")),
    }
}

fn export(state: &mut ShellState, args: &[String], io: &mut Streams) -> i32 {
    let mut status = 0;
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !parser::is_valid_name(name) {
            status = io.error(format_args!("export: `{arg}': not a valid identifier"));
            continue;
        }
        match value {
            Some(value) => {
                state.env.insert(name.to_string(), value.to_string());
            }
            None => {
                state.env.entry(name.to_string()).or_default();
            }
        }
    }
    status
}

fn exit(state: &mut ShellState, args: &[String], io: &mut Streams) -> i32 {
    let code = match args.first() {
        None => state.last_status,
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code & 0xff,
            Err(_) => {
                io.error(format_args!("exit: {arg}: numeric argument required"));
                EXIT_USAGE
            }
        },
    };
    state.exit = Some(code);
    code
}
