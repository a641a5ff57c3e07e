//! Whitelisted utilities for the command interpreter.
//!
//! Every command the interpreter can run lives here (or is one of the
//! shell-level commands in the interpreter itself). There is no fallback to
//! host processes.

mod cat;
mod cut;
mod echo;
mod fs;
mod grep;
mod head;
mod misc;
mod sort;
mod tail;
mod tr;
mod uniq;
mod wc;

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;

use crate::vfs::{FsResult, Vfs, path};

/// A command the interpreter can run.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Run the command. `args` excludes the command name.
    ///
    /// Returns the exit status. Failures that the caller should see go to
    /// `ctx.stderr` with a nonzero status; an `Err` is reported the same way.
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32>;
}

/// I/O and filesystem access for one builtin invocation.
pub struct CommandContext<'a> {
    name: &'a str,
    fs: &'a Vfs,
    cwd: &'a str,
    env: &'a HashMap<String, String>,
    /// Input bytes (from a pipe or `<` redirect).
    pub stdin: Vec<u8>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("name", &self.name)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        fs: &'a Vfs,
        cwd: &'a str,
        env: &'a HashMap<String, String>,
        stdin: Vec<u8>,
    ) -> Self {
        Self {
            name,
            fs,
            cwd,
            env,
            stdin,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Name the command was invoked as.
    pub fn name(&self) -> &str {
        self.name
    }

    /// The filesystem the command runs against.
    pub fn fs(&self) -> &Vfs {
        self.fs
    }

    /// Current working directory (virtual path).
    pub fn cwd(&self) -> &str {
        self.cwd
    }

    /// Look up an environment variable.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Resolve a path argument against the working directory.
    pub fn resolve(&self, path: &str) -> FsResult<String> {
        path::join(self.cwd, path)
    }

    /// Read a file argument (`-` reads stdin).
    pub async fn read(&mut self, file: &str) -> FsResult<Vec<u8>> {
        if file == "-" {
            return Ok(std::mem::take(&mut self.stdin));
        }
        let abs = self.resolve(file)?;
        self.fs.read_file(&abs).await
    }

    /// Read each file argument, or stdin when there are none.
    ///
    /// Unreadable files are reported on stderr and skipped; the flag is
    /// false if any were.
    pub async fn inputs(&mut self, files: &[String]) -> io::Result<(Vec<(String, Vec<u8>)>, bool)> {
        if files.is_empty() {
            return Ok((vec![("-".to_string(), std::mem::take(&mut self.stdin))], true));
        }

        let mut out = Vec::with_capacity(files.len());
        let mut ok = true;
        for file in files {
            match self.read(file).await {
                Ok(data) => out.push((file.clone(), data)),
                Err(e) => {
                    self.error(e)?;
                    ok = false;
                }
            }
        }
        Ok((out, ok))
    }

    /// Write `name: message` to stderr.
    pub fn error(&mut self, message: impl fmt::Display) -> io::Result<()> {
        writeln!(self.stderr, "{}: {}", self.name, message)
    }

    /// Report a usage error and return the conventional status 2.
    pub fn usage(&mut self, message: impl fmt::Display) -> io::Result<i32> {
        self.error(message)?;
        Ok(2)
    }
}

/// Split input into lines without their terminators.
pub(crate) fn lines(data: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    text.lines().map(str::to_string).collect()
}

/// Parse a count argument like `10`.
pub(crate) fn parse_count(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}

/// Register all builtins.
pub(crate) fn register_builtins(builtins: &mut HashMap<String, Arc<dyn Builtin>>) {
    builtins.insert("cat".into(), Arc::new(cat::CatCommand));
    builtins.insert("cp".into(), Arc::new(fs::CpCommand));
    builtins.insert("cut".into(), Arc::new(cut::CutCommand));
    builtins.insert("echo".into(), Arc::new(echo::EchoCommand));
    builtins.insert("false".into(), Arc::new(misc::FalseCommand));
    builtins.insert("grep".into(), Arc::new(grep::GrepCommand));
    builtins.insert("head".into(), Arc::new(head::HeadCommand));
    builtins.insert("ls".into(), Arc::new(fs::LsCommand));
    builtins.insert("mkdir".into(), Arc::new(fs::MkdirCommand));
    builtins.insert("mv".into(), Arc::new(fs::MvCommand));
    builtins.insert("pwd".into(), Arc::new(misc::PwdCommand));
    builtins.insert("rm".into(), Arc::new(fs::RmCommand));
    builtins.insert("sleep".into(), Arc::new(misc::SleepCommand));
    builtins.insert("sort".into(), Arc::new(sort::SortCommand));
    builtins.insert("tail".into(), Arc::new(tail::TailCommand));
    builtins.insert("tee".into(), Arc::new(fs::TeeCommand));
    builtins.insert("touch".into(), Arc::new(fs::TouchCommand));
    builtins.insert("tr".into(), Arc::new(tr::TrCommand));
    builtins.insert("true".into(), Arc::new(misc::TrueCommand));
    builtins.insert("uniq".into(), Arc::new(uniq::UniqCommand));
    builtins.insert("wc".into(), Arc::new(wc::WcCommand));
}
