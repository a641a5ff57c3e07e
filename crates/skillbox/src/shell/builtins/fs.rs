//! Filesystem builtins: ls, mkdir, touch, rm, cp, mv and tee.

use std::io::{self, Write};

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{Builtin, CommandContext};
use crate::vfs::{FsError, FsResult, Vfs, path};

/// Split leading `-xyz` flags from operands. Returns `Err(c)` for a flag
/// outside `allowed`.
fn split_flags(args: &[String], allowed: &str) -> Result<(String, Vec<String>), char> {
    let mut flags = String::new();
    let mut operands = Vec::new();
    let mut options_done = false;

    for arg in args {
        if options_done || arg == "-" || !arg.starts_with('-') {
            operands.push(arg.clone());
        } else if arg == "--" {
            options_done = true;
        } else {
            for c in arg[1..].chars() {
                if !allowed.contains(c) {
                    return Err(c);
                }
                flags.push(c);
            }
        }
    }
    Ok((flags, operands))
}

macro_rules! parse_flags {
    ($ctx:expr, $args:expr, $allowed:expr) => {
        match split_flags($args, $allowed) {
            Ok(parsed) => parsed,
            Err(c) => return $ctx.usage(format!("unknown option: -{c}")),
        }
    };
}

pub(super) struct LsCommand;

#[async_trait]
impl Builtin for LsCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (flags, mut targets) = parse_flags!(ctx, args, "la1F");
        let long = flags.contains('l');
        let all = flags.contains('a');
        let classify = flags.contains('F');
        if targets.is_empty() {
            targets.push(".".to_string());
        }

        let mut status = 0;
        let show_headers = targets.len() > 1;
        let mut first = true;

        for target in &targets {
            let abs = match ctx.resolve(target) {
                Ok(p) => p,
                Err(e) => {
                    ctx.error(e)?;
                    status = 2;
                    continue;
                }
            };
            let meta = match ctx.fs().stat(&abs).await {
                Ok(m) => m,
                Err(e) => {
                    ctx.error(format!("cannot access '{target}': {}", describe(&e)))?;
                    status = 2;
                    continue;
                }
            };

            if !meta.is_dir {
                write_entry(&mut ctx.stdout, target, meta.is_dir, meta.size, long, classify)?;
                continue;
            }

            if show_headers {
                if !first {
                    writeln!(ctx.stdout)?;
                }
                writeln!(ctx.stdout, "{target}:")?;
            }
            first = false;

            let entries = match ctx.fs().list(&abs).await {
                Ok(entries) => entries,
                Err(e) => {
                    ctx.error(e)?;
                    status = 2;
                    continue;
                }
            };
            for entry in entries {
                if !all && entry.name.starts_with('.') {
                    continue;
                }
                write_entry(
                    &mut ctx.stdout,
                    &entry.name,
                    entry.metadata.is_dir,
                    entry.metadata.size,
                    long,
                    classify,
                )?;
            }
        }

        Ok(status)
    }
}

fn write_entry(
    out: &mut Vec<u8>,
    name: &str,
    is_dir: bool,
    size: u64,
    long: bool,
    classify: bool,
) -> io::Result<()> {
    let suffix = if classify && is_dir { "/" } else { "" };
    if long {
        let kind = if is_dir { 'd' } else { '-' };
        writeln!(out, "{kind} {size:>10} {name}{suffix}")
    } else {
        writeln!(out, "{name}{suffix}")
    }
}

/// The message part of an error, without the path prefix.
fn describe(err: &FsError) -> String {
    match err {
        FsError::NotFound(_) => "No such file or directory".into(),
        FsError::NotADirectory(_) => "Not a directory".into(),
        FsError::IsADirectory(_) => "Is a directory".into(),
        FsError::DirectoryNotEmpty(_) => "Directory not empty".into(),
        FsError::Io { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

pub(super) struct MkdirCommand;

#[async_trait]
impl Builtin for MkdirCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (flags, dirs) = parse_flags!(ctx, args, "p");
        let parents = flags.contains('p');
        if dirs.is_empty() {
            return ctx.usage("missing operand");
        }

        let mut status = 0;
        for dir in &dirs {
            if let Err(e) = mkdir(ctx, dir, parents).await {
                ctx.error(format!("cannot create directory '{dir}': {}", describe(&e)))?;
                status = 1;
            }
        }
        Ok(status)
    }
}

async fn mkdir(ctx: &CommandContext<'_>, dir: &str, parents: bool) -> FsResult<()> {
    let abs = ctx.resolve(dir)?;
    if !parents {
        if ctx.fs().exists(&abs).await? {
            return Err(FsError::Io {
                path: abs,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "File exists"),
            });
        }
        let parent = path::parent(&abs);
        if !ctx.fs().stat(parent).await?.is_dir {
            return Err(FsError::NotADirectory(parent.to_string()));
        }
    }
    ctx.fs().mkdir_all(&abs).await
}

pub(super) struct TouchCommand;

#[async_trait]
impl Builtin for TouchCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (_, files) = parse_flags!(ctx, args, "c");
        if files.is_empty() {
            return ctx.usage("missing file operand");
        }

        let mut status = 0;
        for file in &files {
            let result = async {
                let abs = ctx.resolve(file)?;
                if !ctx.fs().exists(&abs).await? {
                    ctx.fs().write_file(&abs, b"").await?;
                }
                Ok::<_, FsError>(())
            }
            .await;
            if let Err(e) = result {
                ctx.error(format!("cannot touch '{file}': {}", describe(&e)))?;
                status = 1;
            }
        }
        Ok(status)
    }
}

pub(super) struct RmCommand;

#[async_trait]
impl Builtin for RmCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (flags, targets) = parse_flags!(ctx, args, "rRf");
        let recursive = flags.contains('r') || flags.contains('R');
        let force = flags.contains('f');
        if targets.is_empty() && !force {
            return ctx.usage("missing operand");
        }

        let mut status = 0;
        for target in &targets {
            let result = async {
                let abs = ctx.resolve(target)?;
                let meta = ctx.fs().stat(&abs).await?;
                if meta.is_dir && !recursive {
                    return Err(FsError::IsADirectory(abs));
                }
                ctx.fs().remove(&abs, recursive).await
            }
            .await;
            match result {
                Ok(()) => {}
                Err(FsError::NotFound(_)) if force => {}
                Err(e) => {
                    ctx.error(format!("cannot remove '{target}': {}", describe(&e)))?;
                    status = 1;
                }
            }
        }
        Ok(status)
    }
}

/// Split `src... dest`, resolving where each source lands.
async fn plan_transfer(
    ctx: &CommandContext<'_>,
    operands: &[String],
) -> Result<Vec<(String, String, String)>, String> {
    let Some((dest, sources)) = operands.split_last() else {
        return Err("missing file operand".into());
    };
    if sources.is_empty() {
        return Err(format!("missing destination file operand after '{dest}'"));
    }

    let dest_abs = ctx.resolve(dest).map_err(|e| e.to_string())?;
    let dest_is_dir = matches!(ctx.fs().stat(&dest_abs).await, Ok(m) if m.is_dir);
    if sources.len() > 1 && !dest_is_dir {
        return Err(format!("target '{dest}' is not a directory"));
    }

    let mut plan = Vec::with_capacity(sources.len());
    for src in sources {
        let src_abs = ctx.resolve(src).map_err(|e| e.to_string())?;
        let target = if dest_is_dir {
            let name = path::file_name(&src_abs).unwrap_or_default();
            path::join(&dest_abs, name).map_err(|e| e.to_string())?
        } else {
            dest_abs.clone()
        };
        plan.push((src.clone(), src_abs, target));
    }
    Ok(plan)
}

pub(super) struct CpCommand;

#[async_trait]
impl Builtin for CpCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (flags, operands) = parse_flags!(ctx, args, "rRpf");
        let recursive = flags.contains('r') || flags.contains('R');
        let plan = match plan_transfer(ctx, &operands).await {
            Ok(plan) => plan,
            Err(e) => return ctx.usage(e),
        };

        let mut status = 0;
        for (src, src_abs, target) in plan {
            let result = async {
                let meta = ctx.fs().stat(&src_abs).await?;
                if meta.is_dir && !recursive {
                    return Err(FsError::IsADirectory(src_abs.clone()));
                }
                copy_tree(ctx.fs(), src_abs.clone(), target).await
            }
            .await;
            if let Err(e) = result {
                let message = match e {
                    FsError::IsADirectory(_) if !recursive => {
                        format!("-r not specified; omitting directory '{src}'")
                    }
                    other => format!("cannot copy '{src}': {}", describe(&other)),
                };
                ctx.error(message)?;
                status = 1;
            }
        }
        Ok(status)
    }
}

fn copy_tree(fs: &Vfs, from: String, to: String) -> BoxFuture<'_, FsResult<()>> {
    Box::pin(async move {
        let meta = fs.stat(&from).await?;
        if !meta.is_dir {
            let data = fs.read_file(&from).await?;
            return fs.write_file(&to, &data).await;
        }
        if to == from || to.starts_with(&format!("{}/", from.trim_end_matches('/'))) {
            return Err(FsError::InvalidPath(format!(
                "cannot copy a directory, '{from}', into itself, '{to}'"
            )));
        }
        fs.mkdir_all(&to).await?;
        for entry in fs.list(&from).await? {
            copy_tree(fs, path::join(&from, &entry.name)?, path::join(&to, &entry.name)?).await?;
        }
        Ok(())
    })
}

pub(super) struct MvCommand;

#[async_trait]
impl Builtin for MvCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (_, operands) = parse_flags!(ctx, args, "f");
        let plan = match plan_transfer(ctx, &operands).await {
            Ok(plan) => plan,
            Err(e) => return ctx.usage(e),
        };

        let mut status = 0;
        for (src, src_abs, target) in plan {
            if let Err(e) = ctx.fs().rename(&src_abs, &target).await {
                ctx.error(format!("cannot move '{src}': {}", describe(&e)))?;
                status = 1;
            }
        }
        Ok(status)
    }
}

pub(super) struct TeeCommand;

#[async_trait]
impl Builtin for TeeCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let (flags, files) = parse_flags!(ctx, args, "a");
        let append = flags.contains('a');
        let data = std::mem::take(&mut ctx.stdin);
        ctx.stdout.write_all(&data)?;

        let mut status = 0;
        for file in &files {
            let result = async {
                let abs = ctx.resolve(file)?;
                if append {
                    ctx.fs().append_file(&abs, &data).await
                } else {
                    ctx.fs().write_file(&abs, &data).await
                }
            }
            .await;
            if let Err(e) = result {
                ctx.error(e)?;
                status = 1;
            }
        }
        Ok(status)
    }
}
