//! Small builtins: true, false, pwd and sleep.

use std::io::{self, Write};
use std::time::Duration;

use async_trait::async_trait;

use super::{Builtin, CommandContext};

pub(super) struct TrueCommand;

#[async_trait]
impl Builtin for TrueCommand {
    async fn run(&self, _ctx: &mut CommandContext<'_>, _args: &[String]) -> io::Result<i32> {
        Ok(0)
    }
}

pub(super) struct FalseCommand;

#[async_trait]
impl Builtin for FalseCommand {
    async fn run(&self, _ctx: &mut CommandContext<'_>, _args: &[String]) -> io::Result<i32> {
        Ok(1)
    }
}

pub(super) struct PwdCommand;

#[async_trait]
impl Builtin for PwdCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, _args: &[String]) -> io::Result<i32> {
        let cwd = ctx.cwd().to_string();
        writeln!(ctx.stdout, "{cwd}")?;
        Ok(0)
    }
}

pub(super) struct SleepCommand;

#[async_trait]
impl Builtin for SleepCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        if args.is_empty() {
            return ctx.usage("missing operand");
        }

        let mut total = Duration::ZERO;
        for arg in args {
            match parse_duration(arg) {
                Some(d) => total += d,
                None => return ctx.usage(format!("invalid time interval '{arg}'")),
            }
        }

        tokio::time::sleep(total).await;
        Ok(0)
    }
}

/// Parse `1`, `0.5`, `2s`, `3m`, `1h`.
fn parse_duration(arg: &str) -> Option<Duration> {
    let (number, scale) = match arg.char_indices().last()? {
        (idx, 's') => (&arg[..idx], 1.0),
        (idx, 'm') => (&arg[..idx], 60.0),
        (idx, 'h') => (&arg[..idx], 3600.0),
        _ => (arg, 1.0),
    };
    let secs: f64 = number.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs * scale).ok()
}
