//! uniq builtin - report or omit repeated lines

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext, lines};

pub(super) struct UniqCommand;

#[async_trait]
impl Builtin for UniqCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut count = false;
        let mut repeated_only = false;
        let mut unique_only = false;
        let mut ignore_case = false;
        let mut files = Vec::new();

        for arg in args {
            if arg.starts_with('-') && arg.len() > 1 {
                for c in arg[1..].chars() {
                    match c {
                        'c' => count = true,
                        'd' => repeated_only = true,
                        'u' => unique_only = true,
                        'i' => ignore_case = true,
                        _ => return ctx.usage(format!("unknown option: -{c}")),
                    }
                }
            } else {
                files.push(arg.clone());
            }
        }
        if files.len() > 1 {
            return ctx.usage("extra operand; only one input file is supported");
        }

        let (inputs, ok) = ctx.inputs(&files).await?;
        let Some((_, data)) = inputs.into_iter().next() else {
            return Ok(1);
        };

        let same = |a: &str, b: &str| {
            if ignore_case {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };

        let mut groups: Vec<(String, usize)> = Vec::new();
        for line in lines(&data) {
            match groups.last_mut() {
                Some((prev, n)) if same(prev, &line) => *n += 1,
                _ => groups.push((line, 1)),
            }
        }

        for (line, n) in groups {
            if (repeated_only && n < 2) || (unique_only && n > 1) {
                continue;
            }
            if count {
                writeln!(ctx.stdout, "{n:7} {line}")?;
            } else {
                writeln!(ctx.stdout, "{line}")?;
            }
        }

        Ok(if ok { 0 } else { 1 })
    }
}
