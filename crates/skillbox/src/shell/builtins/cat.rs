//! cat builtin - concatenate files and print on the standard output

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext};

pub(super) struct CatCommand;

#[async_trait]
impl Builtin for CatCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut show_line_numbers = false;
        let mut show_ends = false;
        let mut squeeze_blank = false;
        let mut files = Vec::new();

        for arg in args {
            if arg.starts_with('-') && arg.len() > 1 && !arg.starts_with("--") {
                for c in arg[1..].chars() {
                    match c {
                        'n' => show_line_numbers = true,
                        'E' => show_ends = true,
                        's' => squeeze_blank = true,
                        _ => return ctx.usage(format!("unknown option: -{c}")),
                    }
                }
            } else {
                files.push(arg.clone());
            }
        }

        let (inputs, ok) = ctx.inputs(&files).await?;
        let mut line_number = 1;
        let mut last_was_blank = false;

        for (_, contents) in inputs {
            if !show_line_numbers && !show_ends && !squeeze_blank {
                ctx.stdout.write_all(&contents)?;
                continue;
            }

            if contents.is_empty() {
                continue;
            }
            let body = contents.strip_suffix(b"\n").unwrap_or(&contents);
            for line in body.split(|&b| b == b'\n') {
                let is_blank = line.iter().all(|b| b.is_ascii_whitespace());
                if squeeze_blank && is_blank && last_was_blank {
                    continue;
                }
                last_was_blank = is_blank;

                if show_line_numbers {
                    write!(ctx.stdout, "{line_number:6}\t")?;
                    line_number += 1;
                }
                ctx.stdout.write_all(line)?;
                if show_ends {
                    ctx.stdout.write_all(b"$")?;
                }
                ctx.stdout.write_all(b"\n")?;
            }
        }

        Ok(if ok { 0 } else { 1 })
    }
}
