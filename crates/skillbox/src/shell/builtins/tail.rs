//! tail builtin - output the last part of files

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext, parse_count};

pub(super) struct TailCommand;

#[async_trait]
impl Builtin for TailCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut num_lines: usize = 10;
        let mut num_bytes: Option<usize> = None;
        let mut from_start = false;
        let mut files = Vec::new();
        let mut args_iter = args.iter();

        while let Some(arg) = args_iter.next() {
            let (flag, value) = if arg == "-n" || arg == "--lines" {
                ('n', args_iter.next().map(String::as_str))
            } else if let Some(rest) = arg.strip_prefix("-n") {
                ('n', Some(rest))
            } else if arg == "-c" || arg == "--bytes" {
                ('c', args_iter.next().map(String::as_str))
            } else if let Some(rest) = arg.strip_prefix("-c") {
                ('c', Some(rest))
            } else if let Some(rest) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
                ('n', Some(rest))
            } else {
                files.push(arg.clone());
                continue;
            };

            // +N means starting from line (or byte) N
            let value = value.unwrap_or("");
            let (plus, digits) = match value.strip_prefix('+') {
                Some(rest) => (true, rest),
                None => (false, value),
            };
            let Some(count) = parse_count(digits) else {
                return ctx.usage(format!("invalid number of lines: '{value}'"));
            };
            from_start = plus;
            match flag {
                'c' => num_bytes = Some(count),
                _ => num_lines = count,
            }
        }

        let show_headers = files.len() > 1;
        let (inputs, ok) = ctx.inputs(&files).await?;

        for (i, (file, contents)) in inputs.iter().enumerate() {
            if show_headers {
                if i > 0 {
                    writeln!(ctx.stdout)?;
                }
                writeln!(ctx.stdout, "==> {file} <==")?;
            }

            let start = match (num_bytes, from_start) {
                (Some(bytes), true) => bytes.saturating_sub(1).min(contents.len()),
                (Some(bytes), false) => contents.len().saturating_sub(bytes),
                (None, true) => line_offset(contents, num_lines.saturating_sub(1)),
                (None, false) => {
                    let total = line_starts(contents).len();
                    line_offset(contents, total.saturating_sub(num_lines))
                }
            };
            ctx.stdout.write_all(&contents[start..])?;
        }

        Ok(if ok { 0 } else { 1 })
    }
}

/// Byte offsets where each line begins.
fn line_starts(data: &[u8]) -> Vec<usize> {
    let mut starts = Vec::new();
    if data.is_empty() {
        return starts;
    }
    starts.push(0);
    for (idx, &b) in data.iter().enumerate() {
        if b == b'\n' && idx + 1 < data.len() {
            starts.push(idx + 1);
        }
    }
    starts
}

/// Offset of line `n` (zero-based), or the end of the data.
fn line_offset(data: &[u8], n: usize) -> usize {
    line_starts(data).get(n).copied().unwrap_or(data.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    #[tokio::test]
    async fn test_last_lines() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&TailCommand, &fs, &["-n", "2"], "a\nb\nc\n").await;
        assert_eq!(out, "b\nc\n");

        let (_, out, _) = run(&TailCommand, &fs, &["-5"], "a\nb\n").await;
        assert_eq!(out, "a\nb\n");

        let (_, out, _) = run(&TailCommand, &fs, &["-n1"], "a\nlast").await;
        assert_eq!(out, "last");
    }

    #[tokio::test]
    async fn test_from_start() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&TailCommand, &fs, &["-n", "+2"], "header\nrow1\nrow2\n").await;
        assert_eq!(out, "row1\nrow2\n");
    }

    #[tokio::test]
    async fn test_bytes() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&TailCommand, &fs, &["-c", "3"], "abcdef").await;
        assert_eq!(out, "def");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let fs = Vfs::in_memory();
        let (status, _, err) = run(&TailCommand, &fs, &["/gone"], "").await;
        assert_eq!(status, 1);
        assert!(err.contains("/gone"));
    }
}
