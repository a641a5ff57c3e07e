//! head builtin - output the first part of files

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext, parse_count};

pub(super) struct HeadCommand;

#[async_trait]
impl Builtin for HeadCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut num_lines: usize = 10;
        let mut num_bytes: Option<usize> = None;
        let mut files = Vec::new();
        let mut args_iter = args.iter();

        while let Some(arg) = args_iter.next() {
            let (flag, value) = if arg == "-n" || arg == "--lines" {
                ('n', args_iter.next().map(String::as_str))
            } else if let Some(suffix) = arg.strip_prefix("-n") {
                ('n', Some(suffix))
            } else if arg == "-c" || arg == "--bytes" {
                ('c', args_iter.next().map(String::as_str))
            } else if let Some(suffix) = arg.strip_prefix("-c") {
                ('c', Some(suffix))
            } else if let Some(suffix) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
                // -N shorthand for -n N
                ('n', Some(suffix))
            } else {
                files.push(arg.clone());
                continue;
            };

            let Some(count) = value.and_then(parse_count) else {
                return ctx.usage(format!("invalid number of lines: '{}'", value.unwrap_or("")));
            };
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

            let end = match num_bytes {
                Some(bytes) => bytes.min(contents.len()),
                None if num_lines == 0 => 0,
                None => contents
                    .iter()
                    .enumerate()
                    .filter(|&(_, &b)| b == b'\n')
                    .nth(num_lines - 1)
                    .map_or(contents.len(), |(idx, _)| idx + 1),
            };
            ctx.stdout.write_all(&contents[..end])?;
        }

        Ok(if ok { 0 } else { 1 })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    #[tokio::test]
    async fn test_default_ten_lines() {
        let fs = Vfs::in_memory();
        let input: String = (1..=15).map(|i| format!("{i}\n")).collect();
        let (_, out, _) = run(&HeadCommand, &fs, &[], &input).await;
        assert_eq!(out.lines().count(), 10);
        assert!(out.ends_with("10\n"));
    }

    #[tokio::test]
    async fn test_line_and_byte_counts() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&HeadCommand, &fs, &["-n", "2"], "a\nb\nc\n").await;
        assert_eq!(out, "a\nb\n");

        let (_, out, _) = run(&HeadCommand, &fs, &["-1"], "a\nb\n").await;
        assert_eq!(out, "a\n");

        let (_, out, _) = run(&HeadCommand, &fs, &["-c3"], "abcdef").await;
        assert_eq!(out, "abc");

        let (_, out, _) = run(&HeadCommand, &fs, &["-n", "0"], "a\n").await;
        assert_eq!(out, "");

        let (_, out, _) = run(&HeadCommand, &fs, &["-n", "5"], "a\nno newline").await;
        assert_eq!(out, "a\nno newline");
    }

    #[tokio::test]
    async fn test_headers_for_multiple_files() {
        let fs = Vfs::in_memory();
        fs.write_file("/a", b"1\n").await.unwrap();
        fs.write_file("/b", b"2\n").await.unwrap();
        let (_, out, _) = run(&HeadCommand, &fs, &["/a", "/b"], "").await;
        assert_eq!(out, "==> /a <==\n1\n\n==> /b <==\n2\n");
    }

    #[tokio::test]
    async fn test_invalid_count() {
        let fs = Vfs::in_memory();
        let (status, _, err) = run(&HeadCommand, &fs, &["-n", "lots"], "").await;
        assert_eq!(status, 2);
        assert!(err.contains("invalid number of lines"));
    }
}
