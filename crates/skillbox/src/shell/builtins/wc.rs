//! wc builtin - print newline, word, and byte counts

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext};

pub(super) struct WcCommand;

#[async_trait]
impl Builtin for WcCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut show = Columns::default();
        let mut files = Vec::new();

        for arg in args {
            if arg.starts_with('-') && arg.len() > 1 {
                for c in arg[1..].chars() {
                    match c {
                        'l' => show.lines = true,
                        'w' => show.words = true,
                        'm' => show.chars = true,
                        'c' => show.bytes = true,
                        _ => return ctx.usage(format!("unknown option: -{c}")),
                    }
                }
            } else {
                files.push(arg.clone());
            }
        }

        // Default: lines, words and bytes
        if !(show.lines || show.words || show.chars || show.bytes) {
            show = Columns {
                lines: true,
                words: true,
                chars: false,
                bytes: true,
            };
        }

        let from_stdin = files.is_empty();
        let (inputs, ok) = ctx.inputs(&files).await?;
        let mut total = Counts::default();

        for (file, contents) in &inputs {
            let counts = count(contents);
            total.add(&counts);

            let row = show.render(&counts, from_stdin);
            if from_stdin {
                writeln!(ctx.stdout, "{row}")?;
            } else {
                writeln!(ctx.stdout, "{row} {file}")?;
            }
        }

        if files.len() > 1 {
            writeln!(ctx.stdout, "{} total", show.render(&total, false))?;
        }

        Ok(if ok { 0 } else { 1 })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Columns {
    lines: bool,
    words: bool,
    chars: bool,
    bytes: bool,
}

impl Columns {
    fn render(&self, counts: &Counts, bare: bool) -> String {
        let mut values = Vec::new();
        if self.lines {
            values.push(counts.lines);
        }
        if self.words {
            values.push(counts.words);
        }
        if self.chars {
            values.push(counts.chars);
        }
        if self.bytes {
            values.push(counts.bytes);
        }

        // A single count on stdin prints unpadded, like `wc -l < file`
        if bare && values.len() == 1 {
            return values[0].to_string();
        }
        values.iter().map(|v| format!("{v:8}")).collect()
    }
}

#[derive(Debug, Default)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
    chars: usize,
}

impl Counts {
    fn add(&mut self, other: &Counts) {
        self.lines += other.lines;
        self.words += other.words;
        self.bytes += other.bytes;
        self.chars += other.chars;
    }
}

fn count(data: &[u8]) -> Counts {
    let bytes = data.len();
    let lines = data.iter().filter(|&&b| b == b'\n').count();

    let mut words = 0;
    let mut in_word = false;
    for &b in data {
        let is_ws = b.is_ascii_whitespace();
        if in_word && is_ws {
            in_word = false;
        } else if !in_word && !is_ws {
            in_word = true;
            words += 1;
        }
    }

    let chars = String::from_utf8_lossy(data).chars().count();

    Counts {
        lines,
        words,
        bytes,
        chars,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    #[test]
    fn test_count() {
        let c = count("héllo world\nbye\n".as_bytes());
        assert_eq!(c.lines, 2);
        assert_eq!(c.words, 3);
        assert_eq!(c.chars, 16);
        assert_eq!(c.bytes, 17);
    }

    #[tokio::test]
    async fn test_single_column_from_stdin() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&WcCommand, &fs, &["-l"], "a\nb\nc\n").await;
        assert_eq!(out, "3\n");
    }

    #[tokio::test]
    async fn test_files_and_total() {
        let fs = Vfs::in_memory();
        fs.write_file("/a", b"one two\n").await.unwrap();
        fs.write_file("/b", b"three\n").await.unwrap();

        let (status, out, _) = run(&WcCommand, &fs, &["-lw", "/a", "/b"], "").await;
        assert_eq!(status, 0);
        assert_eq!(
            out,
            "       1       2 /a\n       1       1 /b\n       2       3 total\n"
        );
    }
}
