//! echo builtin - display a line of text

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext};

pub(super) struct EchoCommand;

#[async_trait]
impl Builtin for EchoCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut newline = true;
        let mut escapes = false;
        let mut start = 0;

        // Leading option words made only of n/e/E; anything else is text
        for arg in args {
            let Some(flags) = arg.strip_prefix('-') else {
                break;
            };
            if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
                break;
            }
            for c in flags.chars() {
                match c {
                    'n' => newline = false,
                    'e' => escapes = true,
                    _ => escapes = false,
                }
            }
            start += 1;
        }

        let text = args[start..].join(" ");
        if escapes {
            let (text, stop) = unescape(&text);
            ctx.stdout.write_all(text.as_bytes())?;
            if stop {
                return Ok(0);
            }
        } else {
            ctx.stdout.write_all(text.as_bytes())?;
        }
        if newline {
            ctx.stdout.write_all(b"\n")?;
        }
        Ok(0)
    }
}

/// Process backslash escapes. The flag is true if `\c` cut the output short.
fn unescape(s: &str) -> (String, bool) {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('a') => out.push('\x07'),
            Some('0') => out.push('\0'),
            Some('c') => return (out, true),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    (out, false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    #[tokio::test]
    async fn test_echo() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&EchoCommand, &fs, &["hello", "world"], "").await;
        assert_eq!(out, "hello world\n");

        let (_, out, _) = run(&EchoCommand, &fs, &[], "").await;
        assert_eq!(out, "\n");
    }

    #[tokio::test]
    async fn test_flags() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&EchoCommand, &fs, &["-n", "x"], "").await;
        assert_eq!(out, "x");

        let (_, out, _) = run(&EchoCommand, &fs, &["-e", "a\\tb\\nc"], "").await;
        assert_eq!(out, "a\tb\nc\n");

        let (_, out, _) = run(&EchoCommand, &fs, &["a\\nb"], "").await;
        assert_eq!(out, "a\\nb\n");

        let (_, out, _) = run(&EchoCommand, &fs, &["-x", "y"], "").await;
        assert_eq!(out, "-x y\n");
    }
}
