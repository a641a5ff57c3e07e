//! tr builtin - translate or delete characters

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext};

pub(super) struct TrCommand;

#[async_trait]
impl Builtin for TrCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut delete = false;
        let mut squeeze = false;
        let mut sets = Vec::new();

        for arg in args {
            if sets.is_empty() && arg.starts_with('-') && arg.len() > 1 {
                for c in arg[1..].chars() {
                    match c {
                        'd' => delete = true,
                        's' => squeeze = true,
                        _ => return ctx.usage(format!("unknown option: -{c}")),
                    }
                }
            } else {
                sets.push(expand_set(arg));
            }
        }

        let valid = match (delete, squeeze) {
            (true, false) => sets.len() == 1,
            (false, true) => matches!(sets.len(), 1 | 2),
            _ => sets.len() == 2,
        };
        if !valid {
            return ctx.usage("wrong number of character sets");
        }

        let input = String::from_utf8_lossy(&std::mem::take(&mut ctx.stdin)).into_owned();
        let from = &sets[0];
        let to = sets.get(1);

        let mut out = String::with_capacity(input.len());
        let mut last: Option<char> = None;
        for c in input.chars() {
            let mapped = if delete {
                if from.contains(&c) {
                    continue;
                }
                c
            } else {
                match (from.iter().position(|&f| f == c), to) {
                    (Some(idx), Some(to)) if !to.is_empty() => to[idx.min(to.len() - 1)],
                    _ => c,
                }
            };

            // Squeeze applies to the last set given
            let squeeze_set = to.unwrap_or(from);
            if squeeze && last == Some(mapped) && squeeze_set.contains(&mapped) {
                continue;
            }
            out.push(mapped);
            last = Some(mapped);
        }

        ctx.stdout.write_all(out.as_bytes())?;
        Ok(0)
    }
}

/// Expand ranges, escapes and a few character classes.
fn expand_set(spec: &str) -> Vec<char> {
    let spec = spec
        .replace("[:lower:]", "a-z")
        .replace("[:upper:]", "A-Z")
        .replace("[:digit:]", "0-9")
        .replace("[:space:]", " \\t\\n\\r");

    let mut raw = Vec::new();
    let mut chars = spec.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            raw.push(match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some(other) => other,
                None => '\\',
            });
        } else {
            raw.push(c);
        }
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        if i + 2 < raw.len() && raw[i + 1] == '-' && raw[i] <= raw[i + 2] {
            out.extend(raw[i]..=raw[i + 2]);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    #[test]
    fn test_expand_set() {
        assert_eq!(expand_set("a-e"), vec!['a', 'b', 'c', 'd', 'e']);
        assert_eq!(expand_set("\\n,"), vec!['\n', ',']);
        assert_eq!(expand_set("[:digit:]").len(), 10);
    }

    #[tokio::test]
    async fn test_translate() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&TrCommand, &fs, &["a-z", "A-Z"], "hello\n").await;
        assert_eq!(out, "HELLO\n");

        let (_, out, _) = run(&TrCommand, &fs, &[",", "\\t"], "a,b\n").await;
        assert_eq!(out, "a\tb\n");
    }

    #[tokio::test]
    async fn test_delete_and_squeeze() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&TrCommand, &fs, &["-d", "0-9"], "a1b22c\n").await;
        assert_eq!(out, "abc\n");

        let (_, out, _) = run(&TrCommand, &fs, &["-s", " "], "a   b  c\n").await;
        assert_eq!(out, "a b c\n");
    }

    #[tokio::test]
    async fn test_missing_sets() {
        let fs = Vfs::in_memory();
        let (status, _, _) = run(&TrCommand, &fs, &["abc"], "").await;
        assert_eq!(status, 2);
    }
}
