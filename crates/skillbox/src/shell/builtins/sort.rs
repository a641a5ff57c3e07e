//! sort builtin - sort lines of text

use std::cmp::Ordering;
use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext, lines};

pub(super) struct SortCommand;

#[async_trait]
impl Builtin for SortCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let opts = match SortOpts::parse(args) {
            Ok(o) => o,
            Err(e) => return ctx.usage(e),
        };

        let (inputs, ok) = ctx.inputs(&opts.files).await?;
        if !ok {
            return Ok(2);
        }

        let mut all: Vec<String> = inputs.iter().flat_map(|(_, data)| lines(data)).collect();
        all.sort_by(|a, b| opts.compare(a, b));
        if opts.unique {
            all.dedup_by(|a, b| opts.compare_keys(a, b) == Ordering::Equal);
        }

        for line in &all {
            writeln!(ctx.stdout, "{line}")?;
        }
        Ok(0)
    }
}

#[derive(Debug, Clone, Default)]
struct KeySpec {
    /// 1-based first field.
    start: usize,
    /// 1-based last field, inclusive; `None` runs to end of line.
    end: Option<usize>,
    numeric: Option<bool>,
    reverse: Option<bool>,
}

#[derive(Debug, Default)]
struct SortOpts {
    files: Vec<String>,
    reverse: bool,
    numeric: bool,
    unique: bool,
    fold_case: bool,
    separator: Option<char>,
    keys: Vec<KeySpec>,
}

impl SortOpts {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = SortOpts::default();
        let mut args_iter = args.iter();

        while let Some(arg) = args_iter.next() {
            if arg == "-" || !arg.starts_with('-') {
                opts.files.push(arg.clone());
                continue;
            }

            let chars: Vec<char> = arg[1..].chars().collect();
            let mut i = 0;
            while i < chars.len() {
                match chars[i] {
                    'r' => opts.reverse = true,
                    'n' => opts.numeric = true,
                    'u' => opts.unique = true,
                    'f' => opts.fold_case = true,
                    c @ ('t' | 'k') => {
                        let value = if i + 1 < chars.len() {
                            let rest: String = chars[i + 1..].iter().collect();
                            i = chars.len();
                            rest
                        } else {
                            args_iter
                                .next()
                                .cloned()
                                .ok_or_else(|| format!("option requires an argument -- '{c}'"))?
                        };
                        if c == 't' {
                            let mut sep = value.chars();
                            match (sep.next(), sep.next()) {
                                (Some(s), None) => opts.separator = Some(s),
                                _ => return Err(format!("multi-character tab '{value}'")),
                            }
                        } else {
                            opts.keys.push(KeySpec::parse(&value)?);
                        }
                    }
                    c => return Err(format!("unknown option: -{c}")),
                }
                i += 1;
            }
        }
        Ok(opts)
    }

    fn fields<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self.separator {
            Some(sep) => line.split(sep).collect(),
            None => line.split_whitespace().collect(),
        }
    }

    fn key_text(&self, line: &str, key: &KeySpec) -> String {
        let fields = self.fields(line);
        let first = key.start.saturating_sub(1);
        let last = key.end.unwrap_or(fields.len()).min(fields.len());
        if first >= last {
            return String::new();
        }
        let joiner = self.separator.map(String::from).unwrap_or_else(|| " ".into());
        fields[first..last].join(&joiner)
    }

    fn compare_text(&self, a: &str, b: &str, numeric: bool) -> Ordering {
        if numeric {
            numeric_prefix(a)
                .partial_cmp(&numeric_prefix(b))
                .unwrap_or(Ordering::Equal)
        } else if self.fold_case {
            a.to_lowercase().cmp(&b.to_lowercase())
        } else {
            a.cmp(b)
        }
    }

    /// Compare by the configured keys only.
    fn compare_keys(&self, a: &str, b: &str) -> Ordering {
        if self.keys.is_empty() {
            let ord = self.compare_text(a, b, self.numeric);
            return if self.reverse { ord.reverse() } else { ord };
        }

        for key in &self.keys {
            let numeric = key.numeric.unwrap_or(self.numeric);
            let reverse = key.reverse.unwrap_or(self.reverse);
            let ord = self.compare_text(&self.key_text(a, key), &self.key_text(b, key), numeric);
            let ord = if reverse { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare by keys, falling back to the whole line.
    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.compare_keys(a, b).then_with(|| {
            if self.unique {
                return Ordering::Equal;
            }
            let ord = a.cmp(b);
            if self.reverse { ord.reverse() } else { ord }
        })
    }
}

impl KeySpec {
    /// Parse `N[,M]` with optional trailing `n`/`r` modifiers on either part.
    fn parse(spec: &str) -> Result<Self, String> {
        let invalid = || format!("invalid key specification: '{spec}'");
        let mut key = KeySpec::default();

        let (start, end) = match spec.split_once(',') {
            Some((s, e)) => (s, Some(e)),
            None => (spec, None),
        };

        let mut field = |part: &str| -> Result<usize, String> {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            for modifier in part[digits.len()..].chars() {
                match modifier {
                    'n' => key.numeric = Some(true),
                    'r' => key.reverse = Some(true),
                    _ => return Err(invalid()),
                }
            }
            match digits.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(invalid()),
            }
        };

        let start = field(start)?;
        let end = end.map(&mut field).transpose()?;
        key.start = start;
        key.end = end;
        Ok(key)
    }
}

/// Leading numeric value of a field, 0 if there is none.
fn numeric_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (idx, c) in s.char_indices() {
        match c {
            '-' | '+' if idx == 0 => {}
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = idx + c.len_utf8();
    }
    s[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    #[tokio::test]
    async fn test_lexical_and_reverse() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&SortCommand, &fs, &[], "pear\napple\nfig\n").await;
        assert_eq!(out, "apple\nfig\npear\n");

        let (_, out, _) = run(&SortCommand, &fs, &["-r"], "pear\napple\nfig\n").await;
        assert_eq!(out, "pear\nfig\napple\n");
    }

    #[tokio::test]
    async fn test_numeric() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&SortCommand, &fs, &["-n"], "10\n9\n-1\n2.5\n").await;
        assert_eq!(out, "-1\n2.5\n9\n10\n");
    }

    #[tokio::test]
    async fn test_unique() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&SortCommand, &fs, &["-u"], "b\na\nb\na\n").await;
        assert_eq!(out, "a\nb\n");
    }

    #[tokio::test]
    async fn test_field_keys() {
        let fs = Vfs::in_memory();
        let input = "West,apple,10\nWest,plum,3\nWest,kiwi,25\n";

        let (_, out, _) = run(&SortCommand, &fs, &["-t,", "-k3", "-nr"], input).await;
        assert_eq!(out, "West,kiwi,25\nWest,apple,10\nWest,plum,3\n");

        let (_, out, _) = run(&SortCommand, &fs, &["-t", ",", "-k", "2,2"], input).await;
        assert_eq!(out, "West,apple,10\nWest,kiwi,25\nWest,plum,3\n");

        let (_, out, _) = run(&SortCommand, &fs, &["-t,", "-k3n"], input).await;
        assert_eq!(out, "West,plum,3\nWest,apple,10\nWest,kiwi,25\n");
    }

    #[tokio::test]
    async fn test_whitespace_fields() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&SortCommand, &fs, &["-k2n"], "b  2\na 10\nc 1\n").await;
        assert_eq!(out, "c 1\nb  2\na 10\n");
    }

    #[tokio::test]
    async fn test_bad_key() {
        let fs = Vfs::in_memory();
        let (status, _, err) = run(&SortCommand, &fs, &["-k", "0"], "").await;
        assert_eq!(status, 2);
        assert!(err.contains("invalid key"));
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix(" 42abc"), 42.0);
        assert_eq!(numeric_prefix("-3.5"), -3.5);
        assert_eq!(numeric_prefix("abc"), 0.0);
    }
}
