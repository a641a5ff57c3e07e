//! cut builtin - remove sections from each line of files

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext, lines};

pub(super) struct CutCommand;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Fields,
    Chars,
}

#[async_trait]
impl Builtin for CutCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let mut delimiter = '\t';
        let mut selection: Option<(Mode, Vec<Range>)> = None;
        let mut only_delimited = false;
        let mut files = Vec::new();
        let mut args_iter = args.iter();

        while let Some(arg) = args_iter.next() {
            if arg == "-" || !arg.starts_with('-') {
                files.push(arg.clone());
                continue;
            }
            if arg == "-s" {
                only_delimited = true;
                continue;
            }

            let mut rest = arg[1..].chars();
            let flag = rest.next().map(String::from).unwrap_or_default();
            let flag = flag.as_str();
            let value = if rest.as_str().is_empty() {
                args_iter.next().cloned()
            } else {
                Some(rest.as_str().to_string())
            };
            let Some(value) = value else {
                return ctx.usage(format!("option requires an argument -- '{flag}'"));
            };

            match flag {
                "d" => {
                    let mut chars = value.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => delimiter = c,
                        _ => return ctx.usage("the delimiter must be a single character"),
                    }
                }
                "f" | "c" => {
                    let mode = if flag == "f" { Mode::Fields } else { Mode::Chars };
                    match parse_list(&value) {
                        Ok(ranges) => selection = Some((mode, ranges)),
                        Err(e) => return ctx.usage(e),
                    }
                }
                _ => return ctx.usage(format!("unknown option: {arg}")),
            }
        }

        let Some((mode, ranges)) = selection else {
            return ctx.usage("you must specify a list of fields or characters");
        };

        let (inputs, ok) = ctx.inputs(&files).await?;
        for (_, data) in &inputs {
            for line in lines(data) {
                match mode {
                    Mode::Chars => {
                        let chars: Vec<char> = line.chars().collect();
                        let picked: String = (1..=chars.len())
                            .filter(|i| selected(&ranges, *i))
                            .map(|i| chars[i - 1])
                            .collect();
                        writeln!(ctx.stdout, "{picked}")?;
                    }
                    Mode::Fields => {
                        if !line.contains(delimiter) {
                            if !only_delimited {
                                writeln!(ctx.stdout, "{line}")?;
                            }
                            continue;
                        }
                        let picked: Vec<&str> = line
                            .split(delimiter)
                            .enumerate()
                            .filter(|(i, _)| selected(&ranges, i + 1))
                            .map(|(_, f)| f)
                            .collect();
                        writeln!(ctx.stdout, "{}", picked.join(&delimiter.to_string()))?;
                    }
                }
            }
        }

        Ok(if ok { 0 } else { 1 })
    }
}

/// Inclusive 1-based range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    start: usize,
    end: usize,
}

fn selected(ranges: &[Range], n: usize) -> bool {
    ranges.iter().any(|r| r.start <= n && n <= r.end)
}

/// Parse a list like `1,3-5,7-`.
fn parse_list(list: &str) -> Result<Vec<Range>, String> {
    let invalid = || format!("invalid field list: '{list}'");
    let number = |s: &str| -> Result<usize, String> {
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid()),
        }
    };

    list.split(',')
        .map(|part| match part.split_once('-') {
            None => number(part).map(|n| Range { start: n, end: n }),
            Some(("", "")) => Err(invalid()),
            Some(("", end)) => Ok(Range {
                start: 1,
                end: number(end)?,
            }),
            Some((start, "")) => Ok(Range {
                start: number(start)?,
                end: usize::MAX,
            }),
            Some((start, end)) => {
                let range = Range {
                    start: number(start)?,
                    end: number(end)?,
                };
                if range.start > range.end {
                    return Err(invalid());
                }
                Ok(range)
            }
        })
        .collect()
}
