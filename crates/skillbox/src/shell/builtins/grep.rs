//! grep builtin - print lines matching a pattern

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Builtin, CommandContext};

pub(super) struct GrepCommand;

#[async_trait]
impl Builtin for GrepCommand {
    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> io::Result<i32> {
        let opts = match GrepOpts::parse(args) {
            Ok(o) => o,
            Err(e) => return ctx.usage(e),
        };

        let regex = match regex_lite::Regex::new(&opts.pattern) {
            Ok(r) => r,
            Err(e) => return ctx.usage(format!("invalid regex: {e}")),
        };

        let show_filename = (opts.files.len() > 1 || opts.with_filename) && !opts.no_filename;
        let (inputs, ok) = if opts.silent {
            // -q only reports through the exit status
            let mut inputs = Vec::new();
            for file in &opts.files {
                if let Ok(data) = ctx.read(file).await {
                    inputs.push((file.clone(), data));
                }
            }
            if opts.files.is_empty() {
                inputs.push(("-".to_string(), std::mem::take(&mut ctx.stdin)));
            }
            (inputs, true)
        } else {
            ctx.inputs(&opts.files).await?
        };

        let mut matched = false;
        for (file, contents) in &inputs {
            let filename = show_filename.then_some(file.as_str());
            let count = grep_buffer(contents, &regex, filename, &opts, &mut ctx.stdout)?;
            matched |= count > 0;

            if opts.files_only && count > 0 {
                writeln!(ctx.stdout, "{file}")?;
            } else if opts.count_only {
                match filename {
                    Some(f) => writeln!(ctx.stdout, "{f}:{count}")?,
                    None => writeln!(ctx.stdout, "{count}")?,
                }
            }
        }

        Ok(if !ok {
            2
        } else if matched {
            0
        } else {
            1
        })
    }
}

/// Write matching lines and return how many matched.
fn grep_buffer(
    input: &[u8],
    regex: &regex_lite::Regex,
    filename: Option<&str>,
    opts: &GrepOpts,
    out: &mut Vec<u8>,
) -> io::Result<usize> {
    let mut match_count = 0;
    let text = String::from_utf8_lossy(input);

    for (idx, line) in text.lines().enumerate() {
        let is_match = regex.is_match(line) != opts.invert;
        if !is_match {
            continue;
        }
        match_count += 1;

        if !(opts.files_only || opts.count_only || opts.silent) {
            if let Some(f) = filename {
                write!(out, "{f}:")?;
            }
            if opts.line_number {
                write!(out, "{}:", idx + 1)?;
            }
            if opts.only_matching && !opts.invert {
                for m in regex.find_iter(line) {
                    writeln!(out, "{}", m.as_str())?;
                }
            } else {
                writeln!(out, "{line}")?;
            }
        }

        if opts.max_count.is_some_and(|max| match_count >= max) {
            break;
        }
    }

    Ok(match_count)
}

#[derive(Debug, Default)]
struct GrepOpts {
    pattern: String,
    files: Vec<String>,
    invert: bool,
    ignore_case: bool,
    fixed: bool,
    word: bool,
    line_number: bool,
    count_only: bool,
    files_only: bool,
    only_matching: bool,
    with_filename: bool,
    no_filename: bool,
    silent: bool,
    max_count: Option<usize>,
}

impl GrepOpts {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = GrepOpts::default();
        let mut pattern = None;
        let mut positional = Vec::new();
        let mut args_iter = args.iter();
        let mut options_done = false;

        while let Some(arg) = args_iter.next() {
            if options_done || arg == "-" || !arg.starts_with('-') {
                positional.push(arg.clone());
            } else if arg == "--" {
                options_done = true;
            } else if let Some(long) = arg.strip_prefix("--") {
                match long {
                    "invert-match" => opts.invert = true,
                    "ignore-case" => opts.ignore_case = true,
                    "fixed-strings" => opts.fixed = true,
                    "word-regexp" => opts.word = true,
                    "line-number" => opts.line_number = true,
                    "count" => opts.count_only = true,
                    "files-with-matches" => opts.files_only = true,
                    "only-matching" => opts.only_matching = true,
                    "with-filename" => opts.with_filename = true,
                    "no-filename" => opts.no_filename = true,
                    "quiet" | "silent" => opts.silent = true,
                    "extended-regexp" => {}
                    _ => return Err(format!("unknown option: {arg}")),
                }
            } else {
                let chars: Vec<char> = arg[1..].chars().collect();
                let mut i = 0;
                while i < chars.len() {
                    match chars[i] {
                        'v' => opts.invert = true,
                        'i' => opts.ignore_case = true,
                        'F' => opts.fixed = true,
                        'w' => opts.word = true,
                        'n' => opts.line_number = true,
                        'c' => opts.count_only = true,
                        'l' => opts.files_only = true,
                        'o' => opts.only_matching = true,
                        'H' => opts.with_filename = true,
                        'h' => opts.no_filename = true,
                        'q' => opts.silent = true,
                        'E' | 's' => {}
                        c @ ('e' | 'm') => {
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
                            if c == 'e' {
                                pattern = Some(value);
                            } else {
                                opts.max_count = Some(
                                    value
                                        .parse()
                                        .map_err(|_| format!("invalid max count: {value}"))?,
                                );
                            }
                        }
                        c => return Err(format!("unknown option: -{c}")),
                    }
                    i += 1;
                }
            }
        }

        // First positional is the pattern unless -e gave one
        let pattern = match pattern {
            Some(p) => p,
            None if positional.is_empty() => return Err("missing pattern".to_string()),
            None => positional.remove(0),
        };

        let mut pattern = if opts.fixed {
            regex_lite::escape(&pattern)
        } else {
            pattern
        };
        if opts.word {
            pattern = format!(r"\b(?:{pattern})\b");
        }
        if opts.ignore_case {
            pattern = format!("(?i){pattern}");
        }

        opts.pattern = pattern;
        opts.files = positional;
        Ok(opts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::builtins::test_support::run;
    use crate::vfs::Vfs;

    const SALES: &str = "region,product,amount\nWest,apple,10\nEast,pear,7\nWest,plum,3\n";

    #[tokio::test]
    async fn test_basic_match() {
        let fs = Vfs::in_memory();
        let (status, out, _) = run(&GrepCommand, &fs, &["West"], SALES).await;
        assert_eq!(status, 0);
        assert_eq!(out, "West,apple,10\nWest,plum,3\n");
    }

    #[tokio::test]
    async fn test_no_match_status() {
        let fs = Vfs::in_memory();
        let (status, out, _) = run(&GrepCommand, &fs, &["North"], SALES).await;
        assert_eq!(status, 1);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_flags() {
        let fs = Vfs::in_memory();
        let (_, out, _) = run(&GrepCommand, &fs, &["-vc", "West"], SALES).await;
        assert_eq!(out, "2\n");

        let (_, out, _) = run(&GrepCommand, &fs, &["-in", "east"], SALES).await;
        assert_eq!(out, "3:East,pear,7\n");

        let (_, out, _) = run(&GrepCommand, &fs, &["-F", "a.p"], "a.p\naxp\n").await;
        assert_eq!(out, "a.p\n");

        let (_, out, _) = run(&GrepCommand, &fs, &["-o", "[0-9]+"], SALES).await;
        assert_eq!(out, "10\n7\n3\n");
    }

    #[tokio::test]
    async fn test_multiple_files_prefix_names() {
        let fs = Vfs::in_memory();
        fs.write_file("/a.txt", b"hit\nmiss\n").await.unwrap();
        fs.write_file("/b.txt", b"hit again\n").await.unwrap();

        let (_, out, _) = run(&GrepCommand, &fs, &["hit", "/a.txt", "/b.txt"], "").await;
        assert_eq!(out, "/a.txt:hit\n/b.txt:hit again\n");

        let (_, out, _) = run(&GrepCommand, &fs, &["-l", "again", "/a.txt", "/b.txt"], "").await;
        assert_eq!(out, "/b.txt\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_status_two() {
        let fs = Vfs::in_memory();
        let (status, _, err) = run(&GrepCommand, &fs, &["x", "/missing"], "").await;
        assert_eq!(status, 2);
        assert!(err.contains("No such file or directory"));
    }

    #[tokio::test]
    async fn test_usage_errors() {
        let fs = Vfs::in_memory();
        let (status, _, err) = run(&GrepCommand, &fs, &[], "").await;
        assert_eq!(status, 2);
        assert!(err.contains("missing pattern"));

        let (status, _, _) = run(&GrepCommand, &fs, &["("], "").await;
        assert_eq!(status, 2);
    }
}
