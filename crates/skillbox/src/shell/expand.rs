//! Word expansion: variables, field splitting and globbing.

use glob::{MatchOptions, Pattern};

use super::parser::{Word, WordPart};
use super::state::ShellState;
use crate::vfs::{Vfs, path};

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

#[derive(Debug, Default)]
struct Field {
    text: String,
    /// Same as `text` but with quoted characters escaped for globbing.
    pattern: String,
    glob: bool,
    present: bool,
}

impl Field {
    fn push_quoted(&mut self, s: &str) {
        self.text.push_str(s);
        self.pattern.push_str(&Pattern::escape(s));
        self.present = true;
    }

    fn push_unquoted(&mut self, s: &str) {
        self.text.push_str(s);
        self.pattern.push_str(s);
        if s.contains(['*', '?', '[']) {
            self.glob = true;
        }
        if !s.is_empty() {
            self.present = true;
        }
    }
}

fn fields(word: &Word, state: &ShellState) -> Vec<Field> {
    let mut out = Vec::new();
    let mut cur = Field::default();

    for part in &word.parts {
        match part {
            WordPart::Literal { text, quoted: true } => cur.push_quoted(text),
            WordPart::Literal {
                text,
                quoted: false,
            } => cur.push_unquoted(text),
            WordPart::Var { name, quoted, .. } if name == "@" => {
                for (i, arg) in state.args().iter().enumerate() {
                    if *quoted {
                        if i > 0 {
                            out.push(std::mem::take(&mut cur));
                        }
                        cur.push_quoted(arg);
                    } else {
                        for piece in arg.split_whitespace() {
                            if cur.present {
                                out.push(std::mem::take(&mut cur));
                            }
                            cur.push_unquoted(piece);
                        }
                    }
                }
            }
            WordPart::Var {
                name,
                default,
                quoted,
            } => {
                let value = match state.lookup(name) {
                    Some(v) if !v.is_empty() || default.is_none() => v,
                    _ => default.clone().unwrap_or_default(),
                };
                if *quoted {
                    cur.push_quoted(&value);
                } else {
                    for (i, piece) in value.split_whitespace().enumerate() {
                        if i > 0 {
                            out.push(std::mem::take(&mut cur));
                        }
                        cur.push_unquoted(piece);
                    }
                }
            }
        }
    }

    if cur.present {
        out.push(cur);
    }
    out
}

/// Expand a word without splitting or globbing (redirect targets,
/// assignment values).
pub(crate) fn expand_single(word: &Word, state: &ShellState) -> String {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Literal { text, .. } => out.push_str(text),
            WordPart::Var { name, default, .. } => {
                let value = match state.lookup(name) {
                    Some(v) if !v.is_empty() || default.is_none() => v,
                    _ => default.clone().unwrap_or_default(),
                };
                out.push_str(&value);
            }
        }
    }
    out
}

/// Expand command words into arguments.
pub(crate) async fn expand_words(words: &[Word], state: &ShellState, fs: &Vfs) -> Vec<String> {
    let mut args = Vec::new();
    for word in words {
        for field in fields(word, state) {
            if field.glob {
                args.extend(glob(&field, fs, &state.cwd).await);
            } else {
                args.push(field.text);
            }
        }
    }
    args
}

/// Expand a glob against the filesystem. No match keeps the word as-is.
async fn glob(field: &Field, fs: &Vfs, cwd: &str) -> Vec<String> {
    let absolute = field.pattern.starts_with('/');
    let start_dir = if absolute { "/".to_string() } else { cwd.to_string() };
    let start_shown = if absolute { "/".to_string() } else { String::new() };

    let components: Vec<&str> = field.pattern.split('/').filter(|c| !c.is_empty()).collect();
    let mut candidates = vec![(start_dir, start_shown)];

    for (idx, component) in components.iter().enumerate() {
        let last = idx + 1 == components.len();
        let mut next = Vec::new();

        for (dir, shown) in &candidates {
            if *component == "." || *component == ".." {
                if let Ok(joined) = path::join(dir, component) {
                    next.push((joined, append_shown(shown, component)));
                }
                continue;
            }

            let Ok(pattern) = Pattern::new(component) else {
                return vec![field.text.clone()];
            };
            let Ok(entries) = fs.list(dir).await else {
                continue;
            };
            for entry in entries {
                if !pattern.matches_with(&entry.name, GLOB_OPTIONS) {
                    continue;
                }
                if !last && !entry.metadata.is_dir {
                    continue;
                }
                if let Ok(joined) = path::join(dir, &entry.name) {
                    next.push((joined, append_shown(shown, &entry.name)));
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }

    let mut matches: Vec<String> = candidates.into_iter().map(|(_, shown)| shown).collect();
    if matches.is_empty() || components.is_empty() {
        return vec![field.text.clone()];
    }
    matches.sort();
    matches
}

fn append_shown(shown: &str, name: &str) -> String {
    if shown.is_empty() {
        name.to_string()
    } else if shown.ends_with('/') {
        format!("{shown}{name}")
    } else {
        format!("{shown}/{name}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::parser::parse;

    fn words_of(line: &str) -> Vec<Word> {
        let script = parse(line).unwrap();
        script.lists[0].first[0].words.clone()
    }

    async fn expand(line: &str, state: &ShellState, fs: &Vfs) -> Vec<String> {
        expand_words(&words_of(line), state, fs).await
    }

    #[tokio::test]
    async fn test_variable_splitting() {
        let fs = Vfs::in_memory();
        let mut state = ShellState::new("/".into());
        state.env.insert("V".into(), "a  b".into());

        assert_eq!(expand("echo $V", &state, &fs).await, vec!["echo", "a", "b"]);
        assert_eq!(expand("echo \"$V\"", &state, &fs).await, vec!["echo", "a  b"]);
        assert_eq!(expand("echo x$V", &state, &fs).await, vec!["echo", "xa", "b"]);
    }

    #[tokio::test]
    async fn test_empty_unquoted_var_vanishes() {
        let fs = Vfs::in_memory();
        let state = ShellState::new("/".into());
        assert_eq!(expand("echo $NOPE", &state, &fs).await, vec!["echo"]);
        assert_eq!(expand("echo \"$NOPE\"", &state, &fs).await, vec!["echo", ""]);
    }

    #[tokio::test]
    async fn test_default_value() {
        let fs = Vfs::in_memory();
        let state = ShellState::new("/".into());
        assert_eq!(
            expand("head -n ${1:-10}", &state, &fs).await,
            vec!["head", "-n", "10"]
        );
    }

    #[tokio::test]
    async fn test_quoted_at_keeps_arguments() {
        let fs = Vfs::in_memory();
        let mut state = ShellState::new("/".into());
        state.positional = vec!["s".into(), "a b".into(), "c".into()];

        assert_eq!(expand("f \"$@\"", &state, &fs).await, vec!["f", "a b", "c"]);
        assert_eq!(expand("f $@", &state, &fs).await, vec!["f", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_glob_expansion() {
        let fs = Vfs::in_memory();
        fs.write_file("/data/b.csv", b"").await.unwrap();
        fs.write_file("/data/a.csv", b"").await.unwrap();
        fs.write_file("/data/notes.txt", b"").await.unwrap();
        fs.write_file("/data/.hidden.csv", b"").await.unwrap();
        let state = ShellState::new("/data".into());

        assert_eq!(expand("ls *.csv", &state, &fs).await, vec!["ls", "a.csv", "b.csv"]);
        assert_eq!(
            expand("ls /data/*.csv", &state, &fs).await,
            vec!["ls", "/data/a.csv", "/data/b.csv"]
        );
        // Quoted globs are literal; unmatched globs stay as written
        assert_eq!(expand("ls '*.csv'", &state, &fs).await, vec!["ls", "*.csv"]);
        assert_eq!(expand("ls *.json", &state, &fs).await, vec!["ls", "*.json"]);
    }

    #[tokio::test]
    async fn test_glob_through_directories() {
        let fs = Vfs::in_memory();
        fs.write_file("/skills/csv/SKILL.md", b"").await.unwrap();
        fs.write_file("/skills/text/SKILL.md", b"").await.unwrap();
        fs.write_file("/skills/README", b"").await.unwrap();
        let state = ShellState::new("/".into());

        assert_eq!(
            expand("cat /skills/*/SKILL.md", &state, &fs).await,
            vec!["cat", "/skills/csv/SKILL.md", "/skills/text/SKILL.md"]
        );
    }
}
