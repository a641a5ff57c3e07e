//! Per-execution shell state.

use std::collections::HashMap;

/// Variables, positional parameters and working directory for one
/// execution. Scripts run with `sh`/`bash` get a child copy; `source` shares
/// the parent's.
#[derive(Debug, Clone)]
pub(crate) struct ShellState {
    pub(crate) cwd: String,
    pub(crate) env: HashMap<String, String>,
    /// `$0`, `$1`, ...
    pub(crate) positional: Vec<String>,
    pub(crate) last_status: i32,
    /// Set by `exit`; stops the current script.
    pub(crate) exit: Option<i32>,
    pub(crate) depth: usize,
}

impl ShellState {
    pub(crate) fn new(cwd: String) -> Self {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/".to_string());
        env.insert("PWD".to_string(), cwd.clone());
        Self {
            cwd,
            env,
            positional: vec!["skillbox".to_string()],
            last_status: 0,
            exit: None,
            depth: 0,
        }
    }

    /// State for a script run in a child shell.
    pub(crate) fn child(&self, positional: Vec<String>, extra_env: &[(String, String)]) -> Self {
        let mut env = self.env.clone();
        env.extend(extra_env.iter().cloned());
        Self {
            cwd: self.cwd.clone(),
            env,
            positional,
            last_status: 0,
            exit: None,
            depth: self.depth + 1,
        }
    }

    pub(crate) fn set_cwd(&mut self, cwd: String) {
        self.env.insert("PWD".to_string(), cwd.clone());
        self.cwd = cwd;
    }

    /// Positional arguments without `$0`.
    pub(crate) fn args(&self) -> &[String] {
        self.positional.get(1..).unwrap_or(&[])
    }

    /// Look up a variable, including the special parameters.
    pub(crate) fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "#" => Some(self.args().len().to_string()),
            "@" => Some(self.args().join(" ")),
            _ if name.chars().all(|c| c.is_ascii_digit()) => name
                .parse::<usize>()
                .ok()
                .and_then(|n| self.positional.get(n).cloned()),
            _ => self.env.get(name).cloned(),
        }
    }
}
