//! Tokenizer and parser for the command language.
//!
//! Grammar (informally):
//!
//! ```text
//! script    := list ((';' | '\n') list)*
//! list      := pipeline (('&&' | '||') pipeline)*
//! pipeline  := command ('|' command)*
//! command   := assignment* (word | redirect)*
//! redirect  := ('<' | '>' | '>>' | '2>' | '2>>') word | '2>&1' | '>&2'
//! ```
//!
//! Words keep their quoting so expansion can decide what to split and glob.

use thiserror::Error;

/// One piece of a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WordPart {
    Literal {
        text: String,
        quoted: bool,
    },
    Var {
        name: String,
        default: Option<String>,
        quoted: bool,
    },
}

/// A shell word before expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Word {
    pub(crate) parts: Vec<WordPart>,
}

impl Word {
    fn push_char(&mut self, c: char, quoted: bool) {
        match self.parts.last_mut() {
            Some(WordPart::Literal { text, quoted: q }) if *q == quoted => text.push(c),
            _ => self.parts.push(WordPart::Literal {
                text: c.to_string(),
                quoted,
            }),
        }
    }

    fn open_quote(&mut self) {
        self.parts.push(WordPart::Literal {
            text: String::new(),
            quoted: true,
        });
    }

    #[cfg(test)]
    pub(crate) fn literal(text: &str) -> Self {
        Word {
            parts: vec![WordPart::Literal {
                text: text.to_string(),
                quoted: false,
            }],
        }
    }

    /// Split `NAME=value` into its name and value word.
    fn as_assignment(&self) -> Option<(String, Word)> {
        let Some(WordPart::Literal {
            text,
            quoted: false,
        }) = self.parts.first()
        else {
            return None;
        };
        let eq = text.find('=')?;
        let name = &text[..eq];
        if !is_valid_name(name) {
            return None;
        }

        let mut value = Word::default();
        let rest = &text[eq + 1..];
        if !rest.is_empty() {
            value.parts.push(WordPart::Literal {
                text: rest.to_string(),
                quoted: false,
            });
        }
        value.parts.extend(self.parts[1..].iter().cloned());
        Some((name.to_string(), value))
    }
}

/// Whether `name` is a valid variable name.
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Redirection operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RedirectOp {
    /// `< file`
    In,
    /// `> file`
    Out,
    /// `>> file`
    Append,
    /// `2> file`
    ErrOut,
    /// `2>> file`
    ErrAppend,
    /// `2>&1`
    ErrToOut,
    /// `>&2`
    OutToErr,
}

impl RedirectOp {
    fn needs_target(self) -> bool {
        !matches!(self, RedirectOp::ErrToOut | RedirectOp::OutToErr)
    }

    fn symbol(self) -> &'static str {
        match self {
            RedirectOp::In => "<",
            RedirectOp::Out => ">",
            RedirectOp::Append => ">>",
            RedirectOp::ErrOut => "2>",
            RedirectOp::ErrAppend => "2>>",
            RedirectOp::ErrToOut => "2>&1",
            RedirectOp::OutToErr => ">&2",
        }
    }
}

/// A redirection attached to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Redirect {
    pub(crate) op: RedirectOp,
    pub(crate) target: Option<Word>,
}

/// A command with its assignments, arguments and redirections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SimpleCommand {
    pub(crate) assignments: Vec<(String, Word)>,
    pub(crate) words: Vec<Word>,
    pub(crate) redirects: Vec<Redirect>,
}

/// Commands connected by `|`.
pub(crate) type Pipeline = Vec<SimpleCommand>;

/// `&&` or `||`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Connector {
    And,
    Or,
}

/// Pipelines connected by `&&` / `||`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AndOrList {
    pub(crate) first: Pipeline,
    pub(crate) rest: Vec<(Connector, Pipeline)>,
}

/// A parsed command line or script file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Script {
    pub(crate) lists: Vec<AndOrList>,
}

/// A syntax error in a command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error: {0}")]
pub struct ParseError(String);

fn syntax(msg: impl Into<String>) -> ParseError {
    ParseError(msg.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(Word),
    Pipe,
    AndIf,
    OrIf,
    Semi,
    Redirect(RedirectOp),
}

impl Token {
    fn describe(&self) -> &'static str {
        match self {
            Token::Word(_) => "word",
            Token::Pipe => "|",
            Token::AndIf => "&&",
            Token::OrIf => "||",
            Token::Semi => ";",
            Token::Redirect(op) => op.symbol(),
        }
    }
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

struct Lexer<'a> {
    chars: Chars<'a>,
    tokens: Vec<Token>,
    word: Word,
    in_word: bool,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            tokens: Vec::new(),
            word: Word::default(),
            in_word: false,
        }
    }

    fn flush(&mut self) {
        if self.in_word {
            self.tokens
                .push(Token::Word(std::mem::take(&mut self.word)));
            self.in_word = false;
        }
    }

    fn push(&mut self, token: Token) {
        self.flush();
        self.tokens.push(token);
    }

    fn next_if(&mut self, expected: char) -> bool {
        self.chars.next_if_eq(&expected).is_some()
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(c) = self.chars.next() {
            match c {
                ' ' | '\t' | '\r' => self.flush(),
                '\n' => self.push(Token::Semi),
                '#' if !self.in_word => {
                    while self.chars.next_if(|&n| n != '\n').is_some() {}
                }
                '\'' => {
                    self.in_word = true;
                    self.word.open_quote();
                    loop {
                        match self.chars.next() {
                            Some('\'') => break,
                            Some(n) => self.word.push_char(n, true),
                            None => return Err(syntax("unterminated single quote")),
                        }
                    }
                }
                '"' => {
                    self.in_word = true;
                    self.word.open_quote();
                    self.double_quoted()?;
                }
                '\\' => match self.chars.next() {
                    Some('\n') => {}
                    Some(n) => {
                        self.in_word = true;
                        self.word.push_char(n, true);
                    }
                    None => {
                        self.in_word = true;
                        self.word.push_char('\\', false);
                    }
                },
                '$' => {
                    self.in_word = true;
                    self.dollar(false)?;
                }
                '`' => return Err(syntax("command substitution is not supported")),
                '|' => {
                    let token = if self.next_if('|') {
                        Token::OrIf
                    } else {
                        Token::Pipe
                    };
                    self.push(token);
                }
                '&' => {
                    if self.next_if('&') {
                        self.push(Token::AndIf);
                    } else {
                        return Err(syntax("background jobs (&) are not supported"));
                    }
                }
                ';' => self.push(Token::Semi),
                '<' => self.push(Token::Redirect(RedirectOp::In)),
                '>' => {
                    let op = if self.next_if('>') {
                        RedirectOp::Append
                    } else if self.next_if('&') {
                        if !self.next_if('2') {
                            return Err(syntax("only >&2 is supported"));
                        }
                        RedirectOp::OutToErr
                    } else {
                        RedirectOp::Out
                    };
                    self.push(Token::Redirect(op));
                }
                '2' if !self.in_word && self.chars.peek() == Some(&'>') => {
                    self.chars.next();
                    let op = if self.next_if('>') {
                        RedirectOp::ErrAppend
                    } else if self.next_if('&') {
                        if !self.next_if('1') {
                            return Err(syntax("only 2>&1 is supported"));
                        }
                        RedirectOp::ErrToOut
                    } else {
                        RedirectOp::ErrOut
                    };
                    self.push(Token::Redirect(op));
                }
                other => {
                    self.in_word = true;
                    self.word.push_char(other, false);
                }
            }
        }
        self.flush();
        Ok(self.tokens)
    }

    fn double_quoted(&mut self) -> Result<(), ParseError> {
        loop {
            match self.chars.next() {
                None => return Err(syntax("unterminated double quote")),
                Some('"') => return Ok(()),
                Some('\\') => match self.chars.peek().copied() {
                    Some(n @ ('$' | '`' | '"' | '\\')) => {
                        self.chars.next();
                        self.word.push_char(n, true);
                    }
                    Some('\n') => {
                        self.chars.next();
                    }
                    _ => self.word.push_char('\\', true),
                },
                Some('$') => self.dollar(true)?,
                Some('`') => return Err(syntax("command substitution is not supported")),
                Some(n) => self.word.push_char(n, true),
            }
        }
    }

    fn dollar(&mut self, quoted: bool) -> Result<(), ParseError> {
        match self.chars.peek().copied() {
            Some('{') => {
                self.chars.next();
                let mut body = String::new();
                loop {
                    match self.chars.next() {
                        Some('}') => break,
                        Some(c) => body.push(c),
                        None => return Err(syntax("unterminated ${")),
                    }
                }
                let (name, default) = match body.split_once(":-") {
                    Some((name, default)) => (name.to_string(), Some(default.to_string())),
                    None => (body, None),
                };
                if !is_valid_name(&name) && !is_special_var(&name) {
                    return Err(syntax(format!("bad substitution: ${{{name}}}")));
                }
                self.word.parts.push(WordPart::Var {
                    name,
                    default,
                    quoted,
                });
            }
            Some('(') => return Err(syntax("command substitution is not supported")),
            Some(c) if c == '?' || c == '#' || c == '@' || c.is_ascii_digit() => {
                self.chars.next();
                self.word.parts.push(WordPart::Var {
                    name: c.to_string(),
                    default: None,
                    quoted,
                });
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(n) = self
                    .chars
                    .next_if(|n| n.is_ascii_alphanumeric() || *n == '_')
                {
                    name.push(n);
                }
                self.word.parts.push(WordPart::Var {
                    name,
                    default: None,
                    quoted,
                });
            }
            _ => self.word.push_char('$', quoted),
        }
        Ok(())
    }
}

fn is_special_var(name: &str) -> bool {
    matches!(name, "?" | "#" | "@") || (!name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn skip_separators(&mut self) {
        while self.peek() == Some(&Token::Semi) {
            self.pos += 1;
        }
    }

    fn script(&mut self) -> Result<Script, ParseError> {
        let mut lists = Vec::new();
        loop {
            self.skip_separators();
            if self.peek().is_none() {
                break;
            }

            let first = self.pipeline()?;
            let mut rest = Vec::new();
            while let Some(connector) = match self.peek() {
                Some(Token::AndIf) => Some(Connector::And),
                Some(Token::OrIf) => Some(Connector::Or),
                _ => None,
            } {
                self.pos += 1;
                self.skip_separators();
                rest.push((connector, self.pipeline()?));
            }
            lists.push(AndOrList { first, rest });

            match self.peek() {
                None | Some(Token::Semi) => {}
                Some(token) => {
                    return Err(syntax(format!(
                        "unexpected token `{}`",
                        token.describe()
                    )));
                }
            }
        }
        Ok(Script { lists })
    }

    fn pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut commands = vec![self.command()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            commands.push(self.command()?);
        }
        Ok(commands)
    }

    fn command(&mut self) -> Result<SimpleCommand, ParseError> {
        let mut cmd = SimpleCommand::default();
        while let Some(token) = self.peek() {
            match token {
                Token::Word(word) => {
                    let word = word.clone();
                    self.pos += 1;
                    match word.as_assignment() {
                        Some(assignment) if cmd.words.is_empty() => {
                            cmd.assignments.push(assignment);
                        }
                        _ => cmd.words.push(word),
                    }
                }
                Token::Redirect(op) => {
                    let op = *op;
                    self.pos += 1;
                    let target = if op.needs_target() {
                        match self.peek() {
                            Some(Token::Word(word)) => {
                                let word = word.clone();
                                self.pos += 1;
                                Some(word)
                            }
                            Some(other) => {
                                return Err(syntax(format!(
                                    "expected file name after `{}`, found `{}`",
                                    op.symbol(),
                                    other.describe()
                                )));
                            }
                            None => {
                                return Err(syntax(format!(
                                    "expected file name after `{}`",
                                    op.symbol()
                                )));
                            }
                        }
                    } else {
                        None
                    };
                    cmd.redirects.push(Redirect { op, target });
                }
                _ => break,
            }
        }

        if cmd.words.is_empty() && cmd.assignments.is_empty() && cmd.redirects.is_empty() {
            return Err(match self.peek() {
                Some(token) => syntax(format!("unexpected token `{}`", token.describe())),
                None => syntax("unexpected end of input"),
            });
        }
        Ok(cmd)
    }
}

/// Parse a command line or script.
pub(crate) fn parse(input: &str) -> Result<Script, ParseError> {
    let tokens = Lexer::new(input).run()?;
    Parser { tokens, pos: 0 }.script()
}
