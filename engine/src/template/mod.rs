//! Invocation templates and their evaluation against a symbol table
//!
//! A template is literal command-line text with parameter tokens (see
//! [`token`]). Evaluation yields a [`Command`], which is either an argument
//! vector for direct exec or a single string for the shell.
//!
//! # Example
//!
//! ```rust
//! use cmdsplit_engine::{SymbolTable, Template};
//!
//! let template = Template::parse("eslint -f json <javascript-src% >").unwrap();
//! let symbols = SymbolTable::new().with(
//!     "javascript-src",
//!     vec!["/pkg/a.js".to_owned(), "/pkg/b.js".to_owned()],
//! );
//! let command = template.evaluate(&symbols);
//! assert_eq!(command.argv(), ["eslint", "-f", "json", "/pkg/a.js", "/pkg/b.js"]);
//! ```

pub mod token;

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::types::{SymbolTable, Value};
pub use token::{is_truthy, Operator, Segment, Token, TemplateError};

/// Characters in literal text that require a shell to interpret
///
/// Pipes, separators, expansions, quoting and globs.
const SHELL_METACHARACTERS: [char; 11] = ['|', '&', ';', '$', '`', '\'', '"', '\\', '*', '?', '['];

/// How the evaluated command must be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandForm {
    /// Argument vector passed straight to exec
    Exec,
    /// One string handed to the shell
    Shell,
}

/// An evaluated command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", rename_all = "lowercase")]
pub enum Command {
    Exec { argv: Vec<String> },
    Shell { script: String },
}

impl Command {
    pub fn form(&self) -> CommandForm {
        match self {
            Self::Exec { .. } => CommandForm::Exec,
            Self::Shell { .. } => CommandForm::Shell,
        }
    }

    /// Argument vector; a shell command is a single element
    pub fn argv(&self) -> &[String] {
        match self {
            Self::Exec { argv } => argv,
            Self::Shell { script } => std::slice::from_ref(script),
        }
    }

    /// Command text as it is measured against the size budget
    pub fn rendered(&self) -> String {
        match self {
            Self::Exec { argv } => argv.join(" "),
            Self::Shell { script } => script.clone(),
        }
    }

    /// Byte length of [`rendered`](Self::rendered), without allocating
    pub fn rendered_len(&self) -> usize {
        match self {
            Self::Exec { argv } => {
                argv.iter().map(String::len).sum::<usize>() + argv.len().saturating_sub(1)
            }
            Self::Shell { script } => script.len(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered())
    }
}

/// A parsed invocation template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    form: CommandForm,
}

impl Template {
    /// Parse template text; malformed tokens are rejected here, once
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let segments = token::parse_segments(source)?;
        let form = detect_form(source, &segments);
        Ok(Self {
            source: source.to_owned(),
            segments,
            form,
        })
    }

    /// Read and parse a template file
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        // invoke files usually end with a newline that is not part of the command
        Self::parse(text.trim_end_matches(['\n', '\r'])).map_err(|source| LoadError::Syntax {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn form(&self) -> CommandForm {
        self.form
    }

    /// Tokens in template order
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(t) => Some(t),
            Segment::Literal(_) => None,
        })
    }

    /// Evaluate against `symbols`
    ///
    /// Unknown names contribute nothing. A plain `<name>` reference to a list
    /// only yields its first element and logs a warning; use `<name% >` to
    /// pass every element.
    pub fn evaluate(&self, symbols: &SymbolTable) -> Command {
        self.render(symbols, true)
    }

    /// Evaluate without diagnostics; used for repeated trial evaluations
    pub(crate) fn render(&self, symbols: &SymbolTable, warn: bool) -> Command {
        match self.form {
            CommandForm::Exec => {
                let mut words = Words::default();
                for segment in &self.segments {
                    match segment {
                        Segment::Literal(text) => words.push_literal(text),
                        Segment::Token(token) => {
                            emit_token(token, symbols.get(&token.name), warn, &mut words);
                        }
                    }
                }
                Command::Exec {
                    argv: words.finish(),
                }
            }
            CommandForm::Shell => Command::Shell {
                script: self.text(symbols, warn, Quoting::Shell),
            },
        }
    }

    /// Plain text substitution, ignoring the command form
    ///
    /// Whitespace is kept exactly as written. Used for expanding
    /// configuration values that reference each other.
    pub fn substitute(&self, symbols: &SymbolTable) -> String {
        self.text(symbols, false, Quoting::Verbatim)
    }

    fn text(&self, symbols: &SymbolTable, warn: bool, quoting: Quoting) -> String {
        let mut text = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => text.push_str(literal),
                Segment::Token(token) => {
                    text.push_str(&token_text(token, symbols.get(&token.name), warn, quoting));
                }
            }
        }
        text
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors reading a template file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template {path}: {source}")]
    Syntax {
        path: String,
        #[source]
        source: TemplateError,
    },
}

fn detect_form(source: &str, segments: &[Segment]) -> CommandForm {
    let escaped_delimiter = source.contains("<<") || source.contains(">>");
    let has_metacharacter = segments.iter().any(|s| match s {
        Segment::Literal(text) => text.contains(SHELL_METACHARACTERS),
        Segment::Token(_) => false,
    });
    if escaped_delimiter || has_metacharacter {
        CommandForm::Shell
    } else {
        CommandForm::Exec
    }
}

/// How substituted values are written into text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    /// As they are
    Verbatim,
    /// Each value a single shell word
    Shell,
}

impl Quoting {
    fn apply(self, value: &str) -> Cow<'_, str> {
        match self {
            Self::Verbatim => Cow::Borrowed(value),
            // an empty value contributes nothing, like an absent one
            Self::Shell if value.is_empty() => Cow::Borrowed(value),
            Self::Shell => shell_quote(value),
        }
    }
}

/// Quote `value` as one shell word
///
/// NUL cannot appear on a command line, so it is dropped first.
fn shell_quote(value: &str) -> Cow<'_, str> {
    match shlex::try_quote(value) {
        Ok(quoted) => quoted,
        Err(_) => {
            let cleaned = value.replace('\0', "");
            let quoted = shlex::try_quote(&cleaned).map(Cow::into_owned);
            Cow::Owned(quoted.unwrap_or(cleaned))
        }
    }
}

/// Text a token contributes to a text command
///
/// Conditional operands are template text and never quoted.
fn token_text(token: &Token, value: Option<&Value>, warn: bool, quoting: Quoting) -> String {
    match &token.operator {
        Operator::IfTrue(text) => {
            if is_truthy(value) {
                text.clone()
            } else {
                String::new()
            }
        }
        Operator::IfFalse(text) => {
            if is_truthy(value) {
                String::new()
            } else {
                text.clone()
            }
        }
        Operator::Plain => match value {
            None => String::new(),
            Some(Value::Scalar(s)) => quoting.apply(s).into_owned(),
            Some(Value::List(items)) => quoting
                .apply(&first_of_list(token, items, warn))
                .into_owned(),
        },
        Operator::Join(sep) => match value {
            None => String::new(),
            Some(Value::Scalar(s)) => quoting.apply(s).into_owned(),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| quoting.apply(item))
                .collect::<Vec<_>>()
                .join(sep),
        },
    }
}

/// Add a token's contribution to an argument vector under construction
fn emit_token(token: &Token, value: Option<&Value>, warn: bool, words: &mut Words) {
    match (&token.operator, value) {
        (Operator::Join(sep), Some(Value::List(items))) if sep == " " => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    words.break_word();
                }
                words.push_value(item);
            }
        }
        (Operator::IfTrue(_) | Operator::IfFalse(_), _) => {
            words.push_literal(&token_text(token, value, warn, Quoting::Verbatim));
        }
        _ => words.push_value(&token_text(token, value, warn, Quoting::Verbatim)),
    }
}

fn first_of_list(token: &Token, items: &[String], warn: bool) -> String {
    if warn && items.len() > 1 {
        log::warn!(
            "{} references a list of {} values; only the first is used (write <{}% > to pass all of them)",
            token,
            items.len(),
            token.name
        );
    }
    items.first().cloned().unwrap_or_default()
}

/// Argument vector builder; whitespace in literal text separates arguments
#[derive(Default)]
struct Words {
    done: Vec<String>,
    current: Option<String>,
}

impl Words {
    fn push_literal(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() {
                self.break_word();
            } else {
                self.current.get_or_insert_with(String::new).push(c);
            }
        }
    }

    /// Append a substituted value verbatim, whitespace included
    fn push_value(&mut self, value: &str) {
        if !value.is_empty() {
            self.current.get_or_insert_with(String::new).push_str(value);
        }
    }

    fn break_word(&mut self) {
        if let Some(word) = self.current.take() {
            self.done.push(word);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.break_word();
        self.done
    }
}
