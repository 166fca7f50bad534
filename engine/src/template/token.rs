//! Parameter token grammar
//!
//! ```text
//! <name>          plain substitution
//! <name%text>     list join, `text` is the separator
//! <name?+text>    `text` when the value is true-like
//! <name?-text>    `text` when the value is false-like or absent
//! <<  >>          literal `<` and `>`
//! ```
//!
//! Names start with an ASCII letter followed by letters, digits, `-` or `_`.

use std::fmt;
use thiserror::Error;

use crate::types::Value;

/// Template syntax errors, reported with the byte offset they occur at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unterminated parameter token starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Unmatched '>' at byte {offset} (write '>>' for a literal '>')")]
    UnmatchedClose { offset: usize },

    #[error("Invalid parameter name at byte {offset}")]
    InvalidName { offset: usize },

    #[error("Unknown operator '{found}' after '{name}' at byte {offset}")]
    UnknownOperator {
        name: String,
        found: char,
        offset: usize,
    },

    #[error("Empty operand for '{name}' at byte {offset}")]
    EmptyOperand { name: String, offset: usize },
}

/// What a token does with its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `<name>`
    Plain,
    /// `<name%sep>`
    Join(String),
    /// `<name?+text>`
    IfTrue(String),
    /// `<name?-text>`
    IfFalse(String),
}

/// A parameter reference embedded in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub name: String,
    pub operator: Operator,
}

impl Token {
    /// Separator a list reference is joined with (single space when plain)
    pub fn separator(&self) -> &str {
        match &self.operator {
            Operator::Join(sep) => sep,
            _ => " ",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operator {
            Operator::Plain => write!(f, "<{}>", self.name),
            Operator::Join(sep) => write!(f, "<{}%{}>", self.name, sep),
            Operator::IfTrue(text) => write!(f, "<{}?+{}>", self.name, text),
            Operator::IfFalse(text) => write!(f, "<{}?-{}>", self.name, text),
        }
    }
}

/// Piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Token(Token),
}

/// Truth test for conditional operators
///
/// Absent, empty, `"false"` and any number equal to zero are false-like.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None => false,
        Some(Value::List(items)) => !items.is_empty(),
        Some(Value::Scalar(s)) => {
            if s.is_empty() || s == "false" {
                return false;
            }
            !matches!(s.trim().parse::<f64>(), Ok(n) if n == 0.0)
        }
    }
}

/// Split template text into literal and token segments
pub fn parse_segments(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '<' => {
                if chars.next_if(|&(_, n)| n == '<').is_some() {
                    literal.push('<');
                    continue;
                }
                let (token, end) = parse_token(source, offset)?;
                // skip the body we just consumed
                while chars.next_if(|&(i, _)| i < end).is_some() {}
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Token(token));
            }
            '>' => {
                if chars.next_if(|&(_, n)| n == '>').is_some() {
                    literal.push('>');
                } else {
                    return Err(TemplateError::UnmatchedClose { offset });
                }
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Parse the token opening at `start`; returns it and the offset past its `>`
fn parse_token(source: &str, start: usize) -> Result<(Token, usize), TemplateError> {
    let body_start = start + 1;
    let close = source[body_start..]
        .find('>')
        .map(|i| body_start + i)
        .ok_or(TemplateError::Unterminated { offset: start })?;
    let body = &source[body_start..close];

    let name_len = body
        .char_indices()
        .find(|&(i, c)| {
            if i == 0 {
                !c.is_ascii_alphabetic()
            } else {
                !(c.is_ascii_alphanumeric() || c == '-' || c == '_')
            }
        })
        .map_or(body.len(), |(i, _)| i);

    if name_len == 0 {
        return Err(TemplateError::InvalidName { offset: body_start });
    }
    let name = body[..name_len].to_owned();
    let rest = &body[name_len..];
    let op_offset = body_start + name_len;

    let operator = if rest.is_empty() {
        Operator::Plain
    } else if let Some(sep) = rest.strip_prefix('%') {
        Operator::Join(non_empty(sep, &name, op_offset)?)
    } else if let Some(text) = rest.strip_prefix("?+") {
        Operator::IfTrue(non_empty(text, &name, op_offset)?)
    } else if let Some(text) = rest.strip_prefix("?-") {
        Operator::IfFalse(non_empty(text, &name, op_offset)?)
    } else {
        let found = rest
            .chars()
            .nth(usize::from(rest.starts_with('?')))
            .unwrap_or('?');
        return Err(TemplateError::UnknownOperator {
            name,
            found,
            offset: op_offset,
        });
    };

    Ok((Token { name, operator }, close + 1))
}

fn non_empty(operand: &str, name: &str, offset: usize) -> Result<String, TemplateError> {
    if operand.is_empty() {
        Err(TemplateError::EmptyOperand {
            name: name.to_owned(),
            offset,
        })
    } else {
        Ok(operand.to_owned())
    }
}
