//! Run conditions over matrix axis bindings
//!
//! Conditions are small boolean expressions in the style of CI `if:` keys:
//!
//! ```text
//! matrix.rust == 'nightly'
//! rust != stable && !(os == windows)
//! experimental
//! ```
//!
//! The left-hand side of a comparison and any operand prefixed with
//! `matrix.` name an axis. Quoted strings and bare words on the right-hand
//! side are literals. A bare axis name on its own is truthy when its value is
//! `true`, `yes` or `1`.

use crate::core::{error::DefinitionError, job::AxisBinding};
use std::fmt;

/// A parsed run condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Literal(bool),
    Truthy(String),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Axis(String),
    Value(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
}

impl Condition {
    /// Parse a condition expression
    pub fn parse(source: &str) -> Result<Self, DefinitionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(DefinitionError::invalid("condition is empty"));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            source,
        };
        let condition = parser.parse_or()?;

        if let Some(token) = parser.peek() {
            return Err(DefinitionError::invalid(format!(
                "unexpected {} in condition '{}'",
                token, source
            )));
        }

        Ok(condition)
    }

    /// Axis names this condition reads
    pub fn referenced_axes(&self) -> Vec<&str> {
        let mut axes = Vec::new();
        self.collect_axes(&mut axes);
        axes
    }

    fn collect_axes<'a>(&'a self, axes: &mut Vec<&'a str>) {
        match self {
            Condition::Literal(_) => {}
            Condition::Truthy(axis) => axes.push(axis),
            Condition::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Axis(axis) = operand {
                        axes.push(axis);
                    }
                }
            }
            Condition::Not(inner) => inner.collect_axes(axes),
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.collect_axes(axes);
                b.collect_axes(axes);
            }
        }
    }

    /// Evaluate against a binding.
    ///
    /// Axes are checked against the template when the pipeline is loaded, so
    /// a missing axis reads as the empty string here.
    pub fn evaluate(&self, binding: &AxisBinding) -> bool {
        match self {
            Condition::Literal(value) => *value,
            Condition::Truthy(axis) => binding
                .get(axis)
                .map(|value| matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1"))
                .unwrap_or(false),
            Condition::Compare { left, op, right } => {
                let equal = left.resolve(binding) == right.resolve(binding);
                match op {
                    CompareOp::Eq => equal,
                    CompareOp::NotEq => !equal,
                }
            }
            Condition::Not(inner) => !inner.evaluate(binding),
            Condition::And(a, b) => a.evaluate(binding) && b.evaluate(binding),
            Condition::Or(a, b) => a.evaluate(binding) || b.evaluate(binding),
        }
    }
}

/// Evaluate an optional condition; an absent condition always holds
pub fn should_run(condition: Option<&Condition>, binding: &AxisBinding) -> bool {
    condition.map_or(true, |c| c.evaluate(binding))
}

impl Operand {
    fn resolve<'a>(&'a self, binding: &'a AxisBinding) -> &'a str {
        match self {
            Operand::Axis(axis) => binding.get(axis).unwrap_or(""),
            Operand::Value(value) => value,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(value) => write!(f, "{}", value),
            Condition::Truthy(axis) => write!(f, "matrix.{}", axis),
            Condition::Compare { left, op, right } => {
                let op = match op {
                    CompareOp::Eq => "==",
                    CompareOp::NotEq => "!=",
                };
                write!(f, "{} {} {}", left, op, right)
            }
            Condition::Not(inner) => write!(f, "!({})", inner),
            Condition::And(a, b) => write!(f, "({} && {})", a, b),
            Condition::Or(a, b) => write!(f, "({} || {})", a, b),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Axis(axis) => write!(f, "matrix.{}", axis),
            Operand::Value(value) => write!(f, "'{}'", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Eq,
    NotEq,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{}'", w),
            Token::Quoted(q) => write!(f, "\"{}\"", q),
            Token::Eq => f.write_str("'=='"),
            Token::NotEq => f.write_str("'!='"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '/')
}

fn tokenize(source: &str) -> Result<Vec<Token>, DefinitionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '=' | '!' | '&' | '|' => {
                let next = chars.peek().map(|(_, n)| *n);
                let token = match (c, next) {
                    ('=', Some('=')) => Token::Eq,
                    ('!', Some('=')) => Token::NotEq,
                    ('&', Some('&')) => Token::And,
                    ('|', Some('|')) => Token::Or,
                    ('!', _) => {
                        tokens.push(Token::Not);
                        continue;
                    }
                    _ => {
                        return Err(DefinitionError::invalid(format!(
                            "unexpected '{}' at offset {} in condition '{}'",
                            c, offset, source
                        )))
                    }
                };
                chars.next();
                tokens.push(token);
            }
            '\'' | '"' => {
                let mut value = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == c {
                        closed = true;
                        break;
                    }
                    value.push(n);
                }
                if !closed {
                    return Err(DefinitionError::invalid(format!(
                        "unterminated string in condition '{}'",
                        source
                    )));
                }
                tokens.push(Token::Quoted(value));
            }
            c if is_word_char(c) => {
                let mut word = c.to_string();
                while let Some((_, n)) = chars.peek() {
                    if !is_word_char(*n) {
                        break;
                    }
                    word.push(*n);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            _ => {
                return Err(DefinitionError::invalid(format!(
                    "unexpected '{}' at offset {} in condition '{}'",
                    c, offset, source
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: &str) -> DefinitionError {
        DefinitionError::invalid(format!("{} in condition '{}'", message, self.source))
    }

    fn parse_or(&mut self) -> Result<Condition, DefinitionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, DefinitionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition, DefinitionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition, DefinitionError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(Token::Word(word)) if self.peek_comparison().is_none() => match word.as_str() {
                "true" => Ok(Condition::Literal(true)),
                "false" => Ok(Condition::Literal(false)),
                _ => Ok(Condition::Truthy(axis_name(&word).to_string())),
            },
            Some(Token::Word(word)) => {
                let left = Operand::Axis(axis_name(&word).to_string());
                self.parse_comparison(left)
            }
            Some(Token::Quoted(value)) => self.parse_comparison(Operand::Value(value)),
            Some(token) => Err(self.error(&format!("unexpected {}", token))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn peek_comparison(&self) -> Option<CompareOp> {
        match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::NotEq) => Some(CompareOp::NotEq),
            _ => None,
        }
    }

    fn parse_comparison(&mut self, left: Operand) -> Result<Condition, DefinitionError> {
        let op = self
            .peek_comparison()
            .ok_or_else(|| self.error("expected '==' or '!='"))?;
        self.pos += 1;

        let right = match self.next() {
            Some(Token::Word(word)) => match word.strip_prefix("matrix.") {
                Some(axis) => Operand::Axis(axis.to_string()),
                None => Operand::Value(word),
            },
            Some(Token::Quoted(value)) => Operand::Value(value),
            _ => return Err(self.error("expected a value after comparison")),
        };

        Ok(Condition::Compare { left, op, right })
    }
}

fn axis_name(word: &str) -> &str {
    word.strip_prefix("matrix.").unwrap_or(word)
}
