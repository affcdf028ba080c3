//! Tokenizer for the text notation.

use std::fmt;

use logos::Logos;

use crate::error::ParseError;
use crate::model::is_symbol_char;

/// Failures reported by token callbacks. Positions are added by [`Lexer`].
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum LexError {
    #[default]
    Unexpected,
    InvalidNumber,
    InvalidString(String),
    UnterminatedString,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r";[^\n]*")]
pub(crate) enum Tok {
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("+")]
    Plus,
    #[token("=")]
    Equals,
    #[token("@")]
    At,
    #[token("\"", string)]
    Str(String),
    /// A bare word or a `$"..."` name.
    #[token("$\"", quoted_name)]
    #[regex(r"[A-Za-z_/][A-Za-z0-9_/.\-]*", |lex| lex.slice().to_string())]
    Symbol(String),
    /// `#N`.
    #[regex(r"#[0-9]+", |lex| lex.slice()[1..].parse::<u64>().map_err(|_| LexError::InvalidNumber))]
    Local(u64),
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().map_err(|_| LexError::InvalidNumber))]
    Int(i64),
    #[regex(r"-?[0-9]+(\.[0-9]*([eE][+-]?[0-9]+)?|[eE][+-]?[0-9]+)", float)]
    #[token("nan", |_| f32::NAN)]
    #[token("inf", |_| f32::INFINITY)]
    #[token("-inf", |_| f32::NEG_INFINITY)]
    Float(f32),
    #[token("nil")]
    Nil,
    #[token("true")]
    True,
    #[token("false")]
    False,
    Eof,
}

fn float(lex: &mut logos::Lexer<'_, Tok>) -> Result<f32, LexError> {
    lex.slice().parse().map_err(|_| LexError::InvalidNumber)
}

/// Extends the token past the closing quote of a string literal.
fn close_quote(lex: &mut logos::Lexer<'_, Tok>) -> Result<(), LexError> {
    let rest = lex.remainder();
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                lex.bump(i + 1);
                return Ok(());
            }
            _ => {}
        }
    }
    lex.bump(rest.len());
    Err(LexError::UnterminatedString)
}

/// Strings use JSON escaping.
fn unescape(literal: &str) -> Result<String, LexError> {
    serde_json::from_str(literal).map_err(|e| LexError::InvalidString(e.to_string()))
}

fn string(lex: &mut logos::Lexer<'_, Tok>) -> Result<String, LexError> {
    close_quote(lex)?;
    unescape(lex.slice())
}

fn quoted_name(lex: &mut logos::Lexer<'_, Tok>) -> Result<String, LexError> {
    close_quote(lex)?;
    unescape(&lex.slice()[1..])
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::LBrace => f.write_str("'{'"),
            Tok::RBrace => f.write_str("'}'"),
            Tok::LBracket => f.write_str("'['"),
            Tok::RBracket => f.write_str("']'"),
            Tok::Colon => f.write_str("':'"),
            Tok::Comma => f.write_str("','"),
            Tok::Plus => f.write_str("'+'"),
            Tok::Equals => f.write_str("'='"),
            Tok::At => f.write_str("'@'"),
            Tok::Str(s) => write!(f, "string {s:?}"),
            Tok::Symbol(s) => write!(f, "symbol {s}"),
            Tok::Local(n) => write!(f, "#{n}"),
            Tok::Int(i) => write!(f, "integer {i}"),
            Tok::Float(x) => write!(f, "float {x:?}"),
            Tok::Nil => f.write_str("nil"),
            Tok::True => f.write_str("true"),
            Tok::False => f.write_str("false"),
            Tok::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with the position of its first character (1-based).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) tok: Tok,
    pub(crate) line: usize,
    pub(crate) column: usize,
}

impl Token {
    pub(crate) fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.tok {
            Tok::Eof => ParseError::UnexpectedEof { expected },
            _ => ParseError::UnexpectedToken {
                found: self.tok.to_string(),
                expected,
                line: self.line,
                column: self.column,
            },
        }
    }
}

/// Wraps the generated lexer with line and column tracking.
pub(crate) struct Lexer<'a> {
    inner: logos::Lexer<'a, Tok>,
    /// Byte offset up to which `line` and `column` have been computed.
    scanned: usize,
    line: usize,
    column: usize,
}

impl fmt::Debug for Lexer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexer")
            .field("span", &self.inner.span())
            .field("line", &self.line)
            .field("column", &self.column)
            .finish()
    }
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            inner: Tok::lexer(input),
            scanned: 0,
            line: 1,
            column: 1,
        }
    }

    /// Advances the position counters to byte `offset`. Offsets never go back.
    fn position(&mut self, offset: usize) -> (usize, usize) {
        let skipped = &self.inner.source()[self.scanned..offset];
        match skipped.rfind('\n') {
            Some(last) => {
                self.line += skipped.matches('\n').count();
                self.column = skipped[last + 1..].chars().count() + 1;
            }
            None => self.column += skipped.chars().count(),
        }
        self.scanned = offset;
        (self.line, self.column)
    }

    /// Returns true if the next character, without skipping whitespace, is `c`.
    pub(crate) fn at(&self, c: char) -> bool {
        self.inner.remainder().starts_with(c)
    }

    pub(crate) fn next_token(&mut self) -> Result<Token, ParseError> {
        let Some(result) = self.inner.next() else {
            let (line, column) = self.position(self.inner.source().len());
            return Ok(Token {
                tok: Tok::Eof,
                line,
                column,
            });
        };
        let (line, column) = self.position(self.inner.span().start);
        let tok = match result {
            Ok(tok) => tok,
            Err(err) => return Err(self.error(err, line, column)),
        };

        // Trailing symbol characters make the whole word an invalid number.
        let rest = self.inner.remainder();
        if matches!(tok, Tok::Int(_) | Tok::Float(_)) && rest.starts_with(is_symbol_char) {
            let run = rest.find(|c: char| !is_symbol_char(c)).unwrap_or(rest.len());
            self.inner.bump(run);
            return Err(self.error(LexError::InvalidNumber, line, column));
        }
        Ok(Token { tok, line, column })
    }

    fn error(&self, err: LexError, line: usize, column: usize) -> ParseError {
        let slice = self.inner.slice();
        match err {
            LexError::Unexpected => ParseError::UnexpectedToken {
                found: slice.chars().next().map(|c| format!("{c:?}")).unwrap_or_default(),
                expected: "value",
                line,
                column,
            },
            LexError::InvalidNumber => ParseError::InvalidNumber {
                text: slice.to_string(),
                line,
                column,
            },
            LexError::InvalidString(message) => ParseError::InvalidString {
                line,
                column,
                message,
            },
            LexError::UnterminatedString => ParseError::UnterminatedString { line, column },
        }
    }
}
