//! Token streams for scheme specification strings.
//!
//! A scheme entry such as `Gauss limitedLinear 1 corrected` is split into
//! words and numbers. Scheme constructors consume the leading tokens they
//! understand and hand the rest of the stream to their sub-schemes.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Number(f64),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{w}"),
            Token::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Zero-based token index at which the error was detected.
    pub position: usize,
    pub message: String,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "token {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    source: String,
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn parse_str(raw: &str) -> Result<Self, ParseError> {
        let body = raw.trim().trim_end_matches(';');
        let mut tokens = Vec::new();

        for (i, item) in body.split_whitespace().enumerate() {
            if item.starts_with("//") {
                break;
            }
            tokens.push(classify(item, i)?);
        }

        Ok(Self {
            source: body.trim().to_string(),
            tokens,
            pos: 0,
        })
    }

    /// The specification text this stream was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Word(w)) => Some(w.as_str()),
            _ => None,
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn next_word(&mut self) -> Result<String, ParseError> {
        let at = self.pos;
        match self.next_token() {
            Some(Token::Word(w)) => Ok(w),
            Some(Token::Number(n)) => Err(ParseError {
                position: at,
                message: format!("expected a word in '{}', found number {n}", self.source),
            }),
            None => Err(self.end_of_stream("a word")),
        }
    }

    pub fn next_scalar(&mut self) -> Result<f64, ParseError> {
        let at = self.pos;
        match self.next_token() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Word(w)) => Err(ParseError {
                position: at,
                message: format!("expected a number in '{}', found '{w}'", self.source),
            }),
            None => Err(self.end_of_stream("a number")),
        }
    }

    /// Consumes a number if one is next, otherwise leaves the stream alone.
    pub fn next_scalar_or(&mut self, default: f64) -> f64 {
        match self.peek() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.pos += 1;
                n
            }
            _ => default,
        }
    }

    pub fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ParseError {
                position: self.pos,
                message: format!("unexpected trailing token '{token}' in '{}'", self.source),
            }),
        }
    }

    /// Unconsumed tokens joined back into text.
    pub fn remainder(&self) -> String {
        self.tokens[self.pos.min(self.tokens.len())..]
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn end_of_stream(&self, wanted: &str) -> ParseError {
        ParseError {
            position: self.pos,
            message: format!("expected {wanted} but '{}' ended", self.source),
        }
    }
}

impl FromStr for TokenStream {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

fn classify(item: &str, position: usize) -> Result<Token, ParseError> {
    let first = item.chars().next().unwrap_or(' ');
    if first.is_ascii_digit() || first == '-' || first == '+' || first == '.' {
        return item
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError {
                position,
                message: format!("malformed number '{item}'"),
            });
    }
    Ok(Token::Word(item.to_string()))
}

/// Builds the dictionary key of a discretised term, e.g.
/// `term_key("laplacian", &["DT", "T"])` gives `laplacian(DT,T)`.
pub fn term_key(operator: &str, args: &[&str]) -> String {
    format!("{operator}({})", args.join(","))
}
