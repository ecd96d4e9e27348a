//! Query string parser.
//!
//! Grammar:
//!
//! ```text
//! query   := or_expr
//! or_expr := and_expr ( "OR" and_expr )*
//! and_expr:= unary ( "AND"? unary )*
//! unary   := ( "NOT" | "-" ) unary | primary
//! primary := "(" or_expr ")" | '"' phrase '"' | word
//! ```
//!
//! A word is a term, a `field:term`, a wildcard pattern (`repo*`), a fuzzy
//! term (`word~N`) or a metadata filter (`size>10MB`, `modified:2024-01-31`,
//! `ext:pdf,docx`). Operators are case-sensitive.

use std::iter::Peekable;
use std::str::CharIndices;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::document::Field;
use crate::error::{FiledexError, Result};
use crate::query::ast::{DateRange, FieldFilter, QueryNode, SizeRange};

/// Edit distance of `word~` when none is given.
pub const DEFAULT_FUZZY_DISTANCE: u32 = 2;

/// Parses query strings into [`QueryNode`] trees.
#[derive(Debug, Clone)]
pub struct QueryParser {
    fuzzy_distance: u32,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryParser {
    pub fn new() -> Self {
        QueryParser {
            fuzzy_distance: DEFAULT_FUZZY_DISTANCE,
        }
    }

    /// Set the distance used by `word~` without an explicit number.
    pub fn with_fuzzy_distance(mut self, distance: u32) -> Self {
        self.fuzzy_distance = distance;
        self
    }

    pub fn fuzzy_distance(&self) -> u32 {
        self.fuzzy_distance
    }

    /// Parse a query string. Returns `None` for a blank query.
    ///
    /// Errors carry the byte offset of the offending input.
    pub fn parse(&self, input: &str) -> Result<Option<QueryNode>> {
        let tokens = Lexer::new(input).tokenize()?;
        if tokens.is_empty() {
            return Ok(None);
        }

        let mut parser = ExpressionParser {
            tokens,
            index: 0,
            end: input.len(),
            fuzzy_distance: self.fuzzy_distance,
        };
        let node = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(FiledexError::query_syntax(
                "unexpected ')'",
                extra.position,
            ));
        }
        Ok(Some(node))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Quoted(String),
    Word(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Spanned {
    token: Token,
    position: usize,
    end: usize,
}

struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        while let Some(&(position, ch)) = self.chars.peek() {
            match ch {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '(' | ')' => {
                    self.chars.next();
                    tokens.push(Spanned {
                        token: if ch == '(' { Token::LParen } else { Token::RParen },
                        position,
                        end: position + 1,
                    });
                }
                '"' => tokens.push(self.quoted(position)?),
                _ => tokens.push(self.word(position)),
            }
        }
        Ok(tokens)
    }

    fn quoted(&mut self, start: usize) -> Result<Spanned> {
        self.chars.next();
        for (position, ch) in self.chars.by_ref() {
            if ch == '"' {
                return Ok(Spanned {
                    token: Token::Quoted(self.input[start + 1..position].to_string()),
                    position: start,
                    end: position + 1,
                });
            }
        }
        Err(FiledexError::query_syntax("unterminated phrase", start))
    }

    fn word(&mut self, start: usize) -> Spanned {
        let mut end = self.input.len();
        while let Some(&(position, ch)) = self.chars.peek() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                end = position;
                break;
            }
            self.chars.next();
        }
        Spanned {
            token: Token::Word(self.input[start..end].to_string()),
            position: start,
            end,
        }
    }
}

struct ExpressionParser {
    tokens: Vec<Spanned>,
    index: usize,
    end: usize,
    fuzzy_distance: u32,
}

impl ExpressionParser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.index)
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Some(Spanned {
                token: Token::Word(word),
                ..
            }) => Some(word),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut nodes = vec![self.parse_and()?];
        while self.peek_word() == Some("OR") {
            self.advance();
            nodes.push(self.parse_and()?);
        }
        Ok(QueryNode::or(nodes))
    }

    fn parse_and(&mut self) -> Result<QueryNode> {
        let mut nodes = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                None
                | Some(Spanned {
                    token: Token::RParen,
                    ..
                }) => break,
                Some(_) => match self.peek_word() {
                    Some("OR") => break,
                    Some("AND") => {
                        self.advance();
                        nodes.push(self.parse_unary()?);
                    }
                    _ => nodes.push(self.parse_unary()?),
                },
            }
        }
        Ok(QueryNode::and(nodes))
    }

    fn parse_unary(&mut self) -> Result<QueryNode> {
        if matches!(self.peek_word(), Some("NOT") | Some("-")) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        let negated = match self.peek() {
            Some(Spanned {
                token: Token::Word(word),
                position,
                ..
            }) if word.len() > 1 && word.starts_with('-') => {
                Some((word[1..].to_string(), position + 1))
            }
            _ => None,
        };
        if let Some((word, position)) = negated {
            self.advance();
            let inner = self.parse_word(&word, position)?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode> {
        let Some(spanned) = self.advance() else {
            return Err(FiledexError::query_syntax(
                "expected a term at end of query",
                self.end,
            ));
        };
        let position = spanned.position;
        match spanned.token {
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(FiledexError::query_syntax("unclosed '('", position)),
                }
            }
            Token::RParen => Err(FiledexError::query_syntax("unexpected ')'", position)),
            Token::Quoted(text) => phrase(text, None, position),
            Token::Word(word) => {
                if word == "AND" || word == "OR" {
                    return Err(FiledexError::query_syntax(
                        format!("expected a term before {word}"),
                        position,
                    ));
                }
                // `name:"two words"` lexes as a word ending in ':' directly
                // followed by a phrase.
                let field = word.strip_suffix(':').and_then(text_field);
                if let Some(field) = field {
                    let adjacent = matches!(
                        self.peek(),
                        Some(Spanned { token: Token::Quoted(_), position: next, .. })
                            if *next == spanned.end
                    );
                    if adjacent {
                        if let Some(Spanned {
                            token: Token::Quoted(text),
                            position,
                            ..
                        }) = self.advance()
                        {
                            return phrase(text, Some(field), position);
                        }
                    }
                }
                self.parse_word(&word, position)
            }
        }
    }

    fn parse_word(&self, word: &str, position: usize) -> Result<QueryNode> {
        if word.is_empty() {
            return Err(FiledexError::query_syntax("expected a term", position));
        }
        if let Some(filter) = parse_filter(word, position)? {
            return Ok(QueryNode::Filter(filter));
        }

        let (field, body, body_position) = match word.split_once(':') {
            Some((prefix, body)) => match text_field(prefix) {
                Some(field) => (Some(field), body, position + prefix.len() + 1),
                None => (None, word, position),
            },
            None => (None, word, position),
        };
        if body.is_empty() {
            return Err(FiledexError::query_syntax(
                format!("missing term after {word}"),
                body_position,
            ));
        }

        if let Some((term, distance)) = body.rsplit_once('~') {
            if term.is_empty() {
                return Err(FiledexError::query_syntax(
                    "missing term before '~'",
                    body_position,
                ));
            }
            let distance = if distance.is_empty() {
                self.fuzzy_distance
            } else {
                distance.parse::<u32>().map_err(|_| {
                    FiledexError::query_syntax(
                        format!("invalid fuzzy distance {distance:?}"),
                        body_position + term.len() + 1,
                    )
                })?
            };
            return Ok(QueryNode::Fuzzy {
                term: term.to_lowercase(),
                distance,
                field,
            });
        }

        if body.contains(['*', '?']) {
            return Ok(QueryNode::Wildcard {
                pattern: body.to_lowercase(),
                field,
            });
        }

        Ok(QueryNode::Term {
            text: body.to_string(),
            field,
        })
    }
}

fn phrase(text: String, field: Option<Field>, position: usize) -> Result<QueryNode> {
    if text.trim().is_empty() {
        return Err(FiledexError::query_syntax("empty phrase", position));
    }
    Ok(QueryNode::Phrase { text, field })
}

fn text_field(prefix: &str) -> Option<Field> {
    match prefix.to_ascii_lowercase().as_str() {
        "name" | "filename" => Some(Field::Filename),
        "content" => Some(Field::Content),
        _ => None,
    }
}

fn parse_filter(word: &str, position: usize) -> Result<Option<FieldFilter>> {
    let lower = word.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("size") {
        if rest.starts_with(['>', '<', ':']) {
            let value_position = position + "size".len();
            return parse_size_filter(rest, value_position)
                .map(|range| Some(FieldFilter::Size(range)));
        }
        return Ok(None);
    }

    let Some((name, value)) = word.split_once(':') else {
        return Ok(None);
    };
    let value_position = position + name.len() + 1;
    match name.to_ascii_lowercase().as_str() {
        "modified" => {
            parse_date_filter(value, value_position).map(|r| Some(FieldFilter::Modified(r)))
        }
        "created" => {
            parse_date_filter(value, value_position).map(|r| Some(FieldFilter::Created(r)))
        }
        "ext" | "extension" => {
            let extensions: Vec<String> = value
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
            if extensions.is_empty() {
                return Err(FiledexError::query_syntax("missing extension", value_position));
            }
            Ok(Some(FieldFilter::Extension(extensions)))
        }
        _ => Ok(None),
    }
}

/// `>N`, `>=N`, `<N`, `<=N`, `:N`, `:A..B` and `:>N` style forms.
fn parse_size_filter(spec: &str, position: usize) -> Result<SizeRange> {
    let (spec, position) = match spec.strip_prefix(':') {
        Some(rest) => (rest, position + 1),
        None => (spec, position),
    };

    if let Some(value) = spec.strip_prefix(">=") {
        return Ok(SizeRange {
            min: Some(parse_size(value, position + 2)?),
            max: None,
        });
    }
    if let Some(value) = spec.strip_prefix('>') {
        return Ok(SizeRange {
            min: Some(parse_size(value, position + 1)?.saturating_add(1)),
            max: None,
        });
    }
    if let Some(value) = spec.strip_prefix("<=") {
        return Ok(SizeRange {
            min: None,
            max: Some(parse_size(value, position + 2)?),
        });
    }
    if let Some(value) = spec.strip_prefix('<') {
        let bound = parse_size(value, position + 1)?;
        return Ok(match bound.checked_sub(1) {
            Some(max) => SizeRange {
                min: None,
                max: Some(max),
            },
            // Nothing is smaller than zero bytes.
            None => SizeRange {
                min: Some(1),
                max: Some(0),
            },
        });
    }
    if let Some((low, high)) = spec.split_once("..") {
        let min = if low.is_empty() {
            None
        } else {
            Some(parse_size(low, position)?)
        };
        let max = if high.is_empty() {
            None
        } else {
            Some(parse_size(high, position + low.len() + 2)?)
        };
        return Ok(SizeRange { min, max });
    }
    let exact = parse_size(spec, position)?;
    Ok(SizeRange {
        min: Some(exact),
        max: Some(exact),
    })
}

/// A byte count with an optional binary unit: `512`, `10KB`, `1.5mb`, `2G`.
pub fn parse_size(value: &str, position: usize) -> Result<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let invalid = || FiledexError::query_syntax(format!("invalid size {value:?}"), position);

    let number: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        _ => return Err(invalid()),
    };
    Ok((number * multiplier as f64).round() as u64)
}

/// `>D`, `>=D`, `<D`, `<=D`, `D` (that whole day) and `A..B` (inclusive days).
fn parse_date_filter(spec: &str, position: usize) -> Result<DateRange> {
    if let Some(value) = spec.strip_prefix(">=") {
        return Ok(DateRange {
            start: Some(day_start(parse_date(value, position + 2)?)),
            end: None,
        });
    }
    if let Some(value) = spec.strip_prefix('>') {
        return Ok(DateRange {
            start: Some(next_day_start(parse_date(value, position + 1)?, position)?),
            end: None,
        });
    }
    if let Some(value) = spec.strip_prefix("<=") {
        return Ok(DateRange {
            start: None,
            end: Some(next_day_start(parse_date(value, position + 2)?, position)?),
        });
    }
    if let Some(value) = spec.strip_prefix('<') {
        return Ok(DateRange {
            start: None,
            end: Some(day_start(parse_date(value, position + 1)?)),
        });
    }
    if let Some((from, to)) = spec.split_once("..") {
        let start = if from.is_empty() {
            None
        } else {
            Some(day_start(parse_date(from, position)?))
        };
        let end = if to.is_empty() {
            None
        } else {
            let to_position = position + from.len() + 2;
            Some(next_day_start(parse_date(to, to_position)?, to_position)?)
        };
        return Ok(DateRange { start, end });
    }
    let day = parse_date(spec, position)?;
    Ok(DateRange {
        start: Some(day_start(day)),
        end: Some(next_day_start(day, position)?),
    })
}

/// A `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str, position: usize) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        FiledexError::query_syntax(
            format!("invalid date {value:?}, expected YYYY-MM-DD"),
            position,
        )
    })
}

pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn next_day_start(day: NaiveDate, position: usize) -> Result<DateTime<Utc>> {
    day.succ_opt()
        .map(day_start)
        .ok_or_else(|| FiledexError::query_syntax("date out of range", position))
}
