//! Structured-text literals.
//!
//! Small parser for the textual values found in signal definitions:
//!
//! - scalars: `1`, `-2.5`, `"text"`
//! - lists: `{1, 2, 3}`, `{{0,0,1}, {4,2,1}}` (commas optional)
//! - tables: `{ Par1 = 1 Par2 = { 1 2 } }`
//!
//! `Samples` and `Operation` fields are matrices of unsigned integers and are
//! extracted with [`parse_matrix`].

use crate::error::{SignalError, SignalResult};

/// Parsed structured-text value.
#[derive(Debug, Clone, PartialEq)]
pub enum TextValue {
    /// Bare or quoted atom.
    Scalar(String),
    /// `{ v, v, ... }`
    List(Vec<TextValue>),
    /// `{ k = v ... }`, in declaration order.
    Table(Vec<(String, TextValue)>),
}

impl TextValue {
    /// All scalars in row-major order, `None` if a table is nested anywhere.
    pub fn flatten_scalars(&self) -> Option<Vec<&str>> {
        let mut out = Vec::new();
        self.collect_scalars(&mut out)?;
        Some(out)
    }

    fn collect_scalars<'a>(&'a self, out: &mut Vec<&'a str>) -> Option<()> {
        match self {
            Self::Scalar(s) => out.push(s.as_str()),
            Self::List(items) => {
                for item in items {
                    item.collect_scalars(out)?;
                }
            }
            Self::Table(_) => return None,
        }
        Some(())
    }

    /// Look up a key of a table value.
    pub fn get(&self, key: &str) -> Option<&TextValue> {
        match self {
            Self::Table(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    Equals,
    Atom(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '{' => {
                chars.next();
                tokens.push(Token::Open);
            }
            '}' => {
                chars.next();
                tokens.push(Token::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '"' => {
                chars.next();
                let mut atom = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => atom.push(ch),
                        None => return Err("unterminated string".to_string()),
                    }
                }
                tokens.push(Token::Atom(atom));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut atom = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '{' | '}' | ',' | '=' | '"') {
                        break;
                    }
                    atom.push(ch);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn value(&mut self) -> Result<TextValue, String> {
        match self.next() {
            Some(Token::Open) => self.compound(),
            Some(Token::Atom(s)) => Ok(TextValue::Scalar(s)),
            Some(other) => Err(format!("unexpected {other:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn compound(&mut self) -> Result<TextValue, String> {
        let is_table = matches!(
            (self.peek(0), self.peek(1)),
            (Some(Token::Atom(_)), Some(Token::Equals))
        );
        let mut items = Vec::new();
        let mut entries = Vec::new();
        loop {
            while self.peek(0) == Some(&Token::Comma) {
                self.pos += 1;
            }
            match self.peek(0) {
                Some(Token::Close) => {
                    self.pos += 1;
                    break;
                }
                None => return Err("missing '}'".to_string()),
                _ => {}
            }
            if is_table {
                let key = match self.next() {
                    Some(Token::Atom(k)) => k,
                    other => return Err(format!("expected a key, found {other:?}")),
                };
                if self.next() != Some(Token::Equals) {
                    return Err(format!("expected '=' after {key}"));
                }
                entries.push((key, self.value()?));
            } else {
                items.push(self.value()?);
            }
        }
        Ok(if is_table {
            TextValue::Table(entries)
        } else {
            TextValue::List(items)
        })
    }
}

/// Parse one structured-text value.
pub fn parse(input: &str) -> SignalResult<TextValue> {
    parse_value(input).map_err(|reason| SignalError::Parse {
        input: input.to_string(),
        reason,
    })
}

fn parse_value(input: &str) -> Result<TextValue, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty input".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.value()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("trailing input after position {}", parser.pos));
    }
    Ok(value)
}

/// Parse an `N x COLS` matrix of unsigned integers.
///
/// `{{a,b},{c,d}}` yields two rows; a flat `{a,b}` is a single row.
/// The error is a human-readable reason.
pub fn parse_matrix<const COLS: usize>(input: &str) -> Result<Vec<[u32; COLS]>, String> {
    let value = parse_value(input)?;
    let rows: Vec<&TextValue> = match &value {
        TextValue::List(items) if items.iter().all(|i| matches!(i, TextValue::Scalar(_))) => {
            vec![&value]
        }
        TextValue::List(items) => items.iter().collect(),
        _ => return Err("not a matrix".to_string()),
    };
    if rows.is_empty() {
        return Err("the matrix has no rows".to_string());
    }
    let mut out = Vec::with_capacity(rows.len());
    for (r, row) in rows.iter().enumerate() {
        let cells = match row {
            TextValue::List(cells) => cells,
            _ => return Err(format!("row {r} is not a list")),
        };
        if cells.len() != COLS {
            return Err(format!("row {r} has {} columns, expected {COLS}", cells.len()));
        }
        let mut parsed = [0u32; COLS];
        for (c, cell) in cells.iter().enumerate() {
            parsed[c] = match cell {
                TextValue::Scalar(s) => s
                    .parse::<u32>()
                    .map_err(|e| format!("cell ({r},{c}) {s:?}: {e}"))?,
                _ => return Err(format!("cell ({r},{c}) is not a number")),
            };
        }
        out.push(parsed);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar() {
        assert_eq!(parse("42").unwrap(), TextValue::Scalar("42".into()));
        assert_eq!(parse("\"a b\"").unwrap(), TextValue::Scalar("a b".into()));
    }

    #[test]
    fn parses_lists_with_and_without_commas() {
        let a = parse("{1, 2, 3}").unwrap();
        let b = parse("{ 1 2 3 }").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.flatten_scalars().unwrap(), vec!["1", "2", "3"]);
    }

    #[test]
    fn parses_tables() {
        let v = parse("{ Par1 = 1 Par2 = { 3, 4 } }").unwrap();
        assert_eq!(v.get("Par1"), Some(&TextValue::Scalar("1".into())));
        assert_eq!(
            v.get("Par2").unwrap().flatten_scalars().unwrap(),
            vec!["3", "4"]
        );
        assert!(v.flatten_scalars().is_none());
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(parse("{1, 2").is_err());
        assert!(parse("1 2").is_err());
        assert!(parse("").is_err());
        assert!(parse("}").is_err());
    }

    #[test]
    fn matrix_of_rows() {
        let m = parse_matrix::<3>("{{0,0,1},{4,2,8}}").unwrap();
        assert_eq!(m, vec![[0, 0, 1], [4, 2, 8]]);
    }

    #[test]
    fn flat_vector_is_one_row() {
        let m = parse_matrix::<2>("{2,5}").unwrap();
        assert_eq!(m, vec![[2, 5]]);
    }

    #[test]
    fn matrix_column_count_enforced() {
        assert!(parse_matrix::<2>("{{1,2,3}}").is_err());
        assert!(parse_matrix::<3>("{{1,2}}").is_err());
        assert!(parse_matrix::<2>("{{-1,2}}").is_err());
        assert!(parse_matrix::<2>("{}").is_err());
        assert!(parse_matrix::<2>("7").is_err());
    }
}
