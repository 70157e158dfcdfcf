//! Lexical analyzer for Dataview queries.
//!
//! Token-matching order mirrors the reference lexer this crate replaces:
//! comments, then strings, then numbers, then operators, then identifiers
//! (which also swallow dotted field paths and `#tag` literals), then
//! punctuation. Operators are matched before identifiers so that `!=`,
//! `<=`, `>=` are never mistaken for the start of a bare word, and
//! two-character operators are tried before their single-character
//! prefixes.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Table,
    List,
    Task,
    From,
    Where,
    Sort,
    Limit,
    And,
    Or,
    Not,
    As,
    Asc,
    Desc,
    Contains,
    Has,
    Tag,
    Is,
    Null,
    In,

    String(String),
    Number(f64),
    Bool(bool),
    Identifier(String),
    /// A dotted reference such as `file.folder` or `project.status`.
    FieldPath(Vec<String>),
    /// A `#tag` literal.
    HashTag(String),

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Comma,
    LParen,
    RParen,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word.to_ascii_uppercase().as_str() {
        "TABLE" => TokenKind::Table,
        "LIST" => TokenKind::List,
        "TASK" => TokenKind::Task,
        "FROM" => TokenKind::From,
        "WHERE" => TokenKind::Where,
        "SORT" => TokenKind::Sort,
        "LIMIT" => TokenKind::Limit,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "AS" => TokenKind::As,
        "ASC" => TokenKind::Asc,
        "DESC" => TokenKind::Desc,
        "CONTAINS" => TokenKind::Contains,
        "HAS" => TokenKind::Has,
        "TAG" => TokenKind::Tag,
        "IS" => TokenKind::Is,
        "IN" => TokenKind::In,
        "TRUE" => TokenKind::Bool(true),
        "FALSE" => TokenKind::Bool(false),
        "NULL" => TokenKind::Null,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }
            let (line, column) = (self.line, self.column);
            let kind = self.next_token()?;
            tokens.push(Token { kind, line, column });
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n')) {
                self.advance();
            }
            if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'/') {
                while self.peek().is_some() && self.peek() != Some(b'\n') {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<TokenKind, ParseError> {
        let c = self.peek().expect("caller checked for end of input");

        if c == b'"' || c == b'\'' {
            return self.match_string(c);
        }
        if c.is_ascii_digit() {
            return Ok(self.match_number());
        }
        if let Some(op) = self.match_operator() {
            return Ok(op);
        }
        if c.is_ascii_alphabetic() || c == b'_' || c == b'#' {
            return Ok(self.match_identifier());
        }
        if let Some(p) = self.match_punctuation() {
            return Ok(p);
        }

        Err(ParseError::new(format!("unexpected character '{}'", c as char))
            .with_location(self.line, self.column))
    }

    fn match_string(&mut self, quote: u8) -> Result<TokenKind, ParseError> {
        let start_line = self.line;
        let start_col = self.column;
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new("unterminated string literal")
                        .with_location(start_line, start_col))
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    if let Some(escaped) = self.advance() {
                        value.push(escaped as char);
                    }
                }
                Some(_) => {
                    // UTF-8 continuation bytes are copied verbatim; only
                    // ASCII delimiters are interpreted above.
                    let c = self.advance().unwrap();
                    value.push(c as char);
                }
            }
        }
        Ok(TokenKind::String(value))
    }

    fn match_number(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = &self.text[start..self.pos];
        TokenKind::Number(text.parse().unwrap_or(0.0))
    }

    fn match_operator(&mut self) -> Option<TokenKind> {
        let two = match (self.peek(), self.peek_at(1)) {
            (Some(a), Some(b)) => Some([a, b]),
            _ => None,
        };
        if let Some(pair) = two {
            let kind = match &pair {
                b"!=" => Some(TokenKind::Ne),
                b"<=" => Some(TokenKind::Le),
                b">=" => Some(TokenKind::Ge),
                _ => None,
            };
            if let Some(kind) = kind {
                self.advance();
                self.advance();
                return Some(kind);
            }
        }
        let kind = match self.peek()? {
            b'=' => Some(TokenKind::Eq),
            b'<' => Some(TokenKind::Lt),
            b'>' => Some(TokenKind::Gt),
            _ => None,
        };
        if kind.is_some() {
            self.advance();
        }
        kind
    }

    fn match_identifier(&mut self) -> TokenKind {
        let is_tag = self.peek() == Some(b'#');
        let start = self.pos;
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.' => {
                    self.advance();
                }
                Some(b'#') if self.pos == start => {
                    self.advance();
                }
                _ => break,
            }
        }
        let text = &self.text[start..self.pos];

        if is_tag {
            return TokenKind::HashTag(text.trim_start_matches('#').to_string());
        }
        if let Some(kw) = keyword(text) {
            return kw;
        }
        if text.contains('.') {
            return TokenKind::FieldPath(text.split('.').map(str::to_string).collect());
        }
        TokenKind::Identifier(text.to_string())
    }

    fn match_punctuation(&mut self) -> Option<TokenKind> {
        let kind = match self.peek()? {
            b',' => TokenKind::Comma,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            _ => return None,
        };
        self.advance();
        Some(kind)
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_table_query() {
        let tokens = tokenize(r#"TABLE status, file.folder FROM "projects" WHERE status != "done" SORT status ASC LIMIT 5"#).unwrap();
        assert_eq!(tokens.first().unwrap().kind, TokenKind::Table);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::From));
        assert!(tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::FieldPath(p) if p == &vec!["file".to_string(), "folder".to_string()])));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Ne));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn tokenizes_hashtag_and_comment() {
        let tokens = tokenize("LIST WHERE #urgent // trailing comment\n").unwrap();
        assert!(tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::HashTag(tag) if tag == "urgent")));
    }

    #[test]
    fn matches_two_char_operators_before_single_char() {
        let tokens = tokenize("WHERE a <= 1 AND b >= 2").unwrap();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Le));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Ge));
    }

    #[test]
    fn handles_escaped_quotes_in_strings() {
        let tokens = tokenize(r#"WHERE title = "a \"quoted\" word""#).unwrap();
        assert!(tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::String(s) if s == "a \"quoted\" word")));
    }
}
