//! Recursive-descent parser over the `Lexer`'s token stream.
//!
//! Grammar (informal):
//!
//! ```text
//! query       := (TABLE fields | LIST | TASK) from? where? sort? limit?
//! fields      := field (COMMA field)*
//! field       := path (AS IDENTIFIER)?
//! from        := FROM STRING
//! where       := WHERE expr
//! sort        := SORT sort_item (COMMA sort_item)*
//! sort_item   := path (ASC | DESC)?
//! limit       := LIMIT NUMBER
//!
//! expr        := or_expr
//! or_expr     := and_expr (OR and_expr)*
//! and_expr    := not_expr (AND not_expr)*
//! not_expr    := NOT not_expr | comparison
//! comparison  := operand ((= | != | < | <= | > | >=) operand
//!              | IS [NOT] NULL
//!              | IN LPAREN expr (COMMA expr)* RPAREN)?
//! operand     := CONTAINS LPAREN [path COMMA] STRING RPAREN
//!              | HAS TAG (STRING | #tag)
//!              | #tag
//!              | literal
//!              | path
//!              | LPAREN expr RPAREN
//! ```

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{self, Token, TokenKind};

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let tok = self.current();
        ParseError::new(message.into()).with_location(tok.line, tok.column)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", kind, self.peek())))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn field_path(cur: &mut Cursor) -> Result<FieldPath, ParseError> {
    match cur.peek().clone() {
        TokenKind::FieldPath(segments) => {
            cur.advance();
            Ok(FieldPath(segments))
        }
        TokenKind::Identifier(name) => {
            cur.advance();
            Ok(FieldPath::single(name))
        }
        other => Err(cur.error(format!("expected a field path, found {:?}", other))),
    }
}

fn string_literal(cur: &mut Cursor) -> Result<String, ParseError> {
    match cur.peek().clone() {
        TokenKind::String(s) => {
            cur.advance();
            Ok(s)
        }
        other => Err(cur.error(format!("expected a string literal, found {:?}", other))),
    }
}

fn literal(cur: &mut Cursor) -> Result<Literal, ParseError> {
    match cur.peek().clone() {
        TokenKind::String(s) => {
            cur.advance();
            Ok(Literal::String(s))
        }
        TokenKind::Number(n) => {
            cur.advance();
            if n.fract() == 0.0 {
                Ok(Literal::Int(n as i64))
            } else {
                Ok(Literal::Float(n))
            }
        }
        TokenKind::Bool(b) => {
            cur.advance();
            Ok(Literal::Bool(b))
        }
        TokenKind::Null => {
            cur.advance();
            Ok(Literal::Null)
        }
        other => Err(cur.error(format!("expected a literal, found {:?}", other))),
    }
}

fn field_or_fields(cur: &mut Cursor) -> Result<Vec<Field>, ParseError> {
    let mut fields = vec![field(cur)?];
    while cur.eat(&TokenKind::Comma) {
        fields.push(field(cur)?);
    }
    Ok(fields)
}

fn field(cur: &mut Cursor) -> Result<Field, ParseError> {
    let path = field_path(cur)?;
    let alias = if cur.eat(&TokenKind::As) {
        match cur.peek().clone() {
            TokenKind::Identifier(name) => {
                cur.advance();
                Some(name)
            }
            other => return Err(cur.error(format!("expected alias name after AS, found {:?}", other))),
        }
    } else {
        None
    };
    Ok(Field { path, alias })
}

fn operand(cur: &mut Cursor) -> Result<Expr, ParseError> {
    match cur.peek().clone() {
        TokenKind::Contains => {
            cur.advance();
            cur.expect(&TokenKind::LParen)?;
            let field = if matches!(cur.peek(), TokenKind::FieldPath(_) | TokenKind::Identifier(_)) {
                let p = field_path(cur)?;
                cur.expect(&TokenKind::Comma)?;
                Some(p)
            } else {
                None
            };
            let text = string_literal(cur)?;
            cur.expect(&TokenKind::RParen)?;
            Ok(Expr::Contains { field, text })
        }
        TokenKind::Has => {
            cur.advance();
            cur.expect(&TokenKind::Tag)?;
            let tag = match cur.peek().clone() {
                TokenKind::HashTag(t) => {
                    cur.advance();
                    t
                }
                TokenKind::String(s) => {
                    cur.advance();
                    s
                }
                other => return Err(cur.error(format!("expected a tag after HAS TAG, found {:?}", other))),
            };
            Ok(Expr::HasTag { tag })
        }
        TokenKind::HashTag(tag) => {
            cur.advance();
            Ok(Expr::HasTag { tag })
        }
        TokenKind::LParen => {
            cur.advance();
            let inner = expr(cur)?;
            cur.expect(&TokenKind::RParen)?;
            Ok(inner)
        }
        TokenKind::String(_) | TokenKind::Number(_) | TokenKind::Bool(_) | TokenKind::Null => {
            Ok(Expr::Literal(literal(cur)?))
        }
        TokenKind::FieldPath(_) | TokenKind::Identifier(_) => Ok(Expr::Field(field_path(cur)?)),
        other => Err(cur.error(format!("unexpected token in expression: {:?}", other))),
    }
}

fn comparison(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let left = operand(cur)?;

    let op = match cur.peek() {
        TokenKind::Eq => Some(BinaryOp::Eq),
        TokenKind::Ne => Some(BinaryOp::Ne),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::Le => Some(BinaryOp::Le),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::Ge => Some(BinaryOp::Ge),
        _ => None,
    };
    if let Some(op) = op {
        cur.advance();
        let right = operand(cur)?;
        return Ok(Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
    }

    if cur.eat(&TokenKind::Is) {
        let negated = cur.eat(&TokenKind::Not);
        cur.expect(&TokenKind::Null)?;
        return Ok(Expr::IsNull {
            expr: Box::new(left),
            negated,
        });
    }

    if cur.eat(&TokenKind::In) {
        cur.expect(&TokenKind::LParen)?;
        let mut values = vec![expr(cur)?];
        while cur.eat(&TokenKind::Comma) {
            values.push(expr(cur)?);
        }
        cur.expect(&TokenKind::RParen)?;
        return Ok(Expr::In {
            expr: Box::new(left),
            values,
            negated: false,
        });
    }

    Ok(left)
}

fn not_expr(cur: &mut Cursor) -> Result<Expr, ParseError> {
    if cur.eat(&TokenKind::Not) {
        let inner = not_expr(cur)?;
        return Ok(Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(inner),
        });
    }
    comparison(cur)
}

fn and_expr(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = not_expr(cur)?;
    while cur.eat(&TokenKind::And) {
        let right = not_expr(cur)?;
        left = Expr::BinaryOp {
            left: Box::new(left),
            op: BinaryOp::And,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn expr(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = and_expr(cur)?;
    while cur.eat(&TokenKind::Or) {
        let right = and_expr(cur)?;
        left = Expr::BinaryOp {
            left: Box::new(left),
            op: BinaryOp::Or,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn sort_clauses(cur: &mut Cursor) -> Result<Vec<SortClause>, ParseError> {
    let mut clauses = vec![sort_item(cur)?];
    while cur.eat(&TokenKind::Comma) {
        clauses.push(sort_item(cur)?);
    }
    Ok(clauses)
}

fn sort_item(cur: &mut Cursor) -> Result<SortClause, ParseError> {
    let field = field_path(cur)?;
    let direction = if cur.eat(&TokenKind::Desc) {
        SortDirection::Desc
    } else {
        cur.eat(&TokenKind::Asc);
        SortDirection::Asc
    };
    Ok(SortClause { field, direction })
}

/// Parse a single Dataview query.
pub fn parse(input: &str) -> Result<DataviewQuery, ParseError> {
    let tokens = lexer::tokenize(input)?;
    let mut cur = Cursor::new(&tokens);

    let mut query = match cur.peek().clone() {
        TokenKind::Table => {
            cur.advance();
            let fields = if matches!(cur.peek(), TokenKind::FieldPath(_) | TokenKind::Identifier(_)) {
                field_or_fields(&mut cur)?
            } else {
                Vec::new()
            };
            let mut q = DataviewQuery::new(QueryType::Table);
            q.fields = fields;
            q
        }
        TokenKind::List => {
            cur.advance();
            DataviewQuery::new(QueryType::List)
        }
        TokenKind::Task => {
            cur.advance();
            DataviewQuery::new(QueryType::Task)
        }
        other => return Err(cur.error(format!("expected TABLE, LIST, or TASK, found {:?}", other))),
    };

    if cur.eat(&TokenKind::From) {
        query.from_source = Some(string_literal(&mut cur)?);
    }

    if cur.eat(&TokenKind::Where) {
        query.where_clause = Some(expr(&mut cur)?);
    }

    if cur.eat(&TokenKind::Sort) {
        query.sort_clauses = sort_clauses(&mut cur)?;
    }

    if cur.eat(&TokenKind::Limit) {
        match cur.peek().clone() {
            TokenKind::Number(n) => {
                cur.advance();
                query.limit = Some(n as usize);
            }
            other => return Err(cur.error(format!("expected a number after LIMIT, found {:?}", other))),
        }
    }

    if !cur.at_eof() {
        return Err(cur.error(format!("unexpected trailing token {:?}", cur.peek())));
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_list() {
        let q = parse("LIST").unwrap();
        assert_eq!(q.query_type, QueryType::List);
        assert!(q.from_source.is_none());
    }

    #[test]
    fn parses_list_from() {
        let q = parse(r#"LIST FROM "projects""#).unwrap();
        assert_eq!(q.query_type, QueryType::List);
        assert_eq!(q.from_source.as_deref(), Some("projects"));
    }

    #[test]
    fn parses_table_with_fields_and_alias() {
        let q = parse(r#"TABLE status, file.folder AS location FROM "projects""#).unwrap();
        assert_eq!(q.query_type, QueryType::Table);
        assert_eq!(q.fields.len(), 2);
        assert_eq!(q.fields[1].alias.as_deref(), Some("location"));
        assert!(q.fields[1].path.is_file_field());
    }

    #[test]
    fn parses_where_comparison_and_sort_limit() {
        let q = parse(r#"TABLE status FROM "projects" WHERE status != "done" SORT status ASC, file.folder DESC LIMIT 5"#).unwrap();
        assert!(q.where_clause.is_some());
        assert_eq!(q.sort_clauses.len(), 2);
        assert_eq!(q.sort_clauses[1].direction, SortDirection::Desc);
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn parses_and_or_not_precedence() {
        let q = parse(r#"LIST WHERE NOT status = "done" AND priority = 1 OR status = "blocked""#).unwrap();
        match q.where_clause.unwrap() {
            Expr::BinaryOp { op: BinaryOp::Or, .. } => {}
            other => panic!("expected top-level OR, got {:?}", other),
        }
    }

    #[test]
    fn parses_contains_and_has_tag() {
        let q = parse(r#"LIST WHERE contains(body, "milk") AND HAS TAG #urgent"#).unwrap();
        match q.where_clause.unwrap() {
            Expr::BinaryOp { left, op: BinaryOp::And, right } => {
                assert!(matches!(*left, Expr::Contains { .. }));
                assert!(matches!(*right, Expr::HasTag { .. }));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn parses_bare_hashtag_and_is_null() {
        let q = parse(r#"TASK WHERE #urgent AND due IS NOT NULL"#).unwrap();
        assert!(q.where_clause.is_some());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("LIST extra tokens here").is_err());
    }
}
