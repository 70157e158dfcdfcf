//! Dataview - the embedded query language for basic-memory notes.
//!
//! A small query language, not a general SQL dialect: three query types
//! (`LIST`, `TABLE`, `TASK`) over a project's notes, with a `FROM` folder
//! filter, a boolean `WHERE` clause, multi-key `SORT`, and `LIMIT`.
//!
//! # Syntax Overview
//!
//! ```text
//! LIST FROM "projects"
//!
//! TABLE status, file.folder AS location
//! FROM "projects"
//! WHERE status != "done"
//! SORT status ASC, file.folder DESC
//! LIMIT 10
//!
//! TASK FROM "projects" WHERE HAS TAG #urgent
//! ```
//!
//! # Special Fields
//!
//! - `file.path`, `file.folder`, `file.link`, `file.mtime` — computed
//!   per-note metadata, not frontmatter lookups.
//! - `contains(field, "text")` / bare `contains("text")` — full-text
//!   search against a field, or the note body when no field is given.
//! - `HAS TAG #tag` — tag-set membership.
//! - `field IS [NOT] NULL`, `field IN (...)` — null checks and set
//!   membership.
//!
//! Queries are parsed by [`parse`] into a [`DataviewQuery`] and executed
//! against a caller-supplied note collection by [`executor::execute`].

mod ast;
mod error;
mod executor;
mod format;
mod lexer;
mod parser;
mod value;

pub use ast::*;
pub use error::ParseError;
pub use executor::{execute, DiscoveredLink, FileInfo, NoteRecord, QueryResult, Row};
pub use value::Value;

/// Parse a single Dataview query string into its AST.
pub fn parse(input: &str) -> Result<DataviewQuery, ParseError> {
    parser::parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_query() {
        let query = parse(r#"LIST FROM "projects""#).unwrap();
        assert_eq!(query.query_type, QueryType::List);
        assert_eq!(query.from_source.as_deref(), Some("projects"));
    }

    #[test]
    fn parse_table_query_with_sort_and_limit() {
        let query = parse(r#"TABLE status FROM "projects" SORT status DESC LIMIT 3"#).unwrap();
        assert_eq!(query.query_type, QueryType::Table);
        assert_eq!(query.fields.len(), 1);
        assert_eq!(query.limit, Some(3));
    }

    #[test]
    fn parse_task_query_with_where() {
        let query = parse(r#"TASK FROM "projects" WHERE HAS TAG #urgent"#).unwrap();
        assert_eq!(query.query_type, QueryType::Task);
        assert!(query.where_clause.is_some());
    }
}
