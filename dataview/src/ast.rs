//! Abstract Syntax Tree for Dataview queries

use serde::{Deserialize, Serialize};

/// A complete, parsed Dataview query.
///
/// Produced by both surface forms (fenced ` ```dataview ` blocks and inline
/// `` `= expr` `` spans normalize to a TABLE query with a single computed
/// column before reaching this type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataviewQuery {
    pub query_type: QueryType,
    /// TABLE columns. Empty for LIST and TASK queries.
    pub fields: Vec<Field>,
    /// FROM source: a folder path, tag, or note reference substring.
    /// `None` means "search the whole collection".
    pub from_source: Option<String>,
    pub where_clause: Option<Expr>,
    pub sort_clauses: Vec<SortClause>,
    pub limit: Option<usize>,
}

impl DataviewQuery {
    pub fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            fields: Vec::new(),
            from_source: None,
            where_clause: None,
            sort_clauses: Vec::new(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    List,
    Table,
    Task,
}

/// A TABLE column: a dotted field path with an optional `AS` alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub path: FieldPath,
    pub alias: Option<String>,
}

/// A dotted field reference, e.g. `file.folder`, `status`, `project.name`.
///
/// Segments index into a note's frontmatter when the note's field is an
/// object; the leading segment `file` is reserved for computed metadata
/// (`file.path`, `file.folder`, `file.link`, `file.mtime`) rather than
/// frontmatter lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn is_file_field(&self) -> bool {
        self.0.first().map(|s| s.as_str()) == Some("file")
    }

    /// Rendered form used as a default TABLE column header, e.g. `file.folder`.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: FieldPath,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Asc
    }
}

/// A WHERE-clause expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Field(FieldPath),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `contains(field, "text")` or bare `contains("text")` against the body.
    Contains {
        field: Option<FieldPath>,
        text: String,
    },
    /// `#tag` membership test against a note's tag set.
    HasTag {
        tag: String,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Literal>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
}
