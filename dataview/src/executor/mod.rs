//! Executes parsed `DataviewQuery` values against a collection of notes.

use std::collections::BTreeMap;

use crate::ast::{BinaryOp, DataviewQuery, Expr, Field, FieldPath, QueryType, SortDirection, UnaryOp};
use crate::value::Value;

/// File-level metadata the engine computes rather than reads from
/// frontmatter. Mirrors the `file.*` special fields.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub folder: String,
    pub link: String,
    pub mtime: Option<String>,
}

/// A note as the caller's sync layer hands it to the engine. Two shapes
/// are supported because the collection this crate was generalized from
/// produced both a flat dict and a `{"file": {...}, ...}` nested one
/// depending on call site, and both need to resolve fields identically.
#[derive(Debug, Clone)]
pub enum NoteRecord {
    Flat {
        file: FileInfo,
        title: String,
        tags: Vec<String>,
        body: String,
        fields: BTreeMap<String, Value>,
    },
    Nested {
        file: FileInfo,
        title: String,
        tags: Vec<String>,
        body: String,
        fields: BTreeMap<String, Value>,
    },
}

impl NoteRecord {
    pub fn file(&self) -> &FileInfo {
        match self {
            NoteRecord::Flat { file, .. } | NoteRecord::Nested { file, .. } => file,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            NoteRecord::Flat { title, .. } | NoteRecord::Nested { title, .. } => title,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            NoteRecord::Flat { tags, .. } | NoteRecord::Nested { tags, .. } => tags,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            NoteRecord::Flat { body, .. } | NoteRecord::Nested { body, .. } => body,
        }
    }

    fn fields(&self) -> &BTreeMap<String, Value> {
        match self {
            NoteRecord::Flat { fields, .. } | NoteRecord::Nested { fields, .. } => fields,
        }
    }

    /// Resolves a dotted field path against this note's computed `file.*`
    /// metadata, or its frontmatter fields (descending into nested objects
    /// one segment at a time).
    pub fn resolve(&self, path: &FieldPath) -> Option<Value> {
        if path.is_file_field() {
            let file = self.file();
            return match path.0.get(1).map(String::as_str) {
                Some("path") => Some(Value::String(file.path.clone())),
                Some("folder") => Some(Value::String(file.folder.clone())),
                Some("link") => Some(Value::String(file.link.clone())),
                Some("mtime") => file.mtime.clone().map(Value::String),
                _ => None,
            };
        }

        let mut current = self.fields().get(&path.0[0])?.clone();
        for segment in &path.0[1..] {
            match current {
                Value::Object(ref map) => current = map.get(segment)?.clone(),
                _ => return None,
            }
        }
        Some(current)
    }

    fn link(&self) -> String {
        format!("[[{}]]", self.title())
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveredLink {
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub markdown: String,
    pub result_count: usize,
    pub discovered_links: Vec<DiscoveredLink>,
}

/// Row of resolved values keyed by column/field name, used both for TABLE
/// output and, before formatting, for LIST/TASK intermediate rows.
pub type Row = BTreeMap<String, Value>;

pub fn execute(query: &DataviewQuery, notes: &[NoteRecord]) -> QueryResult {
    let filtered = filter_by_from(notes, query.from_source.as_deref());
    let filtered: Vec<&NoteRecord> = match &query.where_clause {
        Some(expr) => filtered
            .into_iter()
            .filter(|note| evaluate(expr, note).map(|v| v.is_truthy()).unwrap_or(false))
            .collect(),
        None => filtered,
    };

    match query.query_type {
        QueryType::Table => execute_table(&filtered, query),
        QueryType::List => execute_list(&filtered, query),
        QueryType::Task => execute_task(&filtered, query),
    }
}

fn filter_by_from<'a>(notes: &'a [NoteRecord], from_source: Option<&str>) -> Vec<&'a NoteRecord> {
    let Some(from_source) = from_source else {
        return notes.iter().collect();
    };
    notes
        .iter()
        .filter(|note| {
            let path = &note.file().path;
            path.contains(from_source) || path.starts_with(from_source)
        })
        .collect()
}

fn execute_table(notes: &[&NoteRecord], query: &DataviewQuery) -> QueryResult {
    let mut rows: Vec<Row> = Vec::with_capacity(notes.len());
    for note in notes {
        let mut row = Row::new();
        row.insert("title".to_string(), Value::String(note.title().to_string()));
        row.insert("file.link".to_string(), Value::String(note.link()));
        for field in &query.fields {
            let name = column_name(field);
            let value = note.resolve(&field.path).unwrap_or(Value::Null);
            row.insert(name, value);
        }
        rows.push(row);
    }

    let mut rows = rows;
    apply_sort(&mut rows, &query.sort_clauses);
    apply_limit(&mut rows, query.limit);

    let headers: Vec<String> = std::iter::once("title".to_string())
        .chain(query.fields.iter().map(column_name))
        .collect();

    let links = discovered_links(&rows);
    QueryResult {
        markdown: crate::format::format_table(&rows, &headers),
        result_count: rows.len(),
        discovered_links: links,
    }
}

fn execute_list(notes: &[&NoteRecord], query: &DataviewQuery) -> QueryResult {
    let mut rows: Vec<Row> = notes
        .iter()
        .map(|note| {
            let mut row = Row::new();
            row.insert("title".to_string(), Value::String(note.title().to_string()));
            row.insert("file.link".to_string(), Value::String(note.link()));
            row
        })
        .collect();

    apply_sort(&mut rows, &query.sort_clauses);
    apply_limit(&mut rows, query.limit);

    let links = discovered_links(&rows);
    QueryResult {
        markdown: crate::format::format_list(&rows),
        result_count: rows.len(),
        discovered_links: links,
    }
}

fn execute_task(notes: &[&NoteRecord], query: &DataviewQuery) -> QueryResult {
    let mut rows: Vec<Row> = Vec::new();
    for note in notes {
        for task in extract_tasks(note.body()) {
            let mut row = Row::new();
            row.insert("title".to_string(), Value::String(note.title().to_string()));
            row.insert("file.link".to_string(), Value::String(note.link()));
            row.insert("text".to_string(), Value::String(task.text));
            row.insert("done".to_string(), Value::Bool(task.done));
            rows.push(row);
        }
    }

    apply_sort(&mut rows, &query.sort_clauses);
    apply_limit(&mut rows, query.limit);

    QueryResult {
        markdown: crate::format::format_tasks(&rows),
        result_count: rows.len(),
        discovered_links: Vec::new(),
    }
}

struct ExtractedTask {
    text: String,
    done: bool,
}

/// Pulls Markdown task list items (`- [ ] text`, `- [x] text`) out of a
/// note's body, line by line.
fn extract_tasks(body: &str) -> Vec<ExtractedTask> {
    let mut tasks = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed
            .strip_prefix("- [ ] ")
            .map(|r| (r, false))
            .or_else(|| trimmed.strip_prefix("- [x] ").map(|r| (r, true)))
            .or_else(|| trimmed.strip_prefix("- [X] ").map(|r| (r, true)))
        else {
            continue;
        };
        tasks.push(ExtractedTask {
            text: rest.0.trim().to_string(),
            done: rest.1,
        });
    }
    tasks
}

fn column_name(field: &Field) -> String {
    field.alias.clone().unwrap_or_else(|| field.path.dotted())
}

fn discovered_links(rows: &[Row]) -> Vec<DiscoveredLink> {
    rows.iter()
        .filter_map(|row| row.get("title"))
        .filter_map(|v| v.as_str())
        .map(|title| DiscoveredLink {
            target: title.to_string(),
        })
        .collect()
}

/// Applies SORT clauses in reverse order with a stable sort, so the first
/// clause listed wins ties from later ones. Missing/null values always
/// sort after present values, independent of ASC/DESC.
fn apply_sort(rows: &mut [Row], sort_clauses: &[crate::ast::SortClause]) {
    for clause in sort_clauses.iter().rev() {
        let key = clause.field.dotted();
        let reverse = clause.direction == SortDirection::Desc;
        rows.sort_by(|a, b| {
            let av = a.get(&key);
            let bv = b.get(&key);
            let ordering = match (av, bv) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(x), Some(y)) if x.is_null() && y.is_null() => std::cmp::Ordering::Equal,
                (Some(x), Some(_)) if x.is_null() => std::cmp::Ordering::Greater,
                (Some(_), Some(y)) if y.is_null() => std::cmp::Ordering::Less,
                (Some(x), Some(y)) => x.sort_key().cmp(&y.sort_key()),
            };
            if reverse && !matches!(ordering, std::cmp::Ordering::Equal) {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

fn apply_limit(rows: &mut Vec<Row>, limit: Option<usize>) {
    if let Some(n) = limit {
        rows.truncate(n);
    }
}

/// Evaluates a WHERE-clause expression against a note. Any failure to
/// resolve a field or coerce a comparison returns `None` rather than an
/// error — callers treat that as "excluded" so one malformed note never
/// aborts the rest of a query.
fn evaluate(expr: &Expr, note: &NoteRecord) -> Option<Value> {
    match expr {
        Expr::Literal(lit) => Some(Value::from(lit)),
        Expr::Field(path) => Some(note.resolve(path).unwrap_or(Value::Null)),
        Expr::UnaryOp { op: UnaryOp::Not, expr } => {
            let v = evaluate(expr, note)?;
            Some(Value::Bool(!v.is_truthy()))
        }
        Expr::BinaryOp { left, op: BinaryOp::And, right } => {
            let l = evaluate(left, note)?;
            if !l.is_truthy() {
                return Some(Value::Bool(false));
            }
            Some(Value::Bool(evaluate(right, note)?.is_truthy()))
        }
        Expr::BinaryOp { left, op: BinaryOp::Or, right } => {
            let l = evaluate(left, note)?;
            if l.is_truthy() {
                return Some(Value::Bool(true));
            }
            Some(Value::Bool(evaluate(right, note)?.is_truthy()))
        }
        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, note)?;
            let r = evaluate(right, note)?;
            Some(Value::Bool(compare(&l, *op, &r)))
        }
        Expr::Contains { field, text } => {
            let haystack = match field {
                Some(path) => note.resolve(path).unwrap_or(Value::Null).render(),
                None => note.body().to_string(),
            };
            Some(Value::Bool(haystack.to_lowercase().contains(&text.to_lowercase())))
        }
        Expr::HasTag { tag } => Some(Value::Bool(note.tags().iter().any(|t| t == tag))),
        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, note).map(|v| v.is_null()).unwrap_or(true);
            Some(Value::Bool(is_null != *negated))
        }
        Expr::In { expr, values, negated } => {
            let target = evaluate(expr, note)?;
            let found = values
                .iter()
                .filter_map(|v| evaluate(v, note))
                .any(|v| v == target);
            Some(Value::Bool(found != *negated))
        }
    }
}

fn compare(left: &Value, op: BinaryOp, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
    }
    let a = left.render();
    let b = right.render();
    match op {
        BinaryOp::Eq => *left == *right,
        BinaryOp::Ne => *left != *right,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn note(path: &str, title: &str, status: &str, tags: &[&str]) -> NoteRecord {
        let folder = path.rsplit_once('/').map(|(f, _)| f.to_string()).unwrap_or_default();
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), Value::String(status.to_string()));
        NoteRecord::Nested {
            file: FileInfo {
                path: path.to_string(),
                folder,
                link: format!("[[{title}]]"),
                mtime: None,
            },
            title: title.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            body: String::new(),
            fields,
        }
    }

    #[test]
    fn filters_by_from_and_where() {
        let notes = vec![
            note("projects/a.md", "A", "active", &[]),
            note("projects/b.md", "B", "done", &[]),
            note("areas/c.md", "C", "active", &[]),
        ];
        let query = parse(r#"LIST FROM "projects" WHERE status = "active""#).unwrap();
        let result = execute(&query, &notes);
        assert_eq!(result.result_count, 1);
        assert!(result.markdown.contains("[[A]]"));
    }

    #[test]
    fn table_includes_requested_columns() {
        let notes = vec![note("projects/a.md", "A", "active", &["urgent"])];
        let query = parse(r#"TABLE status FROM "projects""#).unwrap();
        let result = execute(&query, &notes);
        assert!(result.markdown.contains("status"));
        assert!(result.markdown.contains("active"));
    }

    #[test]
    fn sort_places_nulls_last() {
        let mut a = note("projects/a.md", "A", "active", &[]);
        if let NoteRecord::Nested { fields, .. } = &mut a {
            fields.remove("status");
        }
        let notes = vec![a, note("projects/b.md", "B", "active", &[])];
        let query = parse(r#"TABLE status FROM "projects" SORT status ASC"#).unwrap();
        let result = execute(&query, &notes);
        let b_pos = result.markdown.find("[[B]]").unwrap();
        let a_pos = result.markdown.find("[[A]]").unwrap();
        assert!(b_pos < a_pos);
    }

    #[test]
    fn flat_and_nested_shapes_resolve_identically() {
        let nested = note("projects/a.md", "A", "active", &[]);
        let flat = match nested.clone() {
            NoteRecord::Nested { file, title, tags, body, fields } => {
                NoteRecord::Flat { file, title, tags, body, fields }
            }
            other => other,
        };
        let path = FieldPath(vec!["status".to_string()]);
        assert_eq!(nested.resolve(&path), flat.resolve(&path));
        assert_eq!(nested.file().folder, flat.file().folder);
    }

    #[test]
    fn has_tag_matches_note_tags() {
        let notes = vec![
            note("projects/a.md", "A", "active", &["urgent"]),
            note("projects/b.md", "B", "active", &[]),
        ];
        let query = parse(r#"LIST WHERE HAS TAG #urgent"#).unwrap();
        let result = execute(&query, &notes);
        assert_eq!(result.result_count, 1);
    }
}
