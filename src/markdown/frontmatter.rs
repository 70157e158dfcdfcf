//! YAML frontmatter split-and-parse.
//!
//! Markdown files use frontmatter delimited by `---`:
//!
//! ```markdown
//! ---
//! title: My Document
//! tags: [rust, database]
//! ---
//!
//! # Document content here
//! ```

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Fields, Value};

/// Splits `content` into (frontmatter fields, body). A note has frontmatter
/// iff it starts with a `---` line and a subsequent `---` terminator;
/// anything else (including `---\n---\n`, which is legal and empty) is body
/// only.
pub fn parse(content: &str, path: &std::path::Path) -> Result<(Fields, String)> {
    let trimmed = content.strip_prefix('\n').unwrap_or(content);

    if !trimmed.starts_with("---") {
        return Ok((Fields::new(), content.to_string()));
    }
    // A line of exactly "---" (optionally trailing \r), not "----" or "---x".
    let after_marker = &trimmed[3..];
    if !after_marker.is_empty() && !after_marker.starts_with('\n') && !after_marker.starts_with("\r\n") {
        return Ok((Fields::new(), content.to_string()));
    }

    let rest = after_marker.trim_start_matches('\r').strip_prefix('\n').unwrap_or(after_marker);
    let Some(end_pos) = find_closing_delimiter(rest) else {
        return Err(Error::ParseError {
            path: path.to_path_buf(),
            message: "unterminated frontmatter: missing closing '---'".to_string(),
        });
    };

    let yaml_content = &rest[..end_pos.start];
    let body = rest[end_pos.end..].trim_start_matches('\n').to_string();

    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml_content).map_err(|e| Error::ParseError {
        path: path.to_path_buf(),
        message: format!("malformed YAML frontmatter: {e} (check indentation and that keys have a space after the colon)"),
    })?;

    let fields = yaml_to_fields(yaml_value, path)?;
    Ok((fields, body))
}

struct Delimiter {
    start: usize,
    end: usize,
}

/// Finds the first line consisting of exactly `---`, returning the byte
/// range of that line's content (empty) and where the body resumes.
fn find_closing_delimiter(rest: &str) -> Option<Delimiter> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed_line = line.trim_end_matches(['\n', '\r']);
        if trimmed_line == "---" {
            return Some(Delimiter {
                start: offset,
                end: offset + line.len(),
            });
        }
        offset += line.len();
    }
    // Allow a final line with no trailing newline.
    if rest.trim_end_matches(['\n', '\r']) == "---" {
        return Some(Delimiter { start: 0, end: rest.len() });
    }
    None
}

fn yaml_to_fields(value: serde_yaml::Value, path: &std::path::Path) -> Result<Fields> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut fields = Fields::new();
            for (k, v) in map {
                let key = k.as_str().ok_or_else(|| Error::ParseError {
                    path: path.to_path_buf(),
                    message: "frontmatter keys must be strings".to_string(),
                })?;
                fields.insert(key.to_string(), yaml_value_to_value(v));
            }
            Ok(fields)
        }
        serde_yaml::Value::Null => Ok(Fields::new()),
        _ => Err(Error::ParseError {
            path: path.to_path_buf(),
            message: "frontmatter must be a YAML mapping".to_string(),
        }),
    }
}

/// Converts a YAML scalar/collection into our `Value`, coercing dates and
/// other non-string scalars (YAML `!!timestamp`-tagged nodes) to their
/// ISO-8601 string form so downstream code never has to special-case them.
fn yaml_value_to_value(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Null
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_value_to_value).collect()),
        serde_yaml::Value::Mapping(map) => {
            let obj: HashMap<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), yaml_value_to_value(v))))
                .collect();
            Value::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => {
            if tagged.tag.to_string().contains("timestamp") {
                if let serde_yaml::Value::String(s) = tagged.value {
                    return Value::String(s);
                }
            }
            yaml_value_to_value(tagged.value)
        }
    }
}

/// Converts entity metadata back to a YAML mapping, used by the schema
/// engine to re-parse a schema note's `entity_metadata` as Picoschema.
pub fn fields_to_yaml(fields: &Fields) -> serde_yaml::Value {
    let map: serde_yaml::Mapping =
        fields.iter().map(|(k, v)| (serde_yaml::Value::String(k.clone()), value_to_yaml(v))).collect();
    serde_yaml::Value::Mapping(map)
}

fn value_to_yaml(v: &Value) -> serde_yaml::Value {
    match v {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number(serde_yaml::Number::from(*f)),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(arr) => serde_yaml::Value::Sequence(arr.iter().map(value_to_yaml).collect()),
        Value::Object(obj) => {
            let map: serde_yaml::Mapping =
                obj.iter().map(|(k, v)| (serde_yaml::Value::String(k.clone()), value_to_yaml(v))).collect();
            serde_yaml::Value::Mapping(map)
        }
    }
}

/// Renders fields and body back to Markdown with frontmatter, the inverse
/// of [`parse`]. Fields are written in the iteration order `serde_yaml`
/// chooses for the backing map; callers that need a stable key order
/// should pass an already-ordered structure upstream.
pub fn render(fields: &Fields, body: &str) -> String {
    if fields.is_empty() {
        return body.to_string();
    }

    let yaml_map: serde_yaml::Mapping =
        fields.iter().map(|(k, v)| (serde_yaml::Value::String(k.clone()), value_to_yaml(v))).collect();
    let yaml_str = serde_yaml::to_string(&serde_yaml::Value::Mapping(yaml_map)).unwrap_or_default();

    format!("---\n{}---\n\n{}", yaml_str, body)
}
