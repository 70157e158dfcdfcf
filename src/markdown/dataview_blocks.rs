//! Locates the two Dataview surface forms in a note body: fenced
//! ` ```dataview ` blocks and inline `` `= expr` `` spans. Query
//! *execution* lives in the `dataview` crate and the sync engine's
//! `dataview_refresh` module; this module only finds query text and its
//! source line, producing the `query_id`/`line_number` fields that
//! integration needs.

use once_cell::sync::Lazy;
use regex::Regex;

static INLINE_QUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"`=\s*([^`]+?)\s*`").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// A fenced ` ```dataview ` block: the source text is a complete query.
    Block,
    /// An inline `` `= expr` `` span: the source text is a single field
    /// expression, normalized by the caller into a one-column `TABLE` query
    /// evaluated against just the host note.
    Inline,
}

#[derive(Debug, Clone)]
pub struct DataviewBlock {
    pub query_id: String,
    /// 1-based line number the query starts on.
    pub line_number: usize,
    pub kind: BlockKind,
    pub source: String,
}

/// Finds every Dataview block and inline span in `body`, in document order.
pub fn scan(body: &str) -> Vec<DataviewBlock> {
    let mut blocks = Vec::new();
    let mut block_index = 0usize;
    let mut inline_index = 0usize;

    let lines: Vec<&str> = body.lines().collect();
    let mut i = 0usize;
    let mut in_other_fence = false;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        if in_other_fence {
            if trimmed.starts_with("```") {
                in_other_fence = false;
            }
            i += 1;
            continue;
        }

        if trimmed.starts_with("```dataview") {
            let start_line = i + 1; // line_number is 1-based, query starts on the next line
            let mut source_lines = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].trim_start().starts_with("```") {
                source_lines.push(lines[i]);
                i += 1;
            }
            // If the fence never closes, still surface what we collected;
            // the caller's parser will report its own syntax error.
            if i < lines.len() {
                i += 1; // consume the closing fence
            }
            blocks.push(DataviewBlock {
                query_id: format!("block-{block_index}"),
                line_number: start_line,
                kind: BlockKind::Block,
                source: source_lines.join("\n"),
            });
            block_index += 1;
            continue;
        }

        if trimmed.starts_with("```") {
            in_other_fence = true;
            i += 1;
            continue;
        }

        for cap in INLINE_QUERY.captures_iter(line) {
            blocks.push(DataviewBlock {
                query_id: format!("inline-{inline_index}"),
                line_number: i + 1,
                kind: BlockKind::Inline,
                source: cap.get(1).unwrap().as_str().trim().to_string(),
            });
            inline_index += 1;
        }

        i += 1;
    }

    blocks
}

/// An entity "has Dataview blocks" (for impact-analysis cache purposes, see
/// `crate::sync::dataview_refresh`) if its body contains the literal fence
/// opener, independent of whether it parses successfully.
pub fn has_dataview_blocks(body: &str) -> bool {
    body.contains("```dataview")
}
