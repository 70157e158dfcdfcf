//! Splits a note's body into search-index chunks along Markdown structure
//! (headings, then paragraphs), falling back to a fixed sliding window
//! when a single block exceeds the budget. Informed by the
//! embedding-service chunking that composes the search text in
//! `original_source/repository/search_repository.py`'s `content` field.

const CHUNK_BUDGET: usize = 1500;
const WINDOW_OVERLAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub heading_path: Vec<String>,
    pub text: String,
}

/// Splits `body` into chunks of roughly [`CHUNK_BUDGET`] characters,
/// preferring to break at heading and paragraph boundaries.
pub fn chunk_body(body: &str) -> Vec<Chunk> {
    let blocks = split_by_headings(body);
    let mut chunks = Vec::new();
    for (heading_path, text) in blocks {
        if text.len() <= CHUNK_BUDGET {
            if !text.trim().is_empty() {
                chunks.push(Chunk { heading_path, text });
            }
            continue;
        }
        for window in sliding_window(&text) {
            chunks.push(Chunk { heading_path: heading_path.clone(), text: window });
        }
    }
    if chunks.is_empty() && !body.trim().is_empty() {
        chunks.push(Chunk { heading_path: Vec::new(), text: body.to_string() });
    }
    chunks
}

/// Splits on ATX headings (`#`..`######`), tracking the heading stack so
/// each block knows its section path.
fn split_by_headings(body: &str) -> Vec<(Vec<String>, String)> {
    let mut blocks = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();

    let flush = |stack: &[(usize, String)], current: &mut String, blocks: &mut Vec<(Vec<String>, String)>| {
        if !current.trim().is_empty() {
            let path = stack.iter().map(|(_, h)| h.clone()).collect();
            blocks.push((path, std::mem::take(current)));
        } else {
            current.clear();
        }
    };

    for line in body.lines() {
        let trimmed = line.trim_start();
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if level > 0 && level <= 6 && trimmed.chars().nth(level) == Some(' ') {
            flush(&stack, &mut current, &mut blocks);
            let heading = trimmed[level..].trim().to_string();
            stack.retain(|(l, _)| *l < level);
            stack.push((level, heading));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    flush(&stack, &mut current, &mut blocks);
    blocks
}

/// A fixed, overlapping character window over `text`, used only when a
/// single heading section exceeds the chunk budget.
fn sliding_window(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= CHUNK_BUDGET {
        return vec![text.to_string()];
    }
    let mut windows = Vec::new();
    let stride = CHUNK_BUDGET - WINDOW_OVERLAP;
    let mut start = 0;
    while start < chars.len() {
        let end = (start + CHUNK_BUDGET).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_is_one_chunk() {
        let chunks = chunk_body("# Title\n\nSome short text.\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, vec!["Title".to_string()]);
    }

    #[test]
    fn headings_split_into_separate_chunks() {
        let body = "# A\n\nFirst.\n\n## B\n\nSecond.\n";
        let chunks = chunk_body(body);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].heading_path, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn oversized_section_falls_back_to_sliding_window() {
        let body = format!("# Big\n\n{}\n", "word ".repeat(500));
        let chunks = chunk_body(&body);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= CHUNK_BUDGET);
        }
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        assert!(chunk_body("   \n\n").is_empty());
    }
}
