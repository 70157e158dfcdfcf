//! Scans a note body for explicit and inline relations.
//!
//! Explicit: `- rel_type [[Target]] (context)`, inside a `## Relations`
//! section or at the top level. Inline: any other `[[Target]]` occurring
//! in running text creates a `links_to` relation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Relation;
use crate::validation::normalize_relation_type;

static EXPLICIT_RELATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-\s*([A-Za-z][A-Za-z0-9_-]*)\s*\[\[([^\]]+)\]\]\s*(?:\(([^()]*)\))?\s*$").unwrap());
static WIKILINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());

pub const LINKS_TO: &str = "links_to";

/// Matches a single line against the explicit-relation bullet grammar.
pub fn match_explicit_relation_line(line: &str) -> Option<Relation> {
    let caps = EXPLICIT_RELATION_LINE.captures(line)?;
    let relation_type = normalize_relation_type(caps.get(1)?.as_str());
    let target = caps.get(2)?.as_str().trim().to_string();
    let mut relation = Relation::new(0, target, relation_type);
    relation.context = caps.get(3).map(|m| m.as_str().trim().to_string()).filter(|c| !c.is_empty());
    Some(relation)
}

/// Extracts every `[[Target]]` in a line, in order.
pub fn inline_links(line: &str) -> Vec<String> {
    WIKILINK.captures_iter(line).map(|c| c.get(1).unwrap().as_str().trim().to_string()).collect()
}

/// Scans a body for both explicit and inline relations. Lines that match
/// an explicit relation or an observation bullet are excluded from the
/// inline scan so a `- rel [[Target]]` line doesn't also produce a
/// duplicate `links_to` edge. Fenced code blocks are skipped entirely
/// (Dataview blocks are handled separately, see `dataview_blocks`).
pub fn scan(body: &str) -> Vec<Relation> {
    let mut relations = Vec::new();
    let mut in_code_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_code_fence = !in_code_fence;
            continue;
        }
        if in_code_fence {
            continue;
        }
        if let Some(rel) = match_explicit_relation_line(line) {
            relations.push(rel);
            continue;
        }
        if super::observations::match_observation_line(line).is_some() {
            continue;
        }
        for target in inline_links(line) {
            relations.push(Relation::new(0, target, LINKS_TO));
        }
    }

    relations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_relation_with_context() {
        let rel = match_explicit_relation_line("- rel [[Y]] (because)").unwrap();
        assert_eq!(rel.relation_type, "rel");
        assert_eq!(rel.to_name, "Y");
        assert_eq!(rel.context.as_deref(), Some("because"));
    }

    #[test]
    fn underscore_relation_types_normalize_to_hyphen() {
        let rel = match_explicit_relation_line("- part_of [[Whole]]").unwrap();
        assert_eq!(rel.relation_type, "part-of");
    }

    #[test]
    fn inline_links_become_links_to() {
        let relations = scan("See [[Other Note]] for details.");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relation_type, LINKS_TO);
        assert_eq!(relations[0].to_name, "Other Note");
    }

    #[test]
    fn explicit_relation_line_does_not_also_produce_inline_link() {
        let relations = scan("- rel [[Y]]");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relation_type, "rel");
    }

    #[test]
    fn code_fences_are_skipped() {
        let body = "```\n[[Not A Link]]\n```\n\n[[Real Link]]";
        let relations = scan(body);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].to_name, "Real Link");
    }

    #[test]
    fn observation_lines_are_excluded_from_inline_scan() {
        let relations = scan("- [note] see [[Target]] for context");
        assert!(relations.is_empty());
    }
}
