//! Parses one Markdown note into its structured pieces: frontmatter,
//! body, observations, relations, tags, title, entity type, and an
//! optional explicit permalink. Side effects (writing to the graph store,
//! the search index) happen in the sync engine; this module is a pure
//! function of (text, path).

pub mod dataview_blocks;
pub mod frontmatter;
pub mod observations;
pub mod relations;

use std::path::Path;

use crate::error::Result;
use crate::model::{Fields, Observation, Relation, RESERVED_FRONTMATTER_KEYS};
use crate::validation::normalize_entity_type;

pub use dataview_blocks::{BlockKind, DataviewBlock};

#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub frontmatter: Fields,
    pub body: String,
    pub observations: Vec<Observation>,
    pub relations: Vec<Relation>,
    pub tags: Vec<String>,
    pub title: String,
    pub entity_type: String,
    /// Explicit permalink from frontmatter, if the author set one.
    pub permalink: Option<String>,
    pub dataview_blocks: Vec<DataviewBlock>,
}

impl ParsedNote {
    /// Frontmatter with the reserved keys (`title`, `type`, `permalink`)
    /// removed — this becomes `Entity::entity_metadata`.
    pub fn entity_metadata(&self) -> Fields {
        self.frontmatter
            .iter()
            .filter(|(k, _)| !RESERVED_FRONTMATTER_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Parses `text` (the full contents of a `.md` file at `path`) into a
/// [`ParsedNote`].
pub fn parse(text: &str, path: &Path) -> Result<ParsedNote> {
    let (frontmatter, body) = frontmatter::parse(text, path)?;

    let title = frontmatter
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| first_h1(&body))
        .unwrap_or_else(|| filename_stem(path));

    let entity_type = frontmatter
        .get("type")
        .and_then(|v| v.as_str())
        .map(normalize_entity_type)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "note".to_string());

    let permalink = frontmatter.get("permalink").and_then(|v| v.as_str()).map(|s| s.to_string());

    let observations = observations::scan(&body);
    let relations = relations::scan(&body);
    let dataview_blocks = dataview_blocks::scan(&body);

    let mut tags: Vec<String> = Vec::new();
    if let Some(fm_tags) = frontmatter.get("tags").and_then(|v| v.as_array()) {
        for t in fm_tags {
            if let Some(s) = t.as_str() {
                if !tags.contains(&s.to_string()) {
                    tags.push(s.to_string());
                }
            }
        }
    }
    for obs in &observations {
        for t in &obs.tags {
            if !tags.contains(t) {
                tags.push(t.clone());
            }
        }
    }

    Ok(ParsedNote {
        frontmatter,
        body,
        observations,
        relations,
        tags,
        title,
        entity_type,
        permalink,
        dataview_blocks,
    })
}

fn first_h1(body: &str) -> Option<String> {
    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            return Some(rest.trim().to_string());
        }
        if trimmed == "#" {
            return Some(String::new());
        }
    }
    None
}

fn filename_stem(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("untitled").to_string()
}

/// Derives a permalink from a repo-relative `file_path` by dropping the
/// extension and slugifying each path segment.
pub fn derive_permalink(file_path: &str) -> String {
    let without_ext = file_path.strip_suffix(".md").unwrap_or(file_path);
    without_ext
        .split('/')
        .map(crate::validation::slugify_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn round_trip_scenario_from_spec() {
        let text = "---\ntitle: X\n---\n# X\n\n- [note] hi #tag (ctx)\n- rel [[Y]]\n";
        let parsed = parse(text, Path::new("notes/X.md")).unwrap();
        assert_eq!(parsed.title, "X");
        assert_eq!(parsed.observations.len(), 1);
        assert_eq!(parsed.observations[0].category, "note");
        assert_eq!(parsed.observations[0].content, "hi");
        assert_eq!(parsed.observations[0].tags, vec!["tag".to_string()]);
        assert_eq!(parsed.observations[0].context.as_deref(), Some("ctx"));
        assert_eq!(parsed.relations.len(), 1);
        assert_eq!(parsed.relations[0].relation_type, "rel");
        assert_eq!(parsed.relations[0].to_name, "Y");
        assert!(parsed.relations[0].to_id.is_none());
    }

    #[test]
    fn title_defaults_to_filename_without_h1_or_frontmatter() {
        let parsed = parse("just a body, no heading", Path::new("notes/My Note.md")).unwrap();
        assert_eq!(parsed.title, "My Note");
    }

    #[test]
    fn title_falls_back_to_first_h1() {
        let parsed = parse("# Heading Title\n\nbody", Path::new("notes/x.md")).unwrap();
        assert_eq!(parsed.title, "Heading Title");
    }

    #[test]
    fn entity_type_defaults_to_note_and_normalizes() {
        let parsed = parse("body", Path::new("x.md")).unwrap();
        assert_eq!(parsed.entity_type, "note");

        let parsed = parse("---\ntype: Project Plan\n---\nbody", Path::new("x.md")).unwrap();
        assert_eq!(parsed.entity_type, "project_plan");
    }

    #[test]
    fn derives_permalink_from_wsl_style_path() {
        assert_eq!(derive_permalink("legal-research/Legal Research.md"), "legal-research/legal-research");
    }

    #[test]
    fn explicit_permalink_overrides_derivation() {
        let parsed = parse("---\npermalink: custom/slug\n---\nbody", Path::new("x.md")).unwrap();
        assert_eq!(parsed.permalink.as_deref(), Some("custom/slug"));
    }

    #[test]
    fn entity_metadata_excludes_reserved_keys() {
        let parsed = parse("---\ntitle: X\ntype: note\npermalink: a/b\nauthor: me\n---\nbody", Path::new("x.md")).unwrap();
        let meta = parsed.entity_metadata();
        assert!(!meta.contains_key("title"));
        assert!(!meta.contains_key("type"));
        assert!(!meta.contains_key("permalink"));
        assert!(meta.contains_key("author"));
    }
}
