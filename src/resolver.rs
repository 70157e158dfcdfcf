//! Maps a wikilink target (permalink, title, path, or wildcard pattern) to
//! an entity id. Never errors — absence is `None`, surfaced by the caller
//! as an unresolved relation.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::Entity;
use crate::store::GraphStore;

/// An in-memory snapshot of one project's entities, built once and reused
/// across every lookup in a batch (`resolve_many` runs one index pass
/// rather than one store query per text).
pub struct ResolverIndex {
    by_permalink: HashMap<String, i64>,
    by_title: HashMap<String, Vec<i64>>,
    by_path: HashMap<String, i64>,
}

impl ResolverIndex {
    pub fn build(entities: &[Entity]) -> Self {
        let mut by_permalink = HashMap::new();
        let mut by_title: HashMap<String, Vec<i64>> = HashMap::new();
        let mut by_path = HashMap::new();

        for e in entities {
            by_permalink.insert(e.permalink.clone(), e.id);
            by_title.entry(e.title.clone()).or_default().push(e.id);
            by_path.insert(e.file_path.clone(), e.id);
        }

        Self { by_permalink, by_title, by_path }
    }

    /// Resolves one wikilink target, trying each strategy in spec order
    /// and retrying the whole chain once with hyphen/underscore
    /// normalization applied if the first pass finds nothing.
    pub fn resolve(&self, text: &str) -> Option<i64> {
        if let Some(id) = self.try_all(text) {
            return Some(id);
        }
        let normalized = text.replace('_', "-");
        if normalized != text {
            return self.try_all(&normalized);
        }
        None
    }

    fn try_all(&self, text: &str) -> Option<i64> {
        if let Some(&id) = self.by_permalink.get(text) {
            return Some(id);
        }

        if let Some(ids) = self.by_title.get(text) {
            // Ambiguous title matches are deliberately left unresolved
            // rather than falling through to a weaker strategy.
            return if ids.len() == 1 { Some(ids[0]) } else { None };
        }

        if let Some(&id) = self.by_path.get(text) {
            return Some(id);
        }
        let with_md = format!("{text}.md");
        if let Some(&id) = self.by_path.get(&with_md) {
            return Some(id);
        }
        if let Some(stripped) = text.strip_suffix(".md") {
            if let Some(&id) = self.by_path.get(stripped) {
                return Some(id);
            }
        }

        if text.contains('*') {
            return self.resolve_wildcard(text);
        }

        None
    }

    fn resolve_wildcard(&self, pattern: &str) -> Option<i64> {
        let pattern_segs: Vec<&str> = pattern.split('/').collect();
        let mut matches = Vec::new();
        for (permalink, &id) in &self.by_permalink {
            let segs: Vec<&str> = permalink.split('/').collect();
            if segs.len() == pattern_segs.len()
                && segs.iter().zip(pattern_segs.iter()).all(|(s, p)| *p == "*" || s == p)
            {
                matches.push(id);
            }
        }
        match matches.len() {
            1 => Some(matches[0]),
            _ => None,
        }
    }
}

/// Resolves a single wikilink target against a project's current entities.
pub async fn resolve(store: &GraphStore, project_id: i64, text: &str) -> Result<Option<i64>> {
    let entities = store.list_entities(project_id).await?;
    Ok(ResolverIndex::build(&entities).resolve(text))
}

/// Resolves a batch of wikilink targets with a single store query.
pub async fn resolve_many(
    store: &GraphStore,
    project_id: i64,
    texts: &[String],
) -> Result<HashMap<String, Option<i64>>> {
    let entities = store.list_entities(project_id).await?;
    let index = ResolverIndex::build(&entities);
    Ok(texts.iter().map(|t| (t.clone(), index.resolve(t))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn entity(id: i64, title: &str, file_path: &str, permalink: &str) -> Entity {
        Entity {
            id,
            project_id: 1,
            title: title.to_string(),
            entity_type: "note".to_string(),
            content_type: "text/markdown".to_string(),
            file_path: file_path.to_string(),
            permalink: permalink.to_string(),
            checksum: "abc".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            entity_metadata: Map::new(),
        }
    }

    #[test]
    fn resolves_by_exact_permalink() {
        let index = ResolverIndex::build(&[entity(1, "X", "notes/x.md", "notes/x")]);
        assert_eq!(index.resolve("notes/x"), Some(1));
    }

    #[test]
    fn resolves_by_unique_title() {
        let index = ResolverIndex::build(&[entity(1, "Y", "notes/y.md", "notes/y")]);
        assert_eq!(index.resolve("Y"), Some(1));
    }

    #[test]
    fn ambiguous_title_is_unresolved() {
        let index = ResolverIndex::build(&[
            entity(1, "Dup", "a/dup.md", "a/dup"),
            entity(2, "Dup", "b/dup.md", "b/dup"),
        ]);
        assert_eq!(index.resolve("Dup"), None);
    }

    #[test]
    fn resolves_by_path_with_and_without_extension() {
        let index = ResolverIndex::build(&[entity(1, "X", "notes/x.md", "notes/x")]);
        assert_eq!(index.resolve("notes/x.md"), Some(1));
    }

    #[test]
    fn resolves_wildcard_when_unambiguous() {
        let index = ResolverIndex::build(&[
            entity(1, "Impl", "folder/a/impl.md", "folder/a/impl"),
            entity(2, "Other", "folder/a/other.md", "folder/a/other"),
        ]);
        assert_eq!(index.resolve("folder/*/impl"), Some(1));
    }

    #[test]
    fn wildcard_ambiguity_is_unresolved() {
        let index = ResolverIndex::build(&[
            entity(1, "Impl", "folder/a/impl.md", "folder/a/impl"),
            entity(2, "Impl2", "folder/b/impl.md", "folder/b/impl"),
        ]);
        assert_eq!(index.resolve("folder/*/impl"), None);
    }

    #[test]
    fn hyphen_underscore_equivalence() {
        let index = ResolverIndex::build(&[entity(1, "A B", "notes/a-b.md", "notes/a-b")]);
        assert_eq!(index.resolve("notes/a_b"), index.resolve("notes/a-b"));
        assert_eq!(index.resolve("notes/a_b"), Some(1));
    }

    #[test]
    fn unknown_target_is_none() {
        let index = ResolverIndex::build(&[entity(1, "X", "notes/x.md", "notes/x")]);
        assert_eq!(index.resolve("nope"), None);
    }
}
