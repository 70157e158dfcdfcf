//! A directed, typed edge between two entities.

use serde::{Deserialize, Serialize};

/// Reserved `relation_type` owned exclusively by the Dataview refresh path
/// (`crate::sync::dataview_refresh`). Never written by the authoring path.
pub const DATAVIEW_LINK: &str = "dataview_link";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub from_id: i64,
    /// `None` while unresolved; see [`Relation::is_unresolved`].
    pub to_id: Option<i64>,
    /// Original wikilink text, kept so the resolver can retry after
    /// `to_id` resolves and so a re-created file re-resolves it.
    pub to_name: String,
    /// Normalized: underscores are treated as equivalent to hyphens
    /// (`part_of` ≡ `part-of`) by [`crate::validation::normalize_relation_type`].
    pub relation_type: String,
    pub context: Option<String>,
}

impl Relation {
    pub fn new(from_id: i64, to_name: impl Into<String>, relation_type: impl Into<String>) -> Self {
        Self {
            id: 0,
            from_id,
            to_id: None,
            to_name: to_name.into(),
            relation_type: relation_type.into(),
            context: None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.to_id.is_none()
    }

    pub fn is_dataview_link(&self) -> bool {
        self.relation_type == DATAVIEW_LINK
    }
}
