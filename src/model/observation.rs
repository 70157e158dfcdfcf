//! A typed bullet attached to an entity: `- [category] text #tag (context)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: i64,
    pub entity_id: i64,
    /// Free-form, e.g. `design`, `tech`, `todo`.
    pub category: String,
    pub content: String,
    /// Ordered, as written; duplicates are not deduplicated.
    pub tags: Vec<String>,
    pub context: Option<String>,
}

impl Observation {
    pub fn new(category: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            entity_id: 0,
            category: category.into(),
            content: content.into(),
            tags: Vec::new(),
            context: None,
        }
    }
}
