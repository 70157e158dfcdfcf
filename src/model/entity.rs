//! The entity graph node: one Markdown file on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::Fields;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    /// Free-form, normalized to snake_case (`note`, `person`, `schema`, ...).
    pub entity_type: String,
    /// Nearly always `text/markdown`.
    pub content_type: String,
    /// Repo-relative, POSIX separators.
    pub file_path: String,
    /// Stable, URL-safe slug, unique per project.
    pub permalink: String,
    /// SHA-256 hex digest of the file bytes at last sync.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// YAML frontmatter minus reserved keys (`title`, `type`, `permalink`).
    pub entity_metadata: Fields,
}

pub const RESERVED_FRONTMATTER_KEYS: &[&str] = &["title", "type", "permalink"];

impl Entity {
    pub fn new(
        project_id: i64,
        title: impl Into<String>,
        entity_type: impl Into<String>,
        file_path: impl Into<String>,
        permalink: impl Into<String>,
        checksum: impl Into<String>,
        entity_metadata: Fields,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            project_id,
            title: title.into(),
            entity_type: entity_type.into(),
            content_type: "text/markdown".to_string(),
            file_path: file_path.into(),
            permalink: permalink.into(),
            checksum: checksum.into(),
            created_at: now,
            updated_at: now,
            entity_metadata,
        }
    }
}
