//! Picoschema: the compact schema notation a `type: schema` note declares
//! in its frontmatter to describe the expected observation categories and
//! relation types of another entity type, plus the engine that infers,
//! validates against, and diffs such schemas from actual usage.
//!
//! Adapted from a prior `FieldType`/`FieldDef` design that modeled
//! SQL-ish column types for a collection registry loaded from
//! `.mdby/schemas/*.yaml`. Picoschema notes are ordinary entities
//! (frontmatter on a `type: schema` note), not a separate on-disk
//! registry, so that loader is replaced by a query against the graph
//! store; `is_valid_date`/`is_valid_datetime` are kept as the scalar
//! checks a full Picoschema validator would still need.

pub mod drift;
pub mod inference;
pub mod picoschema;
pub mod validate;

use crate::error::Result;
use crate::markdown::frontmatter::fields_to_yaml;
use crate::store::GraphStore;

pub use drift::{diff_schema, CardinalityChange, DriftReport};
pub use inference::{infer_schema, FieldFrequency, FieldSource, InferenceResult, NoteData};
pub use picoschema::{parse_picoschema, parse_schema_note, SchemaDefinition, SchemaField, ValidationMode};
pub use validate::{validate_notes, IssueSeverity, ValidationIssue, ValidationReport};

/// Checks whether a string is a plausible `YYYY-MM-DD` date, used when
/// validating scalar frontmatter fields declared `date` in a schema's
/// `settings.frontmatter` block.
pub fn is_valid_date(s: &str) -> bool {
    if s.len() != 10 {
        return false;
    }
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return false;
    }
    let (year, month, day) = (parts[0].parse::<u32>(), parts[1].parse::<u32>(), parts[2].parse::<u32>());
    matches!((year, month, day), (Ok(_), Ok(m), Ok(d)) if (1..=12).contains(&m) && (1..=31).contains(&d))
}

/// Checks whether a string is a plausible ISO-8601 datetime (`date`,
/// optionally followed by `T`/space and `HH:MM[...]`).
pub fn is_valid_datetime(s: &str) -> bool {
    if s.len() < 10 || !is_valid_date(&s[..10]) {
        return false;
    }
    if s.len() == 10 {
        return true;
    }
    let sep = s.as_bytes()[10] as char;
    if sep != 'T' && sep != ' ' {
        return false;
    }
    if s.len() < 16 {
        return false;
    }
    let time_part = &s[11..];
    let time_base = time_part.split(['Z', '+']).next().unwrap_or("");
    let time_parts: Vec<&str> = time_base.split(':').collect();
    if time_parts.len() < 2 {
        return false;
    }
    matches!(
        (time_parts[0].parse::<u32>(), time_parts[1].parse::<u32>()),
        (Ok(h), Ok(m)) if h <= 23 && m <= 59
    )
}

/// Gathers the schema notes and target-entity notes a project needs for
/// inference/validation/drift, bridging the graph store's async,
/// id-keyed rows to the pure, synchronous functions in the sibling
/// modules.
pub struct SchemaEngine {
    store: GraphStore,
}

impl SchemaEngine {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    /// Finds the `type: schema` entity whose `entity` frontmatter field
    /// names `entity_type`, if one exists in this project.
    async fn find_schema_definition(&self, project_id: i64, entity_type: &str) -> Result<Option<SchemaDefinition>> {
        let entities = self.store.list_entities(project_id).await?;
        for entity in entities.into_iter().filter(|e| e.entity_type == "schema") {
            let declared = entity.entity_metadata.get("entity").and_then(|v| v.as_str());
            if declared != Some(entity_type) {
                continue;
            }
            let yaml = fields_to_yaml(&entity.entity_metadata);
            return Ok(Some(parse_schema_note(&yaml)?));
        }
        Ok(None)
    }

    /// Collects every entity of `entity_type` as [`NoteData`]: its
    /// observation categories/contents and outgoing relation
    /// types/targets, plus (best-effort, per the original's own
    /// single-value-per-note simplification) the entity type of its
    /// first resolved relation target.
    async fn gather_notes(&self, project_id: i64, entity_type: &str) -> Result<Vec<NoteData>> {
        let entities = self.store.list_entities(project_id).await?;
        let mut notes = Vec::new();
        for entity in entities.into_iter().filter(|e| e.entity_type == entity_type) {
            let observations = self.store.list_observations(entity.id).await?;
            let relations = self.store.list_outgoing_relations(entity.id).await?;

            let mut target_entity_type = None;
            for relation in &relations {
                if let Some(to_id) = relation.to_id {
                    if let Some(target) = self.store.get_by_id(to_id).await? {
                        target_entity_type = Some(target.entity_type);
                        break;
                    }
                }
            }

            notes.push(NoteData {
                identifier: entity.permalink.clone(),
                observations: observations.into_iter().map(|o| (o.category, o.content)).collect(),
                relations: relations.iter().map(|r| (r.relation_type.clone(), r.to_name.clone())).collect(),
                entity_type: target_entity_type,
            });
        }
        Ok(notes)
    }

    pub async fn infer(&self, project_id: i64, entity_type: &str) -> Result<InferenceResult> {
        let notes = self.gather_notes(project_id, entity_type).await?;
        Ok(infer_schema(entity_type, &notes))
    }

    /// `mode_override` wins over the schema note's own `settings.validation`
    /// when set; with no declared schema at all, every note is reported
    /// valid and `warn` is assumed.
    pub async fn validate(
        &self,
        project_id: i64,
        entity_type: &str,
        mode_override: Option<ValidationMode>,
    ) -> Result<ValidationReport> {
        let notes = self.gather_notes(project_id, entity_type).await?;
        match self.find_schema_definition(project_id, entity_type).await? {
            Some(schema) => {
                let mode = mode_override.unwrap_or(schema.validation_mode);
                Ok(validate_notes(entity_type, &schema.fields, &notes, &mode))
            }
            None => Ok(ValidationReport {
                entity_type: entity_type.to_string(),
                total_notes: notes.len(),
                valid_count: notes.len(),
                warning_count: 0,
                error_count: 0,
                issues: Vec::new(),
            }),
        }
    }

    pub async fn diff(&self, project_id: i64, entity_type: &str) -> Result<DriftReport> {
        let notes = self.gather_notes(project_id, entity_type).await?;
        let declared = match self.find_schema_definition(project_id, entity_type).await? {
            Some(schema) => schema.fields,
            None => Vec::new(),
        };
        Ok(diff_schema(entity_type, &declared, &notes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_validation_accepts_iso_date() {
        assert!(is_valid_date("2024-01-15"));
        assert!(!is_valid_date("2024-13-01"));
        assert!(!is_valid_date("not-a-date"));
    }

    #[test]
    fn datetime_validation_accepts_common_formats() {
        assert!(is_valid_datetime("2024-01-15T10:30:00"));
        assert!(is_valid_datetime("2024-01-15T10:30:00Z"));
        assert!(is_valid_datetime("2024-01-15 10:30:00"));
        assert!(is_valid_datetime("2024-01-15"));
        assert!(!is_valid_datetime("not-a-datetime"));
    }

    #[tokio::test]
    async fn infer_with_no_notes_reports_zero_analyzed() {
        let store = GraphStore::in_memory().unwrap();
        let engine = SchemaEngine::new(store);
        let result = engine.infer(1, "person").await.unwrap();
        assert_eq!(result.notes_analyzed, 0);
    }

    #[tokio::test]
    async fn validate_with_no_declared_schema_reports_everything_valid() {
        let store = GraphStore::in_memory().unwrap();
        let note = crate::store::AppliedNote {
            project_id: 1,
            file_path: "people/a.md".to_string(),
            permalink: "people/a".to_string(),
            checksum: "sum".to_string(),
            title: "A".to_string(),
            entity_type: "person".to_string(),
            entity_metadata: crate::model::Fields::new(),
            observations: vec![],
            relations: vec![],
            now: chrono::Utc::now(),
        };
        store.apply_note(note).await.unwrap();
        let engine = SchemaEngine::new(store);
        let report = engine.validate(1, "person", None).await.unwrap();
        assert_eq!(report.valid_count, 1);
        assert_eq!(report.error_count, 0);
    }
}
