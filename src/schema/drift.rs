//! Compares a declared Picoschema against what notes actually contain
//! today, by re-running inference and diffing the two field sets.

use std::collections::HashMap;

use super::inference::{infer_schema, NoteData};
use super::picoschema::SchemaField;

const DRIFT_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct CardinalityChange {
    pub field: String,
    pub was_array: bool,
    pub now_array: bool,
}

#[derive(Debug, Clone)]
pub struct DriftReport {
    pub entity_type: String,
    pub new_fields: Vec<String>,
    pub dropped_fields: Vec<String>,
    pub cardinality_changes: Vec<CardinalityChange>,
}

/// `new_fields`: seen in current usage at or above the optional
/// threshold but absent from `declared`. `dropped_fields`: declared but
/// now entirely absent from usage. `cardinality_changes`: present in
/// both, but the array-ness inferred from current usage no longer
/// matches what's declared.
pub fn diff_schema(entity_type: &str, declared: &[SchemaField], notes: &[NoteData]) -> DriftReport {
    let inferred = infer_schema(entity_type, notes);
    let declared_by_name: HashMap<&str, &SchemaField> = declared.iter().map(|f| (f.name.as_str(), f)).collect();
    let inferred_by_name: HashMap<&str, _> = inferred.field_frequencies.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut new_fields = Vec::new();
    for freq in &inferred.field_frequencies {
        if freq.percentage >= DRIFT_THRESHOLD && !declared_by_name.contains_key(freq.name.as_str()) {
            new_fields.push(freq.name.clone());
        }
    }

    let mut dropped_fields = Vec::new();
    let mut cardinality_changes = Vec::new();
    for field in declared {
        match inferred_by_name.get(field.name.as_str()) {
            None => dropped_fields.push(field.name.clone()),
            Some(freq) => {
                if freq.is_array != field.is_array {
                    cardinality_changes.push(CardinalityChange {
                        field: field.name.clone(),
                        was_array: field.is_array,
                        now_array: freq.is_array,
                    });
                }
            }
        }
    }

    DriftReport { entity_type: entity_type.to_string(), new_fields, dropped_fields, cardinality_changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, is_array: bool) -> SchemaField {
        SchemaField {
            name: name.to_string(),
            field_type: "string".to_string(),
            required: true,
            is_array,
            is_enum: false,
            enum_values: Vec::new(),
            description: None,
            is_entity_ref: false,
            children: Vec::new(),
        }
    }

    fn note(id: &str, categories: &[&str]) -> NoteData {
        NoteData {
            identifier: id.to_string(),
            observations: categories.iter().map(|c| (c.to_string(), "x".to_string())).collect(),
            relations: Vec::new(),
            entity_type: None,
        }
    }

    #[test]
    fn field_no_longer_present_is_dropped() {
        let declared = vec![field("role", false)];
        let notes = vec![note("a", &[])];
        let report = diff_schema("person", &declared, &notes);
        assert_eq!(report.dropped_fields, vec!["role".to_string()]);
    }

    #[test]
    fn frequently_used_undeclared_field_is_new() {
        let declared = vec![];
        let notes = vec![note("a", &["location"]), note("b", &["location"])];
        let report = diff_schema("person", &declared, &notes);
        assert_eq!(report.new_fields, vec!["location".to_string()]);
    }

    #[test]
    fn cardinality_flip_is_detected() {
        let declared = vec![field("tag", false)];
        let notes = vec![note("a", &["tag", "tag"]), note("b", &["tag", "tag"])];
        let report = diff_schema("person", &declared, &notes);
        assert_eq!(report.cardinality_changes.len(), 1);
        assert!(!report.cardinality_changes[0].was_array);
        assert!(report.cardinality_changes[0].now_array);
    }

    #[test]
    fn unchanged_field_produces_no_drift() {
        let declared = vec![field("role", false)];
        let notes = vec![note("a", &["role"]), note("b", &["role"])];
        let report = diff_schema("person", &declared, &notes);
        assert!(report.dropped_fields.is_empty());
        assert!(report.new_fields.is_empty());
        assert!(report.cardinality_changes.is_empty());
    }
}
